pub mod biometric;
pub mod codes;
pub mod control;
pub mod message;
pub mod payload;

pub use biometric::{
    BiometricFormat, BiometricReadResult, BiometricStatus, BiometricTemplateData, BiometricType,
};
pub use codes::{CommandCode, ReplyCode, SecurityBlockType};
pub use control::Control;
pub use message::{Command, Reply, SecurityBlock};
pub use payload::{PayloadData, decode_with_tail, encode_with_tail};
