use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Message model errors
    #[error("Unknown command code: 0x{code:02X}")]
    UnknownCommandCode { code: u8 },

    #[error("Unknown reply code: 0x{code:02X}")]
    UnknownReplyCode { code: u8 },

    #[error("Invalid {field} value: 0x{value:02X}")]
    InvalidEnumValue { field: &'static str, value: u8 },

    // Payload errors
    #[error("Payload too short: expected at least {expected} bytes, got {actual}")]
    PayloadTooShort { expected: usize, actual: usize },

    #[error("Payload length mismatch: header declares {declared} bytes, {actual} available")]
    PayloadLengthMismatch { declared: usize, actual: usize },

    #[error("Payload tail too long: {length} bytes exceeds the 2-byte length prefix")]
    PayloadTooLong { length: usize },

    // Secure channel errors
    #[error("Secure channel is not established")]
    SecureChannelNotEstablished,

    #[error("Invalid block length: {length} is not a multiple of {block_size}")]
    InvalidBlockLength { length: usize, block_size: usize },

    #[error("Invalid padding in decrypted data")]
    InvalidPadding,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
