//! ACU side of an OSDP bus: per-device protocol state.
//!
//! This crate decides what an access control unit sends to each peripheral
//! device (PD) and what it makes of the answers. Framing and physical I/O sit
//! behind the [`Transport`] trait.
//!
//! # Components
//!
//! - [`SecureChannel`]: handshake and session crypto (AES-128)
//! - [`RetryState`]: the single retry slot and its budget
//! - [`Device`]: command scheduling, liveness and handshake progression
//! - [`DeviceExchange`]: owns a device and a transport and runs the
//!   get-command → send → receive → report cycle, optionally on a tokio task
//! - [`mock::SimulatedPd`]: an in-memory PD for tests and simulations
//!
//! # Examples
//!
//! ```
//! use osdp_acu::mock::SimulatedPd;
//! use osdp_acu::{Device, DeviceConfig, DeviceExchange, ExchangeConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = DeviceConfig::new(0x01).with_secure_channel(true);
//!     let (pd, _handle) = SimulatedPd::new(0x01, config.effective_key());
//!     let mut exchange = DeviceExchange::new(Device::new(config), pd, ExchangeConfig::default());
//!
//!     exchange.run_once().await; // osdp_CHLNG
//!     exchange.run_once().await; // osdp_SCRYPT
//!     assert!(exchange.device().is_security_established());
//! }
//! ```
//!
//! # Thread Safety
//!
//! A [`Device`] is mutated only through `&mut self` by its owner. The command
//! queue is the exception: [`CommandSender`] handles are `Send + Sync` and can
//! enqueue from anywhere.

pub mod clock;
pub mod config;
pub mod device;
pub mod error;
pub mod exchange;
pub mod mock;
pub mod retry;
pub mod secure_channel;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DeviceConfig, ExchangeConfig};
pub use device::{CommandSender, Device};
pub use error::{AcuError, Result};
pub use exchange::{
    DeviceExchange, DeviceStatus, ExchangeHandle, ExchangeOutcome, ExchangeStats, Transport,
};
pub use retry::{RetryOutcome, RetryState};
pub use secure_channel::{SecureChannel, SecureChannelPhase, SessionKeys};
