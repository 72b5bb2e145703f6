//! Error types for the ACU side of the bus.
//!
//! Protocol validation failures never show up here: they are reported as
//! booleans or unchanged state. These errors cover transports, channels and
//! misuse of the secure channel engine.

/// Result type alias for ACU operations.
pub type Result<T> = std::result::Result<T, AcuError>;

/// Errors that can occur while driving a device.
#[derive(Debug, thiserror::Error)]
pub enum AcuError {
    /// Protocol-level error from the core crates.
    #[error("Protocol error: {0}")]
    Protocol(#[from] osdp_core::Error),

    /// The transport could not complete an exchange.
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// The device owning the command queue has been dropped.
    #[error("Device {address:#04x} is no longer accepting commands")]
    DeviceClosed { address: u8 },

    /// The exchange task ended abnormally.
    #[error("Exchange task failed: {message}")]
    Task { message: String },
}

impl AcuError {
    /// Create a new transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            AcuError::DeviceClosed { address: 0x0A }.to_string(),
            "Device 0x0a is no longer accepting commands"
        );
        assert_eq!(
            AcuError::transport("line idle").to_string(),
            "Transport error: line idle"
        );
    }

    #[test]
    fn test_from_core_error() {
        let err: AcuError = osdp_core::Error::SecureChannelNotEstablished.into();
        assert!(matches!(err, AcuError::Protocol(_)));
    }
}
