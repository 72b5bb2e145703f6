//! Device and exchange configuration.
//!
//! Both types deserialize from JSON with every field optional:
//!
//! ```
//! use osdp_acu::config::DeviceConfig;
//!
//! let config: DeviceConfig = serde_json::from_str(r#"{
//!     "address": 5,
//!     "use_secure_channel": true,
//!     "secure_channel_key": "000102030405060708090A0B0C0D0E0F"
//! }"#).unwrap();
//!
//! assert_eq!(config.address, 5);
//! assert!(!config.effective_key().is_default());
//! ```

use osdp_core::constants::{DEFAULT_POLL_INTERVAL, MAX_DEVICE_ADDRESS};
use osdp_core::{Error, Result, SecureChannelKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-device settings fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Bus address (0x00-0x7E).
    pub address: u8,

    /// CRC-16 instead of the 8-bit checksum.
    pub use_crc: bool,

    /// Require a secure channel before application traffic counts as connected.
    pub use_secure_channel: bool,

    /// Installed key. `None` means the PD still uses the default key.
    pub secure_channel_key: Option<SecureChannelKey>,

    /// Well-known default key the installed key is compared against.
    pub default_key: SecureChannelKey,
}

impl DeviceConfig {
    pub fn new(address: u8) -> Self {
        DeviceConfig {
            address,
            ..Self::default()
        }
    }

    pub fn with_crc(mut self, use_crc: bool) -> Self {
        self.use_crc = use_crc;
        self
    }

    pub fn with_secure_channel(mut self, use_secure_channel: bool) -> Self {
        self.use_secure_channel = use_secure_channel;
        self
    }

    pub fn with_key(mut self, key: SecureChannelKey) -> Self {
        self.secure_channel_key = Some(key);
        self
    }

    pub fn with_default_key(mut self, key: SecureChannelKey) -> Self {
        self.default_key = key;
        self
    }

    /// Key the handshake actually uses.
    pub fn effective_key(&self) -> SecureChannelKey {
        self.secure_channel_key.unwrap_or(self.default_key)
    }

    /// # Errors
    /// Returns `Error::Config` for an address outside the PD range.
    pub fn validate(&self) -> Result<()> {
        if self.address > MAX_DEVICE_ADDRESS {
            return Err(Error::Config(format!(
                "device address {:#04x} exceeds {:#04x}",
                self.address, MAX_DEVICE_ADDRESS
            )));
        }
        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            address: 0,
            use_crc: true,
            use_secure_channel: false,
            secure_channel_key: None,
            default_key: SecureChannelKey::default_key(),
        }
    }
}

/// Settings for the per-device exchange loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Delay between exchanges in milliseconds.
    pub poll_interval_ms: u64,

    /// Whether idle cycles emit a poll. When `false` only queued commands
    /// are sent.
    pub polling: bool,
}

impl ExchangeConfig {
    /// Never shorter than one millisecond, even when `validate` was skipped.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// # Errors
    /// Returns `Error::Config` for a zero poll interval.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll interval must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            polling: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_config() {
        let config = DeviceConfig::default();
        assert!(config.use_crc);
        assert!(!config.use_secure_channel);
        assert!(config.effective_key().is_default());
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case(0x00, true)]
    #[case(0x7E, true)]
    #[case(0x7F, false)]
    #[case(0xFF, false)]
    fn test_validate_address(#[case] address: u8, #[case] valid: bool) {
        assert_eq!(DeviceConfig::new(address).validate().is_ok(), valid);
    }

    #[test]
    fn test_builder_chain() {
        let key = SecureChannelKey::new([0x42; 16]);
        let config = DeviceConfig::new(3)
            .with_crc(false)
            .with_secure_channel(true)
            .with_key(key);

        assert_eq!(config.address, 3);
        assert!(!config.use_crc);
        assert!(config.use_secure_channel);
        assert_eq!(config.effective_key(), key);
    }

    #[test]
    fn test_custom_default_key() {
        let site_default = SecureChannelKey::new([0x99; 16]);
        let config = DeviceConfig::new(1).with_default_key(site_default);
        assert_eq!(config.effective_key(), site_default);
    }

    #[test]
    fn test_json_missing_fields_use_defaults() {
        let config: DeviceConfig = serde_json::from_str(r#"{"address": 9}"#).unwrap();
        assert_eq!(config.address, 9);
        assert!(config.use_crc);
        assert_eq!(config.secure_channel_key, None);
    }

    #[test]
    fn test_json_rejects_bad_key() {
        let result: std::result::Result<DeviceConfig, _> =
            serde_json::from_str(r#"{"secure_channel_key": "1234"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_exchange_config() {
        let config = ExchangeConfig::default();
        assert_eq!(config.poll_interval(), DEFAULT_POLL_INTERVAL);
        assert!(config.polling);

        let zero = ExchangeConfig {
            poll_interval_ms: 0,
            polling: true,
        };
        assert!(matches!(zero.validate(), Err(Error::Config(_))));
        assert_eq!(zero.poll_interval(), Duration::from_millis(1));
    }
}
