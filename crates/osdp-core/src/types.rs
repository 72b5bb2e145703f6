use crate::{
    Result,
    constants::{DEFAULT_SECURE_CHANNEL_KEY, KEY_LENGTH},
    error::Error,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use subtle::ConstantTimeEq;

/// Secure channel base key (AES-128).
///
/// # Security
/// Equality uses constant-time comparison so that checking a configured key
/// against the well-known default key does not leak where they differ. The
/// `Debug` output never contains key material.
///
/// # Serialization
/// Keys are (de)serialized as 32-character hex strings.
///
/// # Examples
///
/// ```
/// use osdp_core::SecureChannelKey;
///
/// let key: SecureChannelKey = "303132333435363738393A3B3C3D3E3F".parse().unwrap();
/// assert!(key.is_default());
/// ```
#[derive(Clone, Copy, Eq)]
pub struct SecureChannelKey([u8; KEY_LENGTH]);

impl SecureChannelKey {
    /// Wrap raw key bytes.
    #[must_use]
    pub const fn new(bytes: [u8; KEY_LENGTH]) -> Self {
        SecureChannelKey(bytes)
    }

    /// The well-known default key (SCBK-D).
    #[must_use]
    pub const fn default_key() -> Self {
        SecureChannelKey(DEFAULT_SECURE_CHANNEL_KEY)
    }

    /// Build a key from a slice.
    ///
    /// # Errors
    /// Returns `Error::InvalidKey` if the slice is not exactly 16 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            Error::InvalidKey(format!(
                "expected {KEY_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(SecureChannelKey(key))
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }

    /// Returns `true` if this key equals the well-known default key.
    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::default_key()
    }

    /// Upper-case hex representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl PartialEq for SecureChannelKey {
    fn eq(&self, other: &Self) -> bool {
        self.0[..].ct_eq(&other.0[..]).into()
    }
}

impl Default for SecureChannelKey {
    fn default() -> Self {
        Self::default_key()
    }
}

impl fmt::Debug for SecureChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureChannelKey(..)")
    }
}

impl std::str::FromStr for SecureChannelKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim()).map_err(|e| Error::InvalidKey(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl From<[u8; KEY_LENGTH]> for SecureChannelKey {
    fn from(bytes: [u8; KEY_LENGTH]) -> Self {
        SecureChannelKey(bytes)
    }
}

impl Serialize for SecureChannelKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SecureChannelKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("303132333435363738393A3B3C3D3E3F", true)]
    #[case("303132333435363738393a3b3c3d3e3f", true)]
    #[case("000102030405060708090A0B0C0D0E0F", false)]
    fn test_key_parse(#[case] input: &str, #[case] is_default: bool) {
        let key: SecureChannelKey = input.parse().unwrap();
        assert_eq!(key.is_default(), is_default);
    }

    #[rstest]
    #[case("")]
    #[case("3031")] // too short
    #[case("303132333435363738393A3B3C3D3E3F40")] // too long
    #[case("zz3132333435363738393A3B3C3D3E3F")] // not hex
    fn test_key_parse_invalid(#[case] input: &str) {
        let result: Result<SecureChannelKey> = input.parse();
        assert!(matches!(result, Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert!(SecureChannelKey::from_slice(&[0u8; 15]).is_err());
        assert!(SecureChannelKey::from_slice(&[0u8; 16]).is_ok());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let key = SecureChannelKey::new([0xAB; 16]);
        let debug = format!("{key:?}");
        assert!(!debug.contains("AB"));
        assert!(!debug.contains("171"));
    }

    #[test]
    fn test_serde_hex_roundtrip() {
        let key = SecureChannelKey::new([0x11; 16]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"11111111111111111111111111111111\"");

        let parsed: SecureChannelKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn test_default_is_default_key() {
        assert!(SecureChannelKey::default().is_default());
        assert_eq!(
            SecureChannelKey::default().as_bytes(),
            &DEFAULT_SECURE_CHANNEL_KEY
        );
    }
}
