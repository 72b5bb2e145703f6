//! Core constants for the OSDP control-panel implementation.
//!
//! This module collects the protocol-level values shared by the message model,
//! the secure channel engine and the per-device scheduler.
//!
//! # Handshake Layout
//!
//! The secure channel handshake is a two-round exchange driven by the ACU:
//!
//! ```text
//! ACU ── osdp_CHLNG  (RND.A, 8 bytes) ─────────────────────────────▶ PD
//! ACU ◀─ osdp_CCRYPT (cUID 8 | RND.B 8 | client cryptogram 16) ─── PD
//! ACU ── osdp_SCRYPT (server cryptogram 16) ──────────────────────▶ PD
//! ACU ◀─ osdp_RMAC_I (initial reply MAC 16) ─────────────────────── PD
//! ```
//!
//! # Usage
//!
//! ```
//! use osdp_core::constants::*;
//!
//! assert_eq!(RETRY_LIMIT, 2);
//! assert_eq!(DEFAULT_SECURE_CHANNEL_KEY[0], 0x30);
//! assert_eq!(CCRYPT_PD_RANDOM_OFFSET + SERVER_RANDOM_LENGTH, CCRYPT_CLIENT_CRYPTOGRAM_OFFSET);
//! ```

use std::time::Duration;

// ============================================================================
// Bus Addressing
// ============================================================================

/// Highest address a PD may be assigned on the bus. 0x7F is broadcast.
pub const MAX_DEVICE_ADDRESS: u8 = 0x7E;

// ============================================================================
// Scheduling
// ============================================================================

/// Number of consecutive resend attempts before a command is abandoned.
pub const RETRY_LIMIT: u8 = 2;

/// How long a valid reply keeps a device "connected".
///
/// # Examples
///
/// ```
/// use osdp_core::constants::LIVENESS_WINDOW;
/// use std::time::Duration;
///
/// assert_eq!(LIVENESS_WINDOW, Duration::from_secs(8));
/// ```
pub const LIVENESS_WINDOW: Duration = Duration::from_secs(8);

/// Default delay between two exchanges with the same device.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

// ============================================================================
// Control Block
// ============================================================================

/// Highest sequence number. Sequence 0 is reserved for the reset exchange,
/// so a running session cycles 1, 2, 3, 1, ...
pub const MAX_SEQUENCE: u8 = 3;

/// Mask applied to an observed sequence byte.
pub const SEQUENCE_MASK: u8 = 0x03;

/// Control byte flag: message carries a 16-bit CRC instead of a checksum.
pub const CONTROL_FLAG_CRC: u8 = 0x04;

/// Control byte flag: message carries a security control block.
pub const CONTROL_FLAG_SECURITY_BLOCK: u8 = 0x08;

// ============================================================================
// Secure Channel
// ============================================================================

/// Well-known secure channel base key (SCBK-D) used during installation mode.
pub const DEFAULT_SECURE_CHANNEL_KEY: [u8; 16] = [
    0x30, 0x31, 0x32, 0x33, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39, 0x3A, 0x3B, 0x3C, 0x3D, 0x3E, 0x3F,
];

/// Length of a secure channel key in bytes (AES-128).
pub const KEY_LENGTH: usize = 16;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Length of the ACU (RND.A) and PD (RND.B) random numbers.
pub const SERVER_RANDOM_LENGTH: usize = 8;

/// Length of client/server cryptograms and MACs.
pub const CRYPTOGRAM_LENGTH: usize = 16;

/// First padding byte appended before encryption and MAC computation.
pub const PADDING_START: u8 = 0x80;

/// Security block data byte selecting the default key (SCBK-D).
pub const KEY_SELECTOR_DEFAULT: u8 = 0x00;

/// Security block data byte selecting the installed key (SCBK).
pub const KEY_SELECTOR_INSTALLED: u8 = 0x01;

/// Security block data byte reporting an accepted server cryptogram.
pub const CRYPTOGRAM_ACCEPTED: u8 = 0x01;

// ============================================================================
// osdp_CCRYPT Reply Layout
// ============================================================================

/// Length of the client UID that opens the osdp_CCRYPT payload.
pub const CCRYPT_CLIENT_UID_LENGTH: usize = 8;

/// Offset of the PD random number (RND.B) inside osdp_CCRYPT.
pub const CCRYPT_PD_RANDOM_OFFSET: usize = 8;

/// Offset of the client cryptogram inside osdp_CCRYPT.
pub const CCRYPT_CLIENT_CRYPTOGRAM_OFFSET: usize = 16;

/// Minimum length of a well-formed osdp_CCRYPT payload.
pub const CCRYPT_PAYLOAD_LENGTH: usize = CCRYPT_CLIENT_CRYPTOGRAM_OFFSET + CRYPTOGRAM_LENGTH;

// ============================================================================
// Payload Convention
// ============================================================================

/// Width of the little-endian length prefix that precedes a variable tail.
pub const LENGTH_PREFIX_SIZE: usize = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ccrypt_layout_is_contiguous() {
        assert_eq!(CCRYPT_CLIENT_UID_LENGTH, CCRYPT_PD_RANDOM_OFFSET);
        assert_eq!(
            CCRYPT_PD_RANDOM_OFFSET + SERVER_RANDOM_LENGTH,
            CCRYPT_CLIENT_CRYPTOGRAM_OFFSET
        );
        assert_eq!(CCRYPT_PAYLOAD_LENGTH, 32);
    }

    #[test]
    fn test_default_key_is_ascii_sequence() {
        for (i, byte) in DEFAULT_SECURE_CHANNEL_KEY.iter().enumerate() {
            assert_eq!(*byte, 0x30 + i as u8);
        }
    }
}
