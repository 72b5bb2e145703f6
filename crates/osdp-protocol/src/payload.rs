//! Shared encode/decode primitive for length-prefixed payloads.
//!
//! Several command and reply payloads share one layout: a few fixed-width
//! header bytes, a 2-byte little-endian length, then a variable-length tail.
//!
//! ```text
//! | header (N bytes) | length (u16 LE) | tail (length bytes) |
//! ```
//!
//! There is no padding or alignment. Decoding is the exact inverse of
//! encoding: the declared length must match the bytes that follow it.
//!
//! # Examples
//!
//! ```
//! use osdp_protocol::payload::{decode_with_tail, encode_with_tail};
//!
//! let encoded = encode_with_tail(&[0x01, 0x02], b"abc").unwrap();
//! assert_eq!(encoded.as_ref(), &[0x01, 0x02, 0x03, 0x00, b'a', b'b', b'c']);
//!
//! let (header, tail) = decode_with_tail::<2>(&encoded).unwrap();
//! assert_eq!(header, [0x01, 0x02]);
//! assert_eq!(tail, b"abc");
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use osdp_core::{Error, Result, constants::LENGTH_PREFIX_SIZE};

/// Payload types that follow the header + length + tail convention.
pub trait PayloadData: Sized {
    /// Serialize into wire bytes.
    ///
    /// # Errors
    /// Returns `Error::PayloadTooLong` if the tail does not fit the length prefix.
    fn build_data(&self) -> Result<Bytes>;

    /// Parse from wire bytes.
    ///
    /// # Errors
    /// Returns an error for truncated payloads, length mismatches and
    /// out-of-range enum values. Never panics on malformed input.
    fn parse_data(data: &[u8]) -> Result<Self>;
}

/// Encode `header`, the tail length and `tail`.
///
/// # Errors
/// Returns `Error::PayloadTooLong` if `tail` is longer than `u16::MAX`.
pub fn encode_with_tail(header: &[u8], tail: &[u8]) -> Result<Bytes> {
    let length = u16::try_from(tail.len())
        .map_err(|_| Error::PayloadTooLong { length: tail.len() })?;

    let mut buf = BytesMut::with_capacity(header.len() + LENGTH_PREFIX_SIZE + tail.len());
    buf.put_slice(header);
    buf.put_u16_le(length);
    buf.put_slice(tail);
    Ok(buf.freeze())
}

/// Decode an `N`-byte header and the length-prefixed tail.
///
/// # Errors
/// - `Error::PayloadTooShort` if the header or length prefix is truncated
/// - `Error::PayloadLengthMismatch` if the declared length differs from the
///   number of bytes that follow
pub fn decode_with_tail<const N: usize>(data: &[u8]) -> Result<([u8; N], &[u8])> {
    let minimum = N + LENGTH_PREFIX_SIZE;
    if data.len() < minimum {
        return Err(Error::PayloadTooShort {
            expected: minimum,
            actual: data.len(),
        });
    }

    let (header, rest) = data.split_at(N);
    let (prefix, tail) = rest.split_at(LENGTH_PREFIX_SIZE);
    let declared = usize::from(u16::from_le_bytes([prefix[0], prefix[1]]));

    if declared != tail.len() {
        return Err(Error::PayloadLengthMismatch {
            declared,
            actual: tail.len(),
        });
    }

    let mut fixed = [0u8; N];
    fixed.copy_from_slice(header);
    Ok((fixed, tail))
}
