//! Biometric command and reply payloads.
//!
//! Both payloads follow the shared header + length + tail layout from
//! [`crate::payload`]:
//!
//! ```text
//! osdp_BIOMATCH  | reader | type   | format  | quality threshold | len LE | template |
//! osdp_BIOREADR  | reader | status | type    | quality           | len LE | template |
//! ```

use crate::codes::CommandCode;
use crate::message::Command;
use crate::payload::{PayloadData, decode_with_tail, encode_with_tail};
use bytes::Bytes;
use osdp_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Body part scanned by a biometric reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BiometricType {
    NotSpecified = 0x00,
    RightThumbPrint = 0x01,
    RightIndexFingerPrint = 0x02,
    RightMiddleFingerPrint = 0x03,
    RightRingFingerPrint = 0x04,
    RightLittleFingerPrint = 0x05,
    LeftThumbPrint = 0x06,
    LeftIndexFingerPrint = 0x07,
    LeftMiddleFingerPrint = 0x08,
    LeftRingFingerPrint = 0x09,
    LeftLittleFingerPrint = 0x0A,
    RightIrisScan = 0x0B,
    RightRetinaScan = 0x0C,
    LeftIrisScan = 0x0D,
    LeftRetinaScan = 0x0E,
    FullFaceImage = 0x0F,
    RightHandGeometry = 0x10,
    LeftHandGeometry = 0x11,
}

impl BiometricType {
    /// # Errors
    /// Returns `Error::InvalidEnumValue` for values above `0x11`.
    pub fn from_u8(value: u8) -> Result<Self> {
        use BiometricType::*;
        let kind = match value {
            0x00 => NotSpecified,
            0x01 => RightThumbPrint,
            0x02 => RightIndexFingerPrint,
            0x03 => RightMiddleFingerPrint,
            0x04 => RightRingFingerPrint,
            0x05 => RightLittleFingerPrint,
            0x06 => LeftThumbPrint,
            0x07 => LeftIndexFingerPrint,
            0x08 => LeftMiddleFingerPrint,
            0x09 => LeftRingFingerPrint,
            0x0A => LeftLittleFingerPrint,
            0x0B => RightIrisScan,
            0x0C => RightRetinaScan,
            0x0D => LeftIrisScan,
            0x0E => LeftRetinaScan,
            0x0F => FullFaceImage,
            0x10 => RightHandGeometry,
            0x11 => LeftHandGeometry,
            _ => {
                return Err(Error::InvalidEnumValue {
                    field: "biometric type",
                    value,
                });
            }
        };
        Ok(kind)
    }

    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Encoding of an attached biometric template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BiometricFormat {
    NotSpecified = 0x00,
    FingerPrintRawPgm = 0x01,
    FingerPrintTemplateAnsi378 = 0x02,
}

impl BiometricFormat {
    /// # Errors
    /// Returns `Error::InvalidEnumValue` for unknown formats.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(BiometricFormat::NotSpecified),
            0x01 => Ok(BiometricFormat::FingerPrintRawPgm),
            0x02 => Ok(BiometricFormat::FingerPrintTemplateAnsi378),
            _ => Err(Error::InvalidEnumValue {
                field: "biometric format",
                value,
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Outcome reported by a PD for a biometric scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BiometricStatus {
    Success = 0x00,
    Timeout = 0x01,
    UnknownError = 0xFF,
}

impl BiometricStatus {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(BiometricStatus::Success),
            0x01 => Ok(BiometricStatus::Timeout),
            0xFF => Ok(BiometricStatus::UnknownError),
            _ => Err(Error::InvalidEnumValue {
                field: "biometric status",
                value,
            }),
        }
    }

    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Template the PD should match a live scan against (osdp_BIOMATCH).
///
/// # Examples
///
/// ```
/// use osdp_protocol::{BiometricFormat, BiometricTemplateData, BiometricType, PayloadData};
///
/// let data = BiometricTemplateData::new(
///     0,
///     BiometricType::RightIndexFingerPrint,
///     BiometricFormat::FingerPrintTemplateAnsi378,
///     80,
///     vec![0xDE, 0xAD],
/// );
///
/// let wire = data.build_data().unwrap();
/// assert_eq!(wire.as_ref(), &[0x00, 0x02, 0x02, 80, 0x02, 0x00, 0xDE, 0xAD]);
/// assert_eq!(BiometricTemplateData::parse_data(&wire).unwrap(), data);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiometricTemplateData {
    /// Reader number starting at 0.
    pub reader_number: u8,
    pub bio_type: BiometricType,
    pub format: BiometricFormat,
    /// Threshold required for accepting a match.
    pub quality_threshold: u8,
    pub template: Bytes,
}

impl BiometricTemplateData {
    pub fn new(
        reader_number: u8,
        bio_type: BiometricType,
        format: BiometricFormat,
        quality_threshold: u8,
        template: impl Into<Bytes>,
    ) -> Self {
        BiometricTemplateData {
            reader_number,
            bio_type,
            format,
            quality_threshold,
            template: template.into(),
        }
    }

    /// Wrap this payload in an osdp_BIOMATCH command.
    ///
    /// # Errors
    /// Returns `Error::PayloadTooLong` if the template exceeds 65535 bytes.
    pub fn to_command(&self, address: u8) -> Result<Command> {
        Ok(Command::new(
            address,
            CommandCode::BiometricMatch,
            self.build_data()?,
        ))
    }
}

impl PayloadData for BiometricTemplateData {
    fn build_data(&self) -> Result<Bytes> {
        encode_with_tail(
            &[
                self.reader_number,
                self.bio_type.to_u8(),
                self.format.to_u8(),
                self.quality_threshold,
            ],
            &self.template,
        )
    }

    fn parse_data(data: &[u8]) -> Result<Self> {
        let ([reader_number, bio_type, format, quality_threshold], template) =
            decode_with_tail::<4>(data)?;
        Ok(BiometricTemplateData {
            reader_number,
            bio_type: BiometricType::from_u8(bio_type)?,
            format: BiometricFormat::from_u8(format)?,
            quality_threshold,
            template: Bytes::copy_from_slice(template),
        })
    }
}

/// Scan result returned by a PD (osdp_BIOREADR).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiometricReadResult {
    pub reader_number: u8,
    pub status: BiometricStatus,
    pub bio_type: BiometricType,
    pub quality: u8,
    pub template: Bytes,
}

impl PayloadData for BiometricReadResult {
    fn build_data(&self) -> Result<Bytes> {
        encode_with_tail(
            &[
                self.reader_number,
                self.status.to_u8(),
                self.bio_type.to_u8(),
                self.quality,
            ],
            &self.template,
        )
    }

    fn parse_data(data: &[u8]) -> Result<Self> {
        let ([reader_number, status, bio_type, quality], template) =
            decode_with_tail::<4>(data)?;
        Ok(BiometricReadResult {
            reader_number,
            status: BiometricStatus::from_u8(status)?,
            bio_type: BiometricType::from_u8(bio_type)?,
            quality,
            template: Bytes::copy_from_slice(template),
        })
    }
}
