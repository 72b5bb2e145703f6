//! Command, reply and security block codes.
//!
//! Every OSDP message carries a one-byte code right after the control block
//! (and the optional security control block). Commands flow from the ACU to a
//! PD, replies flow back.
//!
//! # Wire Format
//!
//! ```text
//! SOM | ADDR | LEN | CTRL | [SCB] | CODE | DATA... | [MAC] | CRC/CKSUM
//!                                   ^^^^
//!                                   code position
//! ```
//!
//! # Handshake Codes
//!
//! - `Challenge` (0x76): osdp_CHLNG, opens a secure channel session
//! - `ServerCryptogram` (0x77): osdp_SCRYPT, proves the ACU holds the key
//! - `ClientCryptogram` (0x76, reply): osdp_CCRYPT, proves the PD holds the key
//! - `InitialReplyMac` (0x78, reply): osdp_RMAC_I, seeds the MAC chain
//!
//! # Examples
//!
//! ```
//! use osdp_protocol::{CommandCode, ReplyCode};
//!
//! let cmd = CommandCode::parse(0x60).unwrap();
//! assert_eq!(cmd, CommandCode::Poll);
//! assert_eq!(cmd.as_u8(), 0x60);
//!
//! assert_eq!(ReplyCode::parse(0x40).unwrap(), ReplyCode::Ack);
//! assert!(ReplyCode::parse(0x00).is_err());
//! ```

use osdp_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Command codes sent by the ACU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandCode {
    Poll,                // 0x60
    IdReport,            // 0x61
    DeviceCapabilities,  // 0x62
    LocalStatus,         // 0x64
    InputStatus,         // 0x65
    OutputStatus,        // 0x66
    ReaderStatus,        // 0x67
    OutputControl,       // 0x68
    LedControl,          // 0x69
    BuzzerControl,       // 0x6A
    TextOutput,          // 0x6B
    CommunicationSet,    // 0x6E
    BiometricRead,       // 0x73
    BiometricMatch,      // 0x74
    KeySet,              // 0x75
    Challenge,           // 0x76
    ServerCryptogram,    // 0x77
    MaxReplySize,        // 0x7B
    FileTransfer,        // 0x7C
    ManufacturerSpecific, // 0x80
    KeepActive,          // 0xA7
}

impl CommandCode {
    /// Parse a command code from its wire byte.
    ///
    /// # Errors
    /// Returns `Error::UnknownCommandCode` for bytes that are not a known command.
    pub fn parse(code: u8) -> Result<Self> {
        match code {
            0x60 => Ok(CommandCode::Poll),
            0x61 => Ok(CommandCode::IdReport),
            0x62 => Ok(CommandCode::DeviceCapabilities),
            0x64 => Ok(CommandCode::LocalStatus),
            0x65 => Ok(CommandCode::InputStatus),
            0x66 => Ok(CommandCode::OutputStatus),
            0x67 => Ok(CommandCode::ReaderStatus),
            0x68 => Ok(CommandCode::OutputControl),
            0x69 => Ok(CommandCode::LedControl),
            0x6A => Ok(CommandCode::BuzzerControl),
            0x6B => Ok(CommandCode::TextOutput),
            0x6E => Ok(CommandCode::CommunicationSet),
            0x73 => Ok(CommandCode::BiometricRead),
            0x74 => Ok(CommandCode::BiometricMatch),
            0x75 => Ok(CommandCode::KeySet),
            0x76 => Ok(CommandCode::Challenge),
            0x77 => Ok(CommandCode::ServerCryptogram),
            0x7B => Ok(CommandCode::MaxReplySize),
            0x7C => Ok(CommandCode::FileTransfer),
            0x80 => Ok(CommandCode::ManufacturerSpecific),
            0xA7 => Ok(CommandCode::KeepActive),
            _ => Err(Error::UnknownCommandCode { code }),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            CommandCode::Poll => 0x60,
            CommandCode::IdReport => 0x61,
            CommandCode::DeviceCapabilities => 0x62,
            CommandCode::LocalStatus => 0x64,
            CommandCode::InputStatus => 0x65,
            CommandCode::OutputStatus => 0x66,
            CommandCode::ReaderStatus => 0x67,
            CommandCode::OutputControl => 0x68,
            CommandCode::LedControl => 0x69,
            CommandCode::BuzzerControl => 0x6A,
            CommandCode::TextOutput => 0x6B,
            CommandCode::CommunicationSet => 0x6E,
            CommandCode::BiometricRead => 0x73,
            CommandCode::BiometricMatch => 0x74,
            CommandCode::KeySet => 0x75,
            CommandCode::Challenge => 0x76,
            CommandCode::ServerCryptogram => 0x77,
            CommandCode::MaxReplySize => 0x7B,
            CommandCode::FileTransfer => 0x7C,
            CommandCode::ManufacturerSpecific => 0x80,
            CommandCode::KeepActive => 0xA7,
        }
    }

    /// Returns `true` for the two commands that drive the secure channel handshake.
    pub fn is_handshake(&self) -> bool {
        matches!(self, CommandCode::Challenge | CommandCode::ServerCryptogram)
    }
}

impl TryFrom<u8> for CommandCode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Self::parse(code)
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02X})", self, self.as_u8())
    }
}

/// Reply codes sent back by a PD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplyCode {
    Ack,                     // 0x40
    Nak,                     // 0x41
    PdIdReport,              // 0x45
    PdCapabilities,          // 0x46
    LocalStatusReport,       // 0x48
    InputStatusReport,       // 0x49
    OutputStatusReport,      // 0x4A
    ReaderStatusReport,      // 0x4B
    RawReaderData,           // 0x50
    FormattedReaderData,     // 0x51
    KeypadData,              // 0x53
    CommunicationConfiguration, // 0x54
    BiometricReadResult,     // 0x57
    BiometricMatchResult,    // 0x58
    ClientCryptogram,        // 0x76
    InitialReplyMac,         // 0x78
    Busy,                    // 0x79
    FileTransferStatus,      // 0x7A
    ManufacturerSpecific,    // 0x90
}

impl ReplyCode {
    /// Parse a reply code from its wire byte.
    ///
    /// # Errors
    /// Returns `Error::UnknownReplyCode` for bytes that are not a known reply.
    pub fn parse(code: u8) -> Result<Self> {
        match code {
            0x40 => Ok(ReplyCode::Ack),
            0x41 => Ok(ReplyCode::Nak),
            0x45 => Ok(ReplyCode::PdIdReport),
            0x46 => Ok(ReplyCode::PdCapabilities),
            0x48 => Ok(ReplyCode::LocalStatusReport),
            0x49 => Ok(ReplyCode::InputStatusReport),
            0x4A => Ok(ReplyCode::OutputStatusReport),
            0x4B => Ok(ReplyCode::ReaderStatusReport),
            0x50 => Ok(ReplyCode::RawReaderData),
            0x51 => Ok(ReplyCode::FormattedReaderData),
            0x53 => Ok(ReplyCode::KeypadData),
            0x54 => Ok(ReplyCode::CommunicationConfiguration),
            0x57 => Ok(ReplyCode::BiometricReadResult),
            0x58 => Ok(ReplyCode::BiometricMatchResult),
            0x76 => Ok(ReplyCode::ClientCryptogram),
            0x78 => Ok(ReplyCode::InitialReplyMac),
            0x79 => Ok(ReplyCode::Busy),
            0x7A => Ok(ReplyCode::FileTransferStatus),
            0x90 => Ok(ReplyCode::ManufacturerSpecific),
            _ => Err(Error::UnknownReplyCode { code }),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ReplyCode::Ack => 0x40,
            ReplyCode::Nak => 0x41,
            ReplyCode::PdIdReport => 0x45,
            ReplyCode::PdCapabilities => 0x46,
            ReplyCode::LocalStatusReport => 0x48,
            ReplyCode::InputStatusReport => 0x49,
            ReplyCode::OutputStatusReport => 0x4A,
            ReplyCode::ReaderStatusReport => 0x4B,
            ReplyCode::RawReaderData => 0x50,
            ReplyCode::FormattedReaderData => 0x51,
            ReplyCode::KeypadData => 0x53,
            ReplyCode::CommunicationConfiguration => 0x54,
            ReplyCode::BiometricReadResult => 0x57,
            ReplyCode::BiometricMatchResult => 0x58,
            ReplyCode::ClientCryptogram => 0x76,
            ReplyCode::InitialReplyMac => 0x78,
            ReplyCode::Busy => 0x79,
            ReplyCode::FileTransferStatus => 0x7A,
            ReplyCode::ManufacturerSpecific => 0x90,
        }
    }
}

impl TryFrom<u8> for ReplyCode {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Self::parse(code)
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02X})", self, self.as_u8())
    }
}

/// Security control block types.
///
/// `BeginSession` through `InitialReplyMac` belong to the handshake; the
/// remaining four mark messages exchanged inside an established session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityBlockType {
    BeginSession,            // SCS_11
    ClientCryptogram,        // SCS_12
    ServerCryptogram,        // SCS_13
    InitialReplyMac,         // SCS_14
    CommandMac,              // SCS_15
    ReplyMac,                // SCS_16
    CommandMacEncrypted,     // SCS_17
    ReplyMacEncrypted,       // SCS_18
}

impl SecurityBlockType {
    pub fn parse(value: u8) -> Result<Self> {
        match value {
            0x11 => Ok(SecurityBlockType::BeginSession),
            0x12 => Ok(SecurityBlockType::ClientCryptogram),
            0x13 => Ok(SecurityBlockType::ServerCryptogram),
            0x14 => Ok(SecurityBlockType::InitialReplyMac),
            0x15 => Ok(SecurityBlockType::CommandMac),
            0x16 => Ok(SecurityBlockType::ReplyMac),
            0x17 => Ok(SecurityBlockType::CommandMacEncrypted),
            0x18 => Ok(SecurityBlockType::ReplyMacEncrypted),
            _ => Err(Error::InvalidEnumValue {
                field: "security block type",
                value,
            }),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            SecurityBlockType::BeginSession => 0x11,
            SecurityBlockType::ClientCryptogram => 0x12,
            SecurityBlockType::ServerCryptogram => 0x13,
            SecurityBlockType::InitialReplyMac => 0x14,
            SecurityBlockType::CommandMac => 0x15,
            SecurityBlockType::ReplyMac => 0x16,
            SecurityBlockType::CommandMacEncrypted => 0x17,
            SecurityBlockType::ReplyMacEncrypted => 0x18,
        }
    }
}
