//! Command and reply message model.
//!
//! These types carry what the device scheduler needs to know about a message:
//! its address, code, optional security control block and payload bytes.
//! Framing, CRC/checksum and MAC placement are handled by the transport layer.

use crate::codes::{CommandCode, ReplyCode, SecurityBlockType};
use bytes::Bytes;
use osdp_core::constants::{
    CRYPTOGRAM_ACCEPTED, CRYPTOGRAM_LENGTH, KEY_SELECTOR_DEFAULT, KEY_SELECTOR_INSTALLED,
    SERVER_RANDOM_LENGTH,
};

/// Security control block attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityBlock {
    pub block_type: SecurityBlockType,
    pub data: Bytes,
}

impl SecurityBlock {
    pub fn new(block_type: SecurityBlockType, data: impl Into<Bytes>) -> Self {
        SecurityBlock {
            block_type,
            data: data.into(),
        }
    }

    /// Security block carrying the key selector byte used by the handshake commands.
    fn key_selector(block_type: SecurityBlockType, is_default_key: bool) -> Self {
        let selector = if is_default_key {
            KEY_SELECTOR_DEFAULT
        } else {
            KEY_SELECTOR_INSTALLED
        };
        Self::new(block_type, vec![selector])
    }
}

/// Command sent from the ACU to a PD.
///
/// # Examples
///
/// ```
/// use osdp_protocol::{Command, CommandCode};
///
/// let poll = Command::poll(0x01);
/// assert_eq!(poll.code(), CommandCode::Poll);
/// assert!(poll.data().is_empty());
///
/// let led = Command::new(0x01, CommandCode::LedControl, vec![0x00, 0x01]);
/// assert_eq!(led.data(), &[0x00, 0x01]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    address: u8,
    code: CommandCode,
    security_block: Option<SecurityBlock>,
    data: Bytes,
}

impl Command {
    /// Build an application command with an opaque payload.
    pub fn new(address: u8, code: CommandCode, data: impl Into<Bytes>) -> Self {
        Command {
            address,
            code,
            security_block: None,
            data: data.into(),
        }
    }

    /// Bare poll (osdp_POLL).
    pub fn poll(address: u8) -> Self {
        Self::new(address, CommandCode::Poll, Bytes::new())
    }

    /// Security initialization request (osdp_CHLNG).
    ///
    /// Carries the ACU random number and tells the PD which key variant to
    /// derive the session from.
    pub fn security_initialization_request(
        address: u8,
        server_random: [u8; SERVER_RANDOM_LENGTH],
        is_default_key: bool,
    ) -> Self {
        Command {
            address,
            code: CommandCode::Challenge,
            security_block: Some(SecurityBlock::key_selector(
                SecurityBlockType::BeginSession,
                is_default_key,
            )),
            data: Bytes::copy_from_slice(&server_random),
        }
    }

    /// Server cryptogram (osdp_SCRYPT).
    pub fn server_cryptogram(
        address: u8,
        cryptogram: [u8; CRYPTOGRAM_LENGTH],
        is_default_key: bool,
    ) -> Self {
        Command {
            address,
            code: CommandCode::ServerCryptogram,
            security_block: Some(SecurityBlock::key_selector(
                SecurityBlockType::ServerCryptogram,
                is_default_key,
            )),
            data: Bytes::copy_from_slice(&cryptogram),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn code(&self) -> CommandCode {
        self.code
    }

    pub fn security_block(&self) -> Option<&SecurityBlock> {
        self.security_block.as_ref()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns `true` if this command is a secure channel handshake step.
    pub fn is_handshake(&self) -> bool {
        self.code.is_handshake()
    }

    /// Returns `true` if the handshake step asks for the default key variant.
    pub fn uses_default_key(&self) -> bool {
        self.security_block
            .as_ref()
            .is_some_and(|block| block.data.first() == Some(&KEY_SELECTOR_DEFAULT))
    }
}

/// Reply received from a PD.
///
/// Integrity checks (CRC/checksum, MAC) are assumed to have passed before a
/// `Reply` is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    address: u8,
    sequence: u8,
    code: ReplyCode,
    security_block: Option<SecurityBlock>,
    data: Bytes,
}

impl Reply {
    pub fn new(address: u8, sequence: u8, code: ReplyCode, data: impl Into<Bytes>) -> Self {
        Reply {
            address,
            sequence,
            code,
            security_block: None,
            data: data.into(),
        }
    }

    /// Attach a security control block.
    pub fn with_security_block(mut self, block: SecurityBlock) -> Self {
        self.security_block = Some(block);
        self
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Sequence number echoed by the PD.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn code(&self) -> ReplyCode {
        self.code
    }

    pub fn security_block(&self) -> Option<&SecurityBlock> {
        self.security_block.as_ref()
    }

    /// Raw reply payload bytes.
    pub fn extract_reply_data(&self) -> &[u8] {
        &self.data
    }

    /// Returns `true` if the PD reported that it accepted the server cryptogram.
    ///
    /// The PD signals acceptance with an SCS_14 block whose data byte is `0x01`.
    pub fn secure_cryptogram_has_been_accepted(&self) -> bool {
        self.security_block.as_ref().is_some_and(|block| {
            block.block_type == SecurityBlockType::InitialReplyMac
                && block.data.first() == Some(&CRYPTOGRAM_ACCEPTED)
        })
    }

    /// NAK error code, when this reply is a NAK carrying one.
    pub fn nak_error_code(&self) -> Option<u8> {
        match self.code {
            ReplyCode::Nak => self.data.first().copied(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_command() {
        let cmd = Command::poll(0x05);
        assert_eq!(cmd.address(), 0x05);
        assert_eq!(cmd.code(), CommandCode::Poll);
        assert!(cmd.security_block().is_none());
        assert!(!cmd.is_handshake());
    }

    #[test]
    fn test_security_initialization_request_carries_random_and_key_selector() {
        let random = [1, 2, 3, 4, 5, 6, 7, 8];
        let cmd = Command::security_initialization_request(0x01, random, true);

        assert_eq!(cmd.code(), CommandCode::Challenge);
        assert_eq!(cmd.data(), &random);
        let block = cmd.security_block().unwrap();
        assert_eq!(block.block_type, SecurityBlockType::BeginSession);
        assert_eq!(&block.data[..], &[KEY_SELECTOR_DEFAULT]);
        assert!(cmd.uses_default_key());
        assert!(cmd.is_handshake());
    }

    #[test]
    fn test_server_cryptogram_with_installed_key() {
        let cryptogram = [0xAA; 16];
        let cmd = Command::server_cryptogram(0x01, cryptogram, false);

        assert_eq!(cmd.code(), CommandCode::ServerCryptogram);
        assert_eq!(cmd.data(), &cryptogram);
        assert_eq!(
            cmd.security_block().unwrap().block_type,
            SecurityBlockType::ServerCryptogram
        );
        assert!(!cmd.uses_default_key());
    }

    #[test]
    fn test_cryptogram_accepted_requires_scs14_with_flag() {
        let accepted = Reply::new(1, 1, ReplyCode::InitialReplyMac, vec![0u8; 16])
            .with_security_block(SecurityBlock::new(
                SecurityBlockType::InitialReplyMac,
                vec![CRYPTOGRAM_ACCEPTED],
            ));
        assert!(accepted.secure_cryptogram_has_been_accepted());

        let rejected = Reply::new(1, 1, ReplyCode::InitialReplyMac, vec![0u8; 16])
            .with_security_block(SecurityBlock::new(
                SecurityBlockType::InitialReplyMac,
                vec![0x00],
            ));
        assert!(!rejected.secure_cryptogram_has_been_accepted());

        let wrong_block = Reply::new(1, 1, ReplyCode::InitialReplyMac, vec![0u8; 16])
            .with_security_block(SecurityBlock::new(
                SecurityBlockType::ClientCryptogram,
                vec![CRYPTOGRAM_ACCEPTED],
            ));
        assert!(!wrong_block.secure_cryptogram_has_been_accepted());

        let bare = Reply::new(1, 1, ReplyCode::Ack, Bytes::new());
        assert!(!bare.secure_cryptogram_has_been_accepted());
    }

    #[test]
    fn test_nak_error_code() {
        let nak = Reply::new(1, 2, ReplyCode::Nak, vec![0x06]);
        assert_eq!(nak.nak_error_code(), Some(0x06));

        let ack = Reply::new(1, 2, ReplyCode::Ack, vec![0x06]);
        assert_eq!(ack.nak_error_code(), None);
    }
}
