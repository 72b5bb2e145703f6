//! Secure channel handshake and session engine.
//!
//! The channel moves through three phases, each carrying exactly the data it
//! needs:
//!
//! - `Idle`: only the ACU random number (RND.A) exists
//! - `Initialized`: session keys are derived and the PD's client cryptogram
//!   checked; the server cryptogram is ready to send
//! - `Established`: the PD's initial reply MAC matched; MAC chaining and
//!   payload encryption are available
//!
//! # Valid Transitions
//!
//! - Idle → Initialized (`initialize` with a matching client cryptogram)
//! - Initialized → Established (`establish` with a matching initial reply MAC)
//! - any → Idle (`create_new_random_number`)
//!
//! A rejected `initialize` or `establish` leaves the channel exactly as it was.
//!
//! # Key Schedule
//!
//! All derivations are single AES-128-ECB blocks:
//!
//! ```text
//! S-ENC  = E(SCBK,   01 82 RND.A[0..6] 00..)
//! S-MAC1 = E(SCBK,   01 01 RND.A[0..6] 00..)
//! S-MAC2 = E(SCBK,   01 02 RND.A[0..6] 00..)
//! client cryptogram   = E(S-ENC, RND.A | RND.B)
//! server cryptogram   = E(S-ENC, RND.B | RND.A)
//! initial reply MAC   = E(S-MAC2, E(S-MAC1, server cryptogram))
//! ```
//!
//! # Examples
//!
//! ```
//! use osdp_acu::secure_channel::{SecureChannel, SecureChannelPhase, SessionKeys};
//! use osdp_core::SecureChannelKey;
//!
//! let key = SecureChannelKey::default_key();
//! let mut channel = SecureChannel::with_server_random([1; 8]);
//! assert_eq!(channel.phase(), SecureChannelPhase::Idle);
//!
//! // What the PD computes on its side
//! let pd_random = [2; 8];
//! let keys = SessionKeys::derive(&key, &[1; 8]);
//! let client_cryptogram = keys.client_cryptogram(&[1; 8], &pd_random);
//!
//! assert!(channel.initialize(&pd_random, &client_cryptogram, &key));
//! assert_eq!(channel.phase(), SecureChannelPhase::Initialized);
//!
//! let server_cryptogram = channel.server_cryptogram().unwrap();
//! let rmac_i = keys.initial_reply_mac(&server_cryptogram);
//! assert!(channel.establish(&rmac_i));
//! assert!(channel.is_established());
//! ```

use aes::Aes128;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use osdp_core::constants::{BLOCK_SIZE, CRYPTOGRAM_LENGTH, PADDING_START, SERVER_RANDOM_LENGTH};
use osdp_core::{Error, Result, SecureChannelKey};
use rand::RngCore;
use std::fmt;
use subtle::ConstantTimeEq;

/// One AES block.
pub type Block = [u8; BLOCK_SIZE];

const DERIVE_ENC: [u8; 2] = [0x01, 0x82];
const DERIVE_MAC1: [u8; 2] = [0x01, 0x01];
const DERIVE_MAC2: [u8; 2] = [0x01, 0x02];

/// Coarse view of the channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureChannelPhase {
    Idle,
    Initialized,
    Established,
}

impl fmt::Display for SecureChannelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            SecureChannelPhase::Idle => "Idle",
            SecureChannelPhase::Initialized => "Initialized",
            SecureChannelPhase::Established => "Established",
        };
        f.write_str(phase)
    }
}

/// Session keys derived from the base key and the ACU random number.
///
/// Both ends of the link run the same schedule, so this type also exposes the
/// PD-side computations (client cryptogram, initial reply MAC).
#[derive(Clone, Copy)]
pub struct SessionKeys {
    enc: Block,
    mac1: Block,
    mac2: Block,
}

impl SessionKeys {
    pub fn derive(key: &SecureChannelKey, server_random: &[u8; SERVER_RANDOM_LENGTH]) -> Self {
        let base = key.as_bytes();
        SessionKeys {
            enc: encrypt_block(base, &derivation_block(DERIVE_ENC, server_random)),
            mac1: encrypt_block(base, &derivation_block(DERIVE_MAC1, server_random)),
            mac2: encrypt_block(base, &derivation_block(DERIVE_MAC2, server_random)),
        }
    }

    /// Cryptogram the PD returns in osdp_CCRYPT.
    pub fn client_cryptogram(
        &self,
        server_random: &[u8; SERVER_RANDOM_LENGTH],
        pd_random: &[u8; SERVER_RANDOM_LENGTH],
    ) -> Block {
        encrypt_block(&self.enc, &concat_randoms(server_random, pd_random))
    }

    /// Cryptogram the ACU sends in osdp_SCRYPT.
    pub fn server_cryptogram(
        &self,
        server_random: &[u8; SERVER_RANDOM_LENGTH],
        pd_random: &[u8; SERVER_RANDOM_LENGTH],
    ) -> Block {
        encrypt_block(&self.enc, &concat_randoms(pd_random, server_random))
    }

    /// MAC the PD returns in osdp_RMAC_I after accepting the server cryptogram.
    pub fn initial_reply_mac(&self, server_cryptogram: &Block) -> Block {
        encrypt_block(&self.mac2, &encrypt_block(&self.mac1, server_cryptogram))
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKeys(..)")
    }
}

#[derive(Debug, Clone, Copy)]
enum SessionState {
    Idle,
    Initialized {
        keys: SessionKeys,
        server_cryptogram: Block,
        expected_reply_mac: Block,
    },
    Established {
        keys: SessionKeys,
        command_mac: Block,
        reply_mac: Block,
    },
}

/// Secure channel engine for one device.
///
/// This type knows nothing about retries, timers or the bus. The device
/// scheduler queries its phase and feeds it handshake replies.
///
/// # Thread Safety
///
/// Not synchronized. It is owned by a `Device` and mutated only from that
/// device's exchange.
pub struct SecureChannel {
    server_random: [u8; SERVER_RANDOM_LENGTH],
    state: SessionState,
}

impl SecureChannel {
    /// Create an idle channel with a fresh random number.
    pub fn new() -> Self {
        Self::with_server_random(fresh_random())
    }

    /// Create an idle channel with a caller-supplied random number.
    ///
    /// Intended for tests and reproducible simulations.
    pub fn with_server_random(server_random: [u8; SERVER_RANDOM_LENGTH]) -> Self {
        SecureChannel {
            server_random,
            state: SessionState::Idle,
        }
    }

    /// Current ACU random number (RND.A).
    pub fn server_random_number(&self) -> [u8; SERVER_RANDOM_LENGTH] {
        self.server_random
    }

    /// Rotate RND.A and drop any session derived from the old one.
    ///
    /// Used when restarting a handshake so that a nonce is never reused.
    pub fn create_new_random_number(&mut self) {
        self.server_random = fresh_random();
        self.state = SessionState::Idle;
    }

    pub fn phase(&self) -> SecureChannelPhase {
        match self.state {
            SessionState::Idle => SecureChannelPhase::Idle,
            SessionState::Initialized { .. } => SecureChannelPhase::Initialized,
            SessionState::Established { .. } => SecureChannelPhase::Established,
        }
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self.state, SessionState::Idle)
    }

    pub fn is_established(&self) -> bool {
        matches!(self.state, SessionState::Established { .. })
    }

    /// Server cryptogram to send in osdp_SCRYPT, once initialized.
    pub fn server_cryptogram(&self) -> Option<Block> {
        match self.state {
            SessionState::Initialized {
                server_cryptogram, ..
            } => Some(server_cryptogram),
            _ => None,
        }
    }

    /// Derive session keys from the PD's osdp_CCRYPT material.
    ///
    /// Returns `false` without touching any state if the client cryptogram
    /// does not match what the configured key produces.
    pub fn initialize(
        &mut self,
        pd_random: &[u8; SERVER_RANDOM_LENGTH],
        client_cryptogram: &[u8; CRYPTOGRAM_LENGTH],
        key: &SecureChannelKey,
    ) -> bool {
        let keys = SessionKeys::derive(key, &self.server_random);
        let expected = keys.client_cryptogram(&self.server_random, pd_random);
        if !bool::from(expected[..].ct_eq(&client_cryptogram[..])) {
            return false;
        }

        let server_cryptogram = keys.server_cryptogram(&self.server_random, pd_random);
        self.state = SessionState::Initialized {
            keys,
            server_cryptogram,
            expected_reply_mac: keys.initial_reply_mac(&server_cryptogram),
        };
        true
    }

    /// Confirm the session with the PD's initial reply MAC.
    ///
    /// Returns `false` and leaves the channel `Initialized` on mismatch, on
    /// a wrongly sized value, or when called outside the `Initialized` phase.
    pub fn establish(&mut self, initial_reply_mac: &[u8]) -> bool {
        let SessionState::Initialized {
            keys,
            expected_reply_mac,
            ..
        } = self.state
        else {
            return false;
        };

        if initial_reply_mac.len() != CRYPTOGRAM_LENGTH
            || !bool::from(expected_reply_mac[..].ct_eq(initial_reply_mac))
        {
            return false;
        }

        self.state = SessionState::Established {
            keys,
            command_mac: [0u8; BLOCK_SIZE],
            reply_mac: expected_reply_mac,
        };
        true
    }

    /// Compute the MAC of `message` and advance the chain.
    ///
    /// Commands chain on the last reply MAC, replies on the last command MAC,
    /// so a replayed command never verifies as a reply. Every block except
    /// the last uses S-MAC1; the last uses S-MAC2 and is padded with
    /// `0x80 00..` when partial.
    ///
    /// # Errors
    /// Returns `Error::SecureChannelNotEstablished` before the handshake completes.
    pub fn generate_mac(&mut self, message: &[u8], is_command: bool) -> Result<Block> {
        let SessionState::Established {
            keys,
            command_mac,
            reply_mac,
        } = &mut self.state
        else {
            return Err(Error::SecureChannelNotEstablished);
        };

        let mut mac = if is_command { *reply_mac } else { *command_mac };
        let block_count = message.len().div_ceil(BLOCK_SIZE).max(1);

        for (index, chunk) in message
            .chunks(BLOCK_SIZE)
            .chain(message.is_empty().then_some(&[][..]))
            .enumerate()
        {
            let last = index + 1 == block_count;
            let mut block = [0u8; BLOCK_SIZE];
            block[..chunk.len()].copy_from_slice(chunk);
            if last && chunk.len() < BLOCK_SIZE {
                block[chunk.len()] = PADDING_START;
            }
            xor_in_place(&mut block, &mac);
            let key = if last { &keys.mac2 } else { &keys.mac1 };
            mac = encrypt_block(key, &block);
        }

        if is_command {
            *command_mac = mac;
        } else {
            *reply_mac = mac;
        }
        Ok(mac)
    }

    /// Encrypt a command payload with S-ENC.
    ///
    /// The IV is the bitwise inverse of the last reply MAC. The plaintext is
    /// always padded with `0x80` followed by zeros to a block boundary.
    ///
    /// # Errors
    /// Returns `Error::SecureChannelNotEstablished` before the handshake completes.
    pub fn encrypt_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let SessionState::Established {
            keys, reply_mac, ..
        } = &self.state
        else {
            return Err(Error::SecureChannelNotEstablished);
        };
        Ok(cbc_encrypt(&keys.enc, &invert(reply_mac), &pad(data)))
    }

    /// Decrypt a reply payload with S-ENC and strip its padding.
    ///
    /// The IV is the bitwise inverse of the last command MAC.
    ///
    /// # Errors
    /// - `Error::SecureChannelNotEstablished` before the handshake completes
    /// - `Error::InvalidBlockLength` if `data` is not block aligned
    /// - `Error::InvalidPadding` if the plaintext padding is malformed
    pub fn decrypt_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let SessionState::Established {
            keys, command_mac, ..
        } = &self.state
        else {
            return Err(Error::SecureChannelNotEstablished);
        };
        if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
            return Err(Error::InvalidBlockLength {
                length: data.len(),
                block_size: BLOCK_SIZE,
            });
        }
        let plain = cbc_decrypt(&keys.enc, &invert(command_mac), data);
        unpad(plain)
    }
}

impl Default for SecureChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureChannel")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

fn fresh_random() -> [u8; SERVER_RANDOM_LENGTH] {
    let mut random = [0u8; SERVER_RANDOM_LENGTH];
    rand::thread_rng().fill_bytes(&mut random);
    random
}

fn derivation_block(prefix: [u8; 2], server_random: &[u8; SERVER_RANDOM_LENGTH]) -> Block {
    let mut block = [0u8; BLOCK_SIZE];
    block[..2].copy_from_slice(&prefix);
    block[2..8].copy_from_slice(&server_random[..6]);
    block
}

fn concat_randoms(first: &[u8; SERVER_RANDOM_LENGTH], second: &[u8; SERVER_RANDOM_LENGTH]) -> Block {
    let mut block = [0u8; BLOCK_SIZE];
    block[..SERVER_RANDOM_LENGTH].copy_from_slice(first);
    block[SERVER_RANDOM_LENGTH..].copy_from_slice(second);
    block
}

/// AES-128-ECB encrypt a single block.
fn encrypt_block(key: &Block, block: &Block) -> Block {
    let cipher = Aes128::new(key.into());
    let mut output = *block;
    cipher.encrypt_block((&mut output).into());
    output
}

fn xor_in_place(block: &mut Block, other: &Block) {
    for (b, o) in block.iter_mut().zip(other) {
        *b ^= o;
    }
}

fn invert(block: &Block) -> Block {
    let mut inverted = *block;
    for b in &mut inverted {
        *b = !*b;
    }
    inverted
}

fn pad(data: &[u8]) -> Vec<u8> {
    let mut padded = Vec::with_capacity((data.len() / BLOCK_SIZE + 1) * BLOCK_SIZE);
    padded.extend_from_slice(data);
    padded.push(PADDING_START);
    padded.resize(padded.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE, 0x00);
    padded
}

fn unpad(mut data: Vec<u8>) -> Result<Vec<u8>> {
    let marker = data
        .iter()
        .rposition(|&b| b != 0x00)
        .ok_or(Error::InvalidPadding)?;
    if data[marker] != PADDING_START || data.len() - marker > BLOCK_SIZE {
        return Err(Error::InvalidPadding);
    }
    data.truncate(marker);
    Ok(data)
}

/// AES-128-CBC over block-aligned input.
fn cbc_encrypt(key: &Block, iv: &Block, data: &[u8]) -> Vec<u8> {
    let cipher = Aes128::new(key.into());
    let mut output = data.to_vec();
    let mut previous = *iv;
    for chunk in output.chunks_mut(BLOCK_SIZE) {
        for (b, p) in chunk.iter_mut().zip(&previous) {
            *b ^= p;
        }
        cipher.encrypt_block(chunk.into());
        previous.copy_from_slice(chunk);
    }
    output
}

fn cbc_decrypt(key: &Block, iv: &Block, data: &[u8]) -> Vec<u8> {
    let cipher = Aes128::new(key.into());
    let mut output = data.to_vec();
    let mut previous = *iv;
    for chunk in output.chunks_mut(BLOCK_SIZE) {
        let mut current = [0u8; BLOCK_SIZE];
        current.copy_from_slice(chunk);
        cipher.decrypt_block(chunk.into());
        for (b, p) in chunk.iter_mut().zip(&previous) {
            *b ^= p;
        }
        previous = current;
    }
    output
}
