//! Simulated PD for testing and development.
//!
//! [`SimulatedPd`] implements [`Transport`] by answering commands the way a
//! well-behaved PD would, including the PD side of the secure channel
//! handshake. A [`SimulatedPdHandle`] changes its behavior at runtime and
//! records what it received.

use crate::error::Result;
use crate::exchange::Transport;
use crate::secure_channel::SessionKeys;
use osdp_core::SecureChannelKey;
use osdp_core::constants::{CRYPTOGRAM_ACCEPTED, SERVER_RANDOM_LENGTH};
use osdp_protocol::{Command, CommandCode, Control, Reply, ReplyCode, SecurityBlock, SecurityBlockType};
use std::sync::{Arc, Mutex, PoisonError};

/// NAK error code for an unknown or refused command.
const NAK_UNKNOWN_COMMAND: u8 = 0x03;

/// How the simulated PD answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PdBehavior {
    /// Answer every command normally.
    #[default]
    Normal,
    /// Never answer (timeout).
    Silent,
    /// NAK every command.
    Nak,
    /// Answer osdp_BUSY to every command.
    Busy,
}

#[derive(Debug, Default)]
struct Shared {
    behavior: PdBehavior,
    received: Vec<CommandCode>,
}

/// Handle for controlling a [`SimulatedPd`] from a test.
#[derive(Debug, Clone)]
pub struct SimulatedPdHandle {
    shared: Arc<Mutex<Shared>>,
}

impl SimulatedPdHandle {
    pub fn set_behavior(&self, behavior: PdBehavior) {
        self.lock().behavior = behavior;
    }

    /// Codes of every command the PD has seen, in order.
    pub fn received(&self) -> Vec<CommandCode> {
        self.lock().received.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handshake progress on the PD side.
#[derive(Debug, Clone, Copy)]
struct PdSession {
    keys: SessionKeys,
    server_random: [u8; SERVER_RANDOM_LENGTH],
}

/// In-memory PD answering over the [`Transport`] trait.
///
/// # Examples
///
/// ```
/// use osdp_acu::exchange::Transport;
/// use osdp_acu::mock::SimulatedPd;
/// use osdp_core::SecureChannelKey;
/// use osdp_protocol::{Command, Control, ReplyCode};
///
/// #[tokio::main]
/// async fn main() -> osdp_acu::Result<()> {
///     let (mut pd, handle) = SimulatedPd::new(0x01, SecureChannelKey::default_key());
///
///     let control = Control::new(1, true, false);
///     let reply = pd.exchange(&control, &Command::poll(0x01)).await?.unwrap();
///
///     assert_eq!(reply.code(), ReplyCode::Ack);
///     assert_eq!(reply.sequence(), 1);
///     assert_eq!(handle.received().len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct SimulatedPd {
    address: u8,
    key: SecureChannelKey,
    client_uid: [u8; 8],
    pd_random: [u8; SERVER_RANDOM_LENGTH],
    session: Option<PdSession>,
    shared: Arc<Mutex<Shared>>,
}

impl SimulatedPd {
    /// Create a PD holding `key`.
    pub fn new(address: u8, key: SecureChannelKey) -> (Self, SimulatedPdHandle) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let pd = SimulatedPd {
            address,
            key,
            client_uid: [0x5D, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, address],
            pd_random: [0xB0, 0xB1, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, address],
            session: None,
            shared: Arc::clone(&shared),
        };
        (pd, SimulatedPdHandle { shared })
    }

    fn answer(&mut self, sequence: u8, command: &Command) -> Reply {
        match command.code() {
            CommandCode::Challenge => self.answer_challenge(sequence, command),
            CommandCode::ServerCryptogram => self.answer_server_cryptogram(sequence, command),
            _ => Reply::new(self.address, sequence, ReplyCode::Ack, Vec::new()),
        }
    }

    fn answer_challenge(&mut self, sequence: u8, command: &Command) -> Reply {
        let Ok(server_random) = <[u8; SERVER_RANDOM_LENGTH]>::try_from(command.data()) else {
            return self.nak(sequence);
        };

        let keys = SessionKeys::derive(&self.key, &server_random);
        self.session = Some(PdSession {
            keys,
            server_random,
        });

        let mut data = Vec::with_capacity(32);
        data.extend_from_slice(&self.client_uid);
        data.extend_from_slice(&self.pd_random);
        data.extend_from_slice(&keys.client_cryptogram(&server_random, &self.pd_random));

        Reply::new(self.address, sequence, ReplyCode::ClientCryptogram, data).with_security_block(
            SecurityBlock::new(SecurityBlockType::ClientCryptogram, vec![0x01]),
        )
    }

    fn answer_server_cryptogram(&mut self, sequence: u8, command: &Command) -> Reply {
        let Some(session) = self.session.take() else {
            return self.nak(sequence);
        };

        let expected = session
            .keys
            .server_cryptogram(&session.server_random, &self.pd_random);
        if command.data() != expected.as_slice() {
            return self.nak(sequence);
        }

        let rmac_i = session.keys.initial_reply_mac(&expected);
        Reply::new(self.address, sequence, ReplyCode::InitialReplyMac, rmac_i.to_vec())
            .with_security_block(SecurityBlock::new(
                SecurityBlockType::InitialReplyMac,
                vec![CRYPTOGRAM_ACCEPTED],
            ))
    }

    fn nak(&self, sequence: u8) -> Reply {
        Reply::new(self.address, sequence, ReplyCode::Nak, vec![NAK_UNKNOWN_COMMAND])
    }
}

impl Transport for SimulatedPd {
    async fn exchange(&mut self, control: &Control, command: &Command) -> Result<Option<Reply>> {
        let behavior = {
            let mut shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
            shared.received.push(command.code());
            shared.behavior
        };

        let sequence = control.sequence();
        let reply = match behavior {
            PdBehavior::Normal => Some(self.answer(sequence, command)),
            PdBehavior::Silent => None,
            PdBehavior::Nak => Some(self.nak(sequence)),
            PdBehavior::Busy => Some(Reply::new(self.address, sequence, ReplyCode::Busy, Vec::new())),
        };
        Ok(reply)
    }
}
