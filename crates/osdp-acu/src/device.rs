//! Per-device command scheduling.
//!
//! A [`Device`] decides, once per bus cycle, what to send to one PD: a pending
//! retry, the next handshake step, a queued application command or a poll.
//! It is then told how the exchange went and updates its sequence, retry
//! budget, secure channel and liveness accordingly.
//!
//! # Ownership
//!
//! Every mutating operation takes `&mut self`, so a device can only be driven
//! by whoever owns it (normally a [`DeviceExchange`](crate::exchange::DeviceExchange)).
//! The command queue is the one shared piece: [`CommandSender`] handles can
//! be cloned into any thread and enqueue while the owner drains.
//!
//! # Scheduling Order
//!
//! 1. A command waiting for retry always goes first.
//! 2. When polling and the secure channel is required, the handshake step
//!    matching the channel phase (osdp_CHLNG, then osdp_SCRYPT).
//! 3. The oldest queued application command.
//! 4. A poll, but only on polling cycles.
//!
//! # Examples
//!
//! ```
//! use osdp_acu::{Device, DeviceConfig};
//! use osdp_protocol::{Command, CommandCode};
//!
//! let mut device = Device::new(DeviceConfig::new(0x01));
//!
//! // First cycle on a clear-text link is a bare poll
//! let first = device.get_next_command_data(true).unwrap();
//! assert_eq!(first.code(), CommandCode::Poll);
//!
//! device.send_command(Command::new(0x01, CommandCode::LedControl, vec![0x00]));
//! let next = device.get_next_command_data(false).unwrap();
//! assert_eq!(next.code(), CommandCode::LedControl);
//! assert!(device.get_next_command_data(false).is_none());
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::DeviceConfig;
use crate::error::{AcuError, Result};
use crate::retry::{RetryOutcome, RetryState};
use crate::secure_channel::{Block, SecureChannel, SecureChannelPhase};
use osdp_core::SecureChannelKey;
use osdp_core::constants::{
    CCRYPT_CLIENT_CRYPTOGRAM_OFFSET, CCRYPT_PAYLOAD_LENGTH, CCRYPT_PD_RANDOM_OFFSET,
    LIVENESS_WINDOW, SERVER_RANDOM_LENGTH,
};
use osdp_protocol::{Command, Control, Reply};
use std::cmp::Ordering;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Cloneable handle for enqueueing commands to one device.
///
/// # Examples
///
/// ```
/// use osdp_acu::{Device, DeviceConfig};
/// use osdp_protocol::Command;
///
/// let device = Device::new(DeviceConfig::new(0x02));
/// let sender = device.command_sender();
///
/// std::thread::spawn(move || sender.send(Command::poll(0x02)).unwrap())
///     .join()
///     .unwrap();
///
/// assert!(device.has_queued_command());
/// ```
#[derive(Debug, Clone)]
pub struct CommandSender {
    address: u8,
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSender {
    /// Enqueue a command at the tail of the device's queue.
    ///
    /// # Errors
    /// Returns `AcuError::DeviceClosed` once the device has been dropped.
    pub fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| AcuError::DeviceClosed {
                address: self.address,
            })
    }

    pub fn address(&self) -> u8 {
        self.address
    }
}

/// Protocol state for one PD on the bus.
pub struct Device<C: Clock = SystemClock> {
    address: u8,
    control: Control,
    use_secure_channel: bool,
    secure_channel_key: SecureChannelKey,
    is_default_key: bool,
    sender: CommandSender,
    commands: mpsc::UnboundedReceiver<Command>,
    retry: RetryState,
    last_valid_reply: Option<Instant>,
    request_delay: Option<Instant>,
    secure_channel: SecureChannel,
    clock: C,
    is_sending_multipart_message: bool,
    is_receiving_multipart_message: bool,
    bypass_secure_for_multipart: bool,
}

impl Device<SystemClock> {
    /// Create a device without checking `config`; see [`Device::try_new`].
    pub fn new(config: DeviceConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }

    /// Create a device after checking that its address is usable on the bus.
    ///
    /// # Errors
    /// Returns `AcuError::Protocol` wrapping `Error::Config` when
    /// [`DeviceConfig::validate`] rejects the configuration.
    pub fn try_new(config: DeviceConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }
}

impl<C: Clock> Device<C> {
    /// Create a device that reads time from `clock`.
    ///
    /// The configuration is taken as is. Callers holding untrusted input
    /// run [`DeviceConfig::validate`] first.
    pub fn with_clock(config: DeviceConfig, clock: C) -> Self {
        let (tx, commands) = mpsc::unbounded_channel();
        let secure_channel_key = config.effective_key();
        // Ambiguous when an installed key happens to equal the default key:
        // the PD is then asked for the default-key variant.
        let is_default_key = secure_channel_key == config.default_key;

        debug!(
            address = config.address,
            use_crc = config.use_crc,
            use_secure_channel = config.use_secure_channel,
            is_default_key,
            "Device created"
        );

        Device {
            address: config.address,
            control: Control::new(0, config.use_crc, config.use_secure_channel),
            use_secure_channel: config.use_secure_channel,
            secure_channel_key,
            is_default_key,
            sender: CommandSender {
                address: config.address,
                tx,
            },
            commands,
            retry: RetryState::new(),
            last_valid_reply: None,
            request_delay: None,
            secure_channel: SecureChannel::new(),
            clock,
            is_sending_multipart_message: false,
            is_receiving_multipart_message: false,
            bypass_secure_for_multipart: false,
        }
    }

    /// Replace the secure channel with one seeded by `server_random`.
    ///
    /// Lets simulations and tests reproduce a handshake byte for byte.
    pub fn with_server_random(mut self, server_random: [u8; SERVER_RANDOM_LENGTH]) -> Self {
        self.secure_channel = SecureChannel::with_server_random(server_random);
        self
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn control(&self) -> &Control {
        &self.control
    }

    pub fn secure_channel_key(&self) -> &SecureChannelKey {
        &self.secure_channel_key
    }

    pub fn is_default_key(&self) -> bool {
        self.is_default_key
    }

    pub fn secure_channel_phase(&self) -> SecureChannelPhase {
        self.secure_channel.phase()
    }

    /// Pick the command for this cycle.
    ///
    /// Always returns a command when `is_polling` is set. Without polling
    /// only a pending retry or a queued command is returned.
    pub fn get_next_command_data(&mut self, is_polling: bool) -> Option<Command> {
        if let Some(command) = self.retry.take() {
            trace!(address = self.address, code = %command.code(), "Resending command");
            return Some(command);
        }

        if is_polling {
            let secure_required = self.use_secure_channel();

            if self.control.sequence() == 0 && !secure_required {
                return Some(Command::poll(self.address));
            }

            if secure_required {
                if let Some(step) = self.next_handshake_step() {
                    return Some(step);
                }
            }
        }

        if let Ok(command) = self.commands.try_recv() {
            debug!(address = self.address, code = %command.code(), "Dequeued command");
            return Some(command);
        }

        is_polling.then(|| Command::poll(self.address))
    }

    fn next_handshake_step(&self) -> Option<Command> {
        match self.secure_channel.phase() {
            SecureChannelPhase::Idle => {
                debug!(address = self.address, "Requesting secure channel initialization");
                Some(Command::security_initialization_request(
                    self.address,
                    self.secure_channel.server_random_number(),
                    self.is_default_key,
                ))
            }
            SecureChannelPhase::Initialized => {
                let cryptogram = self.secure_channel.server_cryptogram()?;
                debug!(address = self.address, "Sending server cryptogram");
                Some(Command::server_cryptogram(
                    self.address,
                    cryptogram,
                    self.is_default_key,
                ))
            }
            SecureChannelPhase::Established => None,
        }
    }

    /// Enqueue a command at the tail of the queue.
    pub fn send_command(&self, command: Command) {
        // the receiver lives in `self`, so this send cannot fail
        let _ = self.sender.send(command);
    }

    /// Handle for enqueueing from other threads or tasks.
    pub fn command_sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Returns `true` if at least one command is waiting in the queue.
    pub fn has_queued_command(&self) -> bool {
        !self.commands.is_empty()
    }

    /// Report that `command` got no valid reply.
    pub fn retry_command(&mut self, command: Command) {
        let code = command.code();
        match self.retry.record_failure(command) {
            RetryOutcome::Scheduled => {
                debug!(
                    address = self.address,
                    %code,
                    remaining = self.retry.remaining(),
                    "Command scheduled for retry"
                );
            }
            RetryOutcome::Dropped => {
                warn!(address = self.address, %code, "Retry budget exhausted, dropping command");
            }
        }
    }

    /// Number of attempts left before a failing command is dropped.
    pub fn retries_remaining(&self) -> u8 {
        self.retry.remaining()
    }

    pub fn has_pending_retry(&self) -> bool {
        self.retry.is_pending()
    }

    /// Report a valid reply carrying `sequence`.
    ///
    /// Sequence 0 belongs to the reset exchange and is not proof of liveness,
    /// but any valid reply restores the retry budget.
    pub fn valid_reply_has_been_received(&mut self, sequence: u8) {
        self.control.increment_sequence(sequence);

        if sequence > 0 {
            self.last_valid_reply = Some(self.clock.now());
        }

        self.retry.reset();
        trace!(address = self.address, sequence, "Valid reply received");
    }

    /// Time of the last reply that counted for liveness.
    pub fn last_valid_reply(&self) -> Option<Instant> {
        self.last_valid_reply
    }

    /// Recently responsive and, unless bypassed, secured as configured.
    pub fn is_connected(&self) -> bool {
        let now = self.clock.now();
        let responsive = self
            .last_valid_reply
            .is_some_and(|at| now.saturating_duration_since(at) < LIVENESS_WINDOW);

        responsive
            && (self.bypass_secure_for_multipart
                || !self.control.has_security_control_block()
                || self.is_security_established())
    }

    pub fn is_security_established(&self) -> bool {
        !self.bypass_secure_for_multipart
            && self.control.has_security_control_block()
            && self.secure_channel.is_established()
    }

    /// Whether this exchange requires the secure channel.
    pub fn use_secure_channel(&self) -> bool {
        !self.bypass_secure_for_multipart && self.use_secure_channel
    }

    /// Feed an osdp_CCRYPT reply into the handshake.
    ///
    /// Returns `false` without touching any state when the payload is too
    /// short or the client cryptogram does not verify.
    pub fn initialize_secure_channel(&mut self, reply: &Reply) -> bool {
        let data = reply.extract_reply_data();
        let pd_random = data
            .get(CCRYPT_PD_RANDOM_OFFSET..CCRYPT_CLIENT_CRYPTOGRAM_OFFSET)
            .and_then(|bytes| <[u8; SERVER_RANDOM_LENGTH]>::try_from(bytes).ok());
        let client_cryptogram = data
            .get(CCRYPT_CLIENT_CRYPTOGRAM_OFFSET..CCRYPT_PAYLOAD_LENGTH)
            .and_then(|bytes| Block::try_from(bytes).ok());

        let (Some(pd_random), Some(client_cryptogram)) = (pd_random, client_cryptogram) else {
            warn!(
                address = self.address,
                length = data.len(),
                "Client cryptogram reply too short"
            );
            return false;
        };

        let initialized = self.secure_channel.initialize(
            &pd_random,
            &client_cryptogram,
            &self.secure_channel_key,
        );
        if initialized {
            info!(address = self.address, "Secure channel initialized");
        } else {
            warn!(address = self.address, "Client cryptogram rejected");
        }
        initialized
    }

    /// Feed an osdp_RMAC_I reply into the handshake.
    pub fn validate_secure_channel_establishment(&mut self, reply: &Reply) -> bool {
        if !reply.secure_cryptogram_has_been_accepted() {
            warn!(address = self.address, "PD did not accept the server cryptogram");
            return false;
        }

        let established = self.secure_channel.establish(reply.extract_reply_data());
        if established {
            info!(address = self.address, "Secure channel established");
        } else {
            warn!(address = self.address, "Initial reply MAC mismatch");
        }
        established
    }

    /// # Errors
    /// Returns `Error::SecureChannelNotEstablished` before the handshake completes.
    pub fn generate_mac(&mut self, message: &[u8], is_command: bool) -> osdp_core::Result<Block> {
        self.secure_channel.generate_mac(message, is_command)
    }

    /// # Errors
    /// Returns `Error::SecureChannelNotEstablished` before the handshake completes.
    pub fn encrypt_data(&self, data: &[u8]) -> osdp_core::Result<Vec<u8>> {
        self.secure_channel.encrypt_data(data)
    }

    /// # Errors
    /// Fails before the handshake completes, on misaligned input or on bad padding.
    pub fn decrypt_data(&self, data: &[u8]) -> osdp_core::Result<Vec<u8>> {
        self.secure_channel.decrypt_data(data)
    }

    /// Rotate the server random and restart the handshake from scratch.
    pub fn create_new_random_number(&mut self) {
        self.secure_channel.create_new_random_number();
        debug!(address = self.address, "Server random rotated");
    }

    /// Start the link over once the PD has fallen silent past the liveness
    /// window: back to sequence 0 and, on a secure link, a fresh handshake.
    ///
    /// Returns `false` while the PD is live or when the link is already reset.
    pub fn reset_if_offline(&mut self) -> bool {
        if self.is_connected() || self.control.sequence() == 0 {
            return false;
        }

        info!(address = self.address, "PD offline, resetting link");
        self.control.reset_sequence();
        if self.use_secure_channel() {
            self.create_new_random_number();
        }
        true
    }

    pub fn is_sending_multipart_message(&self) -> bool {
        self.is_sending_multipart_message
    }

    pub fn set_sending_multipart_message(&mut self, value: bool) {
        self.is_sending_multipart_message = value;
    }

    pub fn is_receiving_multipart_message(&self) -> bool {
        self.is_receiving_multipart_message
    }

    pub fn set_receiving_multipart_message(&mut self, value: bool) {
        self.is_receiving_multipart_message = value;
    }

    pub fn bypass_secure_for_multipart(&self) -> bool {
        self.bypass_secure_for_multipart
    }

    /// Suspend the secure channel requirement for a multi-frame transfer.
    ///
    /// The caller clears it when the transfer ends.
    pub fn set_bypass_secure_for_multipart(&mut self, value: bool) {
        if value != self.bypass_secure_for_multipart {
            debug!(address = self.address, bypass = value, "Multipart secure bypass changed");
        }
        self.bypass_secure_for_multipart = value;
    }

    /// Hold off requests to this device for `duration`.
    pub fn delay_requests(&mut self, duration: Duration) {
        self.request_delay = Some(self.clock.now() + duration);
    }

    /// Returns `true` while a request delay set by the PD is still running.
    pub fn is_request_delayed(&self) -> bool {
        self.request_delay.is_some_and(|until| self.clock.now() < until)
    }
}

impl<C: Clock> fmt::Debug for Device<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("address", &self.address)
            .field("sequence", &self.control.sequence())
            .field("secure_channel", &self.secure_channel.phase())
            .field("retries_remaining", &self.retry.remaining())
            .finish_non_exhaustive()
    }
}

impl<C: Clock> PartialEq for Device<C> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl<C: Clock> Eq for Device<C> {}

impl<C: Clock> PartialOrd for Device<C> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<C: Clock> Ord for Device<C> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.address.cmp(&other.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::secure_channel::SessionKeys;
    use osdp_core::constants::{CRYPTOGRAM_ACCEPTED, RETRY_LIMIT};
    use osdp_protocol::{CommandCode, ReplyCode, SecurityBlock, SecurityBlockType};
    use rstest::rstest;
    use std::collections::BTreeSet;

    const SERVER_RANDOM: [u8; 8] = [0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8];
    const PD_RANDOM: [u8; 8] = [0xB1, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6, 0xB7, 0xB8];

    #[rstest]
    #[case(0x00, true)]
    #[case(0x7E, true)]
    #[case(0x7F, false)]
    #[case(0xFF, false)]
    fn test_try_new_checks_address(#[case] address: u8, #[case] accepted: bool) {
        let result = Device::try_new(DeviceConfig::new(address));
        assert_eq!(result.is_ok(), accepted);
        if let Err(err) = result {
            assert!(matches!(err, AcuError::Protocol(osdp_core::Error::Config(_))));
        }
    }

    fn device(config: DeviceConfig) -> (Device<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let device = Device::with_clock(config, clock.clone()).with_server_random(SERVER_RANDOM);
        (device, clock)
    }

    fn clear_device() -> (Device<ManualClock>, ManualClock) {
        device(DeviceConfig::new(0x01))
    }

    fn secure_device() -> (Device<ManualClock>, ManualClock) {
        device(DeviceConfig::new(0x01).with_secure_channel(true))
    }

    fn led(payload: u8) -> Command {
        Command::new(0x01, CommandCode::LedControl, vec![payload])
    }

    fn keys() -> SessionKeys {
        SessionKeys::derive(&SecureChannelKey::default_key(), &SERVER_RANDOM)
    }

    fn ccrypt_reply(client_cryptogram: Block) -> Reply {
        let mut data = vec![0xC0; 8];
        data.extend_from_slice(&PD_RANDOM);
        data.extend_from_slice(&client_cryptogram);
        Reply::new(0x01, 1, ReplyCode::ClientCryptogram, data)
    }

    fn valid_ccrypt_reply() -> Reply {
        ccrypt_reply(keys().client_cryptogram(&SERVER_RANDOM, &PD_RANDOM))
    }

    fn rmac_i_reply(mac: Block, accepted: bool) -> Reply {
        let status = if accepted { CRYPTOGRAM_ACCEPTED } else { 0xFF };
        Reply::new(0x01, 2, ReplyCode::InitialReplyMac, mac.to_vec()).with_security_block(
            SecurityBlock::new(SecurityBlockType::InitialReplyMac, vec![status]),
        )
    }

    fn valid_rmac_i_reply() -> Reply {
        let server_cryptogram = keys().server_cryptogram(&SERVER_RANDOM, &PD_RANDOM);
        rmac_i_reply(keys().initial_reply_mac(&server_cryptogram), true)
    }

    #[test]
    fn test_retry_exhausts_after_limit() {
        let (mut device, _) = clear_device();
        for _ in 0..RETRY_LIMIT {
            device.retry_command(led(1));
        }

        assert!(!device.has_pending_retry());
        assert_eq!(device.retries_remaining(), RETRY_LIMIT);
    }

    #[test]
    fn test_retry_preempts_queue_and_handshake() {
        let (mut device, _) = secure_device();
        device.send_command(led(7));
        device.retry_command(led(1));

        assert_eq!(device.get_next_command_data(true), Some(led(1)));
        // slot consumed; handshake comes next
        let next = device.get_next_command_data(true).unwrap();
        assert_eq!(next.code(), CommandCode::Challenge);
    }

    #[rstest]
    #[case(false, 0)]
    #[case(false, 2)]
    #[case(true, 0)]
    #[case(true, 3)]
    fn test_polling_always_yields_command(#[case] secure: bool, #[case] sequence: u8) {
        let (mut device, _) = device(DeviceConfig::new(0x01).with_secure_channel(secure));
        if sequence > 0 {
            device.valid_reply_has_been_received(sequence);
        }
        for _ in 0..4 {
            assert!(device.get_next_command_data(true).is_some());
        }
    }

    #[test]
    fn test_non_polling_empty_yields_none() {
        let (mut device, _) = clear_device();
        assert_eq!(device.get_next_command_data(false), None);

        let (mut device, _) = secure_device();
        assert_eq!(device.get_next_command_data(false), None);
    }

    #[test]
    fn test_queue_is_fifo_single_consumption() {
        let (mut device, _) = clear_device();
        device.send_command(led(1));
        device.send_command(led(2));
        device.send_command(led(3));
        assert!(device.has_queued_command());

        assert_eq!(device.get_next_command_data(false), Some(led(1)));
        assert_eq!(device.get_next_command_data(false), Some(led(2)));
        assert_eq!(device.get_next_command_data(false), Some(led(3)));
        assert_eq!(device.get_next_command_data(false), None);
        assert!(!device.has_queued_command());
    }

    #[test]
    fn test_first_clear_text_cycle_polls_before_queue() {
        let (mut device, _) = clear_device();
        device.send_command(led(1));

        assert_eq!(
            device.get_next_command_data(true).map(|c| c.code()),
            Some(CommandCode::Poll)
        );
        device.valid_reply_has_been_received(0);
        assert_eq!(device.get_next_command_data(true), Some(led(1)));
        assert_eq!(
            device.get_next_command_data(true).map(|c| c.code()),
            Some(CommandCode::Poll)
        );
    }

    #[test]
    fn test_concurrent_senders() {
        let (mut device, _) = clear_device();
        let handles: Vec<_> = (0..4u8)
            .map(|n| {
                let sender = device.command_sender();
                std::thread::spawn(move || {
                    for i in 0..25u8 {
                        sender.send(led(n * 25 + i)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut received = 0;
        while device.get_next_command_data(false).is_some() {
            received += 1;
        }
        assert_eq!(received, 100);
    }

    #[test]
    fn test_sender_fails_after_device_dropped() {
        let (device, _) = clear_device();
        let sender = device.command_sender();
        drop(device);

        assert!(matches!(
            sender.send(led(1)),
            Err(AcuError::DeviceClosed { address: 0x01 })
        ));
    }

    #[test]
    fn test_liveness_window() {
        let (mut device, clock) = clear_device();
        assert!(!device.is_connected());

        device.valid_reply_has_been_received(5);
        assert!(device.is_connected());

        clock.advance(LIVENESS_WINDOW - Duration::from_millis(1));
        assert!(device.is_connected());

        clock.advance(Duration::from_millis(1));
        assert!(!device.is_connected());
    }

    #[test]
    fn test_sequence_zero_reply_not_liveness() {
        let (mut device, _) = clear_device();
        device.retry_command(led(1));
        assert_eq!(device.retries_remaining(), RETRY_LIMIT - 1);

        device.valid_reply_has_been_received(0);
        assert_eq!(device.last_valid_reply(), None);
        assert!(!device.is_connected());
        assert_eq!(device.retries_remaining(), RETRY_LIMIT);
    }

    #[test]
    fn test_valid_reply_syncs_sequence() {
        let (mut device, _) = clear_device();
        device.valid_reply_has_been_received(2);
        assert_eq!(device.control().sequence(), 3);
        device.valid_reply_has_been_received(3);
        assert_eq!(device.control().sequence(), 1);
    }

    #[test]
    fn test_handshake_sequencing() {
        let (mut device, _) = secure_device();

        let challenge = device.get_next_command_data(true).unwrap();
        assert_eq!(challenge.code(), CommandCode::Challenge);
        assert_eq!(challenge.data(), &SERVER_RANDOM);
        assert!(challenge.uses_default_key());

        assert!(device.initialize_secure_channel(&valid_ccrypt_reply()));

        let scrypt = device.get_next_command_data(true).unwrap();
        assert_eq!(scrypt.code(), CommandCode::ServerCryptogram);
        assert_eq!(
            scrypt.data(),
            &keys().server_cryptogram(&SERVER_RANDOM, &PD_RANDOM)
        );

        assert!(device.validate_secure_channel_establishment(&valid_rmac_i_reply()));
        assert!(device.is_security_established());

        for _ in 0..3 {
            let code = device.get_next_command_data(true).map(|c| c.code());
            assert_eq!(code, Some(CommandCode::Poll));
        }
    }

    #[test]
    fn test_failed_establishment_resends_server_cryptogram() {
        let (mut device, _) = secure_device();
        device.get_next_command_data(true);
        assert!(device.initialize_secure_channel(&valid_ccrypt_reply()));

        assert!(!device.validate_secure_channel_establishment(&rmac_i_reply([0u8; 16], true)));
        assert!(!device.is_security_established());
        assert_eq!(
            device.get_next_command_data(true).map(|c| c.code()),
            Some(CommandCode::ServerCryptogram)
        );
    }

    #[test]
    fn test_rejected_cryptogram_not_established() {
        let (mut device, _) = secure_device();
        device.initialize_secure_channel(&valid_ccrypt_reply());

        let reply = valid_rmac_i_reply();
        let server_cryptogram = keys().server_cryptogram(&SERVER_RANDOM, &PD_RANDOM);
        let refused = rmac_i_reply(keys().initial_reply_mac(&server_cryptogram), false);

        assert!(!device.validate_secure_channel_establishment(&refused));
        assert_eq!(device.secure_channel_phase(), SecureChannelPhase::Initialized);
        assert!(device.validate_secure_channel_establishment(&reply));
    }

    #[rstest]
    #[case(0)]
    #[case(16)]
    #[case(31)]
    fn test_short_ccrypt_payload_ignored(#[case] length: usize) {
        let (mut device, _) = secure_device();
        let reply = Reply::new(0x01, 1, ReplyCode::ClientCryptogram, vec![0u8; length]);

        assert!(!device.initialize_secure_channel(&reply));
        assert_eq!(device.secure_channel_phase(), SecureChannelPhase::Idle);
    }

    #[test]
    fn test_wrong_client_cryptogram_ignored() {
        let (mut device, _) = secure_device();
        assert!(!device.initialize_secure_channel(&ccrypt_reply([0x55; 16])));
        assert_eq!(
            device.get_next_command_data(true).map(|c| c.code()),
            Some(CommandCode::Challenge)
        );
    }

    #[test]
    fn test_connected_requires_established_channel() {
        let (mut device, _) = secure_device();
        device.valid_reply_has_been_received(1);
        assert!(!device.is_connected());

        device.set_bypass_secure_for_multipart(true);
        assert!(device.is_connected());
        assert!(!device.use_secure_channel());
        device.set_bypass_secure_for_multipart(false);

        device.initialize_secure_channel(&valid_ccrypt_reply());
        device.validate_secure_channel_establishment(&valid_rmac_i_reply());
        assert!(device.is_connected());
    }

    #[test]
    fn test_bypass_suspends_handshake_steps() {
        let (mut device, _) = secure_device();
        device.valid_reply_has_been_received(1);
        device.set_bypass_secure_for_multipart(true);
        device.send_command(Command::new(0x01, CommandCode::FileTransfer, vec![0x01]));

        let next = device.get_next_command_data(true).unwrap();
        assert_eq!(next.code(), CommandCode::FileTransfer);
        assert!(!device.is_security_established());
    }

    #[test]
    fn test_create_new_random_number_restarts_handshake() {
        let (mut device, _) = secure_device();
        device.initialize_secure_channel(&valid_ccrypt_reply());
        device.create_new_random_number();

        let challenge = device.get_next_command_data(true).unwrap();
        assert_eq!(challenge.code(), CommandCode::Challenge);
        assert_ne!(challenge.data(), &SERVER_RANDOM);
    }

    #[test]
    fn test_installed_key_selects_installed_variant() {
        let key = SecureChannelKey::new([0x0F; 16]);
        let (mut device, _) = device(
            DeviceConfig::new(0x01)
                .with_secure_channel(true)
                .with_key(key),
        );
        assert!(!device.is_default_key());
        assert!(!device.get_next_command_data(true).unwrap().uses_default_key());
    }

    #[test]
    fn test_session_crypto_after_handshake() {
        let (mut device, _) = secure_device();
        assert!(device.generate_mac(&[0x60], true).is_err());

        device.initialize_secure_channel(&valid_ccrypt_reply());
        device.validate_secure_channel_establishment(&valid_rmac_i_reply());

        let encrypted = device.encrypt_data(b"open door").unwrap();
        assert_eq!(encrypted.len() % 16, 0);
        assert!(device.generate_mac(&[0x60], true).is_ok());
    }

    #[test]
    fn test_multipart_flags() {
        let (mut device, _) = clear_device();
        device.set_sending_multipart_message(true);
        device.set_receiving_multipart_message(true);
        assert!(device.is_sending_multipart_message());
        assert!(device.is_receiving_multipart_message());
        assert!(!device.bypass_secure_for_multipart());
    }

    #[test]
    fn test_request_delay() {
        let (mut device, clock) = clear_device();
        assert!(!device.is_request_delayed());

        device.delay_requests(Duration::from_millis(500));
        assert!(device.is_request_delayed());
        clock.advance(Duration::from_millis(500));
        assert!(!device.is_request_delayed());
    }

    #[test]
    fn test_ordering_by_address() {
        let (a, _) = device(DeviceConfig::new(0x02));
        let (b, _) = device(DeviceConfig::new(0x10));
        assert!(a < b);
        assert_eq!(a.cmp(&a), Ordering::Equal);
        assert_ne!(a, b);

        let (c, _) = device(DeviceConfig::new(0x01));
        let ordered: Vec<u8> = BTreeSet::from([b, a, c]).iter().map(|d| d.address()).collect();
        assert_eq!(ordered, vec![0x01, 0x02, 0x10]);
    }
}
