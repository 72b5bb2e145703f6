//! Per-device exchange driver.
//!
//! A [`DeviceExchange`] owns one [`Device`] and one [`Transport`] and runs
//! the get-command → send → receive → report cycle. Owning the device is what
//! keeps every mutation on a single call path; other tasks reach the device
//! only through its command queue.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  CommandSender  ┌──────────────────────────┐
//! │ Application │────────────────►│ DeviceExchange task      │
//! │ tasks       │                 │  Device ──► Transport ──►│──► PD
//! └─────────────┘                 │         ◄── Reply     ◄──│
//!        ▲        watch (status)  └──────────────────────────┘
//!        └────────────────────────────────┘
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use osdp_acu::{Device, DeviceConfig, DeviceExchange, ExchangeConfig};
//! use osdp_acu::mock::SimulatedPd;
//!
//! #[tokio::main]
//! async fn main() -> osdp_acu::Result<()> {
//!     let config = DeviceConfig::new(0x01).with_secure_channel(true);
//!     let (pd, _pd_handle) = SimulatedPd::new(0x01, config.effective_key());
//!
//!     let exchange = DeviceExchange::new(Device::new(config), pd, ExchangeConfig::default());
//!     let handle = exchange.spawn();
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!     println!("connected: {}", handle.status().connected);
//!
//!     let stats = handle.shutdown().await?;
//!     println!("exchanges: {}", stats.exchanges);
//!     Ok(())
//! }
//! ```

use crate::clock::{Clock, SystemClock};
use crate::config::ExchangeConfig;
use crate::device::{CommandSender, Device};
use crate::error::{AcuError, Result};
use crate::secure_channel::SecureChannelPhase;
use osdp_protocol::{Command, Control, Reply, ReplyCode};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// How long to back off after a PD answers osdp_BUSY.
pub const BUSY_BACKOFF: Duration = Duration::from_millis(300);

/// Carries one command to the PD and brings back its reply.
///
/// Framing, CRC/checksum and MAC placement live behind this trait. A reply
/// that fails integrity checks, or a timeout, is reported as `Ok(None)`.
///
/// Implementations can use `async fn`; the returned future must be `Send` so
/// the exchange can run on a spawned task.
pub trait Transport: Send {
    fn exchange(
        &mut self,
        control: &Control,
        command: &Command,
    ) -> impl Future<Output = Result<Option<Reply>>> + Send;
}

/// What a single exchange did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Nothing to send on a non-polling cycle.
    Idle,
    /// The PD asked for a pause; nothing was sent.
    Delayed,
    /// No valid reply arrived.
    NoReply,
    /// The PD rejected the command.
    Nak { error_code: Option<u8> },
    /// A valid reply arrived.
    Replied(ReplyCode),
}

/// Counters kept by an exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeStats {
    pub exchanges: u64,
    pub replies: u64,
    pub timeouts: u64,
    pub naks: u64,
}

/// Snapshot of a device published after every exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStatus {
    pub address: u8,
    pub connected: bool,
    pub secure_channel: SecureChannelPhase,
    pub sequence: u8,
}

impl<C: Clock> From<&Device<C>> for DeviceStatus {
    fn from(device: &Device<C>) -> Self {
        DeviceStatus {
            address: device.address(),
            connected: device.is_connected(),
            secure_channel: device.secure_channel_phase(),
            sequence: device.control().sequence(),
        }
    }
}

/// Drives one device over one transport.
pub struct DeviceExchange<T: Transport, C: Clock = SystemClock> {
    device: Device<C>,
    transport: T,
    config: ExchangeConfig,
    stats: ExchangeStats,
}

impl<T: Transport, C: Clock> DeviceExchange<T, C> {
    pub fn new(device: Device<C>, transport: T, config: ExchangeConfig) -> Self {
        DeviceExchange {
            device,
            transport,
            config,
            stats: ExchangeStats::default(),
        }
    }

    pub fn device(&self) -> &Device<C> {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut Device<C> {
        &mut self.device
    }

    pub fn stats(&self) -> ExchangeStats {
        self.stats
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus::from(&self.device)
    }

    /// Run one full exchange.
    ///
    /// Never fails: transport errors count as a missing reply and feed the
    /// retry budget like any other.
    pub async fn run_once(&mut self) -> ExchangeOutcome {
        if self.device.is_request_delayed() {
            return ExchangeOutcome::Delayed;
        }

        let Some(command) = self.device.get_next_command_data(self.config.polling) else {
            return ExchangeOutcome::Idle;
        };

        self.stats.exchanges += 1;
        let control = *self.device.control();
        trace!(
            address = self.device.address(),
            control = control.control_byte(),
            code = %command.code(),
            "Sending command"
        );

        let reply = match self.transport.exchange(&control, &command).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(address = self.device.address(), "Transport failed: {}", e);
                None
            }
        };

        match reply {
            None => {
                self.stats.timeouts += 1;
                self.device.retry_command(command);
                self.device.reset_if_offline();
                ExchangeOutcome::NoReply
            }
            Some(reply) => self.handle_reply(command, reply),
        }
    }

    fn handle_reply(&mut self, command: Command, reply: Reply) -> ExchangeOutcome {
        let address = self.device.address();

        match reply.code() {
            ReplyCode::Nak => {
                self.stats.naks += 1;
                let error_code = reply.nak_error_code();
                if command.is_handshake() {
                    // stale nonce; start over with a fresh one instead of resending
                    warn!(address, ?error_code, "Handshake rejected, restarting");
                    self.device.create_new_random_number();
                } else {
                    debug!(address, ?error_code, code = %command.code(), "Command rejected");
                    self.device.retry_command(command);
                }
                return ExchangeOutcome::Nak { error_code };
            }
            ReplyCode::Busy => {
                debug!(address, "PD busy, backing off");
                self.device.delay_requests(BUSY_BACKOFF);
                self.device.retry_command(command);
            }
            ReplyCode::ClientCryptogram => {
                if !self.device.initialize_secure_channel(&reply) {
                    self.device.create_new_random_number();
                }
            }
            ReplyCode::InitialReplyMac => {
                self.device.validate_secure_channel_establishment(&reply);
            }
            _ => {}
        }

        self.stats.replies += 1;
        self.device.valid_reply_has_been_received(reply.sequence());
        ExchangeOutcome::Replied(reply.code())
    }
}

impl<T, C> DeviceExchange<T, C>
where
    T: Transport + 'static,
    C: Clock + 'static,
{
    /// Move the exchange onto a tokio task and poll on a fixed interval.
    pub fn spawn(self) -> ExchangeHandle {
        let sender = self.device.command_sender();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(self.status());

        let task = tokio::spawn(self.run(shutdown_rx, status_tx));

        ExchangeHandle {
            sender,
            shutdown: shutdown_tx,
            status: status_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
        status: watch::Sender<DeviceStatus>,
    ) -> ExchangeStats {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            address = self.device.address(),
            interval_ms = self.config.poll_interval_ms,
            "Exchange started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_once().await;
                    let current = self.status();
                    status.send_if_modified(|last| {
                        let changed = *last != current;
                        *last = current;
                        changed
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(address = self.device.address(), stats = ?self.stats, "Exchange stopped");
        self.stats
    }
}

/// Handle to a spawned exchange.
pub struct ExchangeHandle {
    sender: CommandSender,
    shutdown: watch::Sender<bool>,
    status: watch::Receiver<DeviceStatus>,
    task: JoinHandle<ExchangeStats>,
}

impl ExchangeHandle {
    /// Queue a command for the device.
    ///
    /// # Errors
    /// Returns `AcuError::DeviceClosed` once the exchange has stopped.
    pub fn send(&self, command: Command) -> Result<()> {
        self.sender.send(command)
    }

    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Latest published device status.
    pub fn status(&self) -> DeviceStatus {
        *self.status.borrow()
    }

    /// Wait until the published status satisfies `predicate`.
    ///
    /// # Errors
    /// Returns `AcuError::Task` if the exchange stops first.
    pub async fn wait_for(&mut self, predicate: impl FnMut(&DeviceStatus) -> bool) -> Result<DeviceStatus> {
        self.status
            .wait_for(predicate)
            .await
            .map(|status| *status)
            .map_err(|_| AcuError::Task {
                message: "exchange stopped".into(),
            })
    }

    /// Stop the exchange and return its counters.
    ///
    /// # Errors
    /// Returns `AcuError::Task` if the task panicked or was aborted.
    pub async fn shutdown(self) -> Result<ExchangeStats> {
        let _ = self.shutdown.send(true);
        self.task.await.map_err(|e| AcuError::Task {
            message: e.to_string(),
        })
    }
}
