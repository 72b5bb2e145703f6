//! Bounded retry of a single outstanding command.
//!
//! A device holds at most one command awaiting resend. The budget counts down
//! on every failed exchange and is restored either by a valid reply or by
//! exhaustion, at which point the command is abandoned.
//!
//! # Examples
//!
//! ```
//! use osdp_acu::retry::{RetryOutcome, RetryState};
//! use osdp_protocol::Command;
//!
//! let mut retry = RetryState::new();
//! let command = Command::poll(0x01);
//!
//! assert_eq!(retry.record_failure(command.clone()), RetryOutcome::Scheduled);
//! assert_eq!(retry.take(), Some(command.clone()));
//!
//! assert_eq!(retry.record_failure(command), RetryOutcome::Dropped);
//! assert!(retry.take().is_none());
//! ```

use osdp_core::constants::RETRY_LIMIT;
use osdp_protocol::Command;

/// What happened to a command reported as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The command will be resent on the next cycle.
    Scheduled,
    /// Budget exhausted; the command was abandoned and the budget restored.
    Dropped,
}

/// Retry slot plus remaining budget.
///
/// `remaining` stays within `0..=RETRY_LIMIT`. It is kept apart from the slot
/// because the budget must survive the slot being taken for resend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    slot: Option<Command>,
    remaining: u8,
}

impl RetryState {
    pub fn new() -> Self {
        RetryState {
            slot: None,
            remaining: RETRY_LIMIT,
        }
    }

    /// Remove the pending command, if any.
    pub fn take(&mut self) -> Option<Command> {
        self.slot.take()
    }

    pub fn is_pending(&self) -> bool {
        self.slot.is_some()
    }

    pub fn remaining(&self) -> u8 {
        self.remaining
    }

    /// Charge one attempt against the budget for `command`.
    pub fn record_failure(&mut self, command: Command) -> RetryOutcome {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            self.slot = Some(command);
            RetryOutcome::Scheduled
        } else {
            self.slot = None;
            self.remaining = RETRY_LIMIT;
            RetryOutcome::Dropped
        }
    }

    /// Restore the full budget. A pending command stays pending.
    pub fn reset(&mut self) {
        self.remaining = RETRY_LIMIT;
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}
