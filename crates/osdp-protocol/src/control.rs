//! Per-device control block bookkeeping.

use osdp_core::constants::{
    CONTROL_FLAG_CRC, CONTROL_FLAG_SECURITY_BLOCK, MAX_SEQUENCE, SEQUENCE_MASK,
};

/// Sequence number and static flags of a device's control block.
///
/// The sequence starts at 0 (the reset exchange). Once the PD acknowledges a
/// message the tracked sequence follows what the PD echoed, cycling through
/// 1, 2, 3 and never returning to 0 on its own.
///
/// # Examples
///
/// ```
/// use osdp_protocol::Control;
///
/// let mut control = Control::new(0, true, false);
/// assert_eq!(control.sequence(), 0);
///
/// control.increment_sequence(0);
/// assert_eq!(control.sequence(), 1);
///
/// control.increment_sequence(3);
/// assert_eq!(control.sequence(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Control {
    sequence: u8,
    use_crc: bool,
    has_security_control_block: bool,
}

impl Control {
    pub fn new(sequence: u8, use_crc: bool, has_security_control_block: bool) -> Self {
        Control {
            sequence: sequence & SEQUENCE_MASK,
            use_crc,
            has_security_control_block,
        }
    }

    /// Sequence number to place on the next outgoing command.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    pub fn use_crc(&self) -> bool {
        self.use_crc
    }

    pub fn has_security_control_block(&self) -> bool {
        self.has_security_control_block
    }

    /// Synchronize to the sequence the PD echoed in a valid reply.
    ///
    /// The next outgoing sequence is the successor of `observed`, so gaps
    /// caused by dropped frames are absorbed instead of accumulated.
    pub fn increment_sequence(&mut self, observed: u8) {
        let acknowledged = observed & SEQUENCE_MASK;
        self.sequence = if acknowledged >= MAX_SEQUENCE {
            1
        } else {
            acknowledged + 1
        };
    }

    /// Return to the reset sequence.
    pub fn reset_sequence(&mut self) {
        self.sequence = 0;
    }

    /// Control byte as placed on the wire.
    pub fn control_byte(&self) -> u8 {
        let mut byte = self.sequence;
        if self.use_crc {
            byte |= CONTROL_FLAG_CRC;
        }
        if self.has_security_control_block {
            byte |= CONTROL_FLAG_SECURITY_BLOCK;
        }
        byte
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1)]
    #[case(1, 2)]
    #[case(2, 3)]
    #[case(3, 1)]
    #[case(5, 2)] // only the low two bits are meaningful
    fn test_increment_sequence(#[case] observed: u8, #[case] expected: u8) {
        let mut control = Control::new(0, true, false);
        control.increment_sequence(observed);
        assert_eq!(control.sequence(), expected);
    }

    #[test]
    fn test_sequence_never_returns_to_zero() {
        let mut control = Control::new(0, true, false);
        for _ in 0..20 {
            let current = control.sequence();
            control.increment_sequence(current);
            assert_ne!(control.sequence(), 0);
        }
    }

    #[test]
    fn test_reset_sequence() {
        let mut control = Control::new(2, true, true);
        control.reset_sequence();
        assert_eq!(control.sequence(), 0);
    }

    #[rstest]
    #[case(0, false, false, 0x00)]
    #[case(1, true, false, 0x05)]
    #[case(2, false, true, 0x0A)]
    #[case(3, true, true, 0x0F)]
    fn test_control_byte(
        #[case] sequence: u8,
        #[case] use_crc: bool,
        #[case] scb: bool,
        #[case] expected: u8,
    ) {
        assert_eq!(Control::new(sequence, use_crc, scb).control_byte(), expected);
    }

    #[test]
    fn test_flags_are_static() {
        let mut control = Control::new(0, true, true);
        control.increment_sequence(1);
        control.reset_sequence();
        assert!(control.use_crc());
        assert!(control.has_security_control_block());
    }
}
