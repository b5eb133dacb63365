//! Board port map — the labelled connectors on the RoboCore board.
//!
//! Port numbers are silkscreen labels, not MCU pin numbers; the binary
//! maps them to GPIO/ADC/LEDC resources at boot. The numbers are also
//! part of the host notification wire format and must not change.

/// A labelled connector on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PortId {
    /// Serial TX/RX header (host link).
    TxRx = 1,
    /// Battery power switch sense.
    Power = 2,
    /// On-board IR emitter.
    IrTran = 3,
    /// USB connector.
    Usb = 4,
    /// Motor channel A.
    MotorA = 5,
    /// Motor channel B.
    MotorB = 6,
    ServoD = 7,
    ServoC = 8,
    ServoB = 9,
    ServoA = 10,
    Dio1 = 11,
    Dio2 = 12,
    Dio3 = 13,
    Dio9 = 14,
    Dio8 = 15,
    Dio7 = 16,
    Dio6 = 17,
    Dio5 = 18,
    Dio4 = 19,
    /// Analog input 2.
    Ai2 = 20,
    /// Analog input 1.
    Ai1 = 21,
}

/// Number of attachable ports (port numbers 1..=22 map to table slots).
pub const PORT_COUNT: usize = 22;

impl PortId {
    /// The wire/table index of this port.
    pub fn number(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_numbers_match_board_labels() {
        assert_eq!(PortId::TxRx.number(), 1);
        assert_eq!(PortId::ServoA.number(), 10);
        assert_eq!(PortId::Dio4.number(), 19);
        assert_eq!(PortId::Ai1.number(), 21);
        assert!((PortId::Ai1.number() as usize) <= PORT_COUNT);
    }
}
