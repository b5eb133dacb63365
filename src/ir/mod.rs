//! Infrared communication: receiver (sampled under a 50 µs timer
//! interrupt) and transmitter (blocking modulated output).
//!
//! Both ends speak modified NEC — a 16-bit address and a 16-bit value
//! in one 32-bit burst — and the receiver additionally understands RC5
//! remotes. Timing constants are shared here so the two sides cannot
//! drift apart.

pub mod receiver;
pub mod transmitter;

pub use receiver::{IrCapture, IrReceiver};
pub use transmitter::IrTransmitter;

/// Sampling period of the receive interrupt.
pub const USEC_PER_TICK: u32 = 50;

/// Minimum quiet run that separates two transmissions, in ticks (5 ms).
pub const GAP_TICKS: u32 = 100;

// NEC timing, microseconds.
pub const NEC_HDR_MARK_US: i32 = 9000;
pub const NEC_HDR_SPACE_US: i32 = 4500;
pub const NEC_BIT_MARK_US: i32 = 560;
pub const NEC_ONE_SPACE_US: i32 = 1690;
pub const NEC_ZERO_SPACE_US: i32 = 560;

/// Received marks run ~100 µs long and spaces ~100 µs short from
/// detector lag; the decoder corrects each expectation by this much.
pub const MARK_EXCESS_US: i32 = 100;

/// RC5 half-bit time.
pub const RC5_T1_US: i32 = 889;

/// Address and value halves of one burst.
pub const MESSAGE_BITS: u32 = 32;

/// Measurement tolerance, percent.
const TOLERANCE_PCT: i32 = 25;

/// Whether a measured tick count matches a desired duration within
/// tolerance. The upper bound gets one extra tick for quantisation.
pub(crate) fn interval_matches(measured_ticks: u16, desired_us: i32) -> bool {
    let ticks_low = desired_us * (100 - TOLERANCE_PCT) / 100 / USEC_PER_TICK as i32;
    let ticks_high = desired_us * (100 + TOLERANCE_PCT) / 100 / USEC_PER_TICK as i32 + 1;
    (ticks_low..=ticks_high).contains(&i32::from(measured_ticks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerance_windows_do_not_overlap_for_nec_spaces() {
        // A one-space and a zero-space must never both match, or bit
        // decoding would be ambiguous.
        for ticks in 0..200u16 {
            let one = interval_matches(ticks, NEC_ONE_SPACE_US - MARK_EXCESS_US);
            let zero = interval_matches(ticks, NEC_ZERO_SPACE_US - MARK_EXCESS_US);
            assert!(!(one && zero), "ambiguous at {ticks} ticks");
        }
    }

    #[test]
    fn nominal_durations_match() {
        assert!(interval_matches(180, NEC_HDR_MARK_US + MARK_EXCESS_US));
        assert!(interval_matches(88, NEC_HDR_SPACE_US - MARK_EXCESS_US));
        assert!(interval_matches(11, NEC_BIT_MARK_US + MARK_EXCESS_US));
        assert!(interval_matches(34, NEC_ONE_SPACE_US - MARK_EXCESS_US));
        assert!(interval_matches(11, NEC_ZERO_SPACE_US - MARK_EXCESS_US));
    }

    #[test]
    fn out_of_tolerance_rejected() {
        assert!(!interval_matches(100, NEC_HDR_MARK_US + MARK_EXCESS_US));
        assert!(!interval_matches(300, NEC_HDR_MARK_US + MARK_EXCESS_US));
    }
}
