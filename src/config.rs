//! Kernel tuning knobs.
//!
//! Defaults match the board's shipped firmware; a deployment can
//! override them by deserialising a `KernelConfig` (the struct derives
//! `serde` so any host-side format works) and passing it to
//! [`Kernel::with_config`](crate::kernel::Kernel::with_config).

use serde::{Deserialize, Serialize};

/// Debounce and pacing parameters, all in milliseconds unless noted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Button press/release debounce window.
    pub button_debounce_ms: u32,
    /// Tape and light sensor debounce window.
    pub sensor_debounce_ms: u32,
    /// Sound sensor quiet-gap tolerance before `SoundEnd`.
    pub sound_deadband_ms: u32,
    /// Minimum interval between joystick axis re-reads.
    pub joystick_debounce_ms: u32,
    /// Host link baud rate.
    pub serial_baud: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            button_debounce_ms: 200,
            sensor_debounce_ms: 200,
            sound_deadband_ms: 200,
            joystick_debounce_ms: 50,
            serial_baud: 115_200,
        }
    }
}
