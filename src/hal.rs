//! Hardware port traits — the boundary between device logic and pins.
//!
//! ```text
//!   GPIO / ADC / PWM adapter ──▶ port trait ──▶ device state machine
//! ```
//!
//! Concrete adapters live behind `cfg(target_os = "espidf")`; host-side
//! tests implement these traits with scripted mocks. Devices own their
//! ports as boxed trait objects, established once at construction.

/// Logic level on a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_low(self) -> bool {
        self == Level::Low
    }

    pub fn is_high(self) -> bool {
        self == Level::High
    }

    /// The opposite level.
    pub fn toggled(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

/// Read-side digital port (buttons, tape/light/sound sensors, IR pin).
pub trait DigitalInput {
    fn read(&mut self) -> Level;
}

/// Write-side digital port (LED, motor direction).
pub trait DigitalOutput {
    fn write(&mut self, level: Level);
}

/// Analog input, 10-bit range 0–1023 (joystick axes).
pub trait AnalogInput {
    fn read(&mut self) -> u16;
}

/// PWM output, duty 0–255 (motor speed).
pub trait PwmOutput {
    fn set_duty(&mut self, duty: u8);
}

/// Modulated infrared output.
///
/// Both operations hold the line state for the full duration by
/// busy-waiting — exact carrier timing depends on not yielding. Callers
/// block for the whole transmission.
pub trait CarrierOutput {
    /// Drive the ~38 kHz carrier for `us` microseconds.
    fn mark(&mut self, us: u32);

    /// Hold the line idle for `us` microseconds. `0` only flips the
    /// output off without waiting.
    fn space(&mut self, us: u32);
}

/// Monotonic time source for the polled state machines.
pub trait Clock {
    /// Milliseconds since boot, wrapping.
    fn now_ms(&self) -> u32;
}

/// Adapter turning any `embedded-hal` input pin into a [`DigitalInput`].
///
/// Read failures report as low — consistent with the silent-reject
/// policy of this firmware (a flaky pin must not take down the control
/// loop).
pub struct HalInput<T>(pub T);

impl<T: embedded_hal::digital::InputPin> DigitalInput for HalInput<T> {
    fn read(&mut self) -> Level {
        if self.0.is_high().unwrap_or(false) {
            Level::High
        } else {
            Level::Low
        }
    }
}

// ── ESP-IDF adapters ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub mod esp {
    //! Thin GPIO/ADC/LEDC adapters over `esp-idf-sys` raw calls, keyed
    //! by pin number so the port table (`pins.rs`) maps straight through.

    use super::{AnalogInput, CarrierOutput, Clock, DigitalInput, DigitalOutput, Level, PwmOutput};
    use crate::error::{Error, Result};
    use esp_idf_svc::sys as sys;

    pub struct GpioIn {
        pin: i32,
    }

    impl GpioIn {
        pub fn new(pin: i32) -> Result<Self> {
            // SAFETY: plain register configuration through the IDF API.
            unsafe {
                if sys::gpio_set_direction(pin, sys::gpio_mode_t_GPIO_MODE_INPUT) != sys::ESP_OK {
                    return Err(Error::Init("gpio input config failed"));
                }
            }
            Ok(Self { pin })
        }

        pub fn read_level(&self) -> Level {
            // SAFETY: pin was configured as input in `new`.
            if unsafe { sys::gpio_get_level(self.pin) } == 0 {
                Level::Low
            } else {
                Level::High
            }
        }
    }

    impl DigitalInput for GpioIn {
        fn read(&mut self) -> Level {
            self.read_level()
        }
    }

    pub struct GpioOut {
        pin: i32,
    }

    impl GpioOut {
        pub fn new(pin: i32) -> Result<Self> {
            // SAFETY: plain register configuration through the IDF API.
            unsafe {
                if sys::gpio_set_direction(pin, sys::gpio_mode_t_GPIO_MODE_OUTPUT) != sys::ESP_OK {
                    return Err(Error::Init("gpio output config failed"));
                }
            }
            Ok(Self { pin })
        }
    }

    impl DigitalOutput for GpioOut {
        fn write(&mut self, level: Level) {
            // SAFETY: pin was configured as output in `new`.
            unsafe {
                sys::gpio_set_level(self.pin, u32::from(level.is_high()));
            }
        }
    }

    pub struct AdcIn {
        channel: sys::adc1_channel_t,
    }

    impl AdcIn {
        pub fn new(channel: sys::adc1_channel_t) -> Self {
            Self { channel }
        }
    }

    impl AnalogInput for AdcIn {
        fn read(&mut self) -> u16 {
            // SAFETY: raw one-shot ADC read; channel configured at boot.
            let raw = unsafe { sys::adc1_get_raw(self.channel) };
            // 12-bit IDF reading scaled to the 10-bit contract.
            (raw.max(0) as u16) >> 2
        }
    }

    pub struct LedcPwm {
        channel: sys::ledc_channel_t,
    }

    impl PwmOutput for LedcPwm {
        fn set_duty(&mut self, duty: u8) {
            // SAFETY: channel configured at boot by the binary.
            unsafe {
                sys::ledc_set_duty(
                    sys::ledc_mode_t_LEDC_LOW_SPEED_MODE,
                    self.channel,
                    u32::from(duty),
                );
                sys::ledc_update_duty(sys::ledc_mode_t_LEDC_LOW_SPEED_MODE, self.channel);
            }
        }
    }

    /// 38 kHz LEDC carrier gated on and off around busy-wait delays.
    pub struct LedcCarrier {
        channel: sys::ledc_channel_t,
    }

    impl LedcCarrier {
        pub fn new(channel: sys::ledc_channel_t) -> Self {
            Self { channel }
        }

        fn gate(&self, on: bool) {
            // 50 % duty when on, 0 when off — the timer keeps running so
            // re-enabling is glitch-free.
            // SAFETY: channel configured for 38 kHz at boot.
            unsafe {
                let duty = if on { 128 } else { 0 };
                sys::ledc_set_duty(sys::ledc_mode_t_LEDC_LOW_SPEED_MODE, self.channel, duty);
                sys::ledc_update_duty(sys::ledc_mode_t_LEDC_LOW_SPEED_MODE, self.channel);
            }
        }
    }

    impl CarrierOutput for LedcCarrier {
        fn mark(&mut self, us: u32) {
            self.gate(true);
            if us > 0 {
                // SAFETY: busy-wait delay, interrupt-safe.
                unsafe { sys::esp_rom_delay_us(us) };
            }
        }

        fn space(&mut self, us: u32) {
            self.gate(false);
            if us > 0 {
                // SAFETY: busy-wait delay, interrupt-safe.
                unsafe { sys::esp_rom_delay_us(us) };
            }
        }
    }

    pub struct EspClock;

    impl Clock for EspClock {
        fn now_ms(&self) -> u32 {
            // SAFETY: esp_timer_get_time has no preconditions.
            (unsafe { sys::esp_timer_get_time() } / 1000) as u32
        }
    }
}
