//! LED driver: on/off/toggle plus slow and fast blinking.
//!
//! Blinking is the only part that needs the scheduler; the state
//! machine flips the line every half-period and counts half-periods so
//! the end event can report completed blinks. Finite blinks restore
//! nothing — they end on the level the blink pattern reached — while
//! `stop_blink` returns to the state the LED was in before blinking.

use core::any::Any;

use crate::device::{Device, DeviceCore, DeviceKind, PortBinding, STATE_INACTIVE};
use crate::events::{EventKind, SourceId};
use crate::hal::{DigitalOutput, Level};
use crate::host::HostLink;

const STATE_OFF: u8 = 1;
const STATE_ON: u8 = 2;
const STATE_BLINK: u8 = 3;

/// Half-period for one blink per second.
const SLOW_BLINK_INTERVAL_MS: u32 = 500;
/// Half-period for four blinks per second.
const FAST_BLINK_INTERVAL_MS: u32 = 125;

pub struct Led {
    core: DeviceCore,
    output: Box<dyn DigitalOutput>,
    level: Level,
    blink_interval_ms: u32,
    finite: bool,
    /// Half-periods elapsed in the current blink run.
    interval_count: i16,
    blink_times: i16,
    last_toggle_ms: u32,
    prior_state: u8,
}

impl Led {
    pub fn new(output: Box<dyn DigitalOutput>) -> Self {
        Self {
            core: DeviceCore::new(DeviceKind::Led),
            output,
            level: Level::Low,
            blink_interval_ms: 0,
            finite: false,
            interval_count: 0,
            blink_times: 0,
            last_toggle_ms: 0,
            prior_state: STATE_OFF,
        }
    }

    fn drive(&mut self, level: Level) {
        self.level = level;
        self.output.write(level);
    }

    pub fn turn_on(&mut self, link: &mut dyn HostLink) {
        if !self.core.is_active() {
            return;
        }
        match self.core.state() {
            STATE_OFF => {
                self.drive(Level::High);
                self.core.set_state(STATE_ON);
                self.core.set_pending(false);
                self.core.emit(EventKind::LedTurnOn, 1, link);
            }
            STATE_BLINK => {
                self.drive(Level::High);
                self.core.set_state(STATE_ON);
                self.core.set_pending(false);
                self.core
                    .emit(EventKind::BlinkEnd, self.interval_count / 2, link);
                self.core.emit(EventKind::LedTurnOn, 1, link);
            }
            _ => {}
        }
    }

    pub fn turn_off(&mut self, link: &mut dyn HostLink) {
        if !self.core.is_active() {
            return;
        }
        match self.core.state() {
            STATE_ON => {
                self.drive(Level::Low);
                self.core.set_state(STATE_OFF);
                self.core.set_pending(false);
                self.core.emit(EventKind::LedTurnOff, 0, link);
            }
            STATE_BLINK => {
                self.drive(Level::Low);
                self.core.set_state(STATE_OFF);
                self.core.set_pending(false);
                self.core
                    .emit(EventKind::BlinkEnd, self.interval_count / 2, link);
                self.core.emit(EventKind::LedTurnOff, 0, link);
            }
            _ => {}
        }
    }

    /// Flip on/off. Ignored while blinking.
    pub fn toggle(&mut self, link: &mut dyn HostLink) {
        if !self.core.is_active() || self.core.state() == STATE_BLINK {
            return;
        }
        match self.core.state() {
            STATE_OFF => self.turn_on(link),
            STATE_ON => self.turn_off(link),
            _ => {}
        }
    }

    /// Blink once per second until told otherwise. Calling this while
    /// fast-blinking indefinitely retargets the rate in place.
    pub fn slow_blink(&mut self, now_ms: u32, link: &mut dyn HostLink) {
        self.blink(SLOW_BLINK_INTERVAL_MS, None, now_ms, link);
    }

    /// Blink four times per second until told otherwise.
    pub fn fast_blink(&mut self, now_ms: u32, link: &mut dyn HostLink) {
        self.blink(FAST_BLINK_INTERVAL_MS, None, now_ms, link);
    }

    /// Blink `times` times at the slow rate, then settle.
    pub fn slow_blink_times(&mut self, times: i16, now_ms: u32, link: &mut dyn HostLink) {
        self.blink(SLOW_BLINK_INTERVAL_MS, Some(times), now_ms, link);
    }

    /// Blink `times` times at the fast rate, then settle.
    pub fn fast_blink_times(&mut self, times: i16, now_ms: u32, link: &mut dyn HostLink) {
        self.blink(FAST_BLINK_INTERVAL_MS, Some(times), now_ms, link);
    }

    fn blink(&mut self, interval_ms: u32, times: Option<i16>, now_ms: u32, link: &mut dyn HostLink) {
        if !self.core.is_active() {
            return;
        }
        let begin = if interval_ms == SLOW_BLINK_INTERVAL_MS {
            EventKind::SlowBlinkBegin
        } else {
            EventKind::FastBlinkBegin
        };
        if self.core.state() != STATE_BLINK {
            self.drive(Level::Low);
            self.prior_state = self.core.state();
            self.blink_interval_ms = interval_ms;
            self.finite = times.is_some();
            self.interval_count = 0;
            // -1 keeps an indefinite run from ever matching the finite
            // completion test.
            self.blink_times = times.unwrap_or(-1);
            self.last_toggle_ms = now_ms;
            self.core.set_state(STATE_BLINK);
            self.core.set_pending(true);
            self.core.emit(begin, times.unwrap_or(0), link);
        } else if !self.finite && times.is_none() && self.blink_interval_ms != interval_ms {
            self.blink_interval_ms = interval_ms;
            self.core.emit(begin, 0, link);
        }
    }

    /// End an indefinite blink, restoring the pre-blink state.
    pub fn stop_blink(&mut self, link: &mut dyn HostLink) {
        if !self.core.is_active() || self.core.state() != STATE_BLINK {
            return;
        }
        self.settle(link);
    }

    fn settle(&mut self, link: &mut dyn HostLink) {
        let level = if self.prior_state == STATE_ON {
            Level::High
        } else {
            Level::Low
        };
        self.drive(level);
        self.core.set_state(self.prior_state);
        self.core.set_pending(false);
        self.core
            .emit(EventKind::BlinkEnd, self.interval_count / 2, link);
    }

    pub fn is_on(&self) -> bool {
        self.level.is_high()
    }
}

impl Device for Led {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn attach(&mut self, binding: PortBinding, source: SourceId, link: &mut dyn HostLink) {
        self.core.bind(binding, source);
        self.activate(link);
    }

    fn activate(&mut self, link: &mut dyn HostLink) {
        if self.core.is_active() {
            return;
        }
        self.core.set_active(true);
        self.core.set_state(STATE_OFF);
        self.core.set_pending(false);
        self.core.emit(EventKind::Activate, 1, link);
    }

    fn deactivate(&mut self, link: &mut dyn HostLink) {
        if !self.core.is_active() {
            return;
        }
        self.drive(Level::Low);
        self.core.set_active(false);
        self.core.set_state(STATE_INACTIVE);
        self.core.set_pending(false);
        self.core.emit(EventKind::Deactivate, 0, link);
    }

    fn run_state_machine(&mut self, now_ms: u32, link: &mut dyn HostLink) {
        if self.core.state() != STATE_BLINK {
            return;
        }
        if now_ms.wrapping_sub(self.last_toggle_ms) <= self.blink_interval_ms {
            return;
        }
        if self.finite && self.interval_count == 2 * self.blink_times {
            self.settle(link);
        } else {
            let level = self.level.toggled();
            self.drive(level);
            self.interval_count = self.interval_count.wrapping_add(1);
            self.last_toggle_ms = now_ms;
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
