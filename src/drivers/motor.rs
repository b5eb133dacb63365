//! DC motor driver.
//!
//! Speed is commanded on the coarse 0..=9 scale and mapped onto the PWM
//! duty range; direction is a separate digital line. `pause` drops the
//! duty to zero while remembering the commanded speed, so `resume`
//! restores it. Motor events carry speed in the first data field and
//! direction (0 forward, 1 reversed) in the second.

use core::any::Any;

use crate::device::{Device, DeviceCore, DeviceKind, PortBinding, STATE_INACTIVE};
use crate::events::{EventKind, SourceId};
use crate::hal::{DigitalOutput, Level, PwmOutput};
use crate::host::HostLink;

const STATE_STOP: u8 = 1;
const STATE_RUN: u8 = 2;

pub const MAX_SPEED: i16 = 9;

/// Spread the nine speed steps across the 8-bit duty range.
fn duty_for(speed: i16) -> u8 {
    (speed * 28).min(252) as u8
}

pub struct Motor {
    core: DeviceCore,
    speed_out: Box<dyn PwmOutput>,
    dir_out: Box<dyn DigitalOutput>,
    speed: i16,
    reversed: bool,
}

impl Motor {
    pub fn new(speed_out: Box<dyn PwmOutput>, dir_out: Box<dyn DigitalOutput>) -> Self {
        Self {
            core: DeviceCore::new(DeviceKind::Motor),
            speed_out,
            dir_out,
            speed: 0,
            reversed: false,
        }
    }

    pub fn speed(&self) -> i16 {
        self.speed
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    fn direction_data(&self) -> i16 {
        i16::from(self.reversed)
    }

    /// Command a speed on the 0..=9 scale. Out-of-range values are
    /// silently rejected; zero stops the motor.
    pub fn rotate(&mut self, speed: i16, link: &mut dyn HostLink) {
        if !self.core.is_active() || !(0..=MAX_SPEED).contains(&speed) {
            return;
        }
        if speed == self.speed {
            return;
        }
        self.speed = speed;
        self.speed_out.set_duty(duty_for(speed));
        if speed == 0 {
            self.core.set_state(STATE_STOP);
            self.core
                .emit2(EventKind::MotorSpeedZero, 0, self.direction_data(), link);
        } else {
            self.core.set_state(STATE_RUN);
            self.core
                .emit2(EventKind::MotorSpeedChange, speed, self.direction_data(), link);
        }
    }

    /// Flip the rotation direction, keeping the current speed.
    pub fn reverse(&mut self, link: &mut dyn HostLink) {
        if !self.core.is_active() {
            return;
        }
        self.reversed = !self.reversed;
        self.dir_out.write(if self.reversed {
            Level::High
        } else {
            Level::Low
        });
        self.core
            .emit2(EventKind::MotorReverse, self.speed, self.direction_data(), link);
    }

    /// Cut the duty to zero without forgetting the commanded speed.
    pub fn pause(&mut self, link: &mut dyn HostLink) {
        if !self.core.is_active() || self.core.state() != STATE_RUN {
            return;
        }
        self.speed_out.set_duty(0);
        self.core.set_state(STATE_STOP);
        self.core
            .emit2(EventKind::MotorSpeedZero, 0, self.direction_data(), link);
    }

    /// Restore the speed commanded before `pause`.
    pub fn resume(&mut self, link: &mut dyn HostLink) {
        if !self.core.is_active() || self.core.state() != STATE_STOP || self.speed == 0 {
            return;
        }
        self.speed_out.set_duty(duty_for(self.speed));
        self.core.set_state(STATE_RUN);
        self.core.emit2(
            EventKind::MotorSpeedChange,
            self.speed,
            self.direction_data(),
            link,
        );
    }
}

impl Device for Motor {
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
        self.core.set_state(STATE_STOP);
        self.core.set_pending(false);
        self.core.emit(EventKind::Activate, 1, link);
    }

    fn deactivate(&mut self, link: &mut dyn HostLink) {
        if !self.core.is_active() {
            return;
        }
        self.speed_out.set_duty(0);
        self.speed = 0;
        self.core.set_active(false);
        self.core.set_state(STATE_INACTIVE);
        self.core.set_pending(false);
        self.core.emit(EventKind::Deactivate, 0, link);
    }

    // Purely command-driven, nothing to poll.
    fn run_state_machine(&mut self, _now_ms: u32, _link: &mut dyn HostLink) {}

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
