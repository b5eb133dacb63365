//! Sound sensor driver.
//!
//! A clap is a few milliseconds of high/low chatter; within one sound
//! the quiet level almost never holds for long. So the first loud edge
//! opens `Noisy`, a loud-to-quiet edge starts a deadband timer, and a
//! loud edge inside the deadband folds back into the same sound. Only a
//! deadband that runs out produces the end event.

use core::any::Any;

use crate::device::{Device, DeviceCore, DeviceKind, PortBinding, STATE_INACTIVE};
use crate::events::{EventKind, SourceId};
use crate::hal::{DigitalInput, Level};
use crate::host::HostLink;

const STATE_QUIET: u8 = 1;
const STATE_NOISY: u8 = 2;
const STATE_DEADBAND: u8 = 3;

pub struct SoundSensor {
    core: DeviceCore,
    input: Box<dyn DigitalInput>,
    deadband_ms: u32,
    last_level: Level,
    deadband_start: u32,
    count: i16,
}

impl SoundSensor {
    pub fn new(input: Box<dyn DigitalInput>, deadband_ms: u32) -> Self {
        Self {
            core: DeviceCore::new(DeviceKind::SoundSensor),
            input,
            deadband_ms,
            last_level: Level::High, // sound is active low
            deadband_start: 0,
            count: 0,
        }
    }

    /// Sounds heard since attach.
    pub fn count(&self) -> i16 {
        self.count
    }
}

impl Device for SoundSensor {
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
        self.core.set_state(STATE_QUIET);
        self.core.set_pending(true);
        self.core.emit(EventKind::Activate, 1, link);
    }

    fn deactivate(&mut self, link: &mut dyn HostLink) {
        if !self.core.is_active() {
            return;
        }
        self.core.set_active(false);
        self.core.set_state(STATE_INACTIVE);
        self.core.set_pending(false);
        self.core.emit(EventKind::Deactivate, 0, link);
    }

    fn run_state_machine(&mut self, now_ms: u32, link: &mut dyn HostLink) {
        let level = self.input.read();
        if level != self.last_level {
            self.last_level = level;
            if level.is_low() {
                // Quiet to loud.
                match self.core.state() {
                    STATE_QUIET => {
                        self.count = self.count.wrapping_add(1);
                        self.core.set_state(STATE_NOISY);
                        self.core.emit(EventKind::SoundBegin, self.count, link);
                        return;
                    }
                    STATE_DEADBAND => {
                        // Same sound continuing.
                        self.core.set_state(STATE_NOISY);
                        return;
                    }
                    _ => {}
                }
            } else if self.core.state() == STATE_NOISY {
                // Loud to quiet: arm the deadband and fall through to
                // the expiry check below.
                self.core.set_state(STATE_DEADBAND);
                self.deadband_start = now_ms;
            }
        }

        if self.core.state() == STATE_DEADBAND
            && now_ms.wrapping_sub(self.deadband_start) > self.deadband_ms
        {
            self.core.set_state(STATE_QUIET);
            self.core.emit(EventKind::SoundEnd, self.count, link);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
