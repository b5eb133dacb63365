//! Push button driver.
//!
//! Active low: pressed reads as a low level, released or untouched as
//! high. Each press increments a running count that rides along on the
//! press and release events.

use core::any::Any;

use crate::device::{Device, DeviceCore, DeviceKind, PortBinding, STATE_INACTIVE};
use crate::events::{EventKind, SourceId};
use crate::hal::{DigitalInput, Level};
use crate::host::HostLink;

use super::debounce::{DebouncedLevel, LevelStep};

const STATE_NORMAL: u8 = 1;
const STATE_DOWN: u8 = 2;
const STATE_DEBOUNCE: u8 = 3;

pub struct Button {
    core: DeviceCore,
    input: Box<dyn DigitalInput>,
    filter: DebouncedLevel,
    count: i16,
}

impl Button {
    pub fn new(input: Box<dyn DigitalInput>, debounce_ms: u32) -> Self {
        Self {
            core: DeviceCore::new(DeviceKind::Button),
            input,
            filter: DebouncedLevel::new(debounce_ms, Level::High),
            count: 0,
        }
    }

    /// Presses seen since attach.
    pub fn count(&self) -> i16 {
        self.count
    }
}

impl Device for Button {
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
        self.core.set_state(STATE_NORMAL);
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
        match self.filter.step(now_ms, self.input.as_mut()) {
            LevelStep::Idle => {}
            LevelStep::Settled(level) => {
                self.core.set_state(if level.is_high() {
                    STATE_NORMAL
                } else {
                    STATE_DOWN
                });
            }
            LevelStep::Edge(level) => {
                if level.is_high() {
                    self.core.set_state(STATE_NORMAL);
                    self.core.emit(EventKind::ButtonRelease, self.count, link);
                } else {
                    self.count = self.count.wrapping_add(1);
                    self.core.set_state(STATE_DOWN);
                    self.core.emit(EventKind::ButtonPress, self.count, link);
                }
                self.core.set_state(STATE_DEBOUNCE);
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
