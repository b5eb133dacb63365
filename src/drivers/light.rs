//! Light sensor driver.
//!
//! Darkness is relative to the module's preset threshold; the line goes
//! low when intensity falls below it. Debounced like the other digital
//! sensors to avoid false retriggers right after a transition.

use core::any::Any;

use crate::device::{Device, DeviceCore, DeviceKind, PortBinding, STATE_INACTIVE};
use crate::events::{EventKind, SourceId};
use crate::hal::{DigitalInput, Level};
use crate::host::HostLink;

use super::debounce::{DebouncedLevel, LevelStep};

const STATE_BRIGHT: u8 = 1;
const STATE_DARK: u8 = 2;
const STATE_DEBOUNCE: u8 = 3;

pub struct LightSensor {
    core: DeviceCore,
    input: Box<dyn DigitalInput>,
    filter: DebouncedLevel,
    count: i16,
}

impl LightSensor {
    pub fn new(input: Box<dyn DigitalInput>, debounce_ms: u32) -> Self {
        Self {
            core: DeviceCore::new(DeviceKind::LightSensor),
            input,
            filter: DebouncedLevel::new(debounce_ms, Level::High),
            count: 0,
        }
    }

    /// Dark entries seen since attach.
    pub fn count(&self) -> i16 {
        self.count
    }
}

impl Device for LightSensor {
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
        self.core.set_state(STATE_BRIGHT);
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
                    STATE_BRIGHT
                } else {
                    STATE_DARK
                });
            }
            LevelStep::Edge(level) => {
                if level.is_high() {
                    self.core.set_state(STATE_BRIGHT);
                    self.core.emit(EventKind::DarkLeave, self.count, link);
                } else {
                    self.count = self.count.wrapping_add(1);
                    self.core.set_state(STATE_DARK);
                    self.core.emit(EventKind::DarkEnter, self.count, link);
                }
                self.core.set_state(STATE_DEBOUNCE);
            }
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullLink;
    use crate::pins::PortId;

    struct SharedLine(std::rc::Rc<core::cell::Cell<Level>>);

    impl DigitalInput for SharedLine {
        fn read(&mut self) -> Level {
            self.0.get()
        }
    }

    #[test]
    fn dark_edge_reports_enter() {
        let level = std::rc::Rc::new(core::cell::Cell::new(Level::High));
        let mut s = LightSensor::new(Box::new(SharedLine(level.clone())), 200);
        s.attach(
            PortBinding::Single(PortId::Dio3),
            SourceId(1),
            &mut NullLink,
        );
        s.core_mut().queue_mut().clear();

        level.set(Level::Low);
        s.run_state_machine(1, &mut NullLink);
        let e = s.core_mut().queue_mut().dequeue();
        assert!(e.is_type(EventKind::DarkEnter));
        assert_eq!(e.data(0), 1);
    }
}
