//! Reflective tape sensor driver.
//!
//! The sensor output drops low over a non-reflective surface, so only
//! the reflective-to-black transition and its reverse are reported. The
//! edge between a white board and black tape bounces just like a
//! mechanical contact, hence the shared debounce filter.

use core::any::Any;

use crate::device::{Device, DeviceCore, DeviceKind, PortBinding, STATE_INACTIVE};
use crate::events::{EventKind, SourceId};
use crate::hal::{DigitalInput, Level};
use crate::host::HostLink;

use super::debounce::{DebouncedLevel, LevelStep};

const STATE_OFF_TAPE: u8 = 1;
const STATE_ON_TAPE: u8 = 2;
const STATE_DEBOUNCE: u8 = 3;

pub struct TapeSensor {
    core: DeviceCore,
    input: Box<dyn DigitalInput>,
    filter: DebouncedLevel,
    count: i16,
}

impl TapeSensor {
    pub fn new(input: Box<dyn DigitalInput>, debounce_ms: u32) -> Self {
        Self {
            core: DeviceCore::new(DeviceKind::TapeSensor),
            input,
            filter: DebouncedLevel::new(debounce_ms, Level::High),
            count: 0,
        }
    }

    /// Tape entries seen since attach.
    pub fn count(&self) -> i16 {
        self.count
    }
}

impl Device for TapeSensor {
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
        self.core.set_state(STATE_OFF_TAPE);
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
                    STATE_OFF_TAPE
                } else {
                    STATE_ON_TAPE
                });
            }
            LevelStep::Edge(level) => {
                if level.is_high() {
                    self.core.set_state(STATE_OFF_TAPE);
                    self.core.emit(EventKind::BlackTapeLeave, self.count, link);
                } else {
                    self.count = self.count.wrapping_add(1);
                    self.core.set_state(STATE_ON_TAPE);
                    self.core.emit(EventKind::BlackTapeEnter, self.count, link);
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
    fn enter_then_leave_keeps_count() {
        let level = std::rc::Rc::new(core::cell::Cell::new(Level::High));
        let mut s = TapeSensor::new(Box::new(SharedLine(level.clone())), 200);
        s.attach(
            PortBinding::Single(PortId::Dio2),
            SourceId(1),
            &mut NullLink,
        );
        s.core_mut().queue_mut().clear();

        level.set(Level::Low);
        s.run_state_machine(5, &mut NullLink);
        let enter = s.core_mut().queue_mut().dequeue();
        assert!(enter.is_type(EventKind::BlackTapeEnter));
        assert_eq!(enter.data(0), 1);

        s.run_state_machine(210, &mut NullLink);
        level.set(Level::High);
        s.run_state_machine(215, &mut NullLink);
        let leave = s.core_mut().queue_mut().dequeue();
        assert!(leave.is_type(EventKind::BlackTapeLeave));
        assert_eq!(leave.data(0), 1);
        assert_eq!(s.count(), 1);
    }
}
