//! Two-axis analog joystick driver.
//!
//! Raw 10-bit readings are bucketed into the -5..=5 range; an axis only
//! reports when its bucketed value changes, with a short debounce so a
//! wobbling stick settles before the values are re-read. Lifecycle
//! records go to the host once per bound port; updates go to the port
//! of the axis that moved.

use core::any::Any;

use crate::device::{Device, DeviceCore, DeviceKind, PortBinding, STATE_INACTIVE};
use crate::events::{EventKind, SourceId};
use crate::hal::AnalogInput;
use crate::host::{EventRecord, HostLink};

const STATE_NORMAL: u8 = 1;
const STATE_DEBOUNCE: u8 = 2;

/// Bucket a raw 10-bit reading into -5..=5.
fn bucket(raw: u16) -> i16 {
    match raw {
        921.. => 5,
        841.. => 4,
        761.. => 3,
        681.. => 2,
        601.. => 1,
        401.. => 0,
        321.. => -1,
        241.. => -2,
        161.. => -3,
        81.. => -4,
        _ => -5,
    }
}

pub struct Joystick {
    core: DeviceCore,
    x_input: Box<dyn AnalogInput>,
    y_input: Box<dyn AnalogInput>,
    debounce_ms: u32,
    debounce_start: u32,
    last_x: i16,
    last_y: i16,
}

impl Joystick {
    pub fn new(x_input: Box<dyn AnalogInput>, y_input: Box<dyn AnalogInput>, debounce_ms: u32) -> Self {
        Self {
            core: DeviceCore::new(DeviceKind::Joystick),
            x_input,
            y_input,
            debounce_ms,
            debounce_start: 0,
            last_x: 0,
            last_y: 0,
        }
    }

    fn ports(&self) -> (u8, u8) {
        match self.core.binding() {
            Some(PortBinding::Dual(x, y)) => (x.number(), y.number()),
            _ => (0, 0),
        }
    }

    /// Lifecycle records go out once per port; one event is queued.
    fn emit_lifecycle(&mut self, kind: EventKind, first: i16, link: &mut dyn HostLink) {
        let (x_port, y_port) = self.ports();
        self.core.emit_on_port(x_port, kind, first, link);
        link.send_record(&EventRecord {
            device: DeviceKind::Joystick,
            port: y_port,
            state: self.core.state(),
            event: kind,
            first,
            second: None,
        });
    }
}

impl Device for Joystick {
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
        self.emit_lifecycle(EventKind::Activate, 1, link);
    }

    fn deactivate(&mut self, link: &mut dyn HostLink) {
        if !self.core.is_active() {
            return;
        }
        self.core.set_active(false);
        self.core.set_state(STATE_INACTIVE);
        self.core.set_pending(false);
        self.emit_lifecycle(EventKind::Deactivate, 0, link);
    }

    fn run_state_machine(&mut self, now_ms: u32, link: &mut dyn HostLink) {
        if self.core.state() == STATE_DEBOUNCE {
            if now_ms.wrapping_sub(self.debounce_start) <= self.debounce_ms {
                return;
            }
            self.core.set_state(STATE_NORMAL);
            let x = bucket(self.x_input.read());
            let y = bucket(self.y_input.read());
            let (x_port, y_port) = self.ports();
            if x != self.last_x {
                self.core
                    .emit_on_port(x_port, EventKind::JoystickXUpdate, x, link);
                self.last_x = x;
            }
            if y != self.last_y {
                self.core
                    .emit_on_port(y_port, EventKind::JoystickYUpdate, y, link);
                self.last_y = y;
            }
        } else {
            let x = bucket(self.x_input.read());
            let y = bucket(self.y_input.read());
            if x != self.last_x || y != self.last_y {
                self.core.set_state(STATE_DEBOUNCE);
                self.debounce_start = now_ms;
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
    use crate::host::RecordingLink;
    use crate::pins::PortId;

    struct SharedAxis(std::rc::Rc<core::cell::Cell<u16>>);

    impl AnalogInput for SharedAxis {
        fn read(&mut self) -> u16 {
            self.0.get()
        }
    }

    type Axis = std::rc::Rc<core::cell::Cell<u16>>;

    fn attached() -> (Joystick, Axis, Axis, RecordingLink) {
        let x = std::rc::Rc::new(core::cell::Cell::new(500));
        let y = std::rc::Rc::new(core::cell::Cell::new(500));
        let mut j = Joystick::new(
            Box::new(SharedAxis(x.clone())),
            Box::new(SharedAxis(y.clone())),
            50,
        );
        let mut link = RecordingLink::new();
        j.attach(
            PortBinding::Dual(PortId::Ai1, PortId::Ai2),
            SourceId(1),
            &mut link,
        );
        j.core_mut().queue_mut().clear();
        (j, x, y, link)
    }

    #[test]
    fn bucket_thresholds() {
        assert_eq!(bucket(1023), 5);
        assert_eq!(bucket(921), 5);
        assert_eq!(bucket(920), 4);
        assert_eq!(bucket(500), 0);
        assert_eq!(bucket(401), 0);
        assert_eq!(bucket(400), -1);
        assert_eq!(bucket(0), -5);
    }

    #[test]
    fn lifecycle_records_once_per_port() {
        let (_j, _x, _y, link) = attached();
        assert_eq!(link.frames.len(), 2);
        assert_eq!(link.frames[0][3], PortId::Ai1.number());
        assert_eq!(link.frames[1][3], PortId::Ai2.number());
    }

    #[test]
    fn axis_update_after_debounce() {
        let (mut j, x, _y, mut link) = attached();
        x.set(1000);
        j.run_state_machine(0, &mut link); // movement noticed, debounce armed
        assert!(j.core_mut().queue_mut().is_empty());
        j.run_state_machine(51, &mut link);
        let e = j.core_mut().queue_mut().dequeue();
        assert!(e.is_type(EventKind::JoystickXUpdate));
        assert_eq!(e.data(0), 5);
        // Record went to the X port.
        assert_eq!(link.frames.last().unwrap()[3], PortId::Ai1.number());
    }

    #[test]
    fn unchanged_bucket_stays_silent() {
        let (mut j, x, _y, mut link) = attached();
        // Still inside the 0 bucket.
        x.set(450);
        j.run_state_machine(0, &mut link);
        j.run_state_machine(51, &mut link);
        assert!(j.core_mut().queue_mut().is_empty());
    }
}
