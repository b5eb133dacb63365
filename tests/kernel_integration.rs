//! Integration tests: kernel scheduler pass → devices → host frames.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use robocore::drivers::{Button, Led};
use robocore::events::EventKind;
use robocore::hal::{Clock, DigitalInput, DigitalOutput, Level};
use robocore::host::{encode_text, Frame, HostLink};
use robocore::kernel::{Kernel, KernelState, TimerInterval};
use robocore::pins::PortId;

// ── Mock implementations ──────────────────────────────────────

/// Clock the test advances by hand.
#[derive(Clone)]
struct TestClock(Rc<Cell<u32>>);

impl TestClock {
    fn new() -> Self {
        Self(Rc::new(Cell::new(0)))
    }

    fn advance(&self, ms: u32) {
        self.0.set(self.0.get() + ms);
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u32 {
        self.0.get()
    }
}

/// Host link that shares its captured frames with the test body.
#[derive(Clone, Default)]
struct SharedLink(Rc<RefCell<Vec<Frame>>>);

impl HostLink for SharedLink {
    fn send_record(&mut self, record: &robocore::host::EventRecord) {
        self.0.borrow_mut().push(record.encode());
    }

    fn send_text(&mut self, text: &str) {
        if let Some(frame) = encode_text(text) {
            self.0.borrow_mut().push(frame);
        }
    }
}

/// Digital line the test drives.
#[derive(Clone)]
struct TestLine(Rc<Cell<Level>>);

impl TestLine {
    fn new(level: Level) -> Self {
        Self(Rc::new(Cell::new(level)))
    }
}

impl DigitalInput for TestLine {
    fn read(&mut self) -> Level {
        self.0.get()
    }
}

/// Output pin recording its last written level.
#[derive(Clone)]
struct TestPin(Rc<Cell<Level>>);

impl TestPin {
    fn new() -> Self {
        Self(Rc::new(Cell::new(Level::Low)))
    }
}

impl DigitalOutput for TestPin {
    fn write(&mut self, level: Level) {
        self.0.set(level);
    }
}

fn drain(kernel: &mut Kernel) -> Vec<robocore::Event> {
    let mut events = Vec::new();
    while kernel.has_events() {
        events.push(kernel.next_event());
    }
    events
}

// ── Scheduler ordering ────────────────────────────────────────

#[test]
fn launch_precedes_device_events_in_attach_order() {
    let clock = TestClock::new();
    let mut kernel = Kernel::new(Box::new(clock), Box::new(SharedLink::default()));

    // Two buttons; each enqueues an activate event at attach time.
    let line_a = TestLine::new(Level::High);
    let line_b = TestLine::new(Level::High);
    let a = kernel
        .attach(Box::new(Button::new(Box::new(line_a), 200)), PortId::Dio1)
        .unwrap();
    let b = kernel
        .attach(Box::new(Button::new(Box::new(line_b), 200)), PortId::Dio2)
        .unwrap();
    assert_ne!(a, b);

    kernel.launch();
    kernel.service();
    let events = drain(&mut kernel);

    // Kernel queue drains first, then device queues in attach order.
    assert_eq!(events.len(), 3);
    assert!(events[0].is_type(EventKind::Launch));
    assert_eq!(events[0].data(0), 2); // ports in use
    assert!(events[1].is_type(EventKind::Activate));
    assert!(events[1].is_from(a));
    assert!(events[2].is_type(EventKind::Activate));
    assert!(events[2].is_from(b));
}

#[test]
fn button_press_flows_through_to_application_and_host() {
    let clock = TestClock::new();
    let link = SharedLink::default();
    let frames = link.0.clone();
    let mut kernel = Kernel::new(Box::new(clock.clone()), Box::new(link));

    let line = TestLine::new(Level::High);
    let button = kernel
        .attach(
            Box::new(Button::new(Box::new(line.clone()), 200)),
            PortId::Dio1,
        )
        .unwrap();
    kernel.launch();
    kernel.service();
    drain(&mut kernel);
    frames.borrow_mut().clear();

    line.0.set(Level::Low);
    clock.advance(10);
    kernel.service();

    let events = drain(&mut kernel);
    assert_eq!(events.len(), 1);
    assert!(events[0].is_type(EventKind::ButtonPress));
    assert!(events[0].is_from(button));
    assert_eq!(events[0].data(0), 1);

    // The host saw the same transition as a record frame.
    let frames = frames.borrow();
    assert_eq!(frames.len(), 1);
    // begin, count, device kind 10 (button), port 11 (DIO1), len 4.
    assert_eq!(&frames[0][..5], &[0xF0, 0x01, 10, 11, 4]);
    assert_eq!(frames[0][6], EventKind::ButtonPress as u8);
}

// ── Registration guards ───────────────────────────────────────

#[test]
fn attach_rejects_conflicts_and_late_arrivals() {
    let mut kernel = Kernel::new(Box::new(TestClock::new()), Box::new(SharedLink::default()));

    let first = kernel.attach(
        Box::new(Button::new(Box::new(TestLine::new(Level::High)), 200)),
        PortId::Dio1,
    );
    assert!(first.is_some());

    // Same port again.
    let conflict = kernel.attach(
        Box::new(Button::new(Box::new(TestLine::new(Level::High)), 200)),
        PortId::Dio1,
    );
    assert!(conflict.is_none());

    // Attachment window closes at launch.
    kernel.launch();
    let late = kernel.attach(
        Box::new(Button::new(Box::new(TestLine::new(Level::High)), 200)),
        PortId::Dio2,
    );
    assert!(late.is_none());
}

// ── Commands through the kernel ───────────────────────────────

#[test]
fn led_command_round_trip() {
    let clock = TestClock::new();
    let mut kernel = Kernel::new(Box::new(clock.clone()), Box::new(SharedLink::default()));

    let pin = TestPin::new();
    let led = kernel
        .attach(Box::new(Led::new(Box::new(pin.clone()))), PortId::Dio3)
        .unwrap();
    kernel.launch();
    kernel.service();
    drain(&mut kernel);

    let turned = kernel.with_device::<Led, _>(led, |led, link| led.turn_on(link));
    assert!(turned.is_some());
    assert_eq!(pin.0.get(), Level::High);

    // The command's event sits in the LED's queue until the next pass
    // drains device queues.
    assert!(drain(&mut kernel).is_empty());
    kernel.service();

    let events = drain(&mut kernel);
    assert_eq!(events.len(), 1);
    assert!(events[0].is_type(EventKind::LedTurnOn));
    assert!(events[0].is_from(led));
}

#[test]
fn wrong_device_type_does_not_resolve() {
    let mut kernel = Kernel::new(Box::new(TestClock::new()), Box::new(SharedLink::default()));
    let led = kernel
        .attach(Box::new(Led::new(Box::new(TestPin::new()))), PortId::Dio3)
        .unwrap();
    let missed = kernel.with_device::<Button, _>(led, |_, _| ());
    assert!(missed.is_none());
}

// ── Timer and prints ──────────────────────────────────────────

#[test]
fn timer_fires_once_and_reports_seconds() {
    let clock = TestClock::new();
    let mut kernel = Kernel::new(Box::new(clock.clone()), Box::new(SharedLink::default()));
    kernel.launch();
    kernel.service();
    drain(&mut kernel);

    kernel.time(TimerInterval::TwoSec);
    clock.advance(1999);
    kernel.service();
    assert!(drain(&mut kernel).is_empty());

    clock.advance(10);
    kernel.service();
    // Expiry lands in the kernel's own queue at the end of the pass;
    // it reaches the application queue on the next pass.
    assert!(drain(&mut kernel).is_empty());
    kernel.service();
    let events = drain(&mut kernel);
    assert_eq!(events.len(), 1);
    assert!(events[0].is_type(EventKind::TimeUp));
    assert_eq!(events[0].data(0), 2);

    // Single shot: no further passes fire it again.
    clock.advance(10_000);
    kernel.service();
    assert!(drain(&mut kernel).is_empty());
}

#[test]
fn print_is_operate_only_and_length_limited() {
    let link = SharedLink::default();
    let frames = link.0.clone();
    let mut kernel = Kernel::new(Box::new(TestClock::new()), Box::new(link));

    kernel.print("too early");
    assert!(frames.borrow().is_empty());

    kernel.launch();
    frames.borrow_mut().clear();

    kernel.print("hello");
    kernel.print(&"x".repeat(51)); // rejected whole
    kernel.print_value("count: ", 42);

    let frames = frames.borrow();
    assert_eq!(frames.len(), 2);
    assert_eq!(&frames[0][..2], &[0xF1, 5]);
    assert_eq!(&frames[0][2..7], b"hello");
    assert_eq!(*frames[0].last().unwrap(), 0xFF);
    assert_eq!(&frames[1][2..11], b"count: 42");
}

#[test]
fn terminate_is_final() {
    let mut kernel = Kernel::new(Box::new(TestClock::new()), Box::new(SharedLink::default()));
    kernel.launch();
    kernel.terminate();
    assert_eq!(kernel.state(), KernelState::Terminate);
    kernel.service();
    assert!(drain(&mut kernel).is_empty());
    // Relaunching a terminated kernel is not possible.
    kernel.launch();
    assert_eq!(kernel.state(), KernelState::Terminate);
}
