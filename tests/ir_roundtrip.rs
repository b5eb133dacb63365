//! Integration test: IR transmitter burst → 50 µs sampling → capture →
//! decode → receiver events.
//!
//! The transmitter's mark/space trace is replayed into an [`IrCapture`]
//! exactly as the sampling interrupt would see it, one sample per 50 µs
//! of trace time.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use robocore::device::Device;
use robocore::events::EventKind;
use robocore::hal::{CarrierOutput, Clock};
use robocore::host::NullLink;
use robocore::ir::{IrCapture, IrReceiver, IrTransmitter, USEC_PER_TICK};
use robocore::kernel::Kernel;
use robocore::pins::PortId;

struct FixedClock;

impl Clock for FixedClock {
    fn now_ms(&self) -> u32 {
        0
    }
}

/// Carrier output that records (is_mark, duration) pairs.
struct TraceOutput(Rc<RefCell<Vec<(bool, u32)>>>);

impl CarrierOutput for TraceOutput {
    fn mark(&mut self, us: u32) {
        self.0.borrow_mut().push((true, us));
    }

    fn space(&mut self, us: u32) {
        self.0.borrow_mut().push((false, us));
    }
}

/// Replay a transmit trace into the capture the way the sampling
/// interrupt would: quiet before and after, one sample per tick.
fn replay(capture: &IrCapture, trace: &[(bool, u32)]) {
    for _ in 0..150 {
        capture.on_sample(false);
    }
    for &(mark, us) in trace {
        for _ in 0..us / USEC_PER_TICK {
            capture.on_sample(mark);
        }
    }
    // Quiet run past the gap threshold parks the capture for decoding.
    for _ in 0..150 {
        capture.on_sample(false);
    }
}

fn drain(kernel: &mut Kernel) -> Vec<robocore::Event> {
    let mut events = Vec::new();
    while kernel.has_events() {
        events.push(kernel.next_event());
    }
    events
}

#[test]
fn transmitted_burst_decodes_on_the_receiving_side() {
    let trace = Rc::new(RefCell::new(Vec::new()));
    let capture = Arc::new(IrCapture::new());

    let mut kernel = Kernel::new(Box::new(FixedClock), Box::new(NullLink));
    let tx = kernel
        .attach(
            Box::new(IrTransmitter::new(Box::new(TraceOutput(trace.clone())))),
            PortId::IrTran,
        )
        .unwrap();
    let rx = kernel
        .attach(Box::new(IrReceiver::new(capture.clone())), PortId::Dio3)
        .unwrap();
    kernel.launch();
    let _ = kernel.with_device::<IrTransmitter, _>(tx, |t, link| t.activate(link));
    kernel.service();
    drain(&mut kernel);

    let _ = kernel.with_device::<IrTransmitter, _>(tx, |t, link| t.emit(0x1234, 0x0042, link));
    replay(&capture, &trace.borrow());
    kernel.service();

    let events = drain(&mut kernel);
    assert_eq!(events.len(), 2);
    assert!(events[0].is_type(EventKind::IrMessageEmit));
    assert!(events[0].is_from(tx));
    assert!(events[1].is_type(EventKind::IrMessageReceive));
    assert!(events[1].is_from(rx));
    assert_eq!(events[1].data(0), 0x1234);
    assert_eq!(events[1].data(1), 0x0042);
}

#[test]
fn identical_burst_reports_as_repeat() {
    let trace = Rc::new(RefCell::new(Vec::new()));
    let capture = Arc::new(IrCapture::new());

    let mut kernel = Kernel::new(Box::new(FixedClock), Box::new(NullLink));
    let tx = kernel
        .attach(
            Box::new(IrTransmitter::new(Box::new(TraceOutput(trace.clone())))),
            PortId::IrTran,
        )
        .unwrap();
    let rx = kernel
        .attach(Box::new(IrReceiver::new(capture.clone())), PortId::Dio3)
        .unwrap();
    kernel.launch();
    let _ = kernel.with_device::<IrTransmitter, _>(tx, |t, link| t.activate(link));
    kernel.service();
    drain(&mut kernel);

    let _ = kernel.with_device::<IrTransmitter, _>(tx, |t, link| t.emit(77, 3, link));
    replay(&capture, &trace.borrow());
    kernel.service();
    let first = drain(&mut kernel);
    assert!(first.iter().any(|e| e.is_type(EventKind::IrMessageReceive)));

    // Same payload again: the receiver already holds these halves.
    trace.borrow_mut().clear();
    let _ = kernel.with_device::<IrTransmitter, _>(tx, |t, link| t.emit(77, 3, link));
    replay(&capture, &trace.borrow());
    kernel.service();

    let second = drain(&mut kernel);
    let repeat = second
        .iter()
        .find(|e| e.is_type(EventKind::IrMessageRepeat))
        .expect("repeat event");
    assert!(repeat.is_from(rx));
    assert_eq!(repeat.data(0), 77);
    assert_eq!(repeat.data(1), 3);
}

#[test]
fn garbled_burst_is_dropped_silently() {
    let capture = Arc::new(IrCapture::new());
    let mut kernel = Kernel::new(Box::new(FixedClock), Box::new(NullLink));
    let rx = kernel
        .attach(Box::new(IrReceiver::new(capture.clone())), PortId::Dio3)
        .unwrap();
    kernel.launch();
    kernel.service();
    drain(&mut kernel);

    // A few marks with no structure: neither NEC nor RC5.
    replay(
        &capture,
        &[
            (true, 3000),
            (false, 700),
            (true, 3000),
            (false, 700),
            (true, 3000),
        ],
    );
    kernel.service();
    assert!(drain(&mut kernel).is_empty());

    // The capture re-armed and a real burst still gets through.
    let trace = Rc::new(RefCell::new(Vec::new()));
    let mut tx = IrTransmitter::new(Box::new(TraceOutput(trace.clone())));
    tx.attach(
        robocore::device::PortBinding::Single(PortId::IrTran),
        rx, // identity is irrelevant for a standalone trace source
        &mut NullLink,
    );
    tx.activate(&mut NullLink);
    tx.emit(9, 9, &mut NullLink);
    replay(&capture, &trace.borrow());
    kernel.service();
    let events = drain(&mut kernel);
    assert!(events.iter().any(|e| e.is_type(EventKind::IrMessageReceive)));
}
