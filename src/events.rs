//! Event primitives: the occurrence record and the per-source FIFO.
//!
//! Events are produced by:
//! - timer ISRs (IR sample decoder ready, servo move finished)
//! - polled device state machines (press/release, tape enter/leave, …)
//! - the kernel itself (launch, terminate, interval timer expiry)
//!
//! Events are consumed by the application control loop, one at a time,
//! after the kernel has drained every device queue into the application
//! queue.
//!
//! ```text
//! ┌──────────────┐     ┌───────────────┐     ┌───────────────┐
//! │ Device SMs   │────▶│ device queues │────▶│               │
//! │ Timer ISRs   │────▶│ (per source)  │     │  app queue →  │
//! │ Kernel       │────▶│ kernel queue  │────▶│  handler      │
//! └──────────────┘     └───────────────┘     └───────────────┘
//! ```
//!
//! Queues are deliberately not thread-safe: every queue has exactly one
//! producer (a device operating in the polled context) and one drainer
//! (the kernel pass). Interrupt handlers never touch a queue directly —
//! they raise the device's pending flag and the polled side enqueues.

use core::ptr;

/// Number of data fields an event carries.
pub const MAX_EVENT_DATA: usize = 2;

/// Hard cap on queued events per queue. Past this, enqueue silently
/// drops — a deliberate memory bound for the constrained target, not an
/// error condition.
pub const MAX_QUEUE_SIZE: usize = 255;

/// Identity token for the source that produced an event.
///
/// This is a non-owning handle (the kernel's attachment index), used for
/// identity comparison only. Token 0 is reserved for the kernel itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceId(pub(crate) u8);

impl SourceId {
    /// The kernel's own source token.
    pub const KERNEL: SourceId = SourceId(0);

    pub fn index(self) -> u8 {
        self.0
    }
}

/// Closed enumeration of everything that can happen in the system.
///
/// Discriminants are part of the host notification wire format and must
/// not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    Null = 0,

    // Kernel lifecycle
    Launch = 1,
    Terminate = 2,
    TimeUp = 3,

    // Every device
    Deactivate = 10,
    Activate = 11,

    // Button
    ButtonPress = 100,
    ButtonRelease = 101,

    // Tape sensor
    BlackTapeEnter = 102,
    BlackTapeLeave = 103,

    // Light sensor
    DarkEnter = 104,
    DarkLeave = 105,

    // Sound sensor
    SoundBegin = 106,
    SoundEnd = 107,

    // IR receiver
    IrMessageRepeat = 108,
    IrMessageReceive = 109,

    // Joystick
    JoystickXUpdate = 111,
    JoystickYUpdate = 112,

    // LED
    LedTurnOn = 200,
    LedTurnOff = 201,
    SlowBlinkBegin = 202,
    FastBlinkBegin = 203,
    BlinkEnd = 204,

    // Servo
    ServoMoveBegin = 205,
    ServoIncreaseEnd = 206,
    ServoDecreaseEnd = 207,

    // Motor
    MotorSpeedChange = 208,
    MotorSpeedZero = 209,
    MotorReverse = 210,

    // IR transmitter
    IrMessageEmit = 211,
}

/// A plain-value occurrence record.
///
/// Copyable, owns nothing; the source field is an identity token and is
/// never dereferenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    source: Option<SourceId>,
    kind: EventKind,
    data: [i16; MAX_EVENT_DATA],
}

impl Event {
    /// The null event: no source, `EventKind::Null`, zeroed data.
    /// Returned by [`EventQueue::dequeue`] on an empty queue.
    pub const fn null() -> Self {
        Self {
            source: None,
            kind: EventKind::Null,
            data: [0; MAX_EVENT_DATA],
        }
    }

    /// Single-data-field event; the second slot defaults to 0.
    pub fn new(source: SourceId, kind: EventKind, first: i16) -> Self {
        Self {
            source: Some(source),
            kind,
            data: [first, 0],
        }
    }

    /// Two-data-field event (IR messages, servo reports).
    pub fn with_data(source: SourceId, kind: EventKind, first: i16, second: i16) -> Self {
        Self {
            source: Some(source),
            kind,
            data: [first, second],
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_type(&self, kind: EventKind) -> bool {
        self.kind == kind
    }

    /// Identity comparison against a source token.
    pub fn is_from(&self, source: SourceId) -> bool {
        self.source == Some(source)
    }

    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    /// Data field by index; out-of-range indices read as 0.
    pub fn data(&self, index: usize) -> i16 {
        if index < MAX_EVENT_DATA {
            self.data[index]
        } else {
            0
        }
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::null()
    }
}

// ── Bounded FIFO ──────────────────────────────────────────────

struct Cell {
    event: Event,
    next: Option<Box<Cell>>,
}

/// Bounded FIFO of events, a linked chain of owned cells.
///
/// Cells are allocated on demand so an idle queue costs two words; the
/// 255-entry cap bounds the worst case. Overflow drops silently and
/// underflow yields [`Event::null`] — callers that cannot distinguish a
/// null sentinel from a legitimate `Null`-typed event must check
/// [`is_empty`](Self::is_empty) first.
pub struct EventQueue {
    head: Option<Box<Cell>>,
    // Raw cursor to the last cell of the chain, so enqueue is O(1).
    // Null iff head is None.
    tail: *mut Cell,
    len: usize,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            head: None,
            tail: ptr::null_mut(),
            len: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append at the tail. No-op at capacity.
    pub fn enqueue(&mut self, event: Event) {
        if self.len == MAX_QUEUE_SIZE {
            return;
        }
        let mut cell = Box::new(Cell { event, next: None });
        // The heap allocation is stable across the Box move below.
        let raw: *mut Cell = &mut *cell;
        if self.head.is_none() {
            self.head = Some(cell);
        } else {
            // SAFETY: tail is non-null whenever head is Some, and points
            // at the last cell of the chain, which is exclusively owned
            // by this queue.
            unsafe {
                (*self.tail).next = Some(cell);
            }
        }
        self.tail = raw;
        self.len += 1;
    }

    /// Remove and return the head, or the null event if empty.
    pub fn dequeue(&mut self) -> Event {
        match self.head.take() {
            None => Event::null(),
            Some(cell) => {
                let cell = *cell;
                self.head = cell.next;
                if self.head.is_none() {
                    self.tail = ptr::null_mut();
                }
                self.len -= 1;
                cell.event
            }
        }
    }

    /// Drop everything by repeated dequeue.
    pub fn clear(&mut self) {
        while self.len > 0 {
            let _ = self.dequeue();
        }
    }

    /// Move every queued event into `other`, preserving order.
    pub fn drain_into(&mut self, other: &mut EventQueue) {
        while !self.is_empty() {
            other.enqueue(self.dequeue());
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
