//! The device contract and the shared per-device core.
//!
//! Every peripheral driver is a state machine behind the [`Device`]
//! trait: the kernel polls it through `run_state_machine`, the
//! application reaches its commands back through `Any` downcasting, and
//! all common bookkeeping (binding, activity, local queue, host
//! mirroring) lives in the embedded [`DeviceCore`].
//!
//! Transitions are double-reported: immediately to the host link as a
//! wire record, and as an [`Event`] into the device's local queue for
//! the application to consume on the next kernel pass.

use core::any::Any;

use crate::events::{Event, EventKind, EventQueue, SourceId};
use crate::host::{EventRecord, HostLink};
use crate::pins::PortId;

/// Device class identifiers. Part of the host wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceKind {
    Core = 1,
    Button = 10,
    TapeSensor = 11,
    LightSensor = 12,
    SoundSensor = 14,
    Motor = 20,
    IrReceiver = 30,
    Joystick = 40,
    Led = 100,
    IrTransmitter = 110,
    Servo = 120,
}

/// Shared inactive state code. Active states are device-specific and
/// start at 1.
pub const STATE_INACTIVE: u8 = 0;

/// Port assignment made at attach time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortBinding {
    Single(PortId),
    /// Two-port devices (joystick: X axis then Y axis).
    Dual(PortId, PortId),
}

impl PortBinding {
    pub fn primary(self) -> PortId {
        match self {
            Self::Single(p) | Self::Dual(p, _) => p,
        }
    }

    pub fn secondary(self) -> Option<PortId> {
        match self {
            Self::Single(_) => None,
            Self::Dual(_, p) => Some(p),
        }
    }
}

/// Common per-device bookkeeping, embedded by every driver.
pub struct DeviceCore {
    kind: DeviceKind,
    binding: Option<PortBinding>,
    source: Option<SourceId>,
    active: bool,
    /// Whether the kernel should poll `run_state_machine` this pass.
    pending: bool,
    state: u8,
    queue: EventQueue,
}

impl DeviceCore {
    pub fn new(kind: DeviceKind) -> Self {
        Self {
            kind,
            binding: None,
            source: None,
            active: false,
            pending: false,
            state: STATE_INACTIVE,
            queue: EventQueue::new(),
        }
    }

    /// Record the kernel-assigned binding and identity token.
    pub fn bind(&mut self, binding: PortBinding, source: SourceId) {
        self.binding = Some(binding);
        self.source = Some(source);
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn binding(&self) -> Option<PortBinding> {
        self.binding
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn pending(&self) -> bool {
        self.pending
    }

    pub fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    pub fn state(&self) -> u8 {
        self.state
    }

    pub fn set_state(&mut self, state: u8) {
        self.state = state;
    }

    /// Wire port number of the primary binding, 0 when unbound.
    pub fn port_number(&self) -> u8 {
        self.binding.map_or(0, |b| b.primary().number())
    }

    pub fn queue_mut(&mut self) -> &mut EventQueue {
        &mut self.queue
    }

    /// Report a transition: host record now, queued event for the next
    /// kernel pass. No-op before binding.
    pub fn emit(&mut self, kind: EventKind, first: i16, link: &mut dyn HostLink) {
        self.emit_on_port(self.port_number(), kind, first, link);
    }

    /// Two-data-field variant (IR messages, servo reports).
    pub fn emit2(&mut self, kind: EventKind, first: i16, second: i16, link: &mut dyn HostLink) {
        let Some(source) = self.source else { return };
        link.send_record(&EventRecord {
            device: self.kind,
            port: self.port_number(),
            state: self.state,
            event: kind,
            first,
            second: Some(second),
        });
        self.queue.enqueue(Event::with_data(source, kind, first, second));
    }

    /// Report against an explicit port number — dual-port devices record
    /// lifecycle per port.
    pub fn emit_on_port(&mut self, port: u8, kind: EventKind, first: i16, link: &mut dyn HostLink) {
        let Some(source) = self.source else { return };
        link.send_record(&EventRecord {
            device: self.kind,
            port,
            state: self.state,
            event: kind,
            first,
            second: None,
        });
        self.queue.enqueue(Event::new(source, kind, first));
    }
}

/// A pollable peripheral driver.
///
/// Lifecycle: `attach` once (kernel-mediated), then `activate` /
/// `deactivate` any number of times; the kernel polls
/// `run_state_machine` whenever `state_machine_pending` is true.
/// Repeated `activate` on an active device (and the converse) is a
/// silent no-op.
pub trait Device {
    fn core(&self) -> &DeviceCore;
    fn core_mut(&mut self) -> &mut DeviceCore;

    /// Bind to ports and adopt the kernel-assigned identity. Implementors
    /// decide the post-attach activity (sensors auto-activate, actuators
    /// start deactivated).
    fn attach(&mut self, binding: PortBinding, source: SourceId, link: &mut dyn HostLink);

    fn activate(&mut self, link: &mut dyn HostLink);
    fn deactivate(&mut self, link: &mut dyn HostLink);

    fn state_machine_pending(&self) -> bool {
        self.core().pending()
    }

    /// One poll step at kernel time `now_ms`.
    fn run_state_machine(&mut self, now_ms: u32, link: &mut dyn HostLink);

    /// Downcast hook for command access through the kernel.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
