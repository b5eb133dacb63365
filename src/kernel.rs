//! The cooperative kernel: device registry, scheduler pass and the
//! application-facing control API.
//!
//! The kernel is a lifecycle state machine of its own (`Commence` →
//! `Operate` → `Terminate`) and the single consumer-side aggregator: one
//! [`service`](Kernel::service) pass runs, in fixed order,
//!
//! 1. drain the kernel's own queue into the application queue
//! 2. poll every pending device state machine, in attachment order
//! 3. drain every device queue into the application queue, in
//!    attachment order
//! 4. check the single-shot interval timer
//!
//! The order is a correctness requirement: the kernel queue goes first
//! so the launch event from the very first pass is visible before any
//! device output, and state machines run before their output is
//! drained.

use core::any::Any;

use log::{debug, info, warn};

use crate::config::KernelConfig;
use crate::device::{Device, DeviceKind, PortBinding};
use crate::events::{Event, EventKind, EventQueue, SourceId};
use crate::hal::Clock;
use crate::host::{EventRecord, HostLink};
use crate::pins::{PortId, PORT_COUNT};

/// Kernel lifecycle. Codes are part of the host wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KernelState {
    /// Boot-time setup; devices may attach.
    Commence = 0,
    /// Control loop running; attachment is closed.
    Operate = 1,
    /// Shut down; nothing runs anymore.
    Terminate = 2,
}

/// Single-shot timer lengths accepted by [`Kernel::time`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TimerInterval {
    TenthSec = 100,
    QuarterSec = 250,
    HalfSec = 500,
    OneSec = 1_000,
    TwoSec = 2_000,
    ThreeSec = 3_000,
    FourSec = 4_000,
    FiveSec = 5_000,
    SixSec = 6_000,
    SevenSec = 7_000,
    EightSec = 8_000,
    NineSec = 9_000,
    TenSec = 10_000,
    HalfMin = 30_000,
    OneMin = 60_000,
    TwoMin = 120_000,
}

struct TimerSlot {
    start_ms: u32,
    length_ms: u32,
}

/// The peripheral-control kernel.
///
/// Owns every attached device, the host link and the clock; the
/// application keeps only [`SourceId`] tokens and reaches device
/// commands back through [`device_mut`](Kernel::device_mut).
pub struct Kernel {
    state: KernelState,
    config: KernelConfig,
    clock: Box<dyn Clock>,
    link: Box<dyn HostLink>,
    devices: Vec<Box<dyn Device>>,
    /// One entry per occupied port, in attachment order; dual-port
    /// devices contribute two entries.
    ports_in_use: heapless::Vec<PortId, PORT_COUNT>,
    /// The kernel's own event queue (launch, terminate, timer).
    queue: EventQueue,
    /// Aggregated events awaiting the application handler.
    app_queue: EventQueue,
    timer: Option<TimerSlot>,
}

impl Kernel {
    pub fn new(clock: Box<dyn Clock>, link: Box<dyn HostLink>) -> Self {
        Self::with_config(KernelConfig::default(), clock, link)
    }

    pub fn with_config(config: KernelConfig, clock: Box<dyn Clock>, link: Box<dyn HostLink>) -> Self {
        Self {
            state: KernelState::Commence,
            config,
            clock,
            link,
            devices: Vec::new(),
            ports_in_use: heapless::Vec::new(),
            queue: EventQueue::new(),
            app_queue: EventQueue::new(),
            timer: None,
        }
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    // ── Registration ──────────────────────────────────────────

    /// Attach a single-port device. Returns its identity token, or
    /// `None` after launch, on an occupied port, or with the table full.
    pub fn attach(&mut self, device: Box<dyn Device>, port: PortId) -> Option<SourceId> {
        self.attach_inner(device, PortBinding::Single(port))
    }

    /// Attach a two-port device (joystick: X axis port, then Y axis).
    pub fn attach_dual(
        &mut self,
        device: Box<dyn Device>,
        port_x: PortId,
        port_y: PortId,
    ) -> Option<SourceId> {
        if port_x == port_y {
            warn!("attach rejected: duplicate port {}", port_x.number());
            return None;
        }
        self.attach_inner(device, PortBinding::Dual(port_x, port_y))
    }

    fn attach_inner(&mut self, mut device: Box<dyn Device>, binding: PortBinding) -> Option<SourceId> {
        if self.state != KernelState::Commence {
            warn!("attach rejected: kernel already launched");
            return None;
        }
        let mut wanted: heapless::Vec<PortId, 2> = heapless::Vec::new();
        let _ = wanted.push(binding.primary());
        if let Some(port) = binding.secondary() {
            let _ = wanted.push(port);
        }
        for port in &wanted {
            if self.ports_in_use.contains(port) {
                warn!("attach rejected: port {} in use", port.number());
                return None;
            }
        }
        if self.ports_in_use.len() + wanted.len() > PORT_COUNT
            || self.devices.len() >= u8::MAX as usize
        {
            warn!("attach rejected: port table full");
            return None;
        }

        // Token 0 is the kernel; devices start at 1.
        let source = SourceId((self.devices.len() + 1) as u8);
        device.attach(binding, source, self.link.as_mut());
        for port in &wanted {
            // Capacity checked above.
            let _ = self.ports_in_use.push(*port);
        }
        debug!(
            "attached device kind {} on port {}",
            device.core().kind() as u8,
            binding.primary().number()
        );
        self.devices.push(device);
        Some(source)
    }

    /// Typed access to an attached device's command surface.
    pub fn device_mut<T: Any>(&mut self, source: SourceId) -> Option<&mut T> {
        let index = (source.index() as usize).checked_sub(1)?;
        self.devices
            .get_mut(index)?
            .as_any_mut()
            .downcast_mut::<T>()
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Open the control loop. No-op unless in `Commence`. The launch
    /// event carries the number of ports in use.
    pub fn launch(&mut self) {
        if self.state != KernelState::Commence {
            return;
        }
        self.state = KernelState::Operate;
        info!("kernel launch, {} ports in use", self.ports_in_use.len());
        self.emit(EventKind::Launch, self.ports_in_use.len() as i16);
    }

    /// Close the control loop for good. No-op unless in `Operate`.
    pub fn terminate(&mut self) {
        if self.state != KernelState::Operate {
            return;
        }
        self.state = KernelState::Terminate;
        info!("kernel terminate");
        // The host gets the record; the queued event is never drained
        // because service passes stop at terminate.
        self.emit(EventKind::Terminate, 0);
    }

    // ── Application API ───────────────────────────────────────

    /// Send a text message to the host. Silent outside `Operate` and for
    /// text over 50 characters.
    pub fn print(&mut self, text: &str) {
        if self.state != KernelState::Operate {
            return;
        }
        self.link.send_text(text);
    }

    /// Send a label plus a decimal value as one text message.
    pub fn print_value(&mut self, label: &str, value: i32) {
        if self.state != KernelState::Operate {
            return;
        }
        self.link.send_text(&format!("{label}{value}"));
    }

    /// Arm the single-shot interval timer. First armed timer wins: calls
    /// while a timer is active are no-ops, as are calls outside
    /// `Operate`.
    pub fn time(&mut self, interval: TimerInterval) {
        if self.state != KernelState::Operate || self.timer.is_some() {
            return;
        }
        self.timer = Some(TimerSlot {
            start_ms: self.clock.now_ms(),
            length_ms: interval as u32,
        });
    }

    // ── Scheduler pass ────────────────────────────────────────

    /// One kernel pass. Call once per control-loop iteration, then drain
    /// [`next_event`](Self::next_event) until empty.
    pub fn service(&mut self) {
        if self.state != KernelState::Operate {
            return;
        }
        let now = self.clock.now_ms();

        self.queue.drain_into(&mut self.app_queue);

        for device in &mut self.devices {
            if device.state_machine_pending() {
                device.run_state_machine(now, self.link.as_mut());
            }
        }
        for device in &mut self.devices {
            device.core_mut().queue_mut().drain_into(&mut self.app_queue);
        }

        self.check_timer(now);
    }

    /// Next aggregated event, or the null event when the application
    /// queue is empty.
    pub fn next_event(&mut self) -> Event {
        self.app_queue.dequeue()
    }

    pub fn has_events(&self) -> bool {
        !self.app_queue.is_empty()
    }

    fn check_timer(&mut self, now: u32) {
        let Some(slot) = &self.timer else { return };
        if now.wrapping_sub(slot.start_ms) <= slot.length_ms {
            return;
        }
        // Sub-second timers report milliseconds, longer ones seconds.
        let report = if slot.length_ms > 999 {
            slot.length_ms / 1000
        } else {
            slot.length_ms
        };
        self.timer = None;
        self.emit(EventKind::TimeUp, report as i16);
    }

    /// Kernel-sourced record to the host plus a queued event.
    fn emit(&mut self, kind: EventKind, first: i16) {
        self.link.send_record(&EventRecord {
            device: DeviceKind::Core,
            port: 0,
            state: self.state as u8,
            event: kind,
            first,
            second: None,
        });
        self.queue.enqueue(Event::new(SourceId::KERNEL, kind, first));
    }

    /// Direct host-link access for devices that transmit inline (IR
    /// emitter commands run in the application context, outside a
    /// service pass).
    pub(crate) fn link_mut(&mut self) -> &mut dyn HostLink {
        self.link.as_mut()
    }
}

// Command helpers that need both a device and the kernel's link borrow
// split through this accessor pair.
impl Kernel {
    /// Run a closure against a typed device together with the host link.
    /// Returns `None` when the token does not resolve to a `T`.
    pub fn with_device<T: Any, R>(
        &mut self,
        source: SourceId,
        f: impl FnOnce(&mut T, &mut dyn HostLink) -> R,
    ) -> Option<R> {
        let index = (source.index() as usize).checked_sub(1)?;
        let device = self.devices.get_mut(index)?;
        let link = self.link.as_mut();
        let typed = device.as_any_mut().downcast_mut::<T>()?;
        Some(f(typed, link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::Clock;
    use crate::host::NullLink;

    struct FixedClock(u32);

    impl Clock for FixedClock {
        fn now_ms(&self) -> u32 {
            self.0
        }
    }

    fn kernel() -> Kernel {
        Kernel::new(Box::new(FixedClock(0)), Box::new(NullLink))
    }

    #[test]
    fn launch_emits_event_on_first_pass() {
        let mut k = kernel();
        k.launch();
        assert_eq!(k.state(), KernelState::Operate);
        k.service();
        let e = k.next_event();
        assert!(e.is_type(EventKind::Launch));
        assert!(e.is_from(SourceId::KERNEL));
        assert_eq!(e.data(0), 0);
    }

    #[test]
    fn launch_twice_is_single_shot() {
        let mut k = kernel();
        k.launch();
        k.launch();
        k.service();
        assert!(k.next_event().is_type(EventKind::Launch));
        assert!(k.next_event().is_type(EventKind::Null));
    }

    #[test]
    fn terminate_stops_service_passes() {
        let mut k = kernel();
        k.launch();
        k.terminate();
        assert_eq!(k.state(), KernelState::Terminate);
        k.service();
        // Nothing drains after terminate, not even the launch event.
        assert!(!k.has_events());
    }

    #[test]
    fn terminate_before_launch_is_rejected() {
        let mut k = kernel();
        k.terminate();
        assert_eq!(k.state(), KernelState::Commence);
    }

    #[test]
    fn timer_is_first_wins_and_scales_report() {
        struct SteppingClock(core::cell::Cell<u32>);
        impl Clock for SteppingClock {
            fn now_ms(&self) -> u32 {
                let t = self.0.get();
                self.0.set(t + 1500);
                t
            }
        }
        let mut k = Kernel::new(
            Box::new(SteppingClock(core::cell::Cell::new(0))),
            Box::new(NullLink),
        );
        k.launch();
        k.time(TimerInterval::OneSec);
        k.time(TimerInterval::TwoMin); // ignored, first wins
        // Clock has advanced past 1000 ms by the second service call.
        k.service();
        k.service();
        let mut kinds = Vec::new();
        while k.has_events() {
            kinds.push(k.next_event());
        }
        let time_up = kinds
            .iter()
            .find(|e| e.is_type(EventKind::TimeUp))
            .expect("timer fired");
        // One second reports as 1, not 1000.
        assert_eq!(time_up.data(0), 1);
    }
}
