//! Multi-channel RC servo control with speed interpolation.
//!
//! One hardware timer multiplexes up to four channels: each interrupt
//! drops the previous channel's pulse, advances the next channel's
//! interpolation, raises its pulse and schedules the following compare.
//! After the last channel the cycle rests so the frame stays at the
//! 20 ms refresh the servos expect.
//!
//! ```text
//!  ch0 ▔▔╲____ ch1 ▔▔▔╲___ ch2 ▔╲____ rest ... (20 ms frame)
//! ```
//!
//! Pulse arithmetic runs in half-microsecond ticks. The interrupt and
//! the polled side share a [`ServoBank`] of atomics; the interrupt
//! flags a finished move and the polled pass turns that into the end
//! event.

use core::any::Any;
use core::sync::atomic::{AtomicBool, AtomicI8, AtomicU16, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::device::{Device, DeviceCore, DeviceKind, PortBinding, STATE_INACTIVE};
use crate::events::{EventKind, SourceId};
use crate::host::HostLink;

/// Channels one timer can multiplex.
pub const MAX_SERVOS: usize = 4;

const MIN_PULSE_US: u32 = 500;
const REFRESH_INTERVAL_US: u32 = 20_000;

/// Compensation for the pin-drive delay inside the interrupt.
const TRIM_TICK: u16 = 1;

const STATE_STOP: u8 = 1;
const STATE_MOVE: u8 = 2;

/// Half-microsecond timer ticks (prescale gives 2 ticks per µs).
const fn us_to_ticks(us: u32) -> u32 {
    us * 2
}

const fn ticks_to_us(ticks: u32) -> u32 {
    ticks / 2
}

/// Angle → pulse width table, 0..=180 mapped onto 500..=2500 µs.
fn pulse_table() -> &'static [u16; 181] {
    static TABLE: OnceLock<[u16; 181]> = OnceLock::new();
    TABLE.get_or_init(|| {
        core::array::from_fn(|i| (MIN_PULSE_US + i as u32 * 11 + i as u32 / 9) as u16)
    })
}

fn angle_to_pulse_us(angle: i16) -> u32 {
    u32::from(pulse_table()[angle as usize])
}

/// Nearest angle for a pulse width, by midpoint between table entries.
fn pulse_us_to_angle(us: u32) -> i16 {
    let table = pulse_table();
    for i in 1..table.len() {
        if us <= u32::from(table[i]) {
            let midpoint = (u32::from(table[i - 1]) + u32::from(table[i])) / 2;
            return if us <= midpoint { i as i16 - 1 } else { i as i16 };
        }
    }
    180
}

fn target_ticks_for(angle: i16) -> u16 {
    (us_to_ticks(angle_to_pulse_us(angle)) as u16) - TRIM_TICK
}

// ── Interrupt-shared state ────────────────────────────────────

/// Per-channel interpolation state, written from both contexts.
struct Channel {
    current_ticks: AtomicU16,
    target_ticks: AtomicU16,
    /// Ticks added per frame; zero disables interpolation.
    speed: AtomicU16,
    initial_ticks: AtomicU16,
    initializing: AtomicBool,
    state: AtomicU8,
    /// A finished move awaiting its end event.
    pending: AtomicBool,
    /// Which end event: increase or decrease.
    end_increase: AtomicBool,
}

impl Channel {
    fn new() -> Self {
        Self {
            current_ticks: AtomicU16::new(0),
            target_ticks: AtomicU16::new(0),
            speed: AtomicU16::new(0),
            initial_ticks: AtomicU16::new(0),
            initializing: AtomicBool::new(false),
            state: AtomicU8::new(STATE_STOP),
            pending: AtomicBool::new(false),
            end_increase: AtomicBool::new(false),
        }
    }

    /// One frame of interpolation. Runs in the interrupt.
    fn advance(&self) {
        let speed = self.speed.load(Ordering::Relaxed);
        if speed == 0 {
            return;
        }
        let current = self.current_ticks.load(Ordering::Relaxed);
        let target = self.target_ticks.load(Ordering::Relaxed);
        if self.state.load(Ordering::Relaxed) == STATE_STOP {
            // Paused mid-move: report where it stopped, once.
            self.speed.store(0, Ordering::Relaxed);
            if current != target {
                self.end_increase.store(current < target, Ordering::Relaxed);
                self.pending.store(true, Ordering::Release);
            }
        } else if current < target {
            let next = current.saturating_add(speed);
            if next >= target {
                self.finish(target, true);
            } else {
                self.current_ticks.store(next, Ordering::Relaxed);
            }
        } else {
            let next = current.saturating_sub(speed);
            if next <= target {
                self.finish(target, false);
            } else {
                self.current_ticks.store(next, Ordering::Relaxed);
            }
        }
    }

    fn finish(&self, target: u16, increase: bool) {
        self.current_ticks.store(target, Ordering::Relaxed);
        self.speed.store(0, Ordering::Relaxed);
        self.state.store(STATE_STOP, Ordering::Relaxed);
        self.end_increase.store(increase, Ordering::Relaxed);
        self.pending.store(true, Ordering::Release);
    }
}

/// Pulse pin fan-out, implemented by the platform glue (and by test
/// recorders).
pub trait ServoPins {
    fn set_high(&mut self, channel: usize);
    fn set_low(&mut self, channel: usize);
}

/// Shared state for every channel plus the cycle cursor.
pub struct ServoBank {
    channels: [Channel; MAX_SERVOS],
    /// Channel currently pulsing; -1 is the rest slot.
    cursor: AtomicI8,
    /// Channels allocated so far; the cycle covers 0..count.
    count: AtomicUsize,
    /// Ticks consumed since the frame began.
    frame_elapsed: AtomicU32,
}

impl ServoBank {
    pub fn new() -> Self {
        Self {
            channels: core::array::from_fn(|_| Channel::new()),
            cursor: AtomicI8::new(-1),
            count: AtomicUsize::new(0),
            frame_elapsed: AtomicU32::new(0),
        }
    }

    /// Claim the next channel slot, or `None` when all four are taken.
    pub fn allocate(&self) -> Option<usize> {
        let index = self.count.load(Ordering::Relaxed);
        if index >= MAX_SERVOS {
            return None;
        }
        self.count.store(index + 1, Ordering::Release);
        Some(index)
    }

    /// One compare interrupt: drop the finished pulse, start the next,
    /// return the tick delay until the next compare.
    pub fn isr_fire(&self, pins: &mut dyn ServoPins) -> u32 {
        let count = self.count.load(Ordering::Acquire);
        let cursor = self.cursor.load(Ordering::Relaxed);
        if cursor >= 0 && (cursor as usize) < count {
            pins.set_low(cursor as usize);
        }

        let next = cursor + 1;
        if (next as usize) < count {
            self.cursor.store(next, Ordering::Relaxed);
            let channel = &self.channels[next as usize];
            channel.advance();

            let delay = if channel.initializing.swap(false, Ordering::Relaxed) {
                // Jump straight to the requested position.
                let initial = channel.initial_ticks.load(Ordering::Relaxed);
                channel.current_ticks.store(initial, Ordering::Relaxed);
                u32::from(initial)
            } else {
                u32::from(channel.current_ticks.load(Ordering::Relaxed))
            };
            pins.set_high(next as usize);
            self.frame_elapsed.fetch_add(delay, Ordering::Relaxed);
            delay
        } else {
            // Rest until the 20 ms frame completes.
            self.cursor.store(-1, Ordering::Relaxed);
            let elapsed = self.frame_elapsed.swap(0, Ordering::Relaxed);
            us_to_ticks(REFRESH_INTERVAL_US).saturating_sub(elapsed)
        }
    }
}

impl Default for ServoBank {
    fn default() -> Self {
        Self::new()
    }
}

// ── Device ────────────────────────────────────────────────────

/// One servo on a bank channel.
///
/// Unlike the sensors, a servo attaches deactivated: activation takes
/// the initial angle to snap to, and deactivation parks at a final
/// angle before pulsing stops mattering.
pub struct Servo {
    core: DeviceCore,
    bank: Arc<ServoBank>,
    index: usize,
    speed_ticks: u16,
}

impl Servo {
    /// `index` comes from [`ServoBank::allocate`].
    pub fn new(bank: Arc<ServoBank>, index: usize) -> Self {
        Self {
            core: DeviceCore::new(DeviceKind::Servo),
            bank,
            index,
            speed_ticks: 0,
        }
    }

    fn channel(&self) -> &Channel {
        &self.bank.channels[self.index]
    }

    /// Start pulsing, snapping to `initial_angle` on the first frame.
    pub fn activate_at(&mut self, initial_angle: i16, link: &mut dyn HostLink) {
        if self.core.is_active() || !(0..=180).contains(&initial_angle) {
            return;
        }
        self.core.set_active(true);
        self.core.set_state(STATE_STOP);
        self.core.emit2(EventKind::Activate, 1, initial_angle, link);

        let channel = self.channel();
        channel
            .initial_ticks
            .store(us_to_ticks(angle_to_pulse_us(initial_angle)) as u16, Ordering::Relaxed);
        channel.initializing.store(true, Ordering::Release);
    }

    /// Park at `final_angle` and stop responding to commands.
    pub fn deactivate_at(&mut self, final_angle: i16, link: &mut dyn HostLink) {
        if !self.core.is_active() || !(0..=180).contains(&final_angle) {
            return;
        }
        self.core.set_active(false);
        self.core.set_state(STATE_INACTIVE);
        self.core.emit2(EventKind::Deactivate, 0, final_angle, link);

        let channel = self.channel();
        channel.speed.store(0, Ordering::Relaxed);
        channel.state.store(STATE_STOP, Ordering::Relaxed);
        channel
            .initial_ticks
            .store(us_to_ticks(angle_to_pulse_us(final_angle)) as u16, Ordering::Relaxed);
        channel.initializing.store(true, Ordering::Release);
    }

    /// Begin a speed-controlled move. Angle 0..=180, speed 1..=10.
    /// Ignored while a move is in flight or when already at the target.
    pub fn rotate(&mut self, final_angle: i16, speed: i16, link: &mut dyn HostLink) {
        if !self.core.is_active()
            || !(0..=180).contains(&final_angle)
            || !(1..=10).contains(&speed)
        {
            return;
        }
        // Speed steps 1..=10 map to 4..=103 ticks per frame.
        let speed_ticks = (speed * 11 - 7) as u16;
        let target = target_ticks_for(final_angle);
        let channel = self.channel();
        if channel.state.load(Ordering::Acquire) != STATE_STOP {
            return;
        }
        if target == channel.target_ticks.load(Ordering::Relaxed) {
            return; // already there
        }
        channel.target_ticks.store(target, Ordering::Relaxed);
        channel.speed.store(speed_ticks, Ordering::Relaxed);
        channel.state.store(STATE_MOVE, Ordering::Release);
        self.speed_ticks = speed_ticks;

        self.core.set_state(STATE_MOVE);
        self.core
            .emit2(EventKind::ServoMoveBegin, final_angle, speed, link);
    }

    /// Freeze the move where it is. The end event comes from the next
    /// frame, reporting the angle actually reached.
    pub fn pause(&mut self) {
        if !self.core.is_active() {
            return;
        }
        let channel = self.channel();
        if channel.state.load(Ordering::Acquire) == STATE_MOVE {
            channel.state.store(STATE_STOP, Ordering::Release);
        }
    }

    /// Continue a paused move toward its original target at the
    /// original speed.
    pub fn resume(&mut self, link: &mut dyn HostLink) {
        if !self.core.is_active() {
            return;
        }
        let channel = self.channel();
        if channel.state.load(Ordering::Acquire) != STATE_STOP {
            return;
        }
        let current = channel.current_ticks.load(Ordering::Relaxed);
        let target = channel.target_ticks.load(Ordering::Relaxed);
        if current == target {
            return; // already there
        }
        channel.speed.store(self.speed_ticks, Ordering::Relaxed);
        channel.state.store(STATE_MOVE, Ordering::Release);

        let angle = pulse_us_to_angle(ticks_to_us(u32::from(target)));
        self.core.set_state(STATE_MOVE);
        self.core.emit2(
            EventKind::ServoMoveBegin,
            angle,
            (self.speed_ticks as i16 + 7) / 11,
            link,
        );
    }

    /// Angle the pulse currently commands.
    pub fn angle(&self) -> i16 {
        pulse_us_to_angle(ticks_to_us(u32::from(
            self.channel().current_ticks.load(Ordering::Relaxed),
        )))
    }
}

impl Device for Servo {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn attach(&mut self, binding: PortBinding, source: SourceId, link: &mut dyn HostLink) {
        self.core.bind(binding, source);
        self.channel().state.store(STATE_STOP, Ordering::Relaxed);
        // Servos start deactivated; activation needs an initial angle.
        self.core.set_state(STATE_INACTIVE);
        self.core.emit2(EventKind::Deactivate, 0, 0, link);
    }

    fn activate(&mut self, link: &mut dyn HostLink) {
        // Default to centre when no initial angle is given.
        self.activate_at(90, link);
    }

    fn deactivate(&mut self, link: &mut dyn HostLink) {
        self.deactivate_at(90, link);
    }

    /// Move completion is flagged by the interrupt.
    fn state_machine_pending(&self) -> bool {
        self.channel().pending.load(Ordering::Acquire)
    }

    fn run_state_machine(&mut self, _now_ms: u32, link: &mut dyn HostLink) {
        let channel = self.channel();
        if !channel.pending.swap(false, Ordering::AcqRel) {
            return;
        }
        let kind = if channel.end_increase.load(Ordering::Relaxed) {
            EventKind::ServoIncreaseEnd
        } else {
            EventKind::ServoDecreaseEnd
        };
        let angle = pulse_us_to_angle(ticks_to_us(u32::from(
            channel.current_ticks.load(Ordering::Relaxed),
        )));
        self.core.set_state(STATE_STOP);
        self.core.emit2(kind, angle, 0, link);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── ESP-IDF pulse timer ───────────────────────────────────────

#[cfg(target_os = "espidf")]
pub mod pulse {
    //! One-shot esp_timer rearmed from its own callback with the delay
    //! the bank computes.

    use std::sync::Arc;

    use esp_idf_svc::sys as sys;

    use super::{ServoBank, ServoPins, MAX_SERVOS};
    use crate::error::{Error, Result};

    pub struct GpioServoPins {
        pub pins: [i32; MAX_SERVOS],
    }

    impl ServoPins for GpioServoPins {
        fn set_high(&mut self, channel: usize) {
            // SAFETY: pins configured as outputs at boot.
            unsafe {
                sys::gpio_set_level(self.pins[channel], 1);
            }
        }

        fn set_low(&mut self, channel: usize) {
            // SAFETY: pins configured as outputs at boot.
            unsafe {
                sys::gpio_set_level(self.pins[channel], 0);
            }
        }
    }

    pub struct ServoTimer {
        handle: sys::esp_timer_handle_t,
        _ctx: Box<Ctx>,
    }

    struct Ctx {
        bank: Arc<ServoBank>,
        pins: GpioServoPins,
        handle: sys::esp_timer_handle_t,
    }

    unsafe extern "C" fn fire(arg: *mut core::ffi::c_void) {
        // SAFETY: arg is the Ctx box owned by ServoTimer, alive until
        // the timer is deleted.
        let ctx = unsafe { &mut *arg.cast::<Ctx>() };
        let delay_ticks = ctx.bank.isr_fire(&mut ctx.pins);
        // SAFETY: rearming our own one-shot handle from the callback.
        unsafe {
            sys::esp_timer_start_once(ctx.handle, u64::from(delay_ticks) / 2);
        }
    }

    impl ServoTimer {
        pub fn start(bank: Arc<ServoBank>, pins: GpioServoPins) -> Result<Self> {
            let mut ctx = Box::new(Ctx {
                bank,
                pins,
                handle: core::ptr::null_mut(),
            });
            let args = sys::esp_timer_create_args_t {
                callback: Some(fire),
                arg: (&mut *ctx as *mut Ctx).cast(),
                dispatch_method: sys::esp_timer_dispatch_t_ESP_TIMER_ISR,
                name: c"servo".as_ptr(),
                skip_unhandled_events: false,
            };
            let mut handle: sys::esp_timer_handle_t = core::ptr::null_mut();
            // SAFETY: args outlives the create call; handle is written
            // before use.
            unsafe {
                if sys::esp_timer_create(&args, &mut handle) != sys::ESP_OK {
                    return Err(Error::Init("servo timer create failed"));
                }
            }
            ctx.handle = handle;
            // First fire after one frame.
            // SAFETY: handle was just created.
            unsafe {
                if sys::esp_timer_start_once(handle, 20_000) != sys::ESP_OK {
                    return Err(Error::Init("servo timer start failed"));
                }
            }
            Ok(Self { handle, _ctx: ctx })
        }
    }

    impl Drop for ServoTimer {
        fn drop(&mut self) {
            // SAFETY: handle was created in `start`.
            unsafe {
                sys::esp_timer_stop(self.handle);
                sys::esp_timer_delete(self.handle);
            }
        }
    }
}
