//! Infrared receiver: interrupt-side capture plus polled decoding.
//!
//! A periodic 50 µs interrupt samples the detector line (active low)
//! and records mark/space durations in ticks. When a post-burst gap is
//! seen the capture parks in `Stop` and the polled side decodes the
//! buffer, first as modified NEC, then as RC5. The two contexts share
//! an [`IrCapture`] through atomics only; the interrupt never touches a
//! queue.

use core::any::Any;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use log::trace;

use crate::device::{Device, DeviceCore, DeviceKind, PortBinding, STATE_INACTIVE};
use crate::events::{EventKind, SourceId};
use crate::host::HostLink;

use super::{
    interval_matches, GAP_TICKS, MARK_EXCESS_US, MESSAGE_BITS, NEC_BIT_MARK_US, NEC_HDR_MARK_US,
    NEC_HDR_SPACE_US, NEC_ONE_SPACE_US, NEC_ZERO_SPACE_US, RC5_T1_US,
};

/// Capture buffer length; anything longer overflows into a failed
/// decode.
pub const MAX_RAW_SAMPLES: usize = 100;

/// Fewest duration entries a plausible RC5 burst produces.
const MIN_RC5_SAMPLES: usize = 11;

// Capture states.
const CAPTURE_IDLE: u8 = 1;
const CAPTURE_MARK: u8 = 2;
const CAPTURE_SPACE: u8 = 3;
const CAPTURE_STOP: u8 = 4;

/// Interrupt-side capture state, shared with the polled decoder.
///
/// Single producer (the sampling interrupt), single consumer (the
/// kernel pass). The producer only writes buffer cells below `index`
/// before publishing `Stop` with release ordering; the consumer reads
/// them after an acquire load of the state, so the durations are
/// visible by the time decoding starts.
pub struct IrCapture {
    state: AtomicU8,
    ticks: AtomicU32,
    index: AtomicUsize,
    raw: [AtomicU16; MAX_RAW_SAMPLES],
    pending: AtomicBool,
}

impl IrCapture {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(CAPTURE_IDLE),
            ticks: AtomicU32::new(0),
            index: AtomicUsize::new(0),
            raw: core::array::from_fn(|_| AtomicU16::new(0)),
            pending: AtomicBool::new(false),
        }
    }

    fn capture_state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    fn set_state(&self, state: u8) {
        self.state.store(state, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    fn push(&self, ticks: u32) {
        let index = self.index.load(Ordering::Relaxed);
        if index < MAX_RAW_SAMPLES {
            self.raw[index].store(ticks.min(u32::from(u16::MAX)) as u16, Ordering::Relaxed);
            self.index.store(index + 1, Ordering::Relaxed);
        }
    }

    /// One 50 µs sample from the interrupt. `mark` is true while the
    /// detector sees carrier (line low).
    pub fn on_sample(&self, mark: bool) {
        // Wraps: in a long idle stretch nothing resets the counter, and
        // an overflow panic inside the interrupt is not an option.
        let tick = self.ticks.load(Ordering::Relaxed).wrapping_add(1);
        self.ticks.store(tick, Ordering::Relaxed);

        let mut state = self.capture_state();
        if self.index.load(Ordering::Relaxed) >= MAX_RAW_SAMPLES {
            // Overflow: the truncated buffer will fail to decode.
            self.index.store(0, Ordering::Relaxed);
            self.set_state(CAPTURE_STOP);
            state = CAPTURE_STOP;
        }

        match state {
            CAPTURE_IDLE => {
                if mark {
                    if tick < GAP_TICKS {
                        // Quiet run too short to be a gap.
                        self.ticks.store(0, Ordering::Relaxed);
                    } else {
                        // Gap just ended; record it and start timing.
                        self.index.store(0, Ordering::Relaxed);
                        self.push(tick);
                        self.set_state(CAPTURE_MARK);
                        self.ticks.store(0, Ordering::Relaxed);
                    }
                }
            }
            CAPTURE_MARK => {
                if !mark {
                    self.push(tick);
                    self.set_state(CAPTURE_SPACE);
                    self.ticks.store(0, Ordering::Relaxed);
                }
            }
            CAPTURE_SPACE => {
                if mark {
                    self.push(tick);
                    self.set_state(CAPTURE_MARK);
                    self.ticks.store(0, Ordering::Relaxed);
                } else {
                    if tick > GAP_TICKS {
                        // Long space: the burst is over, ready to decode.
                        self.set_state(CAPTURE_STOP);
                    }
                    self.pending.store(true, Ordering::Release);
                }
            }
            CAPTURE_STOP => {
                if mark {
                    self.ticks.store(0, Ordering::Relaxed);
                }
            }
            _ => {}
        }
    }

    /// Copy the recorded durations out. Only meaningful in `Stop`.
    fn snapshot(&self, out: &mut [u16; MAX_RAW_SAMPLES]) -> usize {
        let len = self.index.load(Ordering::Relaxed).min(MAX_RAW_SAMPLES);
        for (slot, cell) in out.iter_mut().zip(&self.raw[..len]) {
            *slot = cell.load(Ordering::Relaxed);
        }
        len
    }

    /// Return to listening for the next burst.
    fn rearm(&self) {
        self.index.store(0, Ordering::Relaxed);
        self.pending.store(false, Ordering::Relaxed);
        self.set_state(CAPTURE_IDLE);
    }

    fn park(&self, state: u8) {
        self.ticks.store(0, Ordering::Relaxed);
        self.index.store(0, Ordering::Relaxed);
        self.pending.store(false, Ordering::Relaxed);
        self.set_state(state);
    }
}

impl Default for IrCapture {
    fn default() -> Self {
        Self::new()
    }
}

// ── Decoders ──────────────────────────────────────────────────

/// Decode a modified NEC burst: header mark and space, then 32 bits MSB
/// first, each a fixed mark followed by a length-coded space.
/// `raw[0]` is the leading gap and is skipped.
pub fn decode_nec(raw: &[u16]) -> Option<u32> {
    if raw.len() < 2 * MESSAGE_BITS as usize + 4 {
        return None;
    }
    let mut index = 1;
    if !interval_matches(raw[index], NEC_HDR_MARK_US + MARK_EXCESS_US) {
        return None;
    }
    index += 1;
    if !interval_matches(raw[index], NEC_HDR_SPACE_US - MARK_EXCESS_US) {
        return None;
    }
    index += 1;
    let mut data: u32 = 0;
    for _ in 0..MESSAGE_BITS {
        if !interval_matches(raw[index], NEC_BIT_MARK_US + MARK_EXCESS_US) {
            return None;
        }
        index += 1;
        if interval_matches(raw[index], NEC_ONE_SPACE_US - MARK_EXCESS_US) {
            data = (data << 1) | 1;
        } else if interval_matches(raw[index], NEC_ZERO_SPACE_US - MARK_EXCESS_US) {
            data <<= 1;
        } else {
            return None;
        }
        index += 1;
    }
    Some(data)
}

/// Reader for RC5's Manchester halves: consumes `t1`-width levels from
/// the duration buffer, where each recorded duration may span one, two
/// or three half-bits.
struct Rc5Cursor<'a> {
    raw: &'a [u16],
    offset: usize,
    used: usize,
}

/// Line level during one RC5 half-bit.
#[derive(PartialEq, Eq, Clone, Copy)]
enum Rc5Level {
    Mark,
    Space,
}

impl Rc5Cursor<'_> {
    fn next_level(&mut self) -> Option<Rc5Level> {
        if self.offset >= self.raw.len() {
            // Past the recorded buffer the line is quiet.
            return Some(Rc5Level::Space);
        }
        let width = self.raw[self.offset];
        // Odd entries are marks: entry 0 is the leading gap.
        let (level, correction) = if self.offset % 2 == 1 {
            (Rc5Level::Mark, MARK_EXCESS_US)
        } else {
            (Rc5Level::Space, -MARK_EXCESS_US)
        };
        let avail = if interval_matches(width, RC5_T1_US + correction) {
            1
        } else if interval_matches(width, 2 * RC5_T1_US + correction) {
            2
        } else if interval_matches(width, 3 * RC5_T1_US + correction) {
            3
        } else {
            return None;
        };
        self.used += 1;
        if self.used >= avail {
            self.used = 0;
            self.offset += 1;
        }
        Some(level)
    }
}

/// Decode an RC5 burst: three starter half-bits, then Manchester pairs
/// (space-mark is a one, mark-space a zero).
pub fn decode_rc5(raw: &[u16]) -> Option<u32> {
    if raw.len() < MIN_RC5_SAMPLES + 2 {
        return None;
    }
    let mut cursor = Rc5Cursor {
        raw,
        offset: 1, // skip the leading gap
        used: 0,
    };
    if cursor.next_level()? != Rc5Level::Mark {
        return None;
    }
    if cursor.next_level()? != Rc5Level::Space {
        return None;
    }
    if cursor.next_level()? != Rc5Level::Mark {
        return None;
    }
    let mut data: u32 = 0;
    while cursor.offset < raw.len() {
        let a = cursor.next_level()?;
        let b = cursor.next_level()?;
        data = match (a, b) {
            (Rc5Level::Space, Rc5Level::Mark) => (data << 1) | 1,
            (Rc5Level::Mark, Rc5Level::Space) => data << 1,
            _ => return None,
        };
    }
    Some(data)
}

// ── Device ────────────────────────────────────────────────────

/// The IR receiver device. The capture half is shared with the
/// sampling interrupt through an [`Arc`].
pub struct IrReceiver {
    core: DeviceCore,
    capture: Arc<IrCapture>,
    value: i16,
    address: i16,
}

impl IrReceiver {
    pub fn new(capture: Arc<IrCapture>) -> Self {
        Self {
            core: DeviceCore::new(DeviceKind::IrReceiver),
            capture,
            value: 0,
            address: 0,
        }
    }

    /// Value half of the last decoded message.
    pub fn value(&self) -> i16 {
        self.value
    }

    /// Address half of the last decoded message.
    pub fn address(&self) -> i16 {
        self.address
    }

    fn report(&mut self, data: u32, link: &mut dyn HostLink) {
        let value = data as u16 as i16;
        let address = (data >> 16) as u16 as i16;
        if value == self.value && address == self.address {
            self.core
                .emit2(EventKind::IrMessageRepeat, value, address, link);
        } else {
            self.value = value;
            self.address = address;
            self.core
                .emit2(EventKind::IrMessageReceive, value, address, link);
        }
    }
}

impl Device for IrReceiver {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn attach(&mut self, binding: PortBinding, source: SourceId, link: &mut dyn HostLink) {
        self.core.bind(binding, source);
        self.value = 0;
        self.address = 0;
        self.activate(link);
    }

    fn activate(&mut self, link: &mut dyn HostLink) {
        if self.core.is_active() {
            return;
        }
        self.core.set_active(true);
        self.core.set_state(CAPTURE_IDLE);
        self.capture.park(CAPTURE_IDLE);
        self.core.emit2(EventKind::Activate, 1, 0, link);
    }

    fn deactivate(&mut self, link: &mut dyn HostLink) {
        if !self.core.is_active() {
            return;
        }
        self.core.set_active(false);
        self.core.set_state(STATE_INACTIVE);
        self.capture.park(STATE_INACTIVE);
        self.core.emit2(EventKind::Deactivate, 0, 0, link);
    }

    /// Decoding is demand-driven by the interrupt side.
    fn state_machine_pending(&self) -> bool {
        self.capture.is_pending()
    }

    fn run_state_machine(&mut self, _now_ms: u32, link: &mut dyn HostLink) {
        if !self.core.is_active() || self.capture.capture_state() != CAPTURE_STOP {
            return;
        }
        let mut raw = [0u16; MAX_RAW_SAMPLES];
        let len = self.capture.snapshot(&mut raw);
        let raw = &raw[..len];
        match decode_nec(raw).or_else(|| decode_rc5(raw)) {
            Some(data) => self.report(data, link),
            // Undecodable burst, likely interference. Drop it.
            None => trace!("ir burst of {len} samples failed to decode"),
        }
        self.capture.rearm();
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ── ESP-IDF sampling timer ────────────────────────────────────

#[cfg(target_os = "espidf")]
pub mod sampler {
    //! Periodic 50 µs esp_timer that feeds an [`IrCapture`].

    use std::sync::Arc;

    use esp_idf_svc::sys as sys;

    use super::IrCapture;
    use crate::error::{Error, Result};
    use crate::ir::USEC_PER_TICK;

    pub struct IrSampler {
        handle: sys::esp_timer_handle_t,
        // Keeps the callback context alive for the timer's lifetime.
        _ctx: Box<Ctx>,
    }

    struct Ctx {
        capture: Arc<IrCapture>,
        pin: i32,
    }

    unsafe extern "C" fn tick(arg: *mut core::ffi::c_void) {
        // SAFETY: arg is the Ctx box owned by IrSampler, alive until
        // the timer is deleted.
        let ctx = unsafe { &*arg.cast::<Ctx>() };
        // Detector is active low: low level means carrier.
        let mark = unsafe { sys::gpio_get_level(ctx.pin) } == 0;
        ctx.capture.on_sample(mark);
    }

    impl IrSampler {
        pub fn start(capture: Arc<IrCapture>, pin: i32) -> Result<Self> {
            let mut ctx = Box::new(Ctx { capture, pin });
            let args = sys::esp_timer_create_args_t {
                callback: Some(tick),
                arg: (&mut *ctx as *mut Ctx).cast(),
                dispatch_method: sys::esp_timer_dispatch_t_ESP_TIMER_ISR,
                name: c"ir-rx".as_ptr(),
                skip_unhandled_events: true,
            };
            let mut handle: sys::esp_timer_handle_t = core::ptr::null_mut();
            // SAFETY: args outlives the create call; handle is written
            // before use.
            unsafe {
                if sys::esp_timer_create(&args, &mut handle) != sys::ESP_OK {
                    return Err(Error::Init("ir sample timer create failed"));
                }
                if sys::esp_timer_start_periodic(handle, u64::from(USEC_PER_TICK)) != sys::ESP_OK {
                    return Err(Error::Init("ir sample timer start failed"));
                }
            }
            Ok(Self { handle, _ctx: ctx })
        }
    }

    impl Drop for IrSampler {
        fn drop(&mut self) {
            // SAFETY: handle was created in `start`.
            unsafe {
                sys::esp_timer_stop(self.handle);
                sys::esp_timer_delete(self.handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: u16 = 18; // ~889 us in 50 us ticks

    fn nec_raw(data: u32) -> Vec<u16> {
        let mut raw = vec![200, 180, 88];
        for i in (0..32).rev() {
            raw.push(11);
            raw.push(if data >> i & 1 == 1 { 34 } else { 11 });
        }
        raw.push(11);
        raw
    }

    #[test]
    fn nec_decodes_msb_first() {
        let data = 0x5678_1234;
        assert_eq!(decode_nec(&nec_raw(data)), Some(data));
    }

    #[test]
    fn nec_rejects_short_and_corrupt() {
        assert_eq!(decode_nec(&[200, 180, 88]), None);
        let mut raw = nec_raw(0x1234_5678);
        raw[1] = 50; // ruin the header mark
        assert_eq!(decode_nec(&raw), None);
        let mut raw = nec_raw(0x1234_5678);
        raw[4] = 60; // first bit space in neither window
        assert_eq!(decode_nec(&raw), None);
    }

    fn rc5_raw(bits: &[u8]) -> Vec<u16> {
        // Emit half-bit levels, then run-length encode into durations.
        // Starter: mark, space, mark; then space-mark for 1, mark-space
        // for 0.
        let mut halves = vec![true, false, true];
        for &b in bits {
            if b == 1 {
                halves.extend([false, true]);
            } else {
                halves.extend([true, false]);
            }
        }
        let mut raw = vec![200u16];
        let mut run = 1u16;
        for w in 1..halves.len() {
            if halves[w] == halves[w - 1] {
                run += 1;
            } else {
                raw.push(run * T);
                run = 1;
            }
        }
        raw.push(run * T);
        raw
    }

    #[test]
    fn rc5_decodes_manchester_pairs() {
        let bits = [1, 0, 1, 1, 0, 0, 1, 0, 1, 1];
        let raw = rc5_raw(&bits);
        let expected = bits.iter().fold(0u32, |acc, &b| (acc << 1) | u32::from(b));
        assert_eq!(decode_rc5(&raw), Some(expected));
    }

    #[test]
    fn rc5_rejects_bad_starter() {
        // Starter space doubled: mark, 2x space breaks the second
        // half-bit expectation into an invalid pair downstream.
        let raw = vec![200u16, T, 5 * T, T, T, T, T, T, T, T, T, T, T];
        assert_eq!(decode_rc5(&raw), None);
    }

    #[test]
    fn capture_records_burst_and_parks_in_stop() {
        let cap = IrCapture::new();
        // Leading quiet long enough to count as a gap.
        for _ in 0..150 {
            cap.on_sample(false);
        }
        // A mark of 4 ticks, space of 3, mark of 2.
        for _ in 0..4 {
            cap.on_sample(true);
        }
        for _ in 0..3 {
            cap.on_sample(false);
        }
        for _ in 0..2 {
            cap.on_sample(true);
        }
        // Trailing quiet beyond the gap threshold.
        for _ in 0..GAP_TICKS + 2 {
            cap.on_sample(false);
        }
        assert!(cap.is_pending());
        assert_eq!(cap.capture_state(), CAPTURE_STOP);
        let mut out = [0u16; MAX_RAW_SAMPLES];
        let len = cap.snapshot(&mut out);
        assert_eq!(len, 4);
        assert_eq!(&out[1..4], &[4, 3, 2]);
        cap.rearm();
        assert!(!cap.is_pending());
        assert_eq!(cap.capture_state(), CAPTURE_IDLE);
    }

    #[test]
    fn short_quiet_does_not_start_capture() {
        let cap = IrCapture::new();
        for _ in 0..10 {
            cap.on_sample(false);
        }
        cap.on_sample(true);
        // Quiet run was under GAP_TICKS, still idle.
        assert_eq!(cap.capture_state(), CAPTURE_IDLE);
    }

    #[test]
    fn tick_counter_wraps_after_long_idle() {
        // Days of quiet line leave the counter at the top of its range;
        // the next sample must wrap, not panic.
        let cap = IrCapture::new();
        cap.ticks.store(u32::MAX, Ordering::Relaxed);
        cap.on_sample(false);
        assert_eq!(cap.capture_state(), CAPTURE_IDLE);
        // The wrapped count reads as a fresh (short) quiet run.
        cap.on_sample(true);
        assert_eq!(cap.capture_state(), CAPTURE_IDLE);
    }
}
