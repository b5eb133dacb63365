//! Infrared transmitter.
//!
//! Emission is blocking by design: the NEC burst is ~70 ms of
//! microsecond-precise mark/space timing, driven inline through the
//! carrier port. On this board the emitter shares its timer with the
//! receive sampler, so the transmitter attaches deactivated and turning
//! it on takes the receiver out of service until the receiver is
//! reactivated.

use core::any::Any;

use crate::device::{Device, DeviceCore, DeviceKind, PortBinding, STATE_INACTIVE};
use crate::events::{EventKind, SourceId};
use crate::hal::CarrierOutput;
use crate::host::HostLink;

use super::{
    MESSAGE_BITS, NEC_BIT_MARK_US, NEC_HDR_MARK_US, NEC_HDR_SPACE_US, NEC_ONE_SPACE_US,
    NEC_ZERO_SPACE_US,
};

const STATE_ACTIVE: u8 = 1;

pub struct IrTransmitter {
    core: DeviceCore,
    output: Box<dyn CarrierOutput>,
}

impl IrTransmitter {
    pub fn new(output: Box<dyn CarrierOutput>) -> Self {
        Self {
            core: DeviceCore::new(DeviceKind::IrTransmitter),
            output,
        }
    }

    /// Send one modified NEC burst: 16-bit address in the high half,
    /// 16-bit value in the low, MSB first. Blocks for the duration.
    pub fn emit(&mut self, value: i16, address: i16, link: &mut dyn HostLink) {
        if self.core.state() != STATE_ACTIVE {
            return;
        }
        let data = (u32::from(address as u16) << 16) | u32::from(value as u16);

        self.output.mark(NEC_HDR_MARK_US as u32);
        self.output.space(NEC_HDR_SPACE_US as u32);
        for i in (0..MESSAGE_BITS).rev() {
            self.output.mark(NEC_BIT_MARK_US as u32);
            if data >> i & 1 == 1 {
                self.output.space(NEC_ONE_SPACE_US as u32);
            } else {
                self.output.space(NEC_ZERO_SPACE_US as u32);
            }
        }
        // Trailing mark closes the last bit; zero-length space just
        // drops the carrier.
        self.output.mark(NEC_BIT_MARK_US as u32);
        self.output.space(0);

        self.core
            .emit2(EventKind::IrMessageEmit, value, address, link);
    }
}

impl Device for IrTransmitter {
    fn core(&self) -> &DeviceCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut DeviceCore {
        &mut self.core
    }

    fn attach(&mut self, binding: PortBinding, source: SourceId, link: &mut dyn HostLink) {
        self.core.bind(binding, source);
        // Starts deactivated; activating claims the shared IR timer.
        self.core.set_state(STATE_INACTIVE);
        self.core.emit2(EventKind::Deactivate, 0, 0, link);
    }

    fn activate(&mut self, link: &mut dyn HostLink) {
        if self.core.is_active() {
            return;
        }
        self.core.set_active(true);
        self.core.set_state(STATE_ACTIVE);
        self.core.emit2(EventKind::Activate, 1, 0, link);
    }

    fn deactivate(&mut self, link: &mut dyn HostLink) {
        if !self.core.is_active() {
            return;
        }
        self.core.set_active(false);
        self.core.set_state(STATE_INACTIVE);
        self.core.emit2(EventKind::Deactivate, 0, 0, link);
    }

    // Emission is command-driven, nothing to poll.
    fn run_state_machine(&mut self, _now_ms: u32, _link: &mut dyn HostLink) {}

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
