//! Host notification link.
//!
//! Two frame types travel over the serial line to the companion app:
//!
//! ```text
//! event record   F0 01 <kind> <port> <len> <state> <event> <d0.lo> <d0.hi> [<d1.lo> <d1.hi>] FF
//! text message   F1 <len> <utf-8 bytes, len ≤ 50> FF
//! ```
//!
//! `len` in an event record counts the payload between it and the end
//! marker: 4 for a one-field record, 6 for two fields. These bytes are a
//! wire contract with the host tooling; the encoders here are the single
//! source of truth for it.

use heapless::Vec;

use crate::device::DeviceKind;
use crate::events::EventKind;

/// Longest printable text payload.
pub const MAX_TEXT_LEN: usize = 50;

const RECORD_BEGIN: u8 = 0xF0;
const TEXT_BEGIN: u8 = 0xF1;
const END_MARKER: u8 = 0xFF;

/// Largest encoded frame: text begin + len + 50 bytes + end.
pub const MAX_FRAME_LEN: usize = MAX_TEXT_LEN + 3;

/// One encoded frame, ready for the wire.
pub type Frame = Vec<u8, MAX_FRAME_LEN>;

/// A device lifecycle or occurrence notification bound for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub device: DeviceKind,
    pub port: u8,
    pub state: u8,
    pub event: EventKind,
    pub first: i16,
    /// Second data field; `None` selects the short frame layout.
    pub second: Option<i16>,
}

impl EventRecord {
    pub fn encode(&self) -> Frame {
        let mut frame = Frame::new();
        let msg_len: u8 = if self.second.is_some() { 6 } else { 4 };
        // Infallible: worst case is 12 bytes, well under MAX_FRAME_LEN.
        let _ = frame.push(RECORD_BEGIN);
        let _ = frame.push(0x01); // record count, always one per frame
        let _ = frame.push(self.device as u8);
        let _ = frame.push(self.port);
        let _ = frame.push(msg_len);
        let _ = frame.push(self.state);
        let _ = frame.push(self.event as u8);
        let _ = frame.push(self.first as u8);
        let _ = frame.push((self.first >> 8) as u8);
        if let Some(second) = self.second {
            let _ = frame.push(second as u8);
            let _ = frame.push((second >> 8) as u8);
        }
        let _ = frame.push(END_MARKER);
        frame
    }
}

/// Encode a text frame, or `None` when the text exceeds [`MAX_TEXT_LEN`]
/// (over-long prints are rejected whole, never truncated).
pub fn encode_text(text: &str) -> Option<Frame> {
    if text.len() > MAX_TEXT_LEN {
        return None;
    }
    let mut frame = Frame::new();
    let _ = frame.push(TEXT_BEGIN);
    let _ = frame.push(text.len() as u8);
    let _ = frame.extend_from_slice(text.as_bytes());
    let _ = frame.push(END_MARKER);
    Some(frame)
}

/// Outbound channel to the companion app.
///
/// Devices call this at every state transition; the kernel calls it for
/// lifecycle records and application prints. Implementations must not
/// block the control loop beyond the UART FIFO push.
pub trait HostLink {
    fn send_record(&mut self, record: &EventRecord);
    fn send_text(&mut self, text: &str);
}

/// Link that discards everything. Used when no host is attached and as
/// the quiet default in tests.
pub struct NullLink;

impl HostLink for NullLink {
    fn send_record(&mut self, _record: &EventRecord) {}
    fn send_text(&mut self, _text: &str) {}
}

/// Link that retains encoded frames in memory. Test double, also handy
/// for draining over a transport the firmware does not own.
#[derive(Default)]
pub struct RecordingLink {
    pub frames: std::vec::Vec<Frame>,
}

impl RecordingLink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HostLink for RecordingLink {
    fn send_record(&mut self, record: &EventRecord) {
        self.frames.push(record.encode());
    }

    fn send_text(&mut self, text: &str) {
        if let Some(frame) = encode_text(text) {
            self.frames.push(frame);
        }
    }
}

// ── ESP-IDF serial link ───────────────────────────────────────

#[cfg(target_os = "espidf")]
pub mod serial {
    //! UART0 link. The driver is installed once at boot; frames go out
    //! through the FIFO without waiting for drain.

    use super::{encode_text, EventRecord, HostLink};
    use crate::error::{Error, Result};
    use esp_idf_svc::sys as sys;

    const UART: sys::uart_port_t = 0;

    pub struct SerialLink;

    impl SerialLink {
        pub fn new(baud: u32) -> Result<Self> {
            let config = sys::uart_config_t {
                baud_rate: baud as i32,
                data_bits: sys::uart_word_length_t_UART_DATA_8_BITS,
                parity: sys::uart_parity_t_UART_PARITY_DISABLE,
                stop_bits: sys::uart_stop_bits_t_UART_STOP_BITS_1,
                flow_ctrl: sys::uart_hw_flowcontrol_t_UART_HW_FLOWCTRL_DISABLE,
                ..Default::default()
            };
            // SAFETY: UART0 configuration and driver install at boot,
            // before any other use of the port.
            unsafe {
                if sys::uart_param_config(UART, &config) != sys::ESP_OK {
                    return Err(Error::Link("uart config failed"));
                }
                if sys::uart_driver_install(UART, 512, 512, 0, core::ptr::null_mut(), 0)
                    != sys::ESP_OK
                {
                    return Err(Error::Link("uart driver install failed"));
                }
            }
            Ok(Self)
        }

        fn write(&mut self, bytes: &[u8]) {
            // SAFETY: driver installed in `new`; bytes are copied into
            // the TX ring buffer before this returns.
            unsafe {
                sys::uart_write_bytes(UART, bytes.as_ptr().cast(), bytes.len());
            }
        }
    }

    impl HostLink for SerialLink {
        fn send_record(&mut self, record: &EventRecord) {
            let frame = record.encode();
            self.write(&frame);
        }

        fn send_text(&mut self, text: &str) {
            if let Some(frame) = encode_text(text) {
                self.write(&frame);
            }
        }
    }
}
