//! RoboCore Firmware — Main Entry Point
//!
//! Event-driven peripheral control with a cooperative kernel.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                       │
//! │                                                                │
//! │  GpioIn/GpioOut    AdcIn      LedcCarrier    SerialLink        │
//! │  (digital ports)   (analog)   (IR output)    (host frames)     │
//! │  IrSampler 50 µs   ServoTimer                EspClock          │
//! │  (capture ISR)     (pulse ISR)               (time)            │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            Kernel + devices (pure logic)               │    │
//! │  │  EventQueue · state machines · NEC/RC5 decode          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

// ── Imports ───────────────────────────────────────────────────
use std::sync::Arc;

use anyhow::Result;
use log::{error, info};

use robocore::config::KernelConfig;
use robocore::drivers::{Button, Led};
use robocore::hal::esp::{EspClock, GpioIn, GpioOut};
use robocore::host::serial::SerialLink;
use robocore::ir::receiver::sampler::IrSampler;
use robocore::ir::{IrCapture, IrReceiver};
use robocore::servo::pulse::{GpioServoPins, ServoTimer};
use robocore::servo::{Servo, ServoBank};
use robocore::{Event, EventKind, Kernel, PortId, TimerInterval};

// ── Board pin map ─────────────────────────────────────────────
//
// GPIO numbers behind the labelled ports on the board edge. Only the
// ports this application uses are listed; the full table lives in the
// board schematic.

const GPIO_DIO1: i32 = 4; // push button
const GPIO_DIO2: i32 = 5; // status LED
const GPIO_IR_RECV: i32 = 19;
const GPIO_SERVO_A: i32 = 25;
const GPIO_SERVO_B: i32 = 26;
const GPIO_SERVO_C: i32 = 27;
const GPIO_SERVO_D: i32 = 14;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  RoboCore v{}                     ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let config = KernelConfig::default();
    let link = SerialLink::new(config.serial_baud)?;
    let mut kernel = Kernel::with_config(config, Box::new(EspClock), Box::new(link));

    // ── 2. Attach devices ─────────────────────────────────────
    let button = Button::new(
        Box::new(GpioIn::new(GPIO_DIO1)?),
        kernel.config().button_debounce_ms,
    );
    let button = kernel
        .attach(Box::new(button), PortId::Dio1)
        .ok_or_else(|| anyhow::anyhow!("button attach failed"))?;

    let led = kernel
        .attach(
            Box::new(Led::new(Box::new(GpioOut::new(GPIO_DIO2)?))),
            PortId::Dio2,
        )
        .ok_or_else(|| anyhow::anyhow!("led attach failed"))?;

    let capture = Arc::new(IrCapture::new());
    let _sampler = IrSampler::start(capture.clone(), GPIO_IR_RECV)?;
    let ir = kernel
        .attach(Box::new(IrReceiver::new(capture)), PortId::Dio3)
        .ok_or_else(|| anyhow::anyhow!("ir receiver attach failed"))?;

    let bank = Arc::new(ServoBank::new());
    let slot = bank.allocate().ok_or_else(|| anyhow::anyhow!("servo bank full"))?;
    let servo = kernel
        .attach(Box::new(Servo::new(bank.clone(), slot)), PortId::ServoA)
        .ok_or_else(|| anyhow::anyhow!("servo attach failed"))?;
    for pin in [GPIO_SERVO_A, GPIO_SERVO_B, GPIO_SERVO_C, GPIO_SERVO_D] {
        // Pulse pins are plain outputs; the ISR drives them directly.
        drop(GpioOut::new(pin)?);
    }
    let _servo_timer = ServoTimer::start(
        bank,
        GpioServoPins {
            pins: [GPIO_SERVO_A, GPIO_SERVO_B, GPIO_SERVO_C, GPIO_SERVO_D],
        },
    )?;

    // ── 3. Control loop ───────────────────────────────────────
    kernel.launch();

    loop {
        kernel.service();
        while kernel.has_events() {
            let event = kernel.next_event();
            handle(&mut kernel, event, button, led, ir, servo);
        }
        if kernel.state() == robocore::KernelState::Terminate {
            break;
        }
        // One pass per millisecond keeps debounce timing honest
        // without starving the idle task.
        esp_idf_hal::delay::FreeRtos::delay_ms(1);
    }

    info!("kernel terminated, halting");
    Ok(())
}

// ── Event handler ─────────────────────────────────────────────

fn handle(
    kernel: &mut Kernel,
    event: Event,
    button: robocore::SourceId,
    led: robocore::SourceId,
    ir: robocore::SourceId,
    servo: robocore::SourceId,
) {
    match event.kind() {
        EventKind::Launch => {
            kernel.print("RoboCore up");
            if kernel
                .with_device::<Servo, _>(servo, |s, link| s.activate_at(90, link))
                .is_none()
            {
                error!("servo token did not resolve");
            }
            kernel.time(TimerInterval::TenSec);
        }
        EventKind::ButtonPress if event.is_from(button) => {
            let presses = event.data(0);
            kernel.print_value("presses: ", i32::from(presses));
            // Sweep between the two ends on alternating presses.
            let target = if presses % 2 == 0 { 30 } else { 150 };
            let _ = kernel.with_device::<Servo, _>(servo, |s, link| s.rotate(target, 5, link));
        }
        EventKind::IrMessageReceive if event.is_from(ir) => {
            kernel.print_value("ir value: ", i32::from(event.data(0)));
            let _ = kernel.with_device::<Led, _>(led, |l, link| l.toggle(link));
        }
        EventKind::TimeUp => {
            kernel.print_value("alive after s: ", i32::from(event.data(0)));
        }
        _ => {}
    }
}
