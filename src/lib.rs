//! RoboCore firmware library.
//!
//! Event-driven peripheral control for the RoboCore robotics board:
//! devices run as polled state machines (or interrupt-fed captures)
//! behind the [`device::Device`] contract, the [`kernel::Kernel`]
//! aggregates their events into one application queue, and every
//! transition is mirrored to the companion app over the host link.
//!
//! All ESP-IDF-specific code is guarded by `#[cfg(target_os =
//! "espidf")]` within each module; everything else is host-testable
//! pure logic.

#![deny(unused_must_use)]

pub mod config;
pub mod device;
pub mod drivers;
pub mod events;
pub mod hal;
pub mod host;
pub mod ir;
pub mod kernel;
pub mod pins;
pub mod servo;

pub mod error;

pub use events::{Event, EventKind, EventQueue, SourceId};
pub use kernel::{Kernel, KernelState, TimerInterval};
pub use pins::PortId;
