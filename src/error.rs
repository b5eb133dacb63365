//! Error types for the RoboCore firmware.
//!
//! The device layer deliberately has no error propagation: invalid
//! arguments, capacity overruns and decode failures are silently
//! rejected per the board's non-recoverable-by-software policy. These
//! types cover the one place errors are real — peripheral and link
//! initialisation at boot. All variants are `Copy` so they pass through
//! the entry point without allocation.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Peripheral initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
    /// The host serial link could not be opened.
    Link(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Link(msg) => write!(f, "link: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
