//! Shared pieces for the remote-usb binaries: error type and logging setup.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::setup_logging;
