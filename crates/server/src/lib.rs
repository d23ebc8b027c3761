//! remote-usb server library
//!
//! Owns the native USB side of the protocol: the [`usb::UsbHost`] adapter
//! seam over the system USB library and the [`dispatch::Dispatcher`] that
//! serves one connection, one call at a time.

pub mod config;
pub mod dispatch;
pub mod usb;

pub use dispatch::Dispatcher;
pub use usb::{NativeHost, UsbHost, UsbHostError};
