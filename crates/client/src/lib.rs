//! remote-usb client library
//!
//! One typed stub per remote operation over a [`protocol::Session`]. The
//! client holds no USB state: everything it returns is a by-value copy of
//! a decoded response frame.

pub mod config;
pub mod remote;

pub use remote::RemoteUsb;
