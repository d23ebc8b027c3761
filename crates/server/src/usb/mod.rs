//! Server-side USB: the adapter seam and its implementations

pub mod host;
pub mod mock;
pub mod native;

pub use host::{UsbHost, UsbHostError};
pub use mock::MockHost;
pub use native::NativeHost;
