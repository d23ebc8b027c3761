//! The USB adapter seam
//!
//! The dispatcher talks to the host controller exclusively through this
//! trait, so it can be driven by the real `rusb` adapter in production and
//! by a scripted mock in tests. The primitives map one-to-one onto what a
//! host USB library provides; nothing protocol-shaped leaks below this
//! line except the portable identity record.

use protocol::{DeviceDescriptor, DeviceId};
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a USB adapter.
///
/// The dispatcher maps every variant to the protocol's `FAILURE` status;
/// none of them terminate the connection.
#[derive(Debug, Error)]
pub enum UsbHostError {
    /// No USB context yet; `init` has not run
    #[error("USB context not initialized")]
    NotInitialized,

    /// Device vanished between enumeration and use
    #[error("device not found")]
    NotFound,

    /// Parameter outside what the native library accepts
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Error from the native USB library
    #[error(transparent)]
    Native(#[from] rusb::Error),
}

/// Host USB primitives the server needs (one per remote operation, give
/// or take lookup).
///
/// `Device` is an enumerated-but-unopened device; `Handle` is an open
/// one. Both stay opaque to the dispatcher. Single-threaded sequential
/// use is the only access pattern.
pub trait UsbHost {
    type Device;
    type Handle;

    /// Create the USB context. Idempotent.
    fn init(&mut self) -> Result<(), UsbHostError>;

    /// Destroy the USB context.
    fn exit(&mut self);

    /// Enumerate currently attached devices.
    fn devices(&mut self) -> Result<Vec<Self::Device>, UsbHostError>;

    /// Portable identity of an enumerated device, including the
    /// per-process session id used for lookup.
    fn identify(&mut self, device: &Self::Device) -> Result<DeviceId, UsbHostError>;

    /// Full device descriptor, widened to wire integers.
    fn descriptor(&mut self, device: &Self::Device) -> Result<DeviceDescriptor, UsbHostError>;

    /// Open an enumerated device.
    fn open(&mut self, device: &Self::Device) -> Result<Self::Handle, UsbHostError>;

    /// Open the first device matching vendor/product, returning the
    /// handle and its identity, or `None` when nothing matched (or no
    /// context exists).
    fn open_vid_pid(
        &mut self,
        vendor_id: u16,
        product_id: u16,
    ) -> Option<(Self::Handle, DeviceId)>;

    /// Close an open handle.
    fn close(&mut self, handle: Self::Handle);

    fn claim_interface(
        &mut self,
        handle: &mut Self::Handle,
        interface: i32,
    ) -> Result<(), UsbHostError>;

    fn release_interface(
        &mut self,
        handle: &mut Self::Handle,
        interface: i32,
    ) -> Result<(), UsbHostError>;

    /// Currently active configuration value.
    fn get_configuration(&mut self, handle: &mut Self::Handle) -> Result<i32, UsbHostError>;

    fn set_configuration(
        &mut self,
        handle: &mut Self::Handle,
        config: i32,
    ) -> Result<(), UsbHostError>;

    fn set_interface_alt_setting(
        &mut self,
        handle: &mut Self::Handle,
        interface: i32,
        alt_setting: i32,
    ) -> Result<(), UsbHostError>;

    fn reset_device(&mut self, handle: &mut Self::Handle) -> Result<(), UsbHostError>;

    /// Control transfer on endpoint 0. Direction comes from the
    /// request-type direction bit; `data` is read or filled accordingly.
    /// Returns bytes moved.
    fn control_transfer(
        &mut self,
        handle: &mut Self::Handle,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbHostError>;

    /// Bulk transfer; direction comes from the endpoint direction bit.
    /// Returns bytes moved.
    fn bulk_transfer(
        &mut self,
        handle: &mut Self::Handle,
        endpoint: u8,
        data: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbHostError>;

    fn clear_halt(&mut self, handle: &mut Self::Handle, endpoint: u8) -> Result<(), UsbHostError>;

    /// String descriptor by index, decoded to ASCII.
    fn string_descriptor_ascii(
        &mut self,
        handle: &mut Self::Handle,
        index: u8,
    ) -> Result<String, UsbHostError>;
}
