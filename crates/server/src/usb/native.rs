//! rusb-backed USB adapter
//!
//! Wraps one optional `rusb::Context` and widens everything the native
//! library reports into the protocol's wire integers.

use super::host::{UsbHost, UsbHostError};
use protocol::{DeviceDescriptor, DeviceId};
use rusb::constants::{LIBUSB_ENDPOINT_DIR_MASK, LIBUSB_ENDPOINT_IN};
use rusb::UsbContext;
use std::time::Duration;
use tracing::debug;

// Header fields rusb strips from the descriptor; fixed by USB 2.0 for a
// standard device descriptor.
const DEVICE_DESCRIPTOR_LENGTH: i32 = 18;
const DEVICE_DESCRIPTOR_TYPE: i32 = 0x01;

/// The production adapter: one optional libusb context.
#[derive(Default)]
pub struct NativeHost {
    context: Option<rusb::Context>,
}

impl NativeHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn ctx(&self) -> Result<&rusb::Context, UsbHostError> {
        self.context.as_ref().ok_or(UsbHostError::NotInitialized)
    }
}

/// rusb does not surface libusb's session data, so the id is synthesised
/// from bus and address, which are unique and stable while a device
/// stays plugged.
fn session_id<T: UsbContext>(device: &rusb::Device<T>) -> i32 {
    ((device.bus_number() as i32) << 8) | device.address() as i32
}

fn bcd(version: rusb::Version) -> i32 {
    ((version.major() as i32) << 8)
        | ((version.minor() as i32) << 4)
        | version.sub_minor() as i32
}

fn narrow(value: i32, what: &str) -> Result<u8, UsbHostError> {
    u8::try_from(value).map_err(|_| UsbHostError::InvalidParam(format!("{what}: {value}")))
}

impl UsbHost for NativeHost {
    type Device = rusb::Device<rusb::Context>;
    type Handle = rusb::DeviceHandle<rusb::Context>;

    fn init(&mut self) -> Result<(), UsbHostError> {
        if self.context.is_none() {
            self.context = Some(rusb::Context::new()?);
            debug!("USB context created");
        }
        Ok(())
    }

    fn exit(&mut self) {
        if self.context.take().is_some() {
            debug!("USB context destroyed");
        }
    }

    fn devices(&mut self) -> Result<Vec<Self::Device>, UsbHostError> {
        Ok(self.ctx()?.devices()?.iter().collect())
    }

    fn identify(&mut self, device: &Self::Device) -> Result<DeviceId, UsbHostError> {
        let descriptor = device.device_descriptor()?;
        Ok(DeviceId {
            bus_number: device.bus_number() as i32,
            device_address: device.address() as i32,
            num_configurations: descriptor.num_configurations() as i32,
            session_id: session_id(device),
        })
    }

    fn descriptor(&mut self, device: &Self::Device) -> Result<DeviceDescriptor, UsbHostError> {
        let raw = device.device_descriptor()?;
        Ok(DeviceDescriptor {
            bLength: DEVICE_DESCRIPTOR_LENGTH,
            bDescriptorType: DEVICE_DESCRIPTOR_TYPE,
            bcdUSB: bcd(raw.usb_version()),
            bDeviceClass: raw.class_code() as i32,
            bDeviceSubClass: raw.sub_class_code() as i32,
            bDeviceProtocol: raw.protocol_code() as i32,
            bMaxPacketSize0: raw.max_packet_size() as i32,
            idVendor: raw.vendor_id() as i32,
            idProduct: raw.product_id() as i32,
            bcdDevice: bcd(raw.device_version()),
            iManufacturer: raw.manufacturer_string_index().unwrap_or(0) as i32,
            iProduct: raw.product_string_index().unwrap_or(0) as i32,
            iSerialNumber: raw.serial_number_string_index().unwrap_or(0) as i32,
            bNumConfigurations: raw.num_configurations() as i32,
        })
    }

    fn open(&mut self, device: &Self::Device) -> Result<Self::Handle, UsbHostError> {
        Ok(device.open()?)
    }

    fn open_vid_pid(
        &mut self,
        vendor_id: u16,
        product_id: u16,
    ) -> Option<(Self::Handle, DeviceId)> {
        let handle = self
            .context
            .as_ref()?
            .open_device_with_vid_pid(vendor_id, product_id)?;
        let device = handle.device();
        let id = self.identify(&device).ok()?;
        Some((handle, id))
    }

    fn close(&mut self, handle: Self::Handle) {
        drop(handle);
    }

    fn claim_interface(
        &mut self,
        handle: &mut Self::Handle,
        interface: i32,
    ) -> Result<(), UsbHostError> {
        Ok(handle.claim_interface(narrow(interface, "interface")?)?)
    }

    fn release_interface(
        &mut self,
        handle: &mut Self::Handle,
        interface: i32,
    ) -> Result<(), UsbHostError> {
        Ok(handle.release_interface(narrow(interface, "interface")?)?)
    }

    fn get_configuration(&mut self, handle: &mut Self::Handle) -> Result<i32, UsbHostError> {
        Ok(handle.active_configuration()? as i32)
    }

    fn set_configuration(
        &mut self,
        handle: &mut Self::Handle,
        config: i32,
    ) -> Result<(), UsbHostError> {
        Ok(handle.set_active_configuration(narrow(config, "configuration")?)?)
    }

    fn set_interface_alt_setting(
        &mut self,
        handle: &mut Self::Handle,
        interface: i32,
        alt_setting: i32,
    ) -> Result<(), UsbHostError> {
        Ok(handle.set_alternate_setting(
            narrow(interface, "interface")?,
            narrow(alt_setting, "alt setting")?,
        )?)
    }

    fn reset_device(&mut self, handle: &mut Self::Handle) -> Result<(), UsbHostError> {
        Ok(handle.reset()?)
    }

    fn control_transfer(
        &mut self,
        handle: &mut Self::Handle,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbHostError> {
        let moved = if request_type & LIBUSB_ENDPOINT_DIR_MASK == LIBUSB_ENDPOINT_IN {
            handle.read_control(request_type, request, value, index, data, timeout)?
        } else {
            handle.write_control(request_type, request, value, index, data, timeout)?
        };
        Ok(moved)
    }

    fn bulk_transfer(
        &mut self,
        handle: &mut Self::Handle,
        endpoint: u8,
        data: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, UsbHostError> {
        let moved = if endpoint & LIBUSB_ENDPOINT_DIR_MASK == LIBUSB_ENDPOINT_IN {
            handle.read_bulk(endpoint, data, timeout)?
        } else {
            handle.write_bulk(endpoint, data, timeout)?
        };
        Ok(moved)
    }

    fn clear_halt(&mut self, handle: &mut Self::Handle, endpoint: u8) -> Result<(), UsbHostError> {
        Ok(handle.clear_halt(endpoint)?)
    }

    fn string_descriptor_ascii(
        &mut self,
        handle: &mut Self::Handle,
        index: u8,
    ) -> Result<String, UsbHostError> {
        Ok(handle.read_string_descriptor_ascii(index)?)
    }
}
