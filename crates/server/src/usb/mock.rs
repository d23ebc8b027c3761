//! Scripted USB adapter for tests
//!
//! Stands in for real hardware: a fixed device table that tests can edit
//! mid-scenario (to model unplugs and re-enumeration), canned transfer
//! data, and counters that let tests assert the at-most-one-native-handle
//! discipline.

use super::host::{UsbHost, UsbHostError};
use protocol::{DeviceDescriptor, DeviceId};
use std::collections::HashMap;
use std::time::Duration;

/// One scripted device.
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub id: DeviceId,
    pub descriptor: DeviceDescriptor,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Scripted adapter. The `Handle` is the opened device's session id;
/// handle-scoped calls fail once that id leaves the device table, which
/// is how tests model a device vanishing under an open handle.
#[derive(Default)]
pub struct MockHost {
    initialized: bool,
    devices: Vec<MockDevice>,
    control_data: Vec<u8>,
    strings: HashMap<u8, String>,
    /// Currently open native handles
    pub open_handles: usize,
    /// High-water mark of `open_handles`
    pub max_open_handles: usize,
    /// Total opens performed
    pub opens: usize,
    /// Total closes performed
    pub closes: usize,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_device(&mut self, device: MockDevice) {
        self.devices.push(device);
    }

    /// Drop a device from the table, as if it was unplugged.
    pub fn remove_device(&mut self, session_id: i32) {
        self.devices.retain(|d| d.id.session_id != session_id);
    }

    /// Bytes an IN control transfer will yield.
    pub fn set_control_data(&mut self, data: &[u8]) {
        self.control_data = data.to_vec();
    }

    pub fn set_string(&mut self, index: u8, value: &str) {
        self.strings.insert(index, value.to_string());
    }

    fn device(&self, session_id: i32) -> Result<&MockDevice, UsbHostError> {
        self.devices
            .iter()
            .find(|d| d.id.session_id == session_id)
            .ok_or(UsbHostError::NotFound)
    }

    fn register_open(&mut self, session_id: i32) -> i32 {
        self.open_handles += 1;
        self.max_open_handles = self.max_open_handles.max(self.open_handles);
        self.opens += 1;
        session_id
    }
}

/// A plain descriptor for scripting, parameterised on identity.
pub fn make_descriptor(vendor_id: u16, product_id: u16) -> DeviceDescriptor {
    DeviceDescriptor {
        bLength: 18,
        bDescriptorType: 0x01,
        bcdUSB: 0x0200,
        bDeviceClass: 0,
        bDeviceSubClass: 0,
        bDeviceProtocol: 0,
        bMaxPacketSize0: 64,
        idVendor: vendor_id as i32,
        idProduct: product_id as i32,
        bcdDevice: 0x0100,
        iManufacturer: 1,
        iProduct: 2,
        iSerialNumber: 3,
        bNumConfigurations: 1,
    }
}

/// A scripted device with the usual one-configuration shape.
pub fn make_device(
    bus: i32,
    address: i32,
    session_id: i32,
    vendor_id: u16,
    product_id: u16,
) -> MockDevice {
    MockDevice {
        id: DeviceId {
            bus_number: bus,
            device_address: address,
            num_configurations: 1,
            session_id,
        },
        descriptor: make_descriptor(vendor_id, product_id),
        vendor_id,
        product_id,
    }
}

impl UsbHost for MockHost {
    type Device = DeviceId;
    type Handle = i32;

    fn init(&mut self) -> Result<(), UsbHostError> {
        self.initialized = true;
        Ok(())
    }

    fn exit(&mut self) {
        self.initialized = false;
    }

    fn devices(&mut self) -> Result<Vec<DeviceId>, UsbHostError> {
        if !self.initialized {
            return Err(UsbHostError::NotInitialized);
        }
        Ok(self.devices.iter().map(|d| d.id).collect())
    }

    fn identify(&mut self, device: &DeviceId) -> Result<DeviceId, UsbHostError> {
        Ok(*device)
    }

    fn descriptor(&mut self, device: &DeviceId) -> Result<DeviceDescriptor, UsbHostError> {
        Ok(self.device(device.session_id)?.descriptor)
    }

    fn open(&mut self, device: &DeviceId) -> Result<i32, UsbHostError> {
        let session_id = self.device(device.session_id)?.id.session_id;
        Ok(self.register_open(session_id))
    }

    fn open_vid_pid(&mut self, vendor_id: u16, product_id: u16) -> Option<(i32, DeviceId)> {
        if !self.initialized {
            return None;
        }
        let device = self
            .devices
            .iter()
            .find(|d| d.vendor_id == vendor_id && d.product_id == product_id)?;
        let id = device.id;
        Some((self.register_open(id.session_id), id))
    }

    fn close(&mut self, _handle: i32) {
        self.open_handles -= 1;
        self.closes += 1;
    }

    fn claim_interface(&mut self, handle: &mut i32, _interface: i32) -> Result<(), UsbHostError> {
        self.device(*handle).map(|_| ())
    }

    fn release_interface(&mut self, handle: &mut i32, _interface: i32) -> Result<(), UsbHostError> {
        self.device(*handle).map(|_| ())
    }

    fn get_configuration(&mut self, handle: &mut i32) -> Result<i32, UsbHostError> {
        self.device(*handle).map(|d| d.id.num_configurations)
    }

    fn set_configuration(&mut self, handle: &mut i32, _config: i32) -> Result<(), UsbHostError> {
        self.device(*handle).map(|_| ())
    }

    fn set_interface_alt_setting(
        &mut self,
        handle: &mut i32,
        _interface: i32,
        _alt_setting: i32,
    ) -> Result<(), UsbHostError> {
        self.device(*handle).map(|_| ())
    }

    fn reset_device(&mut self, handle: &mut i32) -> Result<(), UsbHostError> {
        self.device(*handle).map(|_| ())
    }

    fn control_transfer(
        &mut self,
        handle: &mut i32,
        _request_type: u8,
        _request: u8,
        _value: u16,
        _index: u16,
        data: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, UsbHostError> {
        self.device(*handle)?;
        let moved = self.control_data.len().min(data.len());
        data[..moved].copy_from_slice(&self.control_data[..moved]);
        Ok(moved)
    }

    fn bulk_transfer(
        &mut self,
        handle: &mut i32,
        _endpoint: u8,
        data: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize, UsbHostError> {
        self.device(*handle)?;
        data.fill(0xB5);
        Ok(data.len())
    }

    fn clear_halt(&mut self, handle: &mut i32, _endpoint: u8) -> Result<(), UsbHostError> {
        self.device(*handle).map(|_| ())
    }

    fn string_descriptor_ascii(
        &mut self,
        handle: &mut i32,
        index: u8,
    ) -> Result<String, UsbHostError> {
        self.device(*handle)?;
        self.strings
            .get(&index)
            .cloned()
            .ok_or(UsbHostError::NotFound)
    }
}
