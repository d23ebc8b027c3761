//! USB value types as they appear on the wire
//!
//! Every integer in these records travels as a signed 32-bit value in the
//! codec's canonical encoding, regardless of its native width on either
//! host. The server widens when reading from the USB library; the client
//! narrows when interpreting.

use crate::error::{Result, WireError};
use crate::wire::{PayloadReader, PayloadWriter, WireRecord};

/// Fixed capacity of a device list on the wire.
///
/// Every list frame carries exactly this many slots; the companion count
/// field says how many are meaningful. The capacity is part of the wire
/// contract, not an implementation detail.
pub const MAX_DEVS: usize = 128;

/// Fixed capacity of a transfer data buffer on the wire.
///
/// Control, bulk, and string-descriptor payloads always travel at this full
/// size with a separate field stating the meaningful byte count.
pub const MAX_DATA: usize = 1024;

/// Binary status code carried in response payloads.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    #[default]
    Failure,
}

impl Status {
    /// Wire representation (`0` success, `-1` failure).
    pub fn as_i32(self) -> i32 {
        match self {
            Status::Success => 0,
            Status::Failure => -1,
        }
    }

    /// Decode from the wire integer. Anything non-zero reads as failure.
    pub fn from_i32(raw: i32) -> Self {
        if raw == 0 {
            Status::Success
        } else {
            Status::Failure
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }
}

/// Portable identity of a USB device (`S(iiii)`).
///
/// `session_id` is the authoritative key: an opaque token minted by the
/// server's USB adapter that names the device within the current server
/// process. The other three fields are informational for the client.
/// Identities are valid until the next device-list fetch on the server.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    /// Bus the device is attached to
    pub bus_number: i32,
    /// Address on that bus
    pub device_address: i32,
    /// Number of configurations the device reports
    pub num_configurations: i32,
    /// Opaque per-process token used for lookup on the server
    pub session_id: i32,
}

impl WireRecord for DeviceId {
    const FORMAT: &'static str = "S(iiii)";

    fn encode(&self, w: &mut PayloadWriter) {
        w.put_i32(self.bus_number);
        w.put_i32(self.device_address);
        w.put_i32(self.num_configurations);
        w.put_i32(self.session_id);
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            bus_number: r.get_i32()?,
            device_address: r.get_i32()?,
            num_configurations: r.get_i32()?,
            session_id: r.get_i32()?,
        })
    }
}

/// Fixed-capacity device list (`iS(iiii)#`).
///
/// The first `n` slots are meaningful; the remainder are transmitted
/// anyway, zeroed by convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceList {
    /// Number of meaningful entries, `0 ..= MAX_DEVS`
    pub n: i32,
    /// All slots, meaningful or not
    pub devices: [DeviceId; MAX_DEVS],
}

impl Default for DeviceList {
    fn default() -> Self {
        Self {
            n: 0,
            devices: [DeviceId::default(); MAX_DEVS],
        }
    }
}

impl DeviceList {
    /// The meaningful prefix of the slot array.
    ///
    /// Clamps a hostile count so a decoded list can always be iterated.
    pub fn entries(&self) -> &[DeviceId] {
        let n = (self.n.max(0) as usize).min(MAX_DEVS);
        &self.devices[..n]
    }

    /// Append a device, silently dropping it if the list is full.
    pub fn push(&mut self, dev: DeviceId) {
        let n = self.n as usize;
        if n < MAX_DEVS {
            self.devices[n] = dev;
            self.n += 1;
        }
    }
}

impl WireRecord for DeviceList {
    const FORMAT: &'static str = "iS(iiii)#";

    fn encode(&self, w: &mut PayloadWriter) {
        w.put_i32(self.n);
        w.begin_array(MAX_DEVS);
        for dev in &self.devices {
            dev.encode(w);
        }
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        let n = r.get_i32()?;
        r.expect_array(MAX_DEVS)?;
        let mut devices = [DeviceId::default(); MAX_DEVS];
        for slot in devices.iter_mut() {
            *slot = DeviceId::decode(r)?;
        }
        if n < 0 || n as usize > MAX_DEVS {
            return Err(WireError::BadArrayCount {
                expected: MAX_DEVS,
                found: n,
            });
        }
        Ok(Self { n, devices })
    }
}

/// USB 2.0 standard device descriptor, widened to wire integers
/// (`S(iiiiiiiiiiiiii)`).
///
/// Field names keep their USB spelling so they can be matched against the
/// standard without a translation table.
#[allow(non_snake_case)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub bLength: i32,
    pub bDescriptorType: i32,
    pub bcdUSB: i32,
    pub bDeviceClass: i32,
    pub bDeviceSubClass: i32,
    pub bDeviceProtocol: i32,
    pub bMaxPacketSize0: i32,
    pub idVendor: i32,
    pub idProduct: i32,
    pub bcdDevice: i32,
    pub iManufacturer: i32,
    pub iProduct: i32,
    pub iSerialNumber: i32,
    pub bNumConfigurations: i32,
}

impl WireRecord for DeviceDescriptor {
    const FORMAT: &'static str = "S(iiiiiiiiiiiiii)";

    fn encode(&self, w: &mut PayloadWriter) {
        for field in self.fields() {
            w.put_i32(field);
        }
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            bLength: r.get_i32()?,
            bDescriptorType: r.get_i32()?,
            bcdUSB: r.get_i32()?,
            bDeviceClass: r.get_i32()?,
            bDeviceSubClass: r.get_i32()?,
            bDeviceProtocol: r.get_i32()?,
            bMaxPacketSize0: r.get_i32()?,
            idVendor: r.get_i32()?,
            idProduct: r.get_i32()?,
            bcdDevice: r.get_i32()?,
            iManufacturer: r.get_i32()?,
            iProduct: r.get_i32()?,
            iSerialNumber: r.get_i32()?,
            bNumConfigurations: r.get_i32()?,
        })
    }
}

impl DeviceDescriptor {
    fn fields(&self) -> [i32; 14] {
        [
            self.bLength,
            self.bDescriptorType,
            self.bcdUSB,
            self.bDeviceClass,
            self.bDeviceSubClass,
            self.bDeviceProtocol,
            self.bMaxPacketSize0,
            self.idVendor,
            self.idProduct,
            self.bcdDevice,
            self.iManufacturer,
            self.iProduct,
            self.iSerialNumber,
            self.bNumConfigurations,
        ]
    }
}

/// Device handle as it travels on the wire (`S($(iiii))`).
///
/// The identity is structural: the server consults only the embedded
/// `session_id` of the nested [`DeviceId`], native handle state never
/// leaves the server process. An all-zero handle is the failure shape of
/// an open that returns no separate status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle {
    /// The device this handle refers to
    pub dev: DeviceId,
}

impl DeviceHandle {
    pub fn new(dev: DeviceId) -> Self {
        Self { dev }
    }

    /// True when every field is zero, the shape a failed open returns.
    pub fn is_null(&self) -> bool {
        *self == Self::default()
    }
}

impl WireRecord for DeviceHandle {
    const FORMAT: &'static str = "S($(iiii))";

    fn encode(&self, w: &mut PayloadWriter) {
        self.dev.encode(w);
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            dev: DeviceId::decode(r)?,
        })
    }
}

/// Full-capacity transfer buffer (`c#`, capacity [`MAX_DATA`]).
///
/// Always transmitted whole; the meaningful length travels in a companion
/// field of the enclosing record.
#[derive(Clone, Copy)]
pub struct TransferBuffer {
    pub bytes: [u8; MAX_DATA],
}

impl Default for TransferBuffer {
    fn default() -> Self {
        Self {
            bytes: [0; MAX_DATA],
        }
    }
}

impl TransferBuffer {
    /// Copy `src` into a fresh buffer, truncating at capacity.
    pub fn from_slice(src: &[u8]) -> Self {
        let mut buf = Self::default();
        let len = src.len().min(MAX_DATA);
        buf.bytes[..len].copy_from_slice(&src[..len]);
        buf
    }

    /// The meaningful prefix for a transfer that moved `len` bytes.
    pub fn data(&self, len: usize) -> &[u8] {
        &self.bytes[..len.min(MAX_DATA)]
    }
}

impl PartialEq for TransferBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.bytes[..] == other.bytes[..]
    }
}

impl Eq for TransferBuffer {}

impl std::fmt::Debug for TransferBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = MAX_DATA - self.bytes.iter().rev().take_while(|b| **b == 0).count();
        f.debug_struct("TransferBuffer")
            .field("prefix", &&self.bytes[..used.min(16)])
            .finish_non_exhaustive()
    }
}
