//! Operation selector and message catalog
//!
//! One enum names every remote operation; one record struct exists per
//! request/response shape. A full remote call on the wire is:
//!
//! ```text
//! selector frame ("i") -> request frame (if any) -> response frame (if any)
//! ```
//!
//! Several operations share a shape (for example every "handle plus one
//! integer" request): those reuse one record, exactly as the format-string
//! table defines them. Record field order is the wire order.

use crate::error::{Result, WireError};
use crate::types::{
    DeviceDescriptor, DeviceHandle, Status, TransferBuffer, MAX_DATA,
};
use crate::wire::{PayloadReader, PayloadWriter, WireRecord};

/// Remote operation selector, transmitted as a lone `i` frame before any
/// request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Operation {
    Init = 0,
    Exit = 1,
    GetDeviceList = 2,
    GetDeviceDescriptor = 3,
    OpenWithVidPid = 4,
    Open = 5,
    Close = 6,
    ClaimInterface = 7,
    ReleaseInterface = 8,
    GetConfiguration = 9,
    SetConfiguration = 10,
    SetInterfaceAltSetting = 11,
    ResetDevice = 12,
    ControlTransfer = 13,
    BulkTransfer = 14,
    ClearHalt = 15,
    GetStringDescriptorAscii = 16,
}

impl Operation {
    pub fn from_raw(raw: i32) -> Result<Self> {
        Ok(match raw {
            0 => Self::Init,
            1 => Self::Exit,
            2 => Self::GetDeviceList,
            3 => Self::GetDeviceDescriptor,
            4 => Self::OpenWithVidPid,
            5 => Self::Open,
            6 => Self::Close,
            7 => Self::ClaimInterface,
            8 => Self::ReleaseInterface,
            9 => Self::GetConfiguration,
            10 => Self::SetConfiguration,
            11 => Self::SetInterfaceAltSetting,
            12 => Self::ResetDevice,
            13 => Self::ControlTransfer,
            14 => Self::BulkTransfer,
            15 => Self::ClearHalt,
            16 => Self::GetStringDescriptorAscii,
            other => return Err(WireError::UnknownOperation(other)),
        })
    }
}

impl WireRecord for Operation {
    const FORMAT: &'static str = "i";

    fn encode(&self, w: &mut PayloadWriter) {
        w.put_i32(*self as i32);
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        Self::from_raw(r.get_i32()?)
    }
}

// ---------------------------------------------------------------------------
// Status-only responses
// ---------------------------------------------------------------------------

/// Lone status reply (`i`): init, claim/release-interface, get/set
/// configuration, set-interface-alt-setting, reset-device, clear-halt.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: Status,
}

impl StatusResponse {
    pub fn new(status: Status) -> Self {
        Self { status }
    }
}

impl WireRecord for StatusResponse {
    const FORMAT: &'static str = "i";

    fn encode(&self, w: &mut PayloadWriter) {
        w.put_i32(self.status.as_i32());
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            status: Status::from_i32(r.get_i32()?),
        })
    }
}

// ---------------------------------------------------------------------------
// Device lookup and open
// ---------------------------------------------------------------------------

/// get-device-descriptor response (`S(iiiiiiiiiiiiii)i`). The descriptor
/// is zeroed when `status` is failure.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorResponse {
    pub descriptor: DeviceDescriptor,
    pub status: Status,
}

impl WireRecord for DescriptorResponse {
    const FORMAT: &'static str = "S(iiiiiiiiiiiiii)i";

    fn encode(&self, w: &mut PayloadWriter) {
        self.descriptor.encode(w);
        w.put_i32(self.status.as_i32());
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            descriptor: DeviceDescriptor::decode(r)?,
            status: Status::from_i32(r.get_i32()?),
        })
    }
}

/// open-with-vid-pid request (`ii`). Both ids travel widened to `i32`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VidPidRequest {
    pub vendor_id: i32,
    pub product_id: i32,
}

impl WireRecord for VidPidRequest {
    const FORMAT: &'static str = "ii";

    fn encode(&self, w: &mut PayloadWriter) {
        w.put_i32(self.vendor_id);
        w.put_i32(self.product_id);
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            vendor_id: r.get_i32()?,
            product_id: r.get_i32()?,
        })
    }
}

/// open response (`S($(iiii))i`): the handle plus an explicit status.
/// open-with-vid-pid answers with the bare [`DeviceHandle`] record
/// instead, where an all-zero handle is the failure shape.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OpenResponse {
    pub handle: DeviceHandle,
    pub status: Status,
}

impl WireRecord for OpenResponse {
    const FORMAT: &'static str = "S($(iiii))i";

    fn encode(&self, w: &mut PayloadWriter) {
        self.handle.encode(w);
        w.put_i32(self.status.as_i32());
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            handle: DeviceHandle::decode(r)?,
            status: Status::from_i32(r.get_i32()?),
        })
    }
}

// ---------------------------------------------------------------------------
// Handle-scoped requests
// ---------------------------------------------------------------------------

/// Handle plus one integer argument (`S($(iiii))i`): claim-interface and
/// release-interface (interface number), get-configuration and
/// set-configuration (configuration value).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HandleIntRequest {
    pub handle: DeviceHandle,
    pub arg: i32,
}

impl WireRecord for HandleIntRequest {
    const FORMAT: &'static str = "S($(iiii))i";

    fn encode(&self, w: &mut PayloadWriter) {
        self.handle.encode(w);
        w.put_i32(self.arg);
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            handle: DeviceHandle::decode(r)?,
            arg: r.get_i32()?,
        })
    }
}

/// set-interface-alt-setting request (`S($(iiii))ii`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AltSettingRequest {
    pub handle: DeviceHandle,
    pub interface: i32,
    pub alt_setting: i32,
}

impl WireRecord for AltSettingRequest {
    const FORMAT: &'static str = "S($(iiii))ii";

    fn encode(&self, w: &mut PayloadWriter) {
        self.handle.encode(w);
        w.put_i32(self.interface);
        w.put_i32(self.alt_setting);
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            handle: DeviceHandle::decode(r)?,
            interface: r.get_i32()?,
            alt_setting: r.get_i32()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

/// control-transfer request (`S($(iiii))iiiiii`).
///
/// Carries no data bytes: an OUT transfer sends a zeroed buffer of
/// `length` bytes on the server. `length` is the caller-requested size,
/// clamped to [`MAX_DATA`] server-side.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub handle: DeviceHandle,
    pub request_type: i32,
    pub request: i32,
    pub value: i32,
    pub index: i32,
    pub length: i32,
    pub timeout: i32,
}

impl WireRecord for ControlRequest {
    const FORMAT: &'static str = "S($(iiii))iiiiii";

    fn encode(&self, w: &mut PayloadWriter) {
        self.handle.encode(w);
        w.put_i32(self.request_type);
        w.put_i32(self.request);
        w.put_i32(self.value);
        w.put_i32(self.index);
        w.put_i32(self.length);
        w.put_i32(self.timeout);
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            handle: DeviceHandle::decode(r)?,
            request_type: r.get_i32()?,
            request: r.get_i32()?,
            value: r.get_i32()?,
            index: r.get_i32()?,
            length: r.get_i32()?,
            timeout: r.get_i32()?,
        })
    }
}

/// control-transfer response (`iic#`).
///
/// `retcode` is the adapter's return (bytes moved, or `-1`); `sub_status`
/// is byte 4 of the data read as a signed byte when `retcode >= 5`, else
/// zero, so a caller can check a common status byte without another round
/// trip.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ControlResponse {
    pub retcode: i32,
    pub sub_status: i32,
    pub data: TransferBuffer,
}

impl WireRecord for ControlResponse {
    const FORMAT: &'static str = "iic#";

    fn encode(&self, w: &mut PayloadWriter) {
        w.put_i32(self.retcode);
        w.put_i32(self.sub_status);
        w.begin_array(MAX_DATA);
        w.put_bytes(&self.data.bytes);
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        let retcode = r.get_i32()?;
        let sub_status = r.get_i32()?;
        r.expect_array(MAX_DATA)?;
        let mut data = TransferBuffer::default();
        r.get_bytes(&mut data.bytes)?;
        Ok(Self {
            retcode,
            sub_status,
            data,
        })
    }
}

/// bulk-transfer request (`S($(iiii))ciii`).
///
/// `transferred` is vestigial in the request direction; it stays on the
/// wire for schema compatibility and the server ignores it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BulkRequest {
    pub handle: DeviceHandle,
    pub endpoint: i8,
    pub length: i32,
    pub transferred: i32,
    pub timeout: i32,
}

impl WireRecord for BulkRequest {
    const FORMAT: &'static str = "S($(iiii))ciii";

    fn encode(&self, w: &mut PayloadWriter) {
        self.handle.encode(w);
        w.put_i8(self.endpoint);
        w.put_i32(self.length);
        w.put_i32(self.transferred);
        w.put_i32(self.timeout);
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            handle: DeviceHandle::decode(r)?,
            endpoint: r.get_i8()?,
            length: r.get_i32()?,
            transferred: r.get_i32()?,
            timeout: r.get_i32()?,
        })
    }
}

/// bulk-transfer response (`iic#`). Here `transferred` is meaningful:
/// bytes actually moved by the adapter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BulkResponse {
    pub retcode: i32,
    pub transferred: i32,
    pub data: TransferBuffer,
}

impl WireRecord for BulkResponse {
    const FORMAT: &'static str = "iic#";

    fn encode(&self, w: &mut PayloadWriter) {
        w.put_i32(self.retcode);
        w.put_i32(self.transferred);
        w.begin_array(MAX_DATA);
        w.put_bytes(&self.data.bytes);
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        let retcode = r.get_i32()?;
        let transferred = r.get_i32()?;
        r.expect_array(MAX_DATA)?;
        let mut data = TransferBuffer::default();
        r.get_bytes(&mut data.bytes)?;
        Ok(Self {
            retcode,
            transferred,
            data,
        })
    }
}

/// clear-halt request (`S($(iiii))c`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClearHaltRequest {
    pub handle: DeviceHandle,
    pub endpoint: i8,
}

impl WireRecord for ClearHaltRequest {
    const FORMAT: &'static str = "S($(iiii))c";

    fn encode(&self, w: &mut PayloadWriter) {
        self.handle.encode(w);
        w.put_i8(self.endpoint);
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            handle: DeviceHandle::decode(r)?,
            endpoint: r.get_i8()?,
        })
    }
}

/// get-string-descriptor-ascii request (`S($(iiii))ii`).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StringDescriptorRequest {
    pub handle: DeviceHandle,
    pub index: i32,
    pub length: i32,
}

impl WireRecord for StringDescriptorRequest {
    const FORMAT: &'static str = "S($(iiii))ii";

    fn encode(&self, w: &mut PayloadWriter) {
        self.handle.encode(w);
        w.put_i32(self.index);
        w.put_i32(self.length);
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            handle: DeviceHandle::decode(r)?,
            index: r.get_i32()?,
            length: r.get_i32()?,
        })
    }
}

/// get-string-descriptor-ascii response (`ic#`). `retcode` is the string
/// length in bytes, or `-1`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StringDescriptorResponse {
    pub retcode: i32,
    pub data: TransferBuffer,
}

impl WireRecord for StringDescriptorResponse {
    const FORMAT: &'static str = "ic#";

    fn encode(&self, w: &mut PayloadWriter) {
        w.put_i32(self.retcode);
        w.begin_array(MAX_DATA);
        w.put_bytes(&self.data.bytes);
    }

    fn decode(r: &mut PayloadReader) -> Result<Self> {
        let retcode = r.get_i32()?;
        r.expect_array(MAX_DATA)?;
        let mut data = TransferBuffer::default();
        r.get_bytes(&mut data.bytes)?;
        Ok(Self { retcode, data })
    }
}
