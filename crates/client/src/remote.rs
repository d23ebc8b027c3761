//! Client stub surface
//!
//! One method per remote operation. Every stub follows the same shape:
//! write the selector frame, write the request frame when the schema has
//! one, read the response frame when the schema has one, return the typed
//! result. Calls must complete one at a time; the protocol has no
//! correlation ids.

use protocol::{
    AltSettingRequest, BulkRequest, BulkResponse, ClearHaltRequest, ControlRequest,
    ControlResponse, DescriptorResponse, DeviceDescriptor, DeviceHandle, DeviceId, DeviceList,
    HandleIntRequest, Operation, OpenResponse, Result, Role, Session, Status, StatusResponse,
    StringDescriptorRequest, StringDescriptorResponse, VidPidRequest,
};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

/// A remote USB host controller, driven over one session.
pub struct RemoteUsb<S> {
    session: Session<S>,
}

impl RemoteUsb<TcpStream> {
    /// Connect to a server and wrap the stream in a client-role session.
    pub fn connect<A: ToSocketAddrs>(addr: A) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        Ok(Self::new(Session::from_tcp(stream, Role::Client)))
    }
}

impl<S: Read + Write> RemoteUsb<S> {
    pub fn new(session: Session<S>) -> Self {
        Self { session }
    }

    /// Create the server-side USB context. Must precede everything else.
    pub fn init(&mut self) -> Result<Status> {
        self.session.send_operation(Operation::Init)?;
        let reply: StatusResponse = self.session.recv()?;
        Ok(reply.status)
    }

    /// Destroy the server-side USB context. No response travels back.
    pub fn exit(&mut self) -> Result<()> {
        self.session.send_operation(Operation::Exit)
    }

    /// Fetch the current device list. Identities in it stay valid until
    /// the next fetch or `exit`.
    pub fn device_list(&mut self) -> Result<DeviceList> {
        self.session.send_operation(Operation::GetDeviceList)?;
        self.session.recv()
    }

    /// Read the device descriptor for an identity from the last list.
    pub fn device_descriptor(&mut self, dev: DeviceId) -> Result<(DeviceDescriptor, Status)> {
        self.session
            .send_operation(Operation::GetDeviceDescriptor)?;
        self.session.send(&dev)?;
        let reply: DescriptorResponse = self.session.recv()?;
        Ok((reply.descriptor, reply.status))
    }

    /// Open the first device matching vendor/product. `None` when the
    /// server answered with the all-zero failure handle.
    pub fn open_with_vid_pid(
        &mut self,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Option<DeviceHandle>> {
        self.session.send_operation(Operation::OpenWithVidPid)?;
        self.session.send(&VidPidRequest {
            vendor_id: vendor_id as i32,
            product_id: product_id as i32,
        })?;
        let handle: DeviceHandle = self.session.recv()?;
        Ok(if handle.is_null() { None } else { Some(handle) })
    }

    /// Open a device from the last device list.
    pub fn open(&mut self, dev: DeviceId) -> Result<(DeviceHandle, Status)> {
        self.session.send_operation(Operation::Open)?;
        self.session.send(&dev)?;
        let reply: OpenResponse = self.session.recv()?;
        Ok((reply.handle, reply.status))
    }

    /// Close the server's current handle. No response travels back.
    pub fn close(&mut self) -> Result<()> {
        self.session.send_operation(Operation::Close)
    }

    pub fn claim_interface(&mut self, handle: DeviceHandle, interface: i32) -> Result<Status> {
        self.handle_int_call(Operation::ClaimInterface, handle, interface)
    }

    pub fn release_interface(&mut self, handle: DeviceHandle, interface: i32) -> Result<Status> {
        self.handle_int_call(Operation::ReleaseInterface, handle, interface)
    }

    /// Query the active configuration. The value itself never travels
    /// back; only the status does.
    pub fn get_configuration(&mut self, handle: DeviceHandle, config: i32) -> Result<Status> {
        self.handle_int_call(Operation::GetConfiguration, handle, config)
    }

    pub fn set_configuration(&mut self, handle: DeviceHandle, config: i32) -> Result<Status> {
        self.handle_int_call(Operation::SetConfiguration, handle, config)
    }

    pub fn set_interface_alt_setting(
        &mut self,
        handle: DeviceHandle,
        interface: i32,
        alt_setting: i32,
    ) -> Result<Status> {
        self.session
            .send_operation(Operation::SetInterfaceAltSetting)?;
        self.session.send(&AltSettingRequest {
            handle,
            interface,
            alt_setting,
        })?;
        let reply: StatusResponse = self.session.recv()?;
        Ok(reply.status)
    }

    pub fn reset_device(&mut self, handle: DeviceHandle) -> Result<Status> {
        self.session.send_operation(Operation::ResetDevice)?;
        self.session.send(&handle)?;
        let reply: StatusResponse = self.session.recv()?;
        Ok(reply.status)
    }

    /// Control transfer on endpoint 0. `length` is the requested size
    /// (capped server-side at the wire capacity); the response carries
    /// the adapter retcode, the convenience sub-status, and the data.
    #[allow(clippy::too_many_arguments)]
    pub fn control_transfer(
        &mut self,
        handle: DeviceHandle,
        request_type: i32,
        request: i32,
        value: i32,
        index: i32,
        length: i32,
        timeout: i32,
    ) -> Result<ControlResponse> {
        self.session.send_operation(Operation::ControlTransfer)?;
        self.session.send(&ControlRequest {
            handle,
            request_type,
            request,
            value,
            index,
            length,
            timeout,
        })?;
        self.session.recv()
    }

    /// Bulk transfer. The endpoint's direction bit picks read or write.
    pub fn bulk_transfer(
        &mut self,
        handle: DeviceHandle,
        endpoint: i8,
        length: i32,
        timeout: i32,
    ) -> Result<BulkResponse> {
        self.session.send_operation(Operation::BulkTransfer)?;
        self.session.send(&BulkRequest {
            handle,
            endpoint,
            length,
            transferred: 0,
            timeout,
        })?;
        self.session.recv()
    }

    pub fn clear_halt(&mut self, handle: DeviceHandle, endpoint: i8) -> Result<Status> {
        self.session.send_operation(Operation::ClearHalt)?;
        self.session.send(&ClearHaltRequest { handle, endpoint })?;
        let reply: StatusResponse = self.session.recv()?;
        Ok(reply.status)
    }

    /// Read a string descriptor as ASCII bytes. `retcode` in the reply is
    /// the byte count, or `-1`.
    pub fn string_descriptor_ascii(
        &mut self,
        handle: DeviceHandle,
        index: i32,
        length: i32,
    ) -> Result<StringDescriptorResponse> {
        self.session
            .send_operation(Operation::GetStringDescriptorAscii)?;
        self.session.send(&StringDescriptorRequest {
            handle,
            index,
            length,
        })?;
        self.session.recv()
    }

    fn handle_int_call(
        &mut self,
        op: Operation,
        handle: DeviceHandle,
        arg: i32,
    ) -> Result<Status> {
        self.session.send_operation(op)?;
        self.session.send(&HandleIntRequest { handle, arg })?;
        let reply: StatusResponse = self.session.recv()?;
        Ok(reply.status)
    }
}
