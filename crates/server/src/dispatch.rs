//! Server state and dispatcher
//!
//! One sequential loop per connection: read a selector frame, decode the
//! request frame if the operation has one, call the USB adapter, write
//! the response frame if the operation has one. The dispatcher owns the
//! adapter and at most one open native handle at a time; any open closes
//! the previous handle first.
//!
//! Handle identity on the wire is advisory: every post-open operation
//! acts on the one current handle, whatever handle record the client
//! sent. Lookup by device identity goes through re-enumeration and a
//! `session_id` match; a miss answers `FAILURE` and keeps the session
//! alive. Only transport errors end the loop with an error.

use crate::usb::{UsbHost, UsbHostError};
use protocol::{
    AltSettingRequest, BulkRequest, BulkResponse, ClearHaltRequest, ControlRequest,
    ControlResponse, DescriptorResponse, DeviceHandle, DeviceId, DeviceList,
    HandleIntRequest, Operation, OpenResponse, Session, Status, StatusResponse,
    StringDescriptorRequest, StringDescriptorResponse, TransferBuffer, VidPidRequest, MAX_DATA,
    MAX_DEVS,
};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, warn};

/// Serves one connection against a USB adapter.
pub struct Dispatcher<H: UsbHost> {
    host: H,
    current: Option<H::Handle>,
}

impl<H: UsbHost> Dispatcher<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            current: None,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Serve calls until the peer disconnects cleanly between calls.
    ///
    /// Transport errors (torn frames, bad magic, schema mismatch,
    /// unknown selectors) propagate out; the caller drops the
    /// connection. USB-level failures never surface here.
    pub fn serve<S: Read + Write>(&mut self, session: &mut Session<S>) -> protocol::Result<()> {
        while let Some(op) = session.recv_operation()? {
            debug!(?op, "dispatching");
            match op {
                Operation::Init => self.handle_init(session)?,
                Operation::Exit => self.handle_exit(),
                Operation::GetDeviceList => self.handle_get_device_list(session)?,
                Operation::GetDeviceDescriptor => self.handle_get_device_descriptor(session)?,
                Operation::OpenWithVidPid => self.handle_open_with_vid_pid(session)?,
                Operation::Open => self.handle_open(session)?,
                Operation::Close => self.handle_close(),
                Operation::ClaimInterface => self.handle_claim_interface(session)?,
                Operation::ReleaseInterface => self.handle_release_interface(session)?,
                Operation::GetConfiguration => self.handle_get_configuration(session)?,
                Operation::SetConfiguration => self.handle_set_configuration(session)?,
                Operation::SetInterfaceAltSetting => self.handle_set_alt_setting(session)?,
                Operation::ResetDevice => self.handle_reset_device(session)?,
                Operation::ControlTransfer => self.handle_control_transfer(session)?,
                Operation::BulkTransfer => self.handle_bulk_transfer(session)?,
                Operation::ClearHalt => self.handle_clear_halt(session)?,
                Operation::GetStringDescriptorAscii => self.handle_string_descriptor(session)?,
            }
        }
        debug!("peer disconnected");
        Ok(())
    }

    fn handle_init<S: Write>(&mut self, session: &mut Session<S>) -> protocol::Result<()> {
        let status = match self.host.init() {
            Ok(()) => Status::Success,
            Err(e) => {
                warn!("USB init failed: {e}");
                Status::Failure
            }
        };
        session.send(&StatusResponse::new(status))
    }

    /// No response on the wire; the context (and any open handle) is torn
    /// down and the loop keeps serving until the peer hangs up.
    fn handle_exit(&mut self) {
        self.close_current();
        self.host.exit();
    }

    fn handle_get_device_list<S: Write>(
        &mut self,
        session: &mut Session<S>,
    ) -> protocol::Result<()> {
        let mut list = DeviceList::default();
        match self.host.devices() {
            Ok(devices) => {
                for device in &devices {
                    if list.n as usize == MAX_DEVS {
                        // Devices beyond capacity are silently dropped
                        break;
                    }
                    match self.host.identify(device) {
                        Ok(id) => list.push(id),
                        Err(e) => debug!("skipping unidentifiable device: {e}"),
                    }
                }
            }
            Err(e) => debug!("device enumeration unavailable: {e}"),
        }
        debug!(n = list.n, "device list");
        session.send(&list)
    }

    fn handle_get_device_descriptor<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
    ) -> protocol::Result<()> {
        let wanted: DeviceId = session.recv()?;
        let response = match self.find_device(wanted.session_id) {
            Some(device) => match self.host.descriptor(&device) {
                Ok(descriptor) => DescriptorResponse {
                    descriptor,
                    status: Status::Success,
                },
                Err(e) => {
                    warn!("descriptor read failed: {e}");
                    DescriptorResponse::default()
                }
            },
            None => {
                debug!(session_id = wanted.session_id, "no such device");
                DescriptorResponse::default()
            }
        };
        session.send(&response)
    }

    fn handle_open_with_vid_pid<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
    ) -> protocol::Result<()> {
        let req: VidPidRequest = session.recv()?;
        debug!("open by vid/pid {:04x}:{:04x}", req.vendor_id, req.product_id);

        self.close_current();

        // Failure shape is an all-zero handle; there is no status field.
        let mut response = DeviceHandle::default();
        if let Some((handle, id)) = self
            .host
            .open_vid_pid(req.vendor_id as u16, req.product_id as u16)
        {
            self.current = Some(handle);
            response = DeviceHandle::new(id);
        }
        session.send(&response)
    }

    fn handle_open<S: Read + Write>(&mut self, session: &mut Session<S>) -> protocol::Result<()> {
        let wanted: DeviceId = session.recv()?;
        let response = match self.find_device(wanted.session_id) {
            Some(device) => {
                self.close_current();
                match self.host.open(&device) {
                    Ok(handle) => {
                        self.current = Some(handle);
                        let id = self.host.identify(&device).unwrap_or(wanted);
                        OpenResponse {
                            handle: DeviceHandle::new(id),
                            status: Status::Success,
                        }
                    }
                    Err(e) => {
                        warn!("open failed: {e}");
                        OpenResponse::default()
                    }
                }
            }
            None => {
                debug!(session_id = wanted.session_id, "no such device");
                OpenResponse::default()
            }
        };
        session.send(&response)
    }

    /// No request payload and no response; closing without an open
    /// handle is a no-op.
    fn handle_close(&mut self) {
        self.close_current();
    }

    fn handle_claim_interface<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
    ) -> protocol::Result<()> {
        let req: HandleIntRequest = session.recv()?;
        debug!(interface = req.arg, "claim interface");
        let status = self.with_handle(|host, handle| host.claim_interface(handle, req.arg));
        session.send(&StatusResponse::new(status))
    }

    fn handle_release_interface<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
    ) -> protocol::Result<()> {
        let req: HandleIntRequest = session.recv()?;
        debug!(interface = req.arg, "release interface");
        let status = self.with_handle(|host, handle| host.release_interface(handle, req.arg));
        session.send(&StatusResponse::new(status))
    }

    /// The configuration value the adapter reports is read and dropped;
    /// the response carries only the status. Changing that would change
    /// the wire contract.
    fn handle_get_configuration<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
    ) -> protocol::Result<()> {
        let _req: HandleIntRequest = session.recv()?;
        let status = self.with_handle(|host, handle| {
            host.get_configuration(handle).map(|_config| ())
        });
        session.send(&StatusResponse::new(status))
    }

    fn handle_set_configuration<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
    ) -> protocol::Result<()> {
        let req: HandleIntRequest = session.recv()?;
        debug!(config = req.arg, "set configuration");
        let status = self.with_handle(|host, handle| host.set_configuration(handle, req.arg));
        session.send(&StatusResponse::new(status))
    }

    fn handle_set_alt_setting<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
    ) -> protocol::Result<()> {
        let req: AltSettingRequest = session.recv()?;
        debug!(
            interface = req.interface,
            alt_setting = req.alt_setting,
            "set alt setting"
        );
        let status = self.with_handle(|host, handle| {
            host.set_interface_alt_setting(handle, req.interface, req.alt_setting)
        });
        session.send(&StatusResponse::new(status))
    }

    fn handle_reset_device<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
    ) -> protocol::Result<()> {
        let _handle: DeviceHandle = session.recv()?;
        let status = self.with_handle(|host, handle| host.reset_device(handle));
        session.send(&StatusResponse::new(status))
    }

    fn handle_control_transfer<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
    ) -> protocol::Result<()> {
        let req: ControlRequest = session.recv()?;
        let length = clamp_length(req.length);
        let mut data = TransferBuffer::default();

        let retcode = match self.current.as_mut() {
            Some(handle) => {
                // The request carries no data bytes: OUT transfers send
                // a zeroed buffer of the requested length.
                match self.host.control_transfer(
                    handle,
                    req.request_type as u8,
                    req.request as u8,
                    req.value as u16,
                    req.index as u16,
                    &mut data.bytes[..length],
                    timeout_from_ms(req.timeout),
                ) {
                    Ok(moved) => moved as i32,
                    Err(e) => {
                        warn!("control transfer failed: {e}");
                        Status::Failure.as_i32()
                    }
                }
            }
            None => {
                debug!("control transfer without open handle");
                Status::Failure.as_i32()
            }
        };

        // Convenience status byte for callers that expect one at offset 4
        let sub_status = if retcode >= 5 {
            data.bytes[4] as i8 as i32
        } else {
            0
        };

        session.send(&ControlResponse {
            retcode,
            sub_status,
            data,
        })
    }

    fn handle_bulk_transfer<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
    ) -> protocol::Result<()> {
        // `transferred` in the request is vestigial and ignored
        let req: BulkRequest = session.recv()?;
        let length = clamp_length(req.length);
        let mut data = TransferBuffer::default();

        let (retcode, transferred) = match self.current.as_mut() {
            Some(handle) => match self.host.bulk_transfer(
                handle,
                req.endpoint as u8,
                &mut data.bytes[..length],
                timeout_from_ms(req.timeout),
            ) {
                Ok(moved) => (Status::Success.as_i32(), moved as i32),
                Err(e) => {
                    warn!("bulk transfer failed: {e}");
                    (Status::Failure.as_i32(), 0)
                }
            },
            None => {
                debug!("bulk transfer without open handle");
                (Status::Failure.as_i32(), 0)
            }
        };

        session.send(&BulkResponse {
            retcode,
            transferred,
            data,
        })
    }

    fn handle_clear_halt<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
    ) -> protocol::Result<()> {
        let req: ClearHaltRequest = session.recv()?;
        debug!(endpoint = req.endpoint, "clear halt");
        let status = self.with_handle(|host, handle| host.clear_halt(handle, req.endpoint as u8));
        session.send(&StatusResponse::new(status))
    }

    fn handle_string_descriptor<S: Read + Write>(
        &mut self,
        session: &mut Session<S>,
    ) -> protocol::Result<()> {
        let req: StringDescriptorRequest = session.recv()?;
        let mut response = StringDescriptorResponse {
            retcode: Status::Failure.as_i32(),
            data: TransferBuffer::default(),
        };

        if let Some(handle) = self.current.as_mut() {
            match self.host.string_descriptor_ascii(handle, req.index as u8) {
                Ok(text) => {
                    let length = clamp_length(req.length).min(text.len());
                    response.data = TransferBuffer::from_slice(&text.as_bytes()[..length]);
                    response.retcode = length as i32;
                }
                Err(e) => warn!("string descriptor read failed: {e}"),
            }
        } else {
            debug!("string descriptor without open handle");
        }
        session.send(&response)
    }

    /// Run a handle-scoped adapter call, mapping a missing handle or an
    /// adapter error to `FAILURE`.
    fn with_handle<F>(&mut self, op: F) -> Status
    where
        F: FnOnce(&mut H, &mut H::Handle) -> Result<(), UsbHostError>,
    {
        match self.current.as_mut() {
            Some(handle) => match op(&mut self.host, handle) {
                Ok(()) => Status::Success,
                Err(e) => {
                    warn!("USB operation failed: {e}");
                    Status::Failure
                }
            },
            None => {
                debug!("operation requires an open handle");
                Status::Failure
            }
        }
    }

    /// Re-enumerate and match on session id. The identity is only valid
    /// against the current device list.
    fn find_device(&mut self, session_id: i32) -> Option<H::Device> {
        let devices = match self.host.devices() {
            Ok(devices) => devices,
            Err(e) => {
                debug!("device enumeration unavailable: {e}");
                return None;
            }
        };
        devices.into_iter().find(|device| {
            self.host
                .identify(device)
                .map(|id| id.session_id == session_id)
                .unwrap_or(false)
        })
    }

    fn close_current(&mut self) {
        if let Some(handle) = self.current.take() {
            self.host.close(handle);
        }
    }
}

impl<H: UsbHost> Drop for Dispatcher<H> {
    fn drop(&mut self) {
        self.close_current();
    }
}

fn clamp_length(length: i32) -> usize {
    (length.max(0) as usize).min(MAX_DATA)
}

fn timeout_from_ms(timeout: i32) -> Duration {
    Duration::from_millis(timeout.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::mock::{make_device, MockHost};
    use protocol::{read_record, write_frame, write_record, Role, WireRecord};
    use std::io::Cursor;

    /// In-memory stand-in for the socket: reads scripted client frames,
    /// captures the server's response frames.
    struct ScriptedStream {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl std::io::Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl std::io::Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Builder for the client side of a session, one frame at a time.
    struct Script {
        frames: Vec<u8>,
    }

    impl Script {
        fn new() -> Self {
            Self { frames: Vec::new() }
        }

        fn call(mut self, op: Operation) -> Self {
            write_record(&mut self.frames, &op).unwrap();
            self
        }

        fn then<T: WireRecord>(mut self, record: &T) -> Self {
            write_record(&mut self.frames, record).unwrap();
            self
        }

        fn raw(mut self, fmt: &str, payload: &[u8]) -> Self {
            write_frame(&mut self.frames, fmt, payload).unwrap();
            self
        }

        /// Serve the scripted frames; returns the serve result and the
        /// captured response stream.
        fn run<H: UsbHost>(
            self,
            dispatcher: &mut Dispatcher<H>,
        ) -> (protocol::Result<()>, Cursor<Vec<u8>>) {
            let stream = ScriptedStream {
                input: Cursor::new(self.frames),
                output: Vec::new(),
            };
            let mut session = Session::new(stream, Role::Server);
            let result = dispatcher.serve(&mut session);
            (result, Cursor::new(session.into_inner().output))
        }
    }

    fn recv<T: WireRecord>(wire: &mut Cursor<Vec<u8>>) -> T {
        read_record(wire).expect("response frame")
    }

    fn device_id(session_id: i32) -> DeviceId {
        DeviceId {
            session_id,
            ..DeviceId::default()
        }
    }

    fn two_device_host() -> MockHost {
        let mut host = MockHost::new();
        host.push_device(make_device(1, 4, 0x11, 0x05AC, 0x1297));
        host.push_device(make_device(1, 5, 0x12, 0x05AC, 0x12A8));
        host
    }

    #[test]
    fn test_bring_up() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        let (result, mut wire) = Script::new()
            .call(Operation::Init)
            .call(Operation::GetDeviceList)
            .run(&mut dispatcher);
        result.unwrap();

        let init: StatusResponse = recv(&mut wire);
        assert!(init.status.is_success());

        let list: DeviceList = recv(&mut wire);
        assert_eq!(list.n, 2);
        assert_eq!(
            list.entries()[0],
            DeviceId {
                bus_number: 1,
                device_address: 4,
                num_configurations: 1,
                session_id: 0x11,
            }
        );
        assert_eq!(list.entries()[1].session_id, 0x12);
    }

    #[test]
    fn test_device_list_before_init_is_empty() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        let (result, mut wire) = Script::new()
            .call(Operation::GetDeviceList)
            .run(&mut dispatcher);
        result.unwrap();

        let list: DeviceList = recv(&mut wire);
        assert_eq!(list.n, 0);
    }

    #[test]
    fn test_descriptor_fetch() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        let (result, mut wire) = Script::new()
            .call(Operation::Init)
            .call(Operation::GetDeviceDescriptor)
            .then(&device_id(0x12))
            .run(&mut dispatcher);
        result.unwrap();

        let _init: StatusResponse = recv(&mut wire);
        let response: DescriptorResponse = recv(&mut wire);
        assert!(response.status.is_success());
        assert_eq!(response.descriptor.bLength, 18);
        assert_eq!(response.descriptor.idVendor, 0x05AC);
        assert_eq!(response.descriptor.idProduct, 0x12A8);
        assert_eq!(response.descriptor.bNumConfigurations, 1);
    }

    #[test]
    fn test_descriptor_for_unknown_session_fails() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        let (result, mut wire) = Script::new()
            .call(Operation::Init)
            .call(Operation::GetDeviceDescriptor)
            .then(&device_id(0x99))
            .run(&mut dispatcher);
        result.unwrap();

        let _init: StatusResponse = recv(&mut wire);
        let response: DescriptorResponse = recv(&mut wire);
        assert_eq!(response.status, Status::Failure);
        assert_eq!(response.descriptor, Default::default());
    }

    #[test]
    fn test_open_matches_on_session_id_only() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        // Stale informational fields; only session_id counts for lookup
        let stale = DeviceId {
            bus_number: 9,
            device_address: 9,
            num_configurations: 9,
            session_id: 0x12,
        };
        let (result, mut wire) = Script::new()
            .call(Operation::Init)
            .call(Operation::Open)
            .then(&stale)
            .call(Operation::ClaimInterface)
            .then(&HandleIntRequest {
                handle: DeviceHandle::new(stale),
                arg: 0,
            })
            .run(&mut dispatcher);
        result.unwrap();

        let _init: StatusResponse = recv(&mut wire);
        let open: OpenResponse = recv(&mut wire);
        assert!(open.status.is_success());
        // The echoed handle carries the device's real identity
        assert_eq!(open.handle.dev.bus_number, 1);
        assert_eq!(open.handle.dev.device_address, 5);
        assert_eq!(open.handle.dev.session_id, 0x12);

        let claim: StatusResponse = recv(&mut wire);
        assert!(claim.status.is_success());
    }

    #[test]
    fn test_open_unknown_session_fails() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        let (result, mut wire) = Script::new()
            .call(Operation::Init)
            .call(Operation::Open)
            .then(&device_id(0x77))
            .run(&mut dispatcher);
        result.unwrap();

        let _init: StatusResponse = recv(&mut wire);
        let open: OpenResponse = recv(&mut wire);
        assert_eq!(open.status, Status::Failure);
        assert!(open.handle.is_null());
        assert_eq!(dispatcher.host().opens, 0);
    }

    #[test]
    fn test_stale_handle_fails_but_session_stays_usable() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        let (result, mut wire) = Script::new()
            .call(Operation::Init)
            .call(Operation::Open)
            .then(&device_id(0x12))
            .run(&mut dispatcher);
        result.unwrap();
        let _init: StatusResponse = recv(&mut wire);
        let open: OpenResponse = recv(&mut wire);
        assert!(open.status.is_success());

        // The device vanishes while its handle is still open
        dispatcher.host_mut().remove_device(0x12);

        let (result, mut wire) = Script::new()
            .call(Operation::ClaimInterface)
            .then(&HandleIntRequest {
                handle: open.handle,
                arg: 0,
            })
            .call(Operation::GetDeviceList)
            .run(&mut dispatcher);
        result.unwrap();

        let claim: StatusResponse = recv(&mut wire);
        assert_eq!(claim.status, Status::Failure);

        // Same connection keeps working
        let list: DeviceList = recv(&mut wire);
        assert_eq!(list.n, 1);
        assert_eq!(list.entries()[0].session_id, 0x11);
    }

    #[test]
    fn test_reopen_replaces_native_handle() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        let vid_pid = VidPidRequest {
            vendor_id: 0x05AC,
            product_id: 0x12A8,
        };
        let (result, mut wire) = Script::new()
            .call(Operation::OpenWithVidPid)
            .then(&vid_pid)
            .call(Operation::OpenWithVidPid)
            .then(&vid_pid)
            .run(&mut dispatcher);
        // OpenWithVidPid before init: context missing, null handle, but
        // still a clean exchange
        result.unwrap();
        let first: DeviceHandle = recv(&mut wire);
        assert!(first.is_null());

        let mut dispatcher = Dispatcher::new(two_device_host());
        let (result, mut wire) = Script::new()
            .call(Operation::Init)
            .call(Operation::OpenWithVidPid)
            .then(&vid_pid)
            .call(Operation::OpenWithVidPid)
            .then(&vid_pid)
            .run(&mut dispatcher);
        result.unwrap();

        let _init: StatusResponse = recv(&mut wire);
        let first: DeviceHandle = recv(&mut wire);
        let second: DeviceHandle = recv(&mut wire);
        assert_eq!(first.dev.session_id, 0x12);
        assert_eq!(second.dev.session_id, 0x12);

        let host = dispatcher.host();
        assert_eq!(host.opens, 2);
        assert_eq!(host.closes, 1);
        // Never more than one native handle open at once
        assert_eq!(host.max_open_handles, 1);
    }

    #[test]
    fn test_open_vid_pid_no_match_returns_null_handle() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        let (result, mut wire) = Script::new()
            .call(Operation::Init)
            .call(Operation::OpenWithVidPid)
            .then(&VidPidRequest {
                vendor_id: 0xDEAD,
                product_id: 0xBEEF,
            })
            .run(&mut dispatcher);
        result.unwrap();

        let _init: StatusResponse = recv(&mut wire);
        let handle: DeviceHandle = recv(&mut wire);
        assert!(handle.is_null());
    }

    #[test]
    fn test_control_transfer_extracts_sub_status() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        dispatcher
            .host_mut()
            .set_control_data(&[1, 2, 3, 4, 0x17, 6, 7, 8]);

        let control = |length| ControlRequest {
            handle: DeviceHandle::new(device_id(0x12)),
            request_type: 0x80,
            request: 0x06,
            value: 0x0100,
            index: 0,
            length,
            timeout: 1000,
        };
        let (result, mut wire) = Script::new()
            .call(Operation::Init)
            .call(Operation::Open)
            .then(&device_id(0x12))
            .call(Operation::ControlTransfer)
            .then(&control(8))
            .call(Operation::ControlTransfer)
            .then(&control(4))
            .run(&mut dispatcher);
        result.unwrap();

        let _init: StatusResponse = recv(&mut wire);
        let _open: OpenResponse = recv(&mut wire);

        // 8 bytes moved: byte 4 is surfaced as the sub-status
        let full: ControlResponse = recv(&mut wire);
        assert_eq!(full.retcode, 8);
        assert_eq!(full.sub_status, 0x17);
        assert_eq!(full.data.data(8), &[1, 2, 3, 4, 0x17, 6, 7, 8]);

        // 4 bytes moved: below the threshold, sub-status stays zero
        let short: ControlResponse = recv(&mut wire);
        assert_eq!(short.retcode, 4);
        assert_eq!(short.sub_status, 0);
    }

    #[test]
    fn test_control_transfer_without_handle_fails() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        let (result, mut wire) = Script::new()
            .call(Operation::Init)
            .call(Operation::ControlTransfer)
            .then(&ControlRequest {
                length: 8,
                ..Default::default()
            })
            .run(&mut dispatcher);
        result.unwrap();

        let _init: StatusResponse = recv(&mut wire);
        let response: ControlResponse = recv(&mut wire);
        assert_eq!(response.retcode, -1);
        assert_eq!(response.sub_status, 0);
    }

    #[test]
    fn test_bulk_transfer_clamps_to_capacity() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        let (result, mut wire) = Script::new()
            .call(Operation::Init)
            .call(Operation::Open)
            .then(&device_id(0x12))
            .call(Operation::BulkTransfer)
            .then(&BulkRequest {
                handle: DeviceHandle::new(device_id(0x12)),
                endpoint: -127, // 0x81: IN
                length: 4096,
                transferred: 0,
                timeout: 5000,
            })
            .run(&mut dispatcher);
        result.unwrap();

        let _init: StatusResponse = recv(&mut wire);
        let _open: OpenResponse = recv(&mut wire);
        let bulk: BulkResponse = recv(&mut wire);
        assert_eq!(bulk.retcode, 0);
        assert_eq!(bulk.transferred, MAX_DATA as i32);
        assert!(bulk.data.data(MAX_DATA).iter().all(|b| *b == 0xB5));
    }

    #[test]
    fn test_string_descriptor_respects_requested_length() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        dispatcher.host_mut().set_string(2, "iPad Retina");

        let request = |length| StringDescriptorRequest {
            handle: DeviceHandle::new(device_id(0x12)),
            index: 2,
            length,
        };
        let (result, mut wire) = Script::new()
            .call(Operation::Init)
            .call(Operation::Open)
            .then(&device_id(0x12))
            .call(Operation::GetStringDescriptorAscii)
            .then(&request(255))
            .call(Operation::GetStringDescriptorAscii)
            .then(&request(4))
            .run(&mut dispatcher);
        result.unwrap();

        let _init: StatusResponse = recv(&mut wire);
        let _open: OpenResponse = recv(&mut wire);

        let full: StringDescriptorResponse = recv(&mut wire);
        assert_eq!(full.retcode, 11);
        assert_eq!(full.data.data(11), b"iPad Retina");

        let truncated: StringDescriptorResponse = recv(&mut wire);
        assert_eq!(truncated.retcode, 4);
        assert_eq!(truncated.data.data(4), b"iPad");
    }

    #[test]
    fn test_config_and_interface_ops() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        let handle = DeviceHandle::new(device_id(0x12));
        let (result, mut wire) = Script::new()
            .call(Operation::Init)
            .call(Operation::Open)
            .then(&device_id(0x12))
            .call(Operation::GetConfiguration)
            .then(&HandleIntRequest { handle, arg: 0 })
            .call(Operation::SetConfiguration)
            .then(&HandleIntRequest { handle, arg: 1 })
            .call(Operation::SetInterfaceAltSetting)
            .then(&AltSettingRequest {
                handle,
                interface: 0,
                alt_setting: 1,
            })
            .call(Operation::ReleaseInterface)
            .then(&HandleIntRequest { handle, arg: 0 })
            .call(Operation::ResetDevice)
            .then(&handle)
            .call(Operation::ClearHalt)
            .then(&ClearHaltRequest {
                handle,
                endpoint: 0x02,
            })
            .run(&mut dispatcher);
        result.unwrap();

        let _init: StatusResponse = recv(&mut wire);
        let _open: OpenResponse = recv(&mut wire);
        for _ in 0..6 {
            let status: StatusResponse = recv(&mut wire);
            assert!(status.status.is_success());
        }
    }

    #[test]
    fn test_close_without_handle_is_noop() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        let (result, wire) = Script::new().call(Operation::Close).run(&mut dispatcher);
        result.unwrap();
        // close has no response frame
        assert!(wire.get_ref().is_empty());
    }

    #[test]
    fn test_exit_tears_down_context_and_handle() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        let (result, mut wire) = Script::new()
            .call(Operation::Init)
            .call(Operation::Open)
            .then(&device_id(0x11))
            .call(Operation::Exit)
            .call(Operation::GetDeviceList)
            .run(&mut dispatcher);
        result.unwrap();

        let _init: StatusResponse = recv(&mut wire);
        let open: OpenResponse = recv(&mut wire);
        assert!(open.status.is_success());

        // exit produced no frame; the next response is the post-exit list
        let list: DeviceList = recv(&mut wire);
        assert_eq!(list.n, 0);
        assert_eq!(dispatcher.host().open_handles, 0);
    }

    #[test]
    fn test_unknown_selector_is_fatal() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        let (result, _wire) = Script::new()
            .raw("i", &99i32.to_le_bytes())
            .run(&mut dispatcher);
        assert!(matches!(
            result,
            Err(protocol::WireError::UnknownOperation(99))
        ));
    }

    #[test]
    fn test_malformed_request_is_fatal() {
        let mut dispatcher = Dispatcher::new(two_device_host());
        // claim-interface announced, but the request frame carries the
        // wrong schema
        let (result, _wire) = Script::new()
            .call(Operation::ClaimInterface)
            .raw("ii", &[0u8; 8])
            .run(&mut dispatcher);
        assert!(matches!(
            result,
            Err(protocol::WireError::FormatMismatch { .. })
        ));
    }
}
