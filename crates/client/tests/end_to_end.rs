//! Full-loop tests: real client stubs, real TCP, real dispatcher
//!
//! A server thread accepts one loopback connection and serves it from a
//! scripted USB adapter; the test drives the complete call surface
//! through the client stubs and then checks the adapter's handle
//! accounting.

use client::RemoteUsb;
use protocol::{DeviceId, Status, Role, Session, MAX_DATA};
use server::usb::mock::{make_device, MockHost};
use server::Dispatcher;
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

struct HostStats {
    opens: usize,
    closes: usize,
    open_handles: usize,
    max_open_handles: usize,
}

fn scripted_host() -> MockHost {
    let mut host = MockHost::new();
    host.push_device(make_device(1, 4, 0x11, 0x05AC, 0x1297));
    host.push_device(make_device(1, 5, 0x12, 0x05AC, 0x12A8));
    host.set_control_data(&[0x12, 0x01, 0x00, 0x02, 0x17, 0x00, 0x00, 0x40]);
    host.set_string(2, "Remote Widget");
    host
}

fn spawn_server(host: MockHost) -> (u16, JoinHandle<(protocol::Result<()>, HostStats)>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let port = listener.local_addr().expect("local addr").port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut session = Session::from_tcp(stream, Role::Server);
        let mut dispatcher = Dispatcher::new(host);
        let result = dispatcher.serve(&mut session);
        let host = dispatcher.host();
        let stats = HostStats {
            opens: host.opens,
            closes: host.closes,
            open_handles: host.open_handles,
            max_open_handles: host.max_open_handles,
        };
        (result, stats)
    });
    (port, handle)
}

fn by_session(session_id: i32) -> DeviceId {
    DeviceId {
        session_id,
        ..DeviceId::default()
    }
}

#[test]
fn test_full_call_surface_over_tcp() {
    let (port, server) = spawn_server(scripted_host());
    let mut remote = RemoteUsb::connect(("127.0.0.1", port)).expect("connect");

    // Bring-up
    assert!(remote.init().unwrap().is_success());
    let list = remote.device_list().unwrap();
    assert_eq!(list.n, 2);
    assert_eq!(list.entries()[0].session_id, 0x11);
    assert_eq!(list.entries()[1].session_id, 0x12);
    assert_eq!(list.entries()[1].device_address, 5);

    // Descriptor fetch
    let (desc, status) = remote.device_descriptor(list.entries()[1]).unwrap();
    assert!(status.is_success());
    assert_eq!(desc.idVendor, 0x05AC);
    assert_eq!(desc.idProduct, 0x12A8);
    assert_eq!(desc.bNumConfigurations, 1);

    // Open by identity, then the handle-scoped surface
    let (handle, status) = remote.open(list.entries()[1]).unwrap();
    assert!(status.is_success());
    assert_eq!(handle.dev.session_id, 0x12);

    assert!(remote.claim_interface(handle, 0).unwrap().is_success());
    assert!(remote.get_configuration(handle, 0).unwrap().is_success());
    assert!(remote.set_configuration(handle, 1).unwrap().is_success());
    assert!(remote
        .set_interface_alt_setting(handle, 0, 1)
        .unwrap()
        .is_success());

    // Control transfer surfaces byte 4 as the sub-status
    let control = remote
        .control_transfer(handle, 0x80, 0x06, 0x0100, 0, 8, 1000)
        .unwrap();
    assert_eq!(control.retcode, 8);
    assert_eq!(control.sub_status, 0x17);
    assert_eq!(control.data.data(4), &[0x12, 0x01, 0x00, 0x02]);

    // Oversized bulk request is clamped to the wire capacity
    let bulk = remote.bulk_transfer(handle, -127, 4096, 1000).unwrap();
    assert_eq!(bulk.retcode, 0);
    assert_eq!(bulk.transferred, MAX_DATA as i32);

    // String descriptor
    let string = remote.string_descriptor_ascii(handle, 2, 255).unwrap();
    assert_eq!(string.retcode, 13);
    assert_eq!(string.data.data(13), b"Remote Widget");

    assert!(remote.clear_halt(handle, 0x02).unwrap().is_success());
    assert!(remote.release_interface(handle, 0).unwrap().is_success());
    assert!(remote.reset_device(handle).unwrap().is_success());

    // Re-opening by vid/pid twice replaces the native handle each time
    let first = remote.open_with_vid_pid(0x05AC, 0x12A8).unwrap();
    assert!(first.is_some());
    let second = remote.open_with_vid_pid(0x05AC, 0x12A8).unwrap();
    assert_eq!(second.unwrap().dev.session_id, 0x12);

    remote.close().unwrap();
    remote.exit().unwrap();
    drop(remote);

    let (result, stats) = server.join().expect("server thread");
    result.expect("serve");
    assert_eq!(stats.opens, 3);
    assert_eq!(stats.closes, 3);
    assert_eq!(stats.open_handles, 0);
    // The server never held more than one native handle
    assert_eq!(stats.max_open_handles, 1);
}

#[test]
fn test_failed_lookup_keeps_session_usable() {
    let (port, server) = spawn_server(scripted_host());
    let mut remote = RemoteUsb::connect(("127.0.0.1", port)).expect("connect");

    assert!(remote.init().unwrap().is_success());

    // A stale identity: lookup fails, nothing opens
    let (handle, status) = remote.open(by_session(0x99)).unwrap();
    assert_eq!(status, Status::Failure);
    assert!(handle.is_null());

    let (_, status) = remote.device_descriptor(by_session(0x99)).unwrap();
    assert_eq!(status, Status::Failure);

    // Handle-scoped calls without an open handle fail cleanly too
    assert_eq!(
        remote.claim_interface(handle, 0).unwrap(),
        Status::Failure
    );

    // The same connection still answers fresh calls
    let list = remote.device_list().unwrap();
    assert_eq!(list.n, 2);

    drop(remote);
    let (result, stats) = server.join().expect("server thread");
    result.expect("serve");
    assert_eq!(stats.opens, 0);
    assert_eq!(stats.max_open_handles, 0);
}

#[test]
fn test_unknown_vid_pid_yields_none() {
    let (port, server) = spawn_server(scripted_host());
    let mut remote = RemoteUsb::connect(("127.0.0.1", port)).expect("connect");

    assert!(remote.init().unwrap().is_success());
    assert!(remote.open_with_vid_pid(0xDEAD, 0xBEEF).unwrap().is_none());

    drop(remote);
    let (result, _) = server.join().expect("server thread");
    result.expect("serve");
}
