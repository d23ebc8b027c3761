//! Round-trip tests for every record in the message catalog
//!
//! Every schema must decode back to the exact value it encoded, and every
//! frame must advance the stream by exactly the header plus the declared
//! payload length.

use protocol::{
    encode_record, read_record, write_record, AltSettingRequest, BulkRequest, BulkResponse,
    ClearHaltRequest, ControlRequest, ControlResponse, DescriptorResponse, DeviceDescriptor,
    DeviceHandle, DeviceId, DeviceList, HandleIntRequest, Operation, OpenResponse, Status,
    StatusResponse, StringDescriptorRequest, StringDescriptorResponse, TransferBuffer,
    VidPidRequest, WireRecord, MAX_DATA, MAX_DEVS,
};
use std::io::Cursor;

fn make_device(session_id: i32) -> DeviceId {
    DeviceId {
        bus_number: 1,
        device_address: 4 + (session_id & 0xF),
        num_configurations: 1,
        session_id,
    }
}

fn make_descriptor() -> DeviceDescriptor {
    DeviceDescriptor {
        bLength: 18,
        bDescriptorType: 1,
        bcdUSB: 0x0200,
        bDeviceClass: 0,
        bDeviceSubClass: 0,
        bDeviceProtocol: 0,
        bMaxPacketSize0: 64,
        idVendor: 0x05AC,
        idProduct: 0x12A8,
        bcdDevice: 0x0310,
        iManufacturer: 1,
        iProduct: 2,
        iSerialNumber: 3,
        bNumConfigurations: 1,
    }
}

fn roundtrip<T: WireRecord + PartialEq + std::fmt::Debug>(value: T) {
    let mut wire = Vec::new();
    write_record(&mut wire, &value).expect("encode");
    let mut cursor = Cursor::new(wire);
    let decoded: T = read_record(&mut cursor).expect("decode");
    assert_eq!(decoded, value);
    // The frame was consumed exactly
    assert_eq!(cursor.position(), cursor.get_ref().len() as u64);
}

mod record_roundtrips {
    use super::*;

    #[test]
    fn test_selector() {
        for raw in 0..17 {
            roundtrip(Operation::from_raw(raw).unwrap());
        }
    }

    #[test]
    fn test_status_response() {
        roundtrip(StatusResponse::new(Status::Success));
        roundtrip(StatusResponse::new(Status::Failure));
    }

    #[test]
    fn test_device_id() {
        roundtrip(make_device(0x11));
        roundtrip(DeviceId {
            bus_number: -1,
            device_address: i32::MAX,
            num_configurations: 0,
            session_id: i32::MIN,
        });
    }

    #[test]
    fn test_device_list() {
        let mut list = DeviceList::default();
        list.push(make_device(0x11));
        list.push(make_device(0x12));
        roundtrip(list);
    }

    #[test]
    fn test_descriptor_response() {
        roundtrip(DescriptorResponse {
            descriptor: make_descriptor(),
            status: Status::Success,
        });
        // Failure shape: zeroed descriptor
        roundtrip(DescriptorResponse {
            descriptor: DeviceDescriptor::default(),
            status: Status::Failure,
        });
    }

    #[test]
    fn test_vid_pid_request() {
        roundtrip(VidPidRequest {
            vendor_id: 0x05AC,
            product_id: 0x12A8,
        });
    }

    #[test]
    fn test_handle_records() {
        let handle = DeviceHandle::new(make_device(0x12));
        roundtrip(handle);
        roundtrip(OpenResponse {
            handle,
            status: Status::Success,
        });
        roundtrip(HandleIntRequest { handle, arg: 3 });
        roundtrip(AltSettingRequest {
            handle,
            interface: 1,
            alt_setting: 2,
        });
    }

    #[test]
    fn test_control_transfer_records() {
        let handle = DeviceHandle::new(make_device(0x12));
        roundtrip(ControlRequest {
            handle,
            request_type: 0x80,
            request: 0x06,
            value: 0x0100,
            index: 0,
            length: 64,
            timeout: 1000,
        });

        let mut data = [0u8; MAX_DATA];
        data[..8].copy_from_slice(&[1, 2, 3, 4, 0x17, 6, 7, 8]);
        roundtrip(ControlResponse {
            retcode: 8,
            sub_status: 0x17,
            data: TransferBuffer { bytes: data },
        });
    }

    #[test]
    fn test_bulk_transfer_records() {
        let handle = DeviceHandle::new(make_device(0x12));
        roundtrip(BulkRequest {
            handle,
            endpoint: -127, // 0x81 as a signed byte
            length: 4096,
            transferred: 0,
            timeout: 5000,
        });
        roundtrip(BulkResponse {
            retcode: 0,
            transferred: 1024,
            data: TransferBuffer::from_slice(&[0xAB; MAX_DATA]),
        });
    }

    #[test]
    fn test_clear_halt_request() {
        roundtrip(ClearHaltRequest {
            handle: DeviceHandle::new(make_device(0x12)),
            endpoint: 0x02,
        });
    }

    #[test]
    fn test_string_descriptor_records() {
        let handle = DeviceHandle::new(make_device(0x12));
        roundtrip(StringDescriptorRequest {
            handle,
            index: 2,
            length: 255,
        });
        roundtrip(StringDescriptorResponse {
            retcode: 11,
            data: TransferBuffer::from_slice(b"iPad Retina"),
        });
    }
}

mod wire_shapes {
    use super::*;

    #[test]
    fn test_payload_sizes_are_fixed() {
        // Payload byte counts are part of the wire contract.
        assert_eq!(encode_record(&Operation::Init).len(), 4);
        assert_eq!(encode_record(&make_device(1)).len(), 16);
        assert_eq!(
            encode_record(&DeviceList::default()).len(),
            4 + 4 + MAX_DEVS * 16
        );
        assert_eq!(
            encode_record(&DescriptorResponse::default()).len(),
            14 * 4 + 4
        );
        assert_eq!(encode_record(&OpenResponse::default()).len(), 20);
        assert_eq!(encode_record(&ControlRequest::default()).len(), 40);
        assert_eq!(
            encode_record(&ControlResponse::default()).len(),
            4 + 4 + 4 + MAX_DATA
        );
        assert_eq!(encode_record(&BulkRequest::default()).len(), 29);
        assert_eq!(
            encode_record(&BulkResponse::default()).len(),
            4 + 4 + 4 + MAX_DATA
        );
        assert_eq!(encode_record(&ClearHaltRequest::default()).len(), 17);
        assert_eq!(
            encode_record(&StringDescriptorResponse::default()).len(),
            4 + 4 + MAX_DATA
        );
    }

    #[test]
    fn test_integers_are_little_endian() {
        let payload = encode_record(&StatusResponse::new(Status::Failure));
        assert_eq!(payload, vec![0xFF, 0xFF, 0xFF, 0xFF]);

        let payload = encode_record(&VidPidRequest {
            vendor_id: 0x05AC,
            product_id: 0x12A8,
        });
        assert_eq!(payload, vec![0xAC, 0x05, 0, 0, 0xA8, 0x12, 0, 0]);
    }

    #[test]
    fn test_call_sequence_decodes_in_order() {
        // selector -> request -> response back to back on one stream
        let mut wire = Vec::new();
        write_record(&mut wire, &Operation::ClaimInterface).unwrap();
        write_record(
            &mut wire,
            &HandleIntRequest {
                handle: DeviceHandle::new(make_device(0x12)),
                arg: 0,
            },
        )
        .unwrap();
        write_record(&mut wire, &StatusResponse::new(Status::Success)).unwrap();

        let mut cursor = Cursor::new(wire);
        let op: Operation = read_record(&mut cursor).unwrap();
        assert_eq!(op, Operation::ClaimInterface);
        let req: HandleIntRequest = read_record(&mut cursor).unwrap();
        assert_eq!(req.handle.dev.session_id, 0x12);
        let reply: StatusResponse = read_record(&mut cursor).unwrap();
        assert!(reply.status.is_success());
    }
}

mod device_list_bounds {
    use super::*;

    #[test]
    fn test_empty_list_roundtrips() {
        let list = DeviceList::default();
        let mut wire = Vec::new();
        write_record(&mut wire, &list).unwrap();
        let decoded: DeviceList = read_record(&mut Cursor::new(wire)).unwrap();
        assert_eq!(decoded.n, 0);
        assert!(decoded.entries().is_empty());
    }

    #[test]
    fn test_full_list_roundtrips() {
        let mut list = DeviceList::default();
        for i in 0..MAX_DEVS {
            list.push(make_device(i as i32));
        }
        let mut wire = Vec::new();
        write_record(&mut wire, &list).unwrap();
        let decoded: DeviceList = read_record(&mut Cursor::new(wire)).unwrap();
        assert_eq!(decoded.n as usize, MAX_DEVS);
        assert_eq!(decoded.entries().len(), MAX_DEVS);
        assert_eq!(decoded.entries()[MAX_DEVS - 1].session_id, (MAX_DEVS - 1) as i32);
    }

    #[test]
    fn test_overlong_count_rejected() {
        let mut list = DeviceList::default();
        list.n = (MAX_DEVS + 1) as i32;
        let mut wire = Vec::new();
        write_record(&mut wire, &list).unwrap();
        assert!(read_record::<_, DeviceList>(&mut Cursor::new(wire)).is_err());
    }

    #[test]
    fn test_unused_slots_still_transmitted() {
        let mut list = DeviceList::default();
        list.push(make_device(0x11));
        // One meaningful entry, yet the payload is always full capacity.
        assert_eq!(
            encode_record(&list).len(),
            4 + 4 + MAX_DEVS * 16
        );
    }
}
