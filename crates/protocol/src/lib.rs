//! Wire protocol for remote-usb
//!
//! This crate defines everything two peers need to agree on: the
//! self-describing frame codec, the operation selector and per-operation
//! record schemas, the portable USB value types, and the [`Session`]
//! object that sequences frames over one byte stream.
//!
//! There is no handshake and no version negotiation; peers agree on the
//! codec magic and the catalog out of band. A full remote call is always
//! `selector frame -> optional request frame -> optional response frame`,
//! strictly half-duplex.
//!
//! # Example
//!
//! ```
//! use protocol::{encode_record, Operation, StatusResponse, Status, WireRecord};
//!
//! // A lone status travels as a 4-byte little-endian payload.
//! let reply = StatusResponse::new(Status::Success);
//! assert_eq!(StatusResponse::FORMAT, "i");
//! assert_eq!(encode_record(&reply), vec![0, 0, 0, 0]);
//! assert_eq!(Operation::ControlTransfer as i32, 13);
//! ```

pub mod error;
pub mod messages;
pub mod session;
pub mod types;
pub mod wire;

pub use error::{Result, WireError};
pub use messages::{
    AltSettingRequest, BulkRequest, BulkResponse, ClearHaltRequest, ControlRequest,
    ControlResponse, DescriptorResponse, HandleIntRequest, Operation, OpenResponse,
    StatusResponse, StringDescriptorRequest, StringDescriptorResponse, VidPidRequest,
};
pub use session::{Role, Session};
pub use types::{
    DeviceDescriptor, DeviceHandle, DeviceId, DeviceList, Status, TransferBuffer, MAX_DATA,
    MAX_DEVS,
};
pub use wire::{
    encode_record, read_frame, read_record, write_frame, write_record, WireRecord, MAGIC,
    MAX_FRAME_SIZE,
};
