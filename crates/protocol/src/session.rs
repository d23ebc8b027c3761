//! Session: one byte stream, one peer role, strict half-duplex
//!
//! A [`Session`] owns the connected stream and sequences whole frames over
//! it. It does not interleave calls: the caller must finish one full
//! selector/request/response exchange before starting the next. There are
//! no correlation ids on the wire, so ordering is the protocol.

use crate::error::Result;
use crate::messages::Operation;
use crate::wire::{read_record, read_record_opt, write_record, WireRecord};
use std::io::{Read, Write};
use std::net::TcpStream;

/// Which side of the protocol this peer plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Drives the session: sends selectors and requests, reads responses.
    Client,
    /// Blocks on selectors, dispatches, writes responses.
    Server,
}

/// A connected peer: the stream plus the role it plays.
pub struct Session<S> {
    stream: S,
    role: Role,
}

impl Session<TcpStream> {
    /// Wrap an accepted or connected TCP stream.
    pub fn from_tcp(stream: TcpStream, role: Role) -> Self {
        Self::new(stream, role)
    }
}

impl<S> Session<S> {
    pub fn new(stream: S, role: Role) -> Self {
        Self { stream, role }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Give the stream back (used by orchestration for shutdown).
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: Write> Session<S> {
    /// Write one record as a complete frame.
    pub fn send<T: WireRecord>(&mut self, record: &T) -> Result<()> {
        write_record(&mut self.stream, record)
    }

    /// Announce the next operation (client side of a call).
    pub fn send_operation(&mut self, op: Operation) -> Result<()> {
        self.send(&op)
    }
}

impl<S: Read> Session<S> {
    /// Read one record, blocking for the complete frame.
    pub fn recv<T: WireRecord>(&mut self) -> Result<T> {
        read_record(&mut self.stream)
    }

    /// Block for the next operation selector (server side of a call).
    ///
    /// `Ok(None)` means the peer disconnected cleanly between calls.
    pub fn recv_operation(&mut self) -> Result<Option<Operation>> {
        read_record_opt(&mut self.stream)
    }
}
