//! Opaque fallback packet
//!
//! [`Unknown`] wraps bytes that no codec in this crate interprets: the
//! payload behind an unsupported EtherType or protocol number, encrypted ESP
//! data, or application data above TCP/UDP. It is always the last layer of a
//! chain.

use crate::checksum::PseudoHeader;
use crate::hexdump::pretty_hex_dump;
use crate::packet::{checked_range, Packet, PacketKind};
use bytes::{BufMut, BytesMut};
use pktforge_core::Result;
use std::any::Any;
use std::fmt;
use tracing::trace;

/// Bytes carried without any field interpretation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Unknown {
    data: Vec<u8>,
}

impl Unknown {
    /// Wrap `data` as-is
    pub fn new(data: Vec<u8>) -> Self {
        Unknown { data }
    }

    /// Copy all of `data`
    pub fn from_bytes(data: &[u8]) -> Self {
        Unknown {
            data: data.to_vec(),
        }
    }

    /// Copy `length` bytes of `data` starting at `offset`
    pub fn new_instance(data: &[u8], offset: usize, length: usize) -> Result<Self> {
        Ok(Self::from_bytes(checked_range(data, offset, length)?))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = data;
        self
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for Unknown {
    fn from(data: Vec<u8>) -> Self {
        Unknown::new(data)
    }
}

impl Packet for Unknown {
    fn kind(&self) -> PacketKind {
        PacketKind::Unknown
    }

    fn header_len(&self) -> usize {
        self.data.len()
    }

    fn write_header(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.data);
    }

    fn payload(&self) -> Option<&dyn Packet> {
        None
    }

    fn payload_mut(&mut self) -> Option<&mut (dyn Packet + 'static)> {
        None
    }

    /// Opaque bytes never encapsulate anything; the packet is discarded.
    fn set_payload(&mut self, inner: Box<dyn Packet>) -> Result<()> {
        trace!(kind = %inner.kind(), "ignoring payload attached to opaque packet");
        Ok(())
    }

    fn take_payload(&mut self) -> Option<Box<dyn Packet>> {
        None
    }

    fn build_with(&mut self, _pseudo: Option<&PseudoHeader>) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Display for Unknown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Unknown[{} bytes]", self.data.len())?;
        f.write_str(&pretty_hex_dump(&self.data))
    }
}
