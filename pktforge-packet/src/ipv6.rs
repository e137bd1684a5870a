//! IPv6 packet construction and parsing
//!
//! The fixed 40-byte header only. Extension headers are not modelled; the
//! next header field announces the single encapsulated packet.

use crate::checksum::PseudoHeader;
use crate::ip::IpProtocol;
use crate::packet::{
    check_attach, check_depth, checked_range, length_field, require_len, Packet, PacketKind,
};
use crate::unknown::Unknown;
use bytes::{BufMut, BytesMut};
use pktforge_core::{Error, Result};
use std::any::Any;
use std::fmt;
use std::net::Ipv6Addr;
use tracing::trace;

/// IPv6 packet
#[derive(Debug)]
pub struct Ipv6 {
    traffic_class: u8,
    flow_label: u32,
    payload_length: u16,
    next_header: IpProtocol,
    hop_limit: u8,
    source: Ipv6Addr,
    destination: Ipv6Addr,
    payload: Option<Box<dyn Packet>>,
}

impl Ipv6 {
    /// Fixed IPv6 header size
    pub const HEADER_LENGTH: usize = 40;

    /// Create a new IPv6 packet with default values and no payload
    pub fn new(source: Ipv6Addr, destination: Ipv6Addr) -> Self {
        Ipv6 {
            traffic_class: 0,
            flow_label: 0,
            payload_length: 0,
            next_header: IpProtocol::NoNextHeader,
            hop_limit: 64,
            source,
            destination,
            payload: None,
        }
    }

    /// Parse the header; the bytes covered by payload length become an
    /// opaque payload
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (mut packet, rest) = Self::parse(data)?;
        if !rest.is_empty() {
            packet.payload = Some(Box::new(Unknown::from_bytes(rest)));
        }
        Ok(packet)
    }

    /// Parse `length` bytes of `data` starting at `offset`
    pub fn new_instance(data: &[u8], offset: usize, length: usize) -> Result<Self> {
        Self::from_bytes(checked_range(data, offset, length)?)
    }

    pub(crate) fn parse(data: &[u8]) -> Result<(Self, &[u8])> {
        require_len("IPv6", data, Self::HEADER_LENGTH)?;

        let word = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let version = word >> 28;
        if version != 6 {
            return Err(Error::invalid_header(
                "IPv6",
                format!("version {} is not 6", version),
            ));
        }

        let mut source = [0u8; 16];
        source.copy_from_slice(&data[8..24]);
        let mut destination = [0u8; 16];
        destination.copy_from_slice(&data[24..40]);

        let payload_length = u16::from_be_bytes([data[4], data[5]]);
        let packet = Ipv6 {
            traffic_class: ((word >> 20) & 0xFF) as u8,
            flow_label: word & 0x000F_FFFF,
            payload_length,
            next_header: IpProtocol::from_u8(data[6]),
            hop_limit: data[7],
            source: Ipv6Addr::from(source),
            destination: Ipv6Addr::from(destination),
            payload: None,
        };

        let rest = &data[Self::HEADER_LENGTH..];
        let end = (payload_length as usize).min(rest.len());
        Ok((packet, &rest[..end]))
    }

    pub fn version(&self) -> u8 {
        6
    }

    pub fn traffic_class(&self) -> u8 {
        self.traffic_class
    }

    pub fn flow_label(&self) -> u32 {
        self.flow_label
    }

    pub fn payload_length(&self) -> u16 {
        self.payload_length
    }

    pub fn next_header(&self) -> IpProtocol {
        self.next_header
    }

    pub fn hop_limit(&self) -> u8 {
        self.hop_limit
    }

    pub fn source(&self) -> Ipv6Addr {
        self.source
    }

    pub fn destination(&self) -> Ipv6Addr {
        self.destination
    }

    /// Pseudo-header seen by a transport layer inside this packet
    pub fn pseudo_header(&self) -> PseudoHeader {
        PseudoHeader::V6 {
            source: self.source,
            destination: self.destination,
        }
    }

    pub fn with_traffic_class(mut self, traffic_class: u8) -> Self {
        self.traffic_class = traffic_class;
        self
    }

    /// Set the flow label (20 bits)
    pub fn with_flow_label(mut self, flow_label: u32) -> Result<Self> {
        Error::check_width("flow_label", flow_label as u64, 20)?;
        self.flow_label = flow_label;
        Ok(self)
    }

    /// Set the next header; replaced on build when the payload is a known
    /// codec
    pub fn with_next_header(mut self, next_header: IpProtocol) -> Self {
        self.next_header = next_header;
        self
    }

    pub fn with_hop_limit(mut self, hop_limit: u8) -> Self {
        self.hop_limit = hop_limit;
        self
    }

    pub fn with_source(mut self, source: Ipv6Addr) -> Self {
        self.source = source;
        self
    }

    pub fn with_destination(mut self, destination: Ipv6Addr) -> Self {
        self.destination = destination;
        self
    }

    /// Override the payload length; recomputed on build
    pub fn with_payload_length(mut self, payload_length: u16) -> Self {
        self.payload_length = payload_length;
        self
    }

    /// Attach `inner` as the encapsulated packet
    pub fn with_payload<P: Packet>(mut self, inner: P) -> Result<Self> {
        self.set_payload(Box::new(inner))?;
        Ok(self)
    }
}

impl Packet for Ipv6 {
    fn kind(&self) -> PacketKind {
        PacketKind::Ipv6
    }

    fn header_len(&self) -> usize {
        Self::HEADER_LENGTH
    }

    fn write_header(&self, buf: &mut BytesMut) {
        // Version (4) + Traffic Class (8) + Flow Label (20)
        let word = (6u32 << 28) | ((self.traffic_class as u32) << 20) | self.flow_label;
        buf.put_u32(word);
        buf.put_u16(self.payload_length);
        buf.put_u8(self.next_header.to_u8());
        buf.put_u8(self.hop_limit);
        buf.put_slice(&self.source.octets());
        buf.put_slice(&self.destination.octets());
    }

    fn payload(&self) -> Option<&dyn Packet> {
        self.payload.as_deref()
    }

    fn payload_mut(&mut self) -> Option<&mut (dyn Packet + 'static)> {
        self.payload.as_deref_mut()
    }

    fn set_payload(&mut self, inner: Box<dyn Packet>) -> Result<()> {
        check_attach(inner.as_ref())?;
        self.payload = Some(inner);
        Ok(())
    }

    fn take_payload(&mut self) -> Option<Box<dyn Packet>> {
        self.payload.take()
    }

    fn build_with(&mut self, _pseudo: Option<&PseudoHeader>) -> Result<()> {
        check_depth(self)?;
        let pseudo = self.pseudo_header();
        let mut payload_len = 0;
        if let Some(inner) = self.payload.as_deref_mut() {
            inner.build_with(Some(&pseudo))?;
            if let Some(next_header) = inner.kind().ip_protocol() {
                self.next_header = IpProtocol::from_u8(next_header);
            }
            payload_len = inner.len();
        }

        self.payload_length = length_field("payload_length", payload_len)?;
        trace!(payload_length = self.payload_length, "built IPv6 header");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Display for Ipv6 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPv6[src={}, dst={}, next={}, hop_limit={}, tc={}, flow=0x{:05x}, len={}]",
            self.source,
            self.destination,
            self.next_header,
            self.hop_limit,
            self.traffic_class,
            self.flow_label,
            self.payload_length
        )
    }
}
