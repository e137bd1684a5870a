//! Ethernet II frame construction and parsing
//!
//! This module provides functionality for building and parsing Ethernet II
//! frame headers. The frame check sequence is not part of the model.

use crate::checksum::PseudoHeader;
use crate::packet::{check_attach, check_depth, checked_range, require_len, Packet, PacketKind};
use crate::unknown::Unknown;
use bytes::{BufMut, BytesMut};
use pktforge_core::{MacAddr, Result};
use std::any::Any;
use std::fmt;
use tracing::trace;

/// Common EtherType values used in Ethernet II frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EtherType {
    /// IPv4 (0x0800)
    IPv4,
    /// ARP (0x0806)
    ARP,
    /// VLAN-tagged frame (0x8100)
    VLAN,
    /// IPv6 (0x86DD)
    IPv6,
    /// MPLS unicast (0x8847)
    MPLS,
    /// MPLS multicast (0x8848)
    MPLSMulticast,
    /// LLDP (0x88CC)
    LLDP,
    /// Q-in-Q/802.1ad (0x88A8)
    QinQ,
    /// Any other value, including 802.3 length fields
    Custom(u16),
}

impl EtherType {
    /// Convert EtherType to u16 value
    pub fn to_u16(self) -> u16 {
        match self {
            EtherType::IPv4 => 0x0800,
            EtherType::ARP => 0x0806,
            EtherType::VLAN => 0x8100,
            EtherType::IPv6 => 0x86DD,
            EtherType::MPLS => 0x8847,
            EtherType::MPLSMulticast => 0x8848,
            EtherType::LLDP => 0x88CC,
            EtherType::QinQ => 0x88A8,
            EtherType::Custom(val) => val,
        }
    }

    /// Create EtherType from u16 value
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0800 => EtherType::IPv4,
            0x0806 => EtherType::ARP,
            0x8100 => EtherType::VLAN,
            0x86DD => EtherType::IPv6,
            0x8847 => EtherType::MPLS,
            0x8848 => EtherType::MPLSMulticast,
            0x88CC => EtherType::LLDP,
            0x88A8 => EtherType::QinQ,
            val => EtherType::Custom(val),
        }
    }
}

impl From<u16> for EtherType {
    fn from(value: u16) -> Self {
        EtherType::from_u16(value)
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EtherType::IPv4 => write!(f, "IPv4"),
            EtherType::ARP => write!(f, "ARP"),
            EtherType::VLAN => write!(f, "VLAN"),
            EtherType::IPv6 => write!(f, "IPv6"),
            EtherType::MPLS => write!(f, "MPLS"),
            EtherType::MPLSMulticast => write!(f, "MPLS-Multicast"),
            EtherType::LLDP => write!(f, "LLDP"),
            EtherType::QinQ => write!(f, "Q-in-Q"),
            EtherType::Custom(val) => write!(f, "0x{:04X}", val),
        }
    }
}

/// Ethernet II frame
#[derive(Debug)]
pub struct Ethernet {
    destination: MacAddr,
    source: MacAddr,
    ether_type: EtherType,
    payload: Option<Box<dyn Packet>>,
    /// Link-layer padding that followed the network packet on the wire
    trailer: Vec<u8>,
}

impl Ethernet {
    /// Ethernet header size (dst + src + type)
    pub const HEADER_LENGTH: usize = 14;

    /// Minimum Ethernet frame size (without FCS)
    pub const MIN_FRAME_SIZE: usize = 60;

    /// Maximum payload size (MTU)
    pub const MAX_PAYLOAD_SIZE: usize = 1500;

    /// Create a new Ethernet frame without payload
    pub fn new(destination: MacAddr, source: MacAddr, ether_type: EtherType) -> Self {
        Ethernet {
            destination,
            source,
            ether_type,
            payload: None,
            trailer: Vec::new(),
        }
    }

    /// Parse the header; the rest of `data` becomes an opaque payload
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (mut frame, rest) = Self::parse(data)?;
        if !rest.is_empty() {
            frame.payload = Some(Box::new(Unknown::from_bytes(rest)));
        }
        Ok(frame)
    }

    /// Parse `length` bytes of `data` starting at `offset`
    pub fn new_instance(data: &[u8], offset: usize, length: usize) -> Result<Self> {
        Self::from_bytes(checked_range(data, offset, length)?)
    }

    /// Parse the fixed header, returning the frame and the bytes after it
    pub(crate) fn parse(data: &[u8]) -> Result<(Self, &[u8])> {
        require_len("Ethernet", data, Self::HEADER_LENGTH)?;

        let mut destination = [0u8; 6];
        destination.copy_from_slice(&data[0..6]);
        let mut source = [0u8; 6];
        source.copy_from_slice(&data[6..12]);
        let ether_type = EtherType::from_u16(u16::from_be_bytes([data[12], data[13]]));

        let frame = Ethernet::new(MacAddr(destination), MacAddr(source), ether_type);
        Ok((frame, &data[Self::HEADER_LENGTH..]))
    }

    pub fn destination(&self) -> MacAddr {
        self.destination
    }

    pub fn source(&self) -> MacAddr {
        self.source
    }

    pub fn ether_type(&self) -> EtherType {
        self.ether_type
    }

    /// Padding carried after the payload of a decoded frame
    pub fn trailer(&self) -> &[u8] {
        &self.trailer
    }

    pub fn with_destination(mut self, destination: MacAddr) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_source(mut self, source: MacAddr) -> Self {
        self.source = source;
        self
    }

    pub fn with_ether_type(mut self, ether_type: EtherType) -> Self {
        self.ether_type = ether_type;
        self
    }

    pub fn with_trailer(mut self, trailer: Vec<u8>) -> Self {
        self.trailer = trailer;
        self
    }

    /// Attach `inner` as the encapsulated network packet
    pub fn with_payload<P: Packet>(mut self, inner: P) -> Result<Self> {
        self.set_payload(Box::new(inner))?;
        Ok(self)
    }
}

impl Packet for Ethernet {
    fn kind(&self) -> PacketKind {
        PacketKind::Ethernet
    }

    fn header_len(&self) -> usize {
        Self::HEADER_LENGTH
    }

    fn write_header(&self, buf: &mut BytesMut) {
        buf.put_slice(self.destination.as_bytes());
        buf.put_slice(self.source.as_bytes());
        buf.put_u16(self.ether_type.to_u16());
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
        if let Some(inner) = self.payload.as_deref_mut() {
            inner.build_with(None)?;
            if let Some(value) = inner.kind().ether_type() {
                self.ether_type = EtherType::from_u16(value);
            }
        }
        trace!(ether_type = %self.ether_type, "built Ethernet header");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn write_to(&self, buf: &mut BytesMut) {
        self.write_header(buf);
        if let Some(inner) = self.payload() {
            inner.write_to(buf);
        }
        buf.put_slice(&self.trailer);
    }

    fn len(&self) -> usize {
        Self::HEADER_LENGTH + self.payload().map_or(0, |inner| inner.len()) + self.trailer.len()
    }
}

impl fmt::Display for Ethernet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ethernet[dst={}, src={}, type={}]",
            self.destination, self.source, self.ether_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    const DST: MacAddr = MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    #[test]
    fn test_ethertype_conversion() {
        assert_eq!(EtherType::IPv4.to_u16(), 0x0800);
        assert_eq!(EtherType::ARP.to_u16(), 0x0806);
        assert_eq!(EtherType::from_u16(0x0800), EtherType::IPv4);
        assert_eq!(EtherType::from_u16(0x1234), EtherType::Custom(0x1234));
        assert_eq!(EtherType::Custom(0x1234).to_string(), "0x1234");
    }

    #[test]
    fn test_ethernet_to_bytes() {
        let frame = Ethernet::new(DST, SRC, EtherType::IPv4)
            .with_payload(Unknown::new(vec![0x01, 0x02, 0x03, 0x04]))
            .unwrap();
        let bytes = frame.to_bytes();

        // No padding: header plus payload only
        assert_eq!(bytes.len(), Ethernet::HEADER_LENGTH + 4);
        assert_eq!(&bytes[0..6], DST.as_bytes());
        assert_eq!(&bytes[6..12], SRC.as_bytes());
        assert_eq!(u16::from_be_bytes([bytes[12], bytes[13]]), 0x0800);
        assert_eq!(&bytes[14..], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_ethernet_from_bytes() {
        let data = vec![
            0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, // dst
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, // src
            0x08, 0x00, // IPv4
            0x01, 0x02, 0x03, 0x04, // payload
        ];

        let frame = Ethernet::from_bytes(&data).unwrap();
        assert_eq!(frame.destination(), DST);
        assert_eq!(frame.source(), SRC);
        assert_eq!(frame.ether_type(), EtherType::IPv4);
        let payload = frame.payload().unwrap().downcast_ref::<Unknown>().unwrap();
        assert_eq!(payload.data(), &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(frame.to_bytes(), data);
    }

    #[test]
    fn test_ethernet_truncated() {
        let err = Ethernet::from_bytes(&[0u8; 13]).unwrap_err();
        assert_eq!(
            err,
            pktforge_core::Error::Truncated {
                layer: "Ethernet",
                needed: 14,
                available: 13
            }
        );
    }

    #[test]
    fn test_ethernet_trailer_is_serialized_last() {
        let frame = Ethernet::new(DST, SRC, EtherType::IPv4)
            .with_payload(Unknown::new(vec![0x01]))
            .unwrap()
            .with_trailer(vec![0x00, 0x00]);
        let bytes = frame.to_bytes();
        assert_eq!(bytes.len(), 17);
        assert_eq!(frame.len(), 17);
        assert_eq!(&bytes[14..], &[0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_build_keeps_ethertype_for_opaque_payload() {
        let mut frame = Ethernet::new(DST, SRC, EtherType::ARP)
            .with_payload(Unknown::new(vec![0; 28]))
            .unwrap();
        frame.build().unwrap();
        assert_eq!(frame.ether_type(), EtherType::ARP);
    }

    #[test]
    fn test_display() {
        let frame = Ethernet::new(DST, SRC, EtherType::IPv6);
        assert_eq!(
            frame.to_string(),
            "Ethernet[dst=aa:bb:cc:dd:ee:ff, src=00:11:22:33:44:55, type=IPv6]"
        );
    }
}
