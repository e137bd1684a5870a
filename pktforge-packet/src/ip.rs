//! IPv4 packet construction and parsing
//!
//! This module provides functionality for building and parsing IPv4 headers,
//! including the header checksum and the protocol numbers that select the
//! encapsulated codec.

use crate::checksum::{checksum_excluding, validate_checksum, PseudoHeader};
use crate::packet::{
    check_attach, check_depth, checked_range, header_bytes, length_field, pad_options, require_len,
    Packet, PacketKind,
};
use crate::unknown::Unknown;
use bytes::{BufMut, BytesMut};
use pktforge_core::{Error, Result};
use std::any::Any;
use std::fmt;
use std::net::Ipv4Addr;
use tracing::trace;

/// IP Protocol numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpProtocol {
    /// ICMP (1)
    ICMP,
    /// IGMP (2)
    IGMP,
    /// TCP (6)
    TCP,
    /// UDP (17)
    UDP,
    /// GRE (47)
    GRE,
    /// ESP (50)
    ESP,
    /// AH (51)
    AH,
    /// ICMPv6 (58)
    ICMPv6,
    /// No next header (59)
    NoNextHeader,
    /// OSPF (89)
    OSPF,
    /// Custom protocol number
    Custom(u8),
}

impl IpProtocol {
    pub fn to_u8(self) -> u8 {
        match self {
            IpProtocol::ICMP => 1,
            IpProtocol::IGMP => 2,
            IpProtocol::TCP => 6,
            IpProtocol::UDP => 17,
            IpProtocol::GRE => 47,
            IpProtocol::ESP => 50,
            IpProtocol::AH => 51,
            IpProtocol::ICMPv6 => 58,
            IpProtocol::NoNextHeader => 59,
            IpProtocol::OSPF => 89,
            IpProtocol::Custom(val) => val,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => IpProtocol::ICMP,
            2 => IpProtocol::IGMP,
            6 => IpProtocol::TCP,
            17 => IpProtocol::UDP,
            47 => IpProtocol::GRE,
            50 => IpProtocol::ESP,
            51 => IpProtocol::AH,
            58 => IpProtocol::ICMPv6,
            59 => IpProtocol::NoNextHeader,
            89 => IpProtocol::OSPF,
            val => IpProtocol::Custom(val),
        }
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpProtocol::Custom(val) => write!(f, "{}", val),
            IpProtocol::NoNextHeader => write!(f, "NoNext"),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Type of Service (ToS) / Differentiated Services Code Point (DSCP)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeOfService(pub u8);

impl TypeOfService {
    /// Default ToS (0)
    pub const DEFAULT: TypeOfService = TypeOfService(0);

    /// Minimize delay
    pub const MINIMIZE_DELAY: TypeOfService = TypeOfService(0x10);

    /// Maximize throughput
    pub const MAXIMIZE_THROUGHPUT: TypeOfService = TypeOfService(0x08);

    pub fn new(value: u8) -> Self {
        TypeOfService(value)
    }

    pub fn to_u8(self) -> u8 {
        self.0
    }

    /// Upper six bits
    pub fn dscp(self) -> u8 {
        self.0 >> 2
    }

    /// Lower two bits
    pub fn ecn(self) -> u8 {
        self.0 & 0x03
    }
}

/// IP Flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IpFlags {
    /// Reserved bit (must be 0)
    pub reserved: bool,
    /// Don't Fragment flag
    pub dont_fragment: bool,
    /// More Fragments flag
    pub more_fragments: bool,
}

impl IpFlags {
    /// No flags set
    pub const NONE: IpFlags = IpFlags {
        reserved: false,
        dont_fragment: false,
        more_fragments: false,
    };

    /// Don't Fragment flag set
    pub const DONT_FRAGMENT: IpFlags = IpFlags {
        reserved: false,
        dont_fragment: true,
        more_fragments: false,
    };

    pub fn with_dont_fragment(mut self, df: bool) -> Self {
        self.dont_fragment = df;
        self
    }

    pub fn with_more_fragments(mut self, mf: bool) -> Self {
        self.more_fragments = mf;
        self
    }

    /// Convert to 3-bit value
    pub fn to_u8(self) -> u8 {
        let mut flags = 0u8;
        if self.reserved {
            flags |= 0b100;
        }
        if self.dont_fragment {
            flags |= 0b010;
        }
        if self.more_fragments {
            flags |= 0b001;
        }
        flags
    }

    /// Parse from a 3-bit value; wider values are rejected
    pub fn from_bits(value: u8) -> Result<Self> {
        Error::check_width("flags", value as u64, 3)?;
        Ok(IpFlags {
            reserved: (value & 0b100) != 0,
            dont_fragment: (value & 0b010) != 0,
            more_fragments: (value & 0b001) != 0,
        })
    }
}

/// IPv4 packet
#[derive(Debug)]
pub struct Ipv4 {
    tos: TypeOfService,
    total_length: u16,
    identification: u16,
    flags: IpFlags,
    fragment_offset: u16,
    ttl: u8,
    protocol: IpProtocol,
    checksum: u16,
    source: Ipv4Addr,
    destination: Ipv4Addr,
    options: Vec<u8>,
    payload: Option<Box<dyn Packet>>,
}

impl Ipv4 {
    /// IPv4 header size without options
    pub const HEADER_LENGTH: usize = 20;

    /// Maximum IPv4 header size (with maximum options)
    pub const MAX_HEADER_LENGTH: usize = 60;

    /// Maximum size of the options area
    pub const MAX_OPTIONS_LENGTH: usize = Self::MAX_HEADER_LENGTH - Self::HEADER_LENGTH;

    const CHECKSUM_OFFSET: usize = 10;

    /// Create a new IPv4 packet with default values and no payload
    pub fn new(source: Ipv4Addr, destination: Ipv4Addr) -> Self {
        Ipv4 {
            tos: TypeOfService::DEFAULT,
            total_length: Self::HEADER_LENGTH as u16,
            identification: 0,
            flags: IpFlags::DONT_FRAGMENT,
            fragment_offset: 0,
            ttl: 64,
            protocol: IpProtocol::NoNextHeader,
            checksum: 0,
            source,
            destination,
            options: Vec::new(),
            payload: None,
        }
    }

    /// Parse the header; the bytes covered by total length become an
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

    /// Parse the header, returning it with the payload bytes it announces.
    ///
    /// If total length is inconsistent with the buffer, everything after the
    /// header is taken as payload.
    pub(crate) fn parse(data: &[u8]) -> Result<(Self, &[u8])> {
        require_len("IPv4", data, Self::HEADER_LENGTH)?;

        let version = data[0] >> 4;
        let ihl = data[0] & 0x0F;
        if version != 4 {
            return Err(Error::invalid_header(
                "IPv4",
                format!("version {} is not 4", version),
            ));
        }
        if ihl < 5 {
            return Err(Error::invalid_header(
                "IPv4",
                format!("header length {} words is below the minimum of 5", ihl),
            ));
        }

        let header_len = (ihl as usize) * 4;
        require_len("IPv4", data, header_len)?;

        let total_length = u16::from_be_bytes([data[2], data[3]]);
        let flags_and_offset = u16::from_be_bytes([data[6], data[7]]);

        let packet = Ipv4 {
            tos: TypeOfService::new(data[1]),
            total_length,
            identification: u16::from_be_bytes([data[4], data[5]]),
            flags: IpFlags::from_bits((flags_and_offset >> 13) as u8)?,
            fragment_offset: flags_and_offset & 0x1FFF,
            ttl: data[8],
            protocol: IpProtocol::from_u8(data[9]),
            checksum: u16::from_be_bytes([data[10], data[11]]),
            source: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            destination: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
            options: data[Self::HEADER_LENGTH..header_len].to_vec(),
            payload: None,
        };

        let total = total_length as usize;
        let end = if (header_len..=data.len()).contains(&total) {
            total
        } else {
            data.len()
        };

        Ok((packet, &data[header_len..end]))
    }

    pub fn version(&self) -> u8 {
        4
    }

    /// Header length in 32-bit words, derived from the options area
    pub fn ihl(&self) -> u8 {
        (self.header_len() / 4) as u8
    }

    pub fn tos(&self) -> TypeOfService {
        self.tos
    }

    pub fn total_length(&self) -> u16 {
        self.total_length
    }

    pub fn identification(&self) -> u16 {
        self.identification
    }

    pub fn flags(&self) -> IpFlags {
        self.flags
    }

    pub fn fragment_offset(&self) -> u16 {
        self.fragment_offset
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    pub fn protocol(&self) -> IpProtocol {
        self.protocol
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    pub fn source(&self) -> Ipv4Addr {
        self.source
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    pub fn options(&self) -> &[u8] {
        &self.options
    }

    /// Pseudo-header seen by a transport layer inside this packet
    pub fn pseudo_header(&self) -> PseudoHeader {
        PseudoHeader::V4 {
            source: self.source,
            destination: self.destination,
        }
    }

    pub fn with_tos(mut self, tos: TypeOfService) -> Self {
        self.tos = tos;
        self
    }

    pub fn with_identification(mut self, id: u16) -> Self {
        self.identification = id;
        self
    }

    pub fn with_flags(mut self, flags: IpFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the flags from their 3-bit wire value
    pub fn with_flag_bits(mut self, bits: u8) -> Result<Self> {
        self.flags = IpFlags::from_bits(bits)?;
        Ok(self)
    }

    /// Set the fragment offset (13 bits, in 8-byte blocks)
    pub fn with_fragment_offset(mut self, offset: u16) -> Result<Self> {
        Error::check_width("fragment_offset", offset as u64, 13)?;
        self.fragment_offset = offset;
        Ok(self)
    }

    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the protocol number; replaced on build when the payload is a
    /// known transport codec
    pub fn with_protocol(mut self, protocol: IpProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_source(mut self, source: Ipv4Addr) -> Self {
        self.source = source;
        self
    }

    pub fn with_destination(mut self, destination: Ipv4Addr) -> Self {
        self.destination = destination;
        self
    }

    /// Set IP options, padded with zero bytes to a 4-byte boundary
    pub fn with_options(mut self, options: Vec<u8>) -> Result<Self> {
        self.options = pad_options("IPv4", options, Self::MAX_OPTIONS_LENGTH)?;
        Ok(self)
    }

    /// Override the total length; recomputed on build
    pub fn with_total_length(mut self, total_length: u16) -> Self {
        self.total_length = total_length;
        self
    }

    /// Override the header checksum; recomputed on build
    pub fn with_checksum(mut self, checksum: u16) -> Self {
        self.checksum = checksum;
        self
    }

    /// Attach `inner` as the encapsulated packet
    pub fn with_payload<P: Packet>(mut self, inner: P) -> Result<Self> {
        self.set_payload(Box::new(inner))?;
        Ok(self)
    }

    /// Header checksum computed over the current header with the checksum
    /// field taken as zero
    pub fn compute_checksum(&self) -> u16 {
        checksum_excluding(&header_bytes(self), Self::CHECKSUM_OFFSET)
    }

    /// Check the stored header checksum against the header contents
    pub fn verify_checksum(&self) -> bool {
        validate_checksum(&header_bytes(self))
    }
}

impl Packet for Ipv4 {
    fn kind(&self) -> PacketKind {
        PacketKind::Ipv4
    }

    fn header_len(&self) -> usize {
        Self::HEADER_LENGTH + self.options.len()
    }

    fn write_header(&self, buf: &mut BytesMut) {
        // Version (4 bits) + IHL (4 bits)
        buf.put_u8((4 << 4) | (self.ihl() & 0x0F));
        buf.put_u8(self.tos.to_u8());
        buf.put_u16(self.total_length);
        buf.put_u16(self.identification);

        // Flags (3 bits) + Fragment Offset (13 bits)
        let flags_and_offset = ((self.flags.to_u8() as u16) << 13) | self.fragment_offset;
        buf.put_u16(flags_and_offset);

        buf.put_u8(self.ttl);
        buf.put_u8(self.protocol.to_u8());
        buf.put_u16(self.checksum);
        buf.put_slice(&self.source.octets());
        buf.put_slice(&self.destination.octets());
        buf.put_slice(&self.options);
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
            if let Some(protocol) = inner.kind().ip_protocol() {
                self.protocol = IpProtocol::from_u8(protocol);
            }
            payload_len = inner.len();
        }

        self.total_length = length_field("total_length", self.header_len() + payload_len)?;
        self.checksum = self.compute_checksum();

        trace!(
            total_length = self.total_length,
            checksum = self.checksum,
            "built IPv4 header"
        );
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Display for Ipv4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IPv4[src={}, dst={}, proto={}, ttl={}, id={}, flags={:03b}, frag={}, len={}, checksum=0x{:04x}]",
            self.source,
            self.destination,
            self.protocol,
            self.ttl,
            self.identification,
            self.flags.to_u8(),
            self.fragment_offset,
            self.total_length,
            self.checksum
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Ipv4 {
        Ipv4::new(Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2))
    }

    #[test]
    fn test_ip_protocol_conversion() {
        assert_eq!(IpProtocol::TCP.to_u8(), 6);
        assert_eq!(IpProtocol::UDP.to_u8(), 17);
        assert_eq!(IpProtocol::from_u8(6), IpProtocol::TCP);
        assert_eq!(IpProtocol::from_u8(58), IpProtocol::ICMPv6);
        assert_eq!(IpProtocol::from_u8(200), IpProtocol::Custom(200));
    }

    #[test]
    fn test_ip_flags() {
        let flags = IpFlags::DONT_FRAGMENT;
        assert_eq!(flags.to_u8(), 0b010);
        assert_eq!(IpFlags::from_bits(0b010).unwrap(), flags);
        assert!(IpFlags::from_bits(0b1000).is_err());
    }

    #[test]
    fn test_ipv4_build_computes_length_and_checksum() {
        let mut packet = sample()
            .with_payload(Unknown::new(vec![0x01, 0x02, 0x03, 0x04]))
            .unwrap();
        packet.build().unwrap();

        assert_eq!(packet.total_length(), 24);
        assert_ne!(packet.checksum(), 0);
        assert!(packet.verify_checksum());

        let bytes = packet.to_bytes();
        assert_eq!(bytes[0] >> 4, 4);
        assert_eq!(bytes[0] & 0x0F, 5);
        assert_eq!(&bytes[12..16], &[192, 168, 1, 1]);
        assert_eq!(&bytes[16..20], &[192, 168, 1, 2]);
        assert_eq!(&bytes[20..24], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_build_is_idempotent() {
        let mut packet = sample()
            .with_identification(0x1234)
            .with_payload(Unknown::new(vec![9; 7]))
            .unwrap();
        packet.build().unwrap();
        let first = packet.to_bytes();
        packet.build().unwrap();
        assert_eq!(packet.to_bytes(), first);
    }

    #[test]
    fn test_stale_checksum_is_replaced() {
        let mut packet = sample().with_checksum(0xBEEF);
        assert!(!packet.verify_checksum());
        packet.build().unwrap();
        assert!(packet.verify_checksum());
    }

    #[test]
    fn test_fragment_offset_range() {
        assert_eq!(
            sample().with_fragment_offset(0x1FFF).unwrap().fragment_offset(),
            0x1FFF
        );
        assert_eq!(
            sample().with_fragment_offset(0x2000).unwrap_err(),
            Error::FieldRange {
                field: "fragment_offset",
                value: 0x2000,
                bits: 13
            }
        );
    }

    #[test]
    fn test_flags_and_offset_do_not_overlap() {
        let mut packet = sample()
            .with_flags(IpFlags::NONE.with_more_fragments(true))
            .with_fragment_offset(0x1FFF)
            .unwrap();
        packet.build().unwrap();
        let bytes = packet.to_bytes();
        assert_eq!(u16::from_be_bytes([bytes[6], bytes[7]]), 0x3FFF);
    }

    #[test]
    fn test_options_are_padded() {
        let mut packet = sample().with_options(vec![0x94, 0x04, 0x00]).unwrap();
        packet.build().unwrap();
        assert_eq!(packet.options().len(), 4);
        assert_eq!(packet.ihl(), 6);
        assert_eq!(packet.total_length(), 24);
        assert!(sample().with_options(vec![1; 41]).is_err());
    }

    #[test]
    fn test_ipv4_parse_roundtrip() {
        let mut packet = sample()
            .with_ttl(128)
            .with_identification(0xABCD)
            .with_payload(Unknown::new(vec![0x01, 0x02, 0x03, 0x04]))
            .unwrap();
        packet.build().unwrap();
        let bytes = packet.to_bytes();

        let parsed = Ipv4::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.ttl(), 128);
        assert_eq!(parsed.identification(), 0xABCD);
        assert_eq!(parsed.source(), packet.source());
        assert_eq!(parsed.checksum(), packet.checksum());
        assert!(parsed.verify_checksum());
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn test_parse_rejects_bad_version_and_ihl() {
        let mut bytes = vec![0u8; 20];
        bytes[0] = 0x65;
        assert!(matches!(
            Ipv4::from_bytes(&bytes),
            Err(Error::InvalidHeader { layer: "IPv4", .. })
        ));
        bytes[0] = 0x44;
        assert!(matches!(
            Ipv4::from_bytes(&bytes),
            Err(Error::InvalidHeader { layer: "IPv4", .. })
        ));
        bytes[0] = 0x46;
        assert!(matches!(
            Ipv4::from_bytes(&bytes),
            Err(Error::Truncated { needed: 24, .. })
        ));
    }

    #[test]
    fn test_parse_bounds_payload_by_total_length() {
        let mut packet = sample().with_payload(Unknown::new(vec![7; 6])).unwrap();
        packet.build().unwrap();
        let mut bytes = packet.to_bytes();
        bytes.extend_from_slice(&[0, 0, 0, 0]);

        let (_, payload) = Ipv4::parse(&bytes).unwrap();
        assert_eq!(payload, &[7; 6]);
    }
}
