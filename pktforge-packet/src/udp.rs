//! UDP datagram construction and parsing
//!
//! This module provides functionality for building and parsing UDP datagrams,
//! including header construction and checksum calculation.

use crate::checksum::{transport_checksum, validate_transport_checksum, PseudoHeader};
use crate::packet::{
    check_attach, check_depth, checked_range, length_field, payload_bytes, require_len, Packet,
    PacketKind,
};
use crate::unknown::Unknown;
use bytes::{BufMut, BytesMut};
use pktforge_core::{ip_protocols, Result};
use std::any::Any;
use std::fmt;
use tracing::{debug, trace};

/// UDP datagram
#[derive(Debug)]
pub struct Udp {
    source_port: u16,
    destination_port: u16,
    length: u16,
    checksum: u16,
    /// Addresses used for the checksum when no enclosing IP layer supplies them
    pseudo_header: Option<PseudoHeader>,
    payload: Option<Box<dyn Packet>>,
}

impl Udp {
    /// UDP header size in bytes
    pub const HEADER_LENGTH: usize = 8;

    /// Create a new UDP datagram with no payload
    ///
    /// Length and checksum are filled in by [`Packet::build`].
    pub fn new(source_port: u16, destination_port: u16) -> Self {
        Udp {
            source_port,
            destination_port,
            length: Self::HEADER_LENGTH as u16,
            checksum: 0,
            pseudo_header: None,
            payload: None,
        }
    }

    /// Parse the header; the bytes covered by the length field become an
    /// opaque payload
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (mut datagram, rest) = Self::parse(data)?;
        if !rest.is_empty() {
            datagram.payload = Some(Box::new(Unknown::from_bytes(rest)));
        }
        Ok(datagram)
    }

    /// Parse `length` bytes of `data` starting at `offset`
    pub fn new_instance(data: &[u8], offset: usize, length: usize) -> Result<Self> {
        Self::from_bytes(checked_range(data, offset, length)?)
    }

    pub(crate) fn parse(data: &[u8]) -> Result<(Self, &[u8])> {
        require_len("UDP", data, Self::HEADER_LENGTH)?;

        let length = u16::from_be_bytes([data[4], data[5]]);
        let datagram = Udp {
            source_port: u16::from_be_bytes([data[0], data[1]]),
            destination_port: u16::from_be_bytes([data[2], data[3]]),
            length,
            checksum: u16::from_be_bytes([data[6], data[7]]),
            pseudo_header: None,
            payload: None,
        };

        // A length field smaller than the header is taken as "rest of data"
        let rest = &data[Self::HEADER_LENGTH..];
        let end = match (length as usize).checked_sub(Self::HEADER_LENGTH) {
            Some(body) => body.min(rest.len()),
            None => rest.len(),
        };
        Ok((datagram, &rest[..end]))
    }

    pub fn source_port(&self) -> u16 {
        self.source_port
    }

    pub fn destination_port(&self) -> u16 {
        self.destination_port
    }

    pub fn length(&self) -> u16 {
        self.length
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    pub fn with_source_port(mut self, port: u16) -> Self {
        self.source_port = port;
        self
    }

    pub fn with_destination_port(mut self, port: u16) -> Self {
        self.destination_port = port;
        self
    }

    /// Override the length field; recomputed on build
    pub fn with_length(mut self, length: u16) -> Self {
        self.length = length;
        self
    }

    /// Override the checksum; recomputed on build when addresses are known
    pub fn with_checksum(mut self, checksum: u16) -> Self {
        self.checksum = checksum;
        self
    }

    /// Addresses to checksum against when the datagram is built on its own
    pub fn with_pseudo_header(mut self, pseudo: PseudoHeader) -> Self {
        self.pseudo_header = Some(pseudo);
        self
    }

    /// Attach `inner` as the datagram body
    pub fn with_payload<P: Packet>(mut self, inner: P) -> Result<Self> {
        self.set_payload(Box::new(inner))?;
        Ok(self)
    }

    /// Checksum of header and payload under `pseudo`, with the checksum
    /// field taken as zero
    pub fn compute_checksum(&self, pseudo: &PseudoHeader) -> u16 {
        let mut data = BytesMut::with_capacity(self.len());
        data.put_u16(self.source_port);
        data.put_u16(self.destination_port);
        data.put_u16(self.length);
        data.put_u16(0);
        data.put_slice(&payload_bytes(self.payload()));
        transport_checksum(pseudo, ip_protocols::UDP, &data)
    }

    /// Check the stored checksum against header and payload under `pseudo`
    pub fn verify_checksum(&self, pseudo: &PseudoHeader) -> bool {
        validate_transport_checksum(pseudo, ip_protocols::UDP, &self.to_bytes())
    }
}

impl Packet for Udp {
    fn kind(&self) -> PacketKind {
        PacketKind::Udp
    }

    fn header_len(&self) -> usize {
        Self::HEADER_LENGTH
    }

    fn write_header(&self, buf: &mut BytesMut) {
        buf.put_u16(self.source_port);
        buf.put_u16(self.destination_port);
        buf.put_u16(self.length);
        buf.put_u16(self.checksum);
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

    fn build_with(&mut self, pseudo: Option<&PseudoHeader>) -> Result<()> {
        check_depth(self)?;
        let mut body_len = 0;
        if let Some(inner) = self.payload.as_deref_mut() {
            inner.build_with(None)?;
            body_len = inner.len();
        }
        self.length = length_field("length", Self::HEADER_LENGTH + body_len)?;

        match pseudo.copied().or(self.pseudo_header) {
            Some(pseudo) => {
                self.checksum = self.compute_checksum(&pseudo);
                trace!(length = self.length, checksum = self.checksum, "built UDP header");
            }
            None => {
                debug!("no pseudo-header available, UDP checksum left unchanged");
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Display for Udp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UDP[sport={}, dport={}, len={}, checksum=0x{:04x}]",
            self.source_port, self.destination_port, self.length, self.checksum
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn pseudo() -> PseudoHeader {
        PseudoHeader::V4 {
            source: Ipv4Addr::new(192, 168, 1, 1),
            destination: Ipv4Addr::new(192, 168, 1, 2),
        }
    }

    #[test]
    fn test_udp_datagram_build() {
        let mut datagram = Udp::new(53, 53)
            .with_payload(Unknown::new(vec![0x01, 0x02, 0x03, 0x04]))
            .unwrap();
        datagram.build().unwrap();

        assert_eq!(datagram.length(), 12);
        let bytes = datagram.to_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(u16::from_be_bytes([bytes[0], bytes[1]]), 53);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 53);
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 12);
        assert_eq!(&bytes[8..12], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_udp_checksum() {
        let mut datagram = Udp::new(12345, 53)
            .with_pseudo_header(pseudo())
            .with_payload(Unknown::new(vec![0x01, 0x02, 0x03, 0x04]))
            .unwrap();
        datagram.build().unwrap();

        assert_ne!(datagram.checksum(), 0);
        assert!(datagram.verify_checksum(&pseudo()));
        assert_eq!(datagram.compute_checksum(&pseudo()), datagram.checksum());
    }

    #[test]
    fn test_udp_checksum_over_ipv6() {
        let v6 = PseudoHeader::V6 {
            source: Ipv6Addr::LOCALHOST,
            destination: "fe80::1".parse().unwrap(),
        };
        let mut datagram = Udp::new(546, 547)
            .with_payload(Unknown::new(b"dhcp".to_vec()))
            .unwrap();
        datagram.build_with(Some(&v6)).unwrap();
        assert!(datagram.verify_checksum(&v6));
        assert!(!datagram.verify_checksum(&pseudo()));
    }

    #[test]
    fn test_udp_datagram_from_bytes() {
        let data = vec![
            0x00, 0x35, // Source port (53)
            0x00, 0x35, // Dest port (53)
            0x00, 0x0C, // Length (12)
            0x00, 0x00, // Checksum
            0x01, 0x02, 0x03, 0x04, // Payload
        ];

        let datagram = Udp::from_bytes(&data).unwrap();

        assert_eq!(datagram.source_port(), 53);
        assert_eq!(datagram.destination_port(), 53);
        assert_eq!(datagram.length(), 12);
        let payload = datagram.payload().unwrap().downcast_ref::<Unknown>().unwrap();
        assert_eq!(payload.data(), &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_parse_stops_at_length_field() {
        let data = vec![0x00, 0x35, 0x00, 0x35, 0x00, 0x0A, 0x00, 0x00, 0xAA, 0xBB, 0x00, 0x00];
        let (datagram, rest) = Udp::parse(&data).unwrap();
        assert_eq!(datagram.length(), 10);
        assert_eq!(rest, &[0xAA, 0xBB]);
    }

    #[test]
    fn test_udp_datagram_too_short() {
        let data = vec![0x00, 0x35, 0x00];
        assert!(Udp::from_bytes(&data).is_err());
    }
}
