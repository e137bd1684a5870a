//! ICMP and ICMPv6 message construction and parsing
//!
//! Both versions share one layout: type, code, checksum and a type-specific
//! body. Messages are told apart by their (type, code) pair, named through a
//! [`TypeCodeRegistry`] rather than by separate structures.
//!
//! ICMPv4 checksums cover the message alone; ICMPv6 checksums also cover the
//! IPv6 pseudo-header.

use crate::checksum::{
    checksum_excluding, transport_checksum, validate_checksum, validate_transport_checksum,
    PseudoHeader,
};
use crate::packet::{check_attach, check_depth, checked_range, require_len, Packet, PacketKind};
use crate::registry::TypeCodeRegistry;
use bytes::{BufMut, BytesMut};
use pktforge_core::{ip_protocols, Result};
use std::any::Any;
use std::fmt;
use tracing::{debug, trace};

/// Which ICMP the message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IcmpVersion {
    V4,
    V6,
}

impl IcmpVersion {
    pub fn echo_request_type(self) -> u8 {
        match self {
            IcmpVersion::V4 => 8,
            IcmpVersion::V6 => 128,
        }
    }

    pub fn echo_reply_type(self) -> u8 {
        match self {
            IcmpVersion::V4 => 0,
            IcmpVersion::V6 => 129,
        }
    }
}

/// ICMP or ICMPv6 message
#[derive(Debug)]
pub struct Icmp {
    version: IcmpVersion,
    message_type: u8,
    code: u8,
    checksum: u16,
    name: Option<String>,
    body: Vec<u8>,
    pseudo_header: Option<PseudoHeader>,
    payload: Option<Box<dyn Packet>>,
}

impl Icmp {
    /// Type, code and checksum
    pub const HEADER_LENGTH: usize = 4;

    const CHECKSUM_OFFSET: usize = 2;

    /// Create a message with an empty body
    pub fn new(version: IcmpVersion, message_type: u8, code: u8) -> Self {
        Icmp {
            version,
            message_type,
            code,
            checksum: 0,
            name: None,
            body: Vec::new(),
            pseudo_header: None,
            payload: None,
        }
    }

    /// Create a message named after its entry in `registry`
    ///
    /// Unregistered pairs are still accepted and display as unnamed.
    pub fn new_registered(
        registry: &TypeCodeRegistry,
        version: IcmpVersion,
        message_type: u8,
        code: u8,
    ) -> Self {
        Self::new(version, message_type, code).named_from(registry)
    }

    /// Create ICMP Echo Request (Ping)
    ///
    /// The message is unnamed until [`Icmp::named_from`] resolves it.
    pub fn echo_request(version: IcmpVersion, id: u16, seq: u16, data: &[u8]) -> Self {
        Self::echo(version, version.echo_request_type(), id, seq, data)
    }

    /// Create ICMP Echo Reply
    pub fn echo_reply(version: IcmpVersion, id: u16, seq: u16, data: &[u8]) -> Self {
        Self::echo(version, version.echo_reply_type(), id, seq, data)
    }

    fn echo(version: IcmpVersion, message_type: u8, id: u16, seq: u16, data: &[u8]) -> Self {
        let mut body = Vec::with_capacity(4 + data.len());
        body.extend_from_slice(&id.to_be_bytes());
        body.extend_from_slice(&seq.to_be_bytes());
        body.extend_from_slice(data);
        Self::new(version, message_type, 0).with_body(body)
    }

    /// Parse a message; everything after the first four bytes is the body
    pub fn from_bytes(version: IcmpVersion, data: &[u8]) -> Result<Self> {
        require_len("ICMP", data, Self::HEADER_LENGTH)?;
        Ok(Icmp {
            version,
            message_type: data[0],
            code: data[1],
            checksum: u16::from_be_bytes([data[2], data[3]]),
            name: None,
            body: data[Self::HEADER_LENGTH..].to_vec(),
            pseudo_header: None,
            payload: None,
        })
    }

    /// Parse `length` bytes of `data` starting at `offset`
    pub fn new_instance(
        version: IcmpVersion,
        data: &[u8],
        offset: usize,
        length: usize,
    ) -> Result<Self> {
        Self::from_bytes(version, checked_range(data, offset, length)?)
    }

    pub fn version(&self) -> IcmpVersion {
        self.version
    }

    pub fn message_type(&self) -> u8 {
        self.message_type
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// Registered name of the (type, code) pair, when known
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    fn is_echo(&self) -> bool {
        self.code == 0
            && (self.message_type == self.version.echo_request_type()
                || self.message_type == self.version.echo_reply_type())
            && self.body.len() >= 4
    }

    /// Identifier of an echo request or reply
    pub fn echo_identifier(&self) -> Option<u16> {
        self.is_echo()
            .then(|| u16::from_be_bytes([self.body[0], self.body[1]]))
    }

    /// Sequence number of an echo request or reply
    pub fn echo_sequence(&self) -> Option<u16> {
        self.is_echo()
            .then(|| u16::from_be_bytes([self.body[2], self.body[3]]))
    }

    /// Change the type; the name no longer applies and is dropped
    pub fn with_type(mut self, message_type: u8) -> Self {
        if message_type != self.message_type {
            self.name = None;
        }
        self.message_type = message_type;
        self
    }

    /// Change the code; the name no longer applies and is dropped
    pub fn with_code(mut self, code: u8) -> Self {
        if code != self.code {
            self.name = None;
        }
        self.code = code;
        self
    }

    /// Take the name of the current (type, code) pair from `registry`
    pub fn named_from(mut self, registry: &TypeCodeRegistry) -> Self {
        self.name = registry
            .lookup(self.message_type, self.code)
            .map(|descriptor| descriptor.name);
        self
    }

    /// Set the type-specific part of the message
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Override the checksum; recomputed on build
    pub fn with_checksum(mut self, checksum: u16) -> Self {
        self.checksum = checksum;
        self
    }

    /// Addresses for the ICMPv6 checksum when no enclosing IPv6 layer
    /// supplies them
    pub fn with_pseudo_header(mut self, pseudo: PseudoHeader) -> Self {
        self.pseudo_header = Some(pseudo);
        self
    }

    /// Attach `inner` after the body
    pub fn with_payload<P: Packet>(mut self, inner: P) -> Result<Self> {
        self.set_payload(Box::new(inner))?;
        Ok(self)
    }

    /// Checksum of the whole message with the checksum field taken as zero.
    ///
    /// ICMPv6 needs `pseudo`; without it `None` is returned.
    pub fn compute_checksum(&self, pseudo: Option<&PseudoHeader>) -> Option<u16> {
        let bytes = self.to_bytes();
        match self.version {
            IcmpVersion::V4 => Some(checksum_excluding(&bytes, Self::CHECKSUM_OFFSET)),
            IcmpVersion::V6 => {
                let pseudo = pseudo?;
                let mut zeroed = bytes;
                zeroed[Self::CHECKSUM_OFFSET..Self::CHECKSUM_OFFSET + 2].fill(0);
                Some(transport_checksum(pseudo, ip_protocols::ICMPV6, &zeroed))
            }
        }
    }

    /// Check the stored checksum; ICMPv6 messages fail without `pseudo`
    pub fn verify_checksum(&self, pseudo: Option<&PseudoHeader>) -> bool {
        let bytes = self.to_bytes();
        match (self.version, pseudo) {
            (IcmpVersion::V4, _) => validate_checksum(&bytes),
            (IcmpVersion::V6, Some(pseudo)) => {
                validate_transport_checksum(pseudo, ip_protocols::ICMPV6, &bytes)
            }
            (IcmpVersion::V6, None) => false,
        }
    }
}

impl Packet for Icmp {
    fn kind(&self) -> PacketKind {
        match self.version {
            IcmpVersion::V4 => PacketKind::Icmp,
            IcmpVersion::V6 => PacketKind::Icmpv6,
        }
    }

    fn header_len(&self) -> usize {
        Self::HEADER_LENGTH + self.body.len()
    }

    fn write_header(&self, buf: &mut BytesMut) {
        buf.put_u8(self.message_type);
        buf.put_u8(self.code);
        buf.put_u16(self.checksum);
        buf.put_slice(&self.body);
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
        if let Some(inner) = self.payload.as_deref_mut() {
            inner.build_with(None)?;
        }

        let pseudo = pseudo.copied().or(self.pseudo_header);
        match self.compute_checksum(pseudo.as_ref()) {
            Some(checksum) => {
                self.checksum = checksum;
                trace!(kind = %self.kind(), checksum, "built ICMP header");
            }
            None => {
                debug!("no pseudo-header available, ICMPv6 checksum left unchanged");
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Display for Icmp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[type={}, code={} ({}), checksum=0x{:04x}, body={}]",
            self.kind(),
            self.message_type,
            self.code,
            self.name.as_deref().unwrap_or("unnamed"),
            self.checksum,
            self.body.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_echo_request() {
        let mut packet = Icmp::echo_request(IcmpVersion::V4, 1, 1, &[0x42; 32]);
        packet.build().unwrap();
        let bytes = packet.to_bytes();

        assert_eq!(bytes[0], 8);
        assert_eq!(bytes.len(), 4 + 4 + 32);
        assert!(packet.checksum() != 0);
        assert!(packet.verify_checksum(None));

        let parsed = Icmp::from_bytes(IcmpVersion::V4, &bytes).unwrap();
        assert_eq!(parsed.message_type(), 8);
        assert_eq!(parsed.echo_identifier(), Some(1));
        assert_eq!(parsed.echo_sequence(), Some(1));
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn test_known_echo_checksum() {
        // type 8, code 0, id 0x1234, seq 1
        let mut packet = Icmp::echo_request(IcmpVersion::V4, 0x1234, 1, &[]);
        packet.build().unwrap();
        // ~(0x0800 + 0x1234 + 0x0001) = ~0x1a35
        assert_eq!(packet.checksum(), 0xe5ca);
    }

    #[test]
    fn test_icmpv6_needs_pseudo_header() {
        let pseudo = PseudoHeader::V6 {
            source: Ipv6Addr::LOCALHOST,
            destination: Ipv6Addr::LOCALHOST,
        };
        let mut packet = Icmp::echo_reply(IcmpVersion::V6, 7, 9, b"hi");
        assert_eq!(packet.kind(), PacketKind::Icmpv6);
        assert_eq!(packet.message_type(), 129);

        packet.build().unwrap();
        assert_eq!(packet.checksum(), 0);

        packet.build_with(Some(&pseudo)).unwrap();
        assert!(packet.verify_checksum(Some(&pseudo)));
        assert!(!packet.verify_checksum(None));
    }

    #[test]
    fn test_registered_and_unnamed() {
        let registry = TypeCodeRegistry::icmpv6();
        let named = Icmp::new_registered(&registry, IcmpVersion::V6, 135, 0);
        assert_eq!(named.name(), Some("Neighbor solicitation"));

        let unnamed = Icmp::new_registered(&registry, IcmpVersion::V6, 250, 3);
        assert_eq!(unnamed.name(), None);
        assert!(unnamed.to_string().contains("unnamed"));
    }

    #[test]
    fn test_echo_name_comes_from_registry() {
        let registry = TypeCodeRegistry::icmpv4();
        let packet = Icmp::echo_request(IcmpVersion::V4, 1, 1, &[]);
        assert_eq!(packet.name(), None);

        registry.register(8, 0, "Custom");
        let packet = packet.named_from(&registry);
        assert_eq!(packet.name(), Some("Custom"));

        let reply = Icmp::echo_reply(IcmpVersion::V4, 1, 1, &[]).named_from(&registry);
        assert_eq!(reply.name(), Some("Echo reply"));
    }

    #[test]
    fn test_changing_type_or_code_drops_name() {
        let registry = TypeCodeRegistry::icmpv4();
        let packet = Icmp::echo_request(IcmpVersion::V4, 1, 1, &[]).named_from(&registry);

        let same = packet.with_type(8).with_code(0);
        assert_eq!(same.name(), Some("Echo request"));

        let retyped = same.with_type(3);
        assert_eq!(retyped.name(), None);
        assert!(retyped.to_string().contains("code=0 (unnamed)"));

        let recoded = Icmp::new_registered(&registry, IcmpVersion::V4, 3, 1).with_code(3);
        assert_eq!(recoded.name(), None);
        assert_eq!(
            recoded.named_from(&registry).name(),
            Some("Port unreachable")
        );
    }

    #[test]
    fn test_non_echo_has_no_identifier() {
        let packet = Icmp::new(IcmpVersion::V4, 3, 3).with_body(vec![0; 4]);
        assert_eq!(packet.echo_identifier(), None);
    }

    #[test]
    fn test_too_short() {
        assert!(Icmp::from_bytes(IcmpVersion::V4, &[8, 0, 0]).is_err());
    }
}
