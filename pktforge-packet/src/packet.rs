//! The capability shared by every protocol layer
//!
//! A packet is one protocol header plus, optionally, exactly one inner packet
//! that it owns. Serialization is header first, then the inner packet's own
//! serialization, recursively:
//!
//! ```text
//! to_bytes(p) == header(p) ++ to_bytes(p.payload())
//! ```
//!
//! Ownership of the inner packet moves into the outer one on
//! [`Packet::set_payload`], so a chain can never contain itself.

use crate::checksum::PseudoHeader;
use bytes::BytesMut;
use pktforge_core::{ethertypes, ip_protocols, Error, Result};
use std::any::Any;
use std::fmt;

/// Maximum number of layers in one encapsulation chain.
pub const MAX_ENCAPSULATION_DEPTH: usize = 32;

/// The closed set of protocol variants implemented by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Ethernet,
    Ipv4,
    Ipv6,
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
    Esp,
    Unknown,
}

impl PacketKind {
    /// EtherType announcing this kind inside an Ethernet frame
    pub fn ether_type(self) -> Option<u16> {
        match self {
            PacketKind::Ipv4 => Some(ethertypes::IPV4),
            PacketKind::Ipv6 => Some(ethertypes::IPV6),
            _ => None,
        }
    }

    /// IP protocol / next-header number announcing this kind inside IP
    pub fn ip_protocol(self) -> Option<u8> {
        match self {
            PacketKind::Tcp => Some(ip_protocols::TCP),
            PacketKind::Udp => Some(ip_protocols::UDP),
            PacketKind::Icmp => Some(ip_protocols::ICMP),
            PacketKind::Icmpv6 => Some(ip_protocols::ICMPV6),
            PacketKind::Esp => Some(ip_protocols::ESP),
            _ => None,
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketKind::Ethernet => "Ethernet",
            PacketKind::Ipv4 => "IPv4",
            PacketKind::Ipv6 => "IPv6",
            PacketKind::Tcp => "TCP",
            PacketKind::Udp => "UDP",
            PacketKind::Icmp => "ICMP",
            PacketKind::Icmpv6 => "ICMPv6",
            PacketKind::Esp => "ESP",
            PacketKind::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Capability implemented by every protocol layer.
///
/// The trait is object safe; chains are built from `Box<dyn Packet>`.
pub trait Packet: fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Which protocol this layer is
    fn kind(&self) -> PacketKind;

    /// Length of this layer's own bytes (everything except the payload)
    fn header_len(&self) -> usize;

    /// Append this layer's own bytes to `buf`
    fn write_header(&self, buf: &mut BytesMut);

    /// The encapsulated packet, if any
    fn payload(&self) -> Option<&dyn Packet>;

    /// Mutable access to the encapsulated packet, if any
    fn payload_mut(&mut self) -> Option<&mut (dyn Packet + 'static)>;

    /// Attach or replace the encapsulated packet.
    ///
    /// Fails with [`Error::StructuralViolation`] when the resulting chain
    /// would be deeper than [`MAX_ENCAPSULATION_DEPTH`].
    fn set_payload(&mut self, inner: Box<dyn Packet>) -> Result<()>;

    /// Detach and return the encapsulated packet
    fn take_payload(&mut self) -> Option<Box<dyn Packet>>;

    /// Recompute derived fields (lengths, checksums, type selectors).
    ///
    /// `pseudo` is supplied by an enclosing network layer so that transport
    /// layers can checksum their pseudo-header. Inner layers are finalized
    /// before the fields of this layer that depend on them.
    fn build_with(&mut self, pseudo: Option<&PseudoHeader>) -> Result<()>;

    /// Upcast for downcasting to the concrete codec
    fn as_any(&self) -> &dyn Any;

    /// Recompute derived fields for the whole chain rooted here
    fn build(&mut self) -> Result<()> {
        self.build_with(None)
    }

    /// Serialize header followed by payload into `buf`
    fn write_to(&self, buf: &mut BytesMut) {
        self.write_header(buf);
        if let Some(inner) = self.payload() {
            inner.write_to(buf);
        }
    }

    /// Wire-format bytes of this layer and everything it encapsulates
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.len());
        self.write_to(&mut buf);
        buf.to_vec()
    }

    /// Serialized length of this layer and everything it encapsulates
    fn len(&self) -> usize {
        self.header_len() + self.payload().map_or(0, |inner| inner.len())
    }

    /// True when nothing would be serialized
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of layers in the chain rooted here
    fn depth(&self) -> usize {
        1 + self.payload().map_or(0, |inner| inner.depth())
    }
}

impl<'p> dyn Packet + 'p {
    /// Borrow this layer as a concrete codec type
    pub fn downcast_ref<T: Packet>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Find the first layer of `kind` in the chain rooted here
    pub fn find(&self, kind: PacketKind) -> Option<&dyn Packet> {
        let mut layer: Option<&dyn Packet> = Some(self);
        while let Some(current) = layer {
            if current.kind() == kind {
                return Some(current);
            }
            layer = current.payload();
        }
        None
    }

    /// Iterate the layers of the chain, outermost first
    pub fn layers(&self) -> Layers<'_> {
        Layers {
            next: Some(self),
        }
    }
}

/// Iterator over the layers of an encapsulation chain
pub struct Layers<'a> {
    next: Option<&'a dyn Packet>,
}

impl<'a> Iterator for Layers<'a> {
    type Item = &'a dyn Packet;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.payload();
        Some(current)
    }
}

/// Verify that `inner` can be attached below one more layer
pub(crate) fn check_attach(inner: &dyn Packet) -> Result<()> {
    check_depth_of(inner.depth() + 1)
}

/// Verify that the whole chain rooted at `packet` is within the depth limit.
///
/// Attaching checks only the chain below the attach point, so a layer
/// reached through [`Packet::payload_mut`] can still push the root past the
/// limit; every `build_with` re-checks from where it stands.
pub(crate) fn check_depth<P: Packet + ?Sized>(packet: &P) -> Result<()> {
    check_depth_of(packet.depth())
}

fn check_depth_of(depth: usize) -> Result<()> {
    if depth > MAX_ENCAPSULATION_DEPTH {
        return Err(Error::structural(format!(
            "encapsulation chain of {} layers exceeds the maximum of {}",
            depth, MAX_ENCAPSULATION_DEPTH
        )));
    }
    Ok(())
}

/// Borrow `length` bytes of `data` starting at `offset`, or fail with
/// [`Error::BoundsViolation`] before anything is copied.
pub fn checked_range(data: &[u8], offset: usize, length: usize) -> Result<&[u8]> {
    let violation = || Error::BoundsViolation {
        offset,
        length,
        available: data.len(),
    };
    let end = offset.checked_add(length).ok_or_else(violation)?;
    data.get(offset..end).ok_or_else(violation)
}

/// Fail with [`Error::Truncated`] unless `data` holds at least `needed` bytes
pub(crate) fn require_len(layer: &'static str, data: &[u8], needed: usize) -> Result<()> {
    if data.len() < needed {
        return Err(Error::Truncated {
            layer,
            needed,
            available: data.len(),
        });
    }
    Ok(())
}

/// Serialized bytes of an optional payload
pub(crate) fn payload_bytes(payload: Option<&dyn Packet>) -> Vec<u8> {
    payload.map(|inner| inner.to_bytes()).unwrap_or_default()
}

/// Convert a derived length to its 16-bit wire field
pub(crate) fn length_field(field: &'static str, length: usize) -> Result<u16> {
    u16::try_from(length).map_err(|_| Error::FieldRange {
        field,
        value: length as u64,
        bits: 16,
    })
}

/// Pad an option area with zero bytes to a 4-byte boundary, enforcing `max`
pub(crate) fn pad_options(
    layer: &'static str,
    mut options: Vec<u8>,
    max: usize,
) -> Result<Vec<u8>> {
    let padded_len = (options.len() + 3) & !3;
    if padded_len > max {
        return Err(Error::OptionsTooLong {
            layer,
            length: padded_len,
            max,
        });
    }
    options.resize(padded_len, 0);
    Ok(options)
}

/// This layer's own bytes in a fresh buffer
pub(crate) fn header_bytes<P: Packet + ?Sized>(packet: &P) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(packet.header_len());
    packet.write_header(&mut buf);
    buf.to_vec()
}
