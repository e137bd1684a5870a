//! Full-stack dissection of captured bytes
//!
//! The [`Decoder`] walks Ethernet → IPv4/IPv6 → TCP/UDP/ICMP/ICMPv6/ESP,
//! choosing each inner codec from the selector field of the layer above it.
//! Only the outermost header must parse. Any inner layer that is unsupported
//! or does not parse becomes an [`Unknown`] packet holding the bytes as they
//! were, so a decoded chain always serializes back to its input.

use crate::esp::Esp;
use crate::ethernet::{EtherType, Ethernet};
use crate::icmp::{Icmp, IcmpVersion};
use crate::ip::Ipv4;
use crate::ipv6::Ipv6;
use crate::packet::Packet;
use crate::registry::TypeCodeRegistry;
use crate::tcp::Tcp;
use crate::udp::Udp;
use crate::unknown::Unknown;
use pktforge_core::{ethertypes, ip_protocols, Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Decoder holding the type/code registries used to name ICMP messages
#[derive(Debug, Clone)]
pub struct Decoder {
    icmpv4: Arc<TypeCodeRegistry>,
    icmpv6: Arc<TypeCodeRegistry>,
}

impl Decoder {
    pub fn new(icmpv4: Arc<TypeCodeRegistry>, icmpv6: Arc<TypeCodeRegistry>) -> Self {
        Decoder { icmpv4, icmpv6 }
    }

    pub fn icmpv4_registry(&self) -> &Arc<TypeCodeRegistry> {
        &self.icmpv4
    }

    pub fn icmpv6_registry(&self) -> &Arc<TypeCodeRegistry> {
        &self.icmpv6
    }

    /// Decode an Ethernet II frame and everything it carries.
    ///
    /// Bytes after the network packet's declared length are kept as the
    /// frame trailer.
    pub fn decode_ethernet(&self, data: &[u8]) -> Result<Ethernet> {
        if data.is_empty() {
            return Err(Error::missing("empty capture buffer"));
        }

        let (mut frame, rest) = Ethernet::parse(data)?;
        if rest.is_empty() {
            return Ok(frame);
        }

        let inner = self.network(frame.ether_type().to_u16(), rest);
        let used = inner.len().min(rest.len());
        let trailer = rest[used..].to_vec();
        frame.set_payload(inner)?;
        Ok(frame.with_trailer(trailer))
    }

    /// Decode an IPv4 packet and its transport layer.
    ///
    /// Fragments other than the first carry no transport header and are
    /// kept opaque.
    pub fn decode_ipv4(&self, data: &[u8]) -> Result<Ipv4> {
        let (mut packet, rest) = Ipv4::parse(data)?;
        if rest.is_empty() {
            return Ok(packet);
        }

        let inner = if packet.fragment_offset() != 0 {
            debug!(fragment_offset = packet.fragment_offset(), "Non-initial fragment");
            opaque(rest)
        } else {
            self.transport(packet.protocol().to_u8(), rest)
        };
        packet.set_payload(inner)?;
        Ok(packet)
    }

    /// Decode an IPv6 packet and its transport layer
    pub fn decode_ipv6(&self, data: &[u8]) -> Result<Ipv6> {
        let (mut packet, rest) = Ipv6::parse(data)?;
        if !rest.is_empty() {
            let inner = self.transport(packet.next_header().to_u8(), rest);
            packet.set_payload(inner)?;
        }
        Ok(packet)
    }

    fn network(&self, ether_type: u16, data: &[u8]) -> Box<dyn Packet> {
        let decoded = match ether_type {
            ethertypes::IPV4 => self.decode_ipv4(data).map(boxed),
            ethertypes::IPV6 => self.decode_ipv6(data).map(boxed),
            _ => {
                debug!(ether_type = %EtherType::from_u16(ether_type), "Unsupported EtherType");
                return opaque(data);
            }
        };
        decoded.unwrap_or_else(|e| {
            debug!(
                ether_type = %EtherType::from_u16(ether_type),
                error = %e,
                "Network header did not parse"
            );
            opaque(data)
        })
    }

    fn transport(&self, protocol: u8, data: &[u8]) -> Box<dyn Packet> {
        let decoded = match protocol {
            ip_protocols::TCP => Tcp::from_bytes(data).map(boxed),
            ip_protocols::UDP => Udp::from_bytes(data).map(boxed),
            ip_protocols::ICMP => Icmp::from_bytes(IcmpVersion::V4, data)
                .map(|icmp| boxed(icmp.named_from(&self.icmpv4))),
            ip_protocols::ICMPV6 => Icmp::from_bytes(IcmpVersion::V6, data)
                .map(|icmp| boxed(icmp.named_from(&self.icmpv6))),
            ip_protocols::ESP => Esp::from_bytes(data).map(boxed),
            _ => {
                debug!(protocol, "Unsupported IP protocol");
                return opaque(data);
            }
        };

        match decoded {
            Ok(packet) if packet.len() == data.len() => packet,
            Ok(packet) => {
                debug!(
                    protocol,
                    decoded = packet.len(),
                    available = data.len(),
                    "Transport length disagrees with network layer"
                );
                opaque(data)
            }
            Err(e) => {
                debug!(protocol, error = %e, "Transport header did not parse");
                opaque(data)
            }
        }
    }
}

impl Default for Decoder {
    /// Decoder with the default ICMPv4 and ICMPv6 tables
    fn default() -> Self {
        Decoder::new(
            Arc::new(TypeCodeRegistry::icmpv4()),
            Arc::new(TypeCodeRegistry::icmpv6()),
        )
    }
}

fn boxed<P: Packet>(packet: P) -> Box<dyn Packet> {
    Box::new(packet)
}

fn opaque(data: &[u8]) -> Box<dyn Packet> {
    Box::new(Unknown::from_bytes(data))
}
