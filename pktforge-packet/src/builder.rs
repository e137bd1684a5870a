//! Packet builder for constructing network packets with a fluent API
//!
//! This module provides a high-level builder interface for constructing
//! complete encapsulation chains from layer 2 (Ethernet) to layer 4
//! (TCP/UDP/ICMP). The result is an already built [`Ethernet`] frame whose
//! lengths, checksums and type selectors are consistent.

use crate::ethernet::{EtherType, Ethernet};
use crate::icmp::{Icmp, IcmpVersion};
use crate::ip::Ipv4;
use crate::ipv6::Ipv6;
use crate::packet::Packet;
use crate::tcp::{Tcp, TcpFlags};
use crate::udp::Udp;
use crate::unknown::Unknown;
use pktforge_core::{Error, MacAddr, Result};
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::debug;

/// Layer 2 frame type
#[derive(Debug, Clone)]
enum Layer2 {
    Ethernet {
        src: MacAddr,
        dst: MacAddr,
        ethertype: EtherType,
    },
}

/// Layer 3 packet type
#[derive(Debug, Clone)]
enum Layer3 {
    Ipv4 {
        src: Ipv4Addr,
        dst: Ipv4Addr,
        ttl: u8,
        identification: u16,
    },
    Ipv6 {
        src: Ipv6Addr,
        dst: Ipv6Addr,
        hop_limit: u8,
    },
}

/// Layer 4 segment/datagram/message type
#[derive(Debug, Clone)]
enum Layer4 {
    Udp {
        src_port: u16,
        dst_port: u16,
    },
    Tcp {
        src_port: u16,
        dst_port: u16,
        seq: u32,
        ack: u32,
        flags: TcpFlags,
        window: u16,
    },
    Icmp {
        message_type: u8,
        code: u8,
        body: Vec<u8>,
    },
    IcmpEcho {
        id: u16,
        seq: u16,
    },
}

/// Packet builder with fluent API for constructing network packets
///
/// # Examples
///
/// ```
/// use std::net::Ipv4Addr;
/// use pktforge_core::MacAddr;
/// use pktforge_packet::PacketBuilder;
/// use pktforge_packet::ethernet::EtherType;
/// use pktforge_packet::packet::Packet;
///
/// let frame = PacketBuilder::new()
///     .ethernet(
///         MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
///         MacAddr::BROADCAST,
///         EtherType::IPv4,
///     )
///     .ipv4(Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2))
///     .udp(12345, 53)
///     .payload(vec![0x01, 0x02, 0x03, 0x04])
///     .build()
///     .unwrap();
///
/// assert_eq!(frame.len(), 14 + 20 + 8 + 4);
/// ```
pub struct PacketBuilder {
    layer2: Option<Layer2>,
    layer3: Option<Layer3>,
    layer4: Option<Layer4>,
    payload: Vec<u8>,
}

impl PacketBuilder {
    /// Create a new packet builder
    pub fn new() -> Self {
        PacketBuilder {
            layer2: None,
            layer3: None,
            layer4: None,
            payload: Vec::new(),
        }
    }

    /// Add an Ethernet layer
    ///
    /// `ethertype` is replaced by the network layer's value when one is
    /// configured.
    pub fn ethernet(mut self, src: MacAddr, dst: MacAddr, ethertype: EtherType) -> Self {
        self.layer2 = Some(Layer2::Ethernet {
            src,
            dst,
            ethertype,
        });
        self
    }

    /// Add an IPv4 layer (TTL 64)
    pub fn ipv4(mut self, src: Ipv4Addr, dst: Ipv4Addr) -> Self {
        self.layer3 = Some(Layer3::Ipv4 {
            src,
            dst,
            ttl: 64,
            identification: 0,
        });
        self
    }

    /// Add an IPv6 layer (hop limit 64)
    pub fn ipv6(mut self, src: Ipv6Addr, dst: Ipv6Addr) -> Self {
        self.layer3 = Some(Layer3::Ipv6 {
            src,
            dst,
            hop_limit: 64,
        });
        self
    }

    /// Set the TTL or hop limit of the network layer
    ///
    /// Must be called after `ipv4()` or `ipv6()`.
    pub fn ttl(mut self, new_ttl: u8) -> Self {
        match self.layer3 {
            Some(Layer3::Ipv4 { ref mut ttl, .. }) => *ttl = new_ttl,
            Some(Layer3::Ipv6 {
                ref mut hop_limit, ..
            }) => *hop_limit = new_ttl,
            None => {}
        }
        self
    }

    /// Set the identification for the IPv4 layer
    ///
    /// Must be called after `ipv4()`.
    pub fn identification(mut self, id: u16) -> Self {
        if let Some(Layer3::Ipv4 {
            ref mut identification,
            ..
        }) = self.layer3
        {
            *identification = id;
        }
        self
    }

    /// Add a UDP layer
    pub fn udp(mut self, src_port: u16, dst_port: u16) -> Self {
        self.layer4 = Some(Layer4::Udp { src_port, dst_port });
        self
    }

    /// Add a TCP layer with a 65535-byte window
    pub fn tcp(
        mut self,
        src_port: u16,
        dst_port: u16,
        seq: u32,
        ack: u32,
        flags: TcpFlags,
    ) -> Self {
        self.layer4 = Some(Layer4::Tcp {
            src_port,
            dst_port,
            seq,
            ack,
            flags,
            window: 65535,
        });
        self
    }

    /// Set the TCP window size
    ///
    /// Must be called after `tcp()`.
    pub fn window(mut self, new_window: u16) -> Self {
        if let Some(Layer4::Tcp { ref mut window, .. }) = self.layer4 {
            *window = new_window;
        }
        self
    }

    /// Add an ICMP layer; the version follows the network layer
    pub fn icmp(mut self, message_type: u8, code: u8, body: Vec<u8>) -> Self {
        self.layer4 = Some(Layer4::Icmp {
            message_type,
            code,
            body,
        });
        self
    }

    /// Add an ICMP echo request; the version follows the network layer
    pub fn icmp_echo(mut self, id: u16, seq: u16) -> Self {
        self.layer4 = Some(Layer4::IcmpEcho { id, seq });
        self
    }

    /// Set the payload data
    pub fn payload(mut self, data: Vec<u8>) -> Self {
        self.payload = data;
        self
    }

    /// Build the complete frame
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingReference`] without a link layer and
    /// [`Error::StructuralViolation`] for a transport layer without a
    /// network layer.
    pub fn build(self) -> Result<Ethernet> {
        let Layer2::Ethernet {
            src: src_mac,
            dst: dst_mac,
            ethertype,
        } = self
            .layer2
            .ok_or_else(|| Error::missing("Layer 2 is required"))?;

        let data = (!self.payload.is_empty()).then(|| Unknown::new(self.payload));

        let transport: Option<Box<dyn Packet>> = match self.layer4 {
            None => data.map(|data| Box::new(data) as Box<dyn Packet>),
            Some(layer4) => {
                let layer3 = self
                    .layer3
                    .as_ref()
                    .ok_or_else(|| Error::structural("Layer 4 requires Layer 3"))?;
                let version = match layer3 {
                    Layer3::Ipv4 { .. } => IcmpVersion::V4,
                    Layer3::Ipv6 { .. } => IcmpVersion::V6,
                };
                Some(Self::transport(layer4, version, data)?)
            }
        };

        let network: Option<Box<dyn Packet>> = match self.layer3 {
            Some(Layer3::Ipv4 {
                src,
                dst,
                ttl,
                identification,
            }) => {
                let mut ip = Ipv4::new(src, dst)
                    .with_ttl(ttl)
                    .with_identification(identification);
                if let Some(inner) = transport {
                    ip.set_payload(inner)?;
                }
                Some(Box::new(ip) as Box<dyn Packet>)
            }
            Some(Layer3::Ipv6 {
                src,
                dst,
                hop_limit,
            }) => {
                let mut ip = Ipv6::new(src, dst).with_hop_limit(hop_limit);
                if let Some(inner) = transport {
                    ip.set_payload(inner)?;
                }
                Some(Box::new(ip) as Box<dyn Packet>)
            }
            None => transport,
        };

        let mut frame = Ethernet::new(dst_mac, src_mac, ethertype);
        if let Some(inner) = network {
            frame.set_payload(inner)?;
        }
        frame.build()?;

        debug!(layers = frame.depth(), length = frame.len(), "Built packet");
        Ok(frame)
    }

    fn transport(
        layer4: Layer4,
        version: IcmpVersion,
        data: Option<Unknown>,
    ) -> Result<Box<dyn Packet>> {
        let mut segment: Box<dyn Packet> = match layer4 {
            Layer4::Udp { src_port, dst_port } => Box::new(Udp::new(src_port, dst_port)),
            Layer4::Tcp {
                src_port,
                dst_port,
                seq,
                ack,
                flags,
                window,
            } => Box::new(
                Tcp::new(src_port, dst_port)
                    .with_sequence(seq)
                    .with_acknowledgment(ack)
                    .with_flags(flags)
                    .with_window_size(window),
            ),
            Layer4::Icmp {
                message_type,
                code,
                body,
            } => Box::new(Icmp::new(version, message_type, code).with_body(body)),
            Layer4::IcmpEcho { id, seq } => Box::new(Icmp::echo_request(version, id, seq, &[])),
        };
        if let Some(data) = data {
            segment.set_payload(Box::new(data))?;
        }
        Ok(segment)
    }

    /// Build the complete frame and return its wire bytes
    pub fn build_bytes(self) -> Result<Vec<u8>> {
        Ok(self.build()?.to_bytes())
    }

    /// Build and send the packet
    ///
    /// This is a convenience method that builds the packet and hands its
    /// bytes to the provided transmit function.
    ///
    /// # Errors
    ///
    /// Returns an error if packet building fails or transmission fails.
    pub fn send<F>(self, mut tx: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let packet = self.build_bytes()?;
        tx(&packet)
    }
}

impl Default for PacketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketKind;

    const SRC_MAC: MacAddr = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
    const DST_MAC: MacAddr = MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

    fn src_ip() -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, 1)
    }

    fn dst_ip() -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, 2)
    }

    #[test]
    fn test_builder_ethernet_only() {
        let frame = PacketBuilder::new()
            .ethernet(SRC_MAC, DST_MAC, EtherType::IPv4)
            .payload(vec![0x01, 0x02, 0x03, 0x04])
            .build()
            .unwrap();

        let parsed = Ethernet::from_bytes(&frame.to_bytes()).unwrap();
        assert_eq!(parsed.source(), SRC_MAC);
        assert_eq!(parsed.destination(), DST_MAC);
        assert_eq!(parsed.ether_type(), EtherType::IPv4);
        assert_eq!(frame.len(), 18);
    }

    #[test]
    fn test_builder_ethernet_ip_udp() {
        let frame = PacketBuilder::new()
            .ethernet(SRC_MAC, DST_MAC, EtherType::Custom(0))
            .ipv4(src_ip(), dst_ip())
            .udp(12345, 53)
            .payload(vec![0x01, 0x02, 0x03, 0x04])
            .build()
            .unwrap();

        assert_eq!(frame.ether_type(), EtherType::IPv4);
        let ip = frame.payload().unwrap().downcast_ref::<Ipv4>().unwrap();
        assert_eq!(ip.source(), src_ip());
        assert_eq!(ip.protocol(), crate::ip::IpProtocol::UDP);
        assert_eq!(ip.total_length(), 32);
        assert!(ip.verify_checksum());

        let udp = ip.payload().unwrap().downcast_ref::<Udp>().unwrap();
        assert_eq!(udp.source_port(), 12345);
        assert_eq!(udp.length(), 12);
        assert!(udp.verify_checksum(&ip.pseudo_header()));
    }

    #[test]
    fn test_builder_ethernet_ip_tcp() {
        let frame = PacketBuilder::new()
            .ethernet(SRC_MAC, DST_MAC, EtherType::IPv4)
            .ipv4(src_ip(), dst_ip())
            .tcp(12345, 80, 1000, 2000, TcpFlags::SYN)
            .window(1024)
            .payload(vec![0x01, 0x02, 0x03, 0x04])
            .build()
            .unwrap();

        let ip = frame.payload().unwrap().downcast_ref::<Ipv4>().unwrap();
        let tcp = ip.payload().unwrap().downcast_ref::<Tcp>().unwrap();
        assert_eq!(tcp.sequence(), 1000);
        assert_eq!(tcp.acknowledgment(), 2000);
        assert_eq!(tcp.window_size(), 1024);
        assert!(tcp.flags().syn);
        assert!(tcp.verify_checksum(&ip.pseudo_header()));
    }

    #[test]
    fn test_builder_ipv6_icmp_echo() {
        let frame = PacketBuilder::new()
            .ethernet(SRC_MAC, DST_MAC, EtherType::IPv4)
            .ipv6(Ipv6Addr::LOCALHOST, "ff02::1".parse().unwrap())
            .ttl(1)
            .icmp_echo(7, 1)
            .build()
            .unwrap();

        assert_eq!(frame.ether_type(), EtherType::IPv6);
        let ip = frame.payload().unwrap().downcast_ref::<Ipv6>().unwrap();
        assert_eq!(ip.hop_limit(), 1);
        assert_eq!(ip.next_header().to_u8(), 58);
        let icmp = ip.payload().unwrap().downcast_ref::<Icmp>().unwrap();
        assert_eq!(icmp.kind(), PacketKind::Icmpv6);
        assert_eq!(icmp.message_type(), 128);
        assert!(icmp.verify_checksum(Some(&ip.pseudo_header())));
    }

    #[test]
    fn test_builder_ttl_and_identification() {
        let frame = PacketBuilder::new()
            .ethernet(SRC_MAC, DST_MAC, EtherType::IPv4)
            .ipv4(src_ip(), dst_ip())
            .ttl(128)
            .identification(0x1234)
            .build()
            .unwrap();

        let ip = frame.payload().unwrap().downcast_ref::<Ipv4>().unwrap();
        assert_eq!(ip.ttl(), 128);
        assert_eq!(ip.identification(), 0x1234);
    }

    #[test]
    fn test_builder_missing_layer2() {
        let result = PacketBuilder::new().payload(vec![0x01, 0x02]).build();
        assert!(matches!(result, Err(Error::MissingReference(_))));
    }

    #[test]
    fn test_builder_layer4_without_layer3() {
        let result = PacketBuilder::new()
            .ethernet(SRC_MAC, DST_MAC, EtherType::IPv4)
            .udp(12345, 53)
            .build();
        assert!(matches!(result, Err(Error::StructuralViolation(_))));
    }

    #[test]
    fn test_builder_send() {
        let mut sent_packet = Vec::new();

        let result = PacketBuilder::new()
            .ethernet(SRC_MAC, DST_MAC, EtherType::IPv4)
            .payload(vec![0x01, 0x02, 0x03, 0x04])
            .send(|packet| {
                sent_packet = packet.to_vec();
                Ok(())
            });

        assert!(result.is_ok());
        assert_eq!(sent_packet.len(), 18);
    }
}
