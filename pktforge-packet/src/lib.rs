//! Layered packet codec for pktforge
//!
//! This crate builds, serializes and parses network packets as chains of
//! typed protocol layers. Each layer owns at most one encapsulated layer, and
//! serializing a chain emits every header outermost first, byte-exact to the
//! wire format. It includes support for:
//!
//! - **Ethernet II frames** with common EtherTypes
//! - **IPv4** packets with options and header checksum
//! - **IPv6** fixed headers
//! - **TCP** segments with flags, options, and pseudo-header checksum
//! - **UDP** datagrams with pseudo-header checksum
//! - **ICMP / ICMPv6** messages named through a type/code registry
//! - **ESP** headers with opaque ciphertext
//! - **Unknown** opaque bytes for anything else
//!
//! # Architecture
//!
//! - [`packet`] - The [`Packet`] trait every layer implements
//! - [`checksum`] - Internet checksum calculation utilities
//! - [`ethernet`], [`ip`], [`ipv6`], [`tcp`], [`udp`], [`icmp`], [`esp`],
//!   [`unknown`] - One codec per protocol
//! - [`registry`] - (type, code) → name tables for ICMP
//! - [`decode`] - Full-stack dissection of captured bytes
//! - [`builder`] - High-level fluent API for packet construction
//! - [`hexdump`] - Hex dump formatting
//!
//! # Quick Start
//!
//! ## Building a TCP SYN packet
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use pktforge_core::MacAddr;
//! use pktforge_packet::PacketBuilder;
//! use pktforge_packet::ethernet::EtherType;
//! use pktforge_packet::tcp::TcpFlags;
//!
//! let src_mac = MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
//! let dst_mac = MacAddr([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
//!
//! let bytes = PacketBuilder::new()
//!     .ethernet(src_mac, dst_mac, EtherType::IPv4)
//!     .ipv4(Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2))
//!     .tcp(54321, 80, 1000, 0, TcpFlags::SYN)
//!     .build_bytes()
//!     .unwrap();
//! assert_eq!(bytes.len(), 54);
//! ```
//!
//! ## Chaining layers by hand
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use pktforge_packet::{Ipv4, Packet, Udp, Unknown};
//!
//! let mut packet = Ipv4::new(Ipv4Addr::LOCALHOST, Ipv4Addr::LOCALHOST)
//!     .with_payload(
//!         Udp::new(5353, 5353)
//!             .with_payload(Unknown::new(b"query".to_vec()))
//!             .unwrap(),
//!     )
//!     .unwrap();
//! packet.build().unwrap();
//!
//! assert_eq!(packet.total_length(), 20 + 8 + 5);
//! assert!(packet.verify_checksum());
//! ```
//!
//! ## Decoding captured bytes
//!
//! ```rust
//! use pktforge_packet::{Decoder, Packet, PacketKind};
//!
//! let frame = [
//!     0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x11, 0x22, 0x33, 0x44, 0x55,
//!     0x88, 0xcc, 0x01, 0x02,
//! ];
//! let decoded = Decoder::default().decode_ethernet(&frame).unwrap();
//! assert_eq!(decoded.payload().unwrap().kind(), PacketKind::Unknown);
//! assert_eq!(decoded.to_bytes(), frame);
//! ```

pub mod builder;
pub mod checksum;
pub mod decode;
pub mod esp;
pub mod ethernet;
pub mod hexdump;
pub mod icmp;
pub mod ip;
pub mod ipv6;
pub mod packet;
pub mod registry;
pub mod tcp;
pub mod udp;
pub mod unknown;


// Re-export commonly used types for convenience
pub use builder::PacketBuilder;
pub use checksum::{internet_checksum, transport_checksum, validate_checksum, PseudoHeader};
pub use decode::Decoder;
pub use esp::Esp;
pub use ethernet::{EtherType, Ethernet};
pub use icmp::{Icmp, IcmpVersion};
pub use ip::{IpFlags, IpProtocol, Ipv4, TypeOfService};
pub use ipv6::Ipv6;
pub use packet::{Packet, PacketKind, MAX_ENCAPSULATION_DEPTH};
pub use registry::{TypeCode, TypeCodeDescriptor, TypeCodeRegistry};
pub use tcp::{Tcp, TcpFlags};
pub use udp::Udp;
pub use unknown::Unknown;
