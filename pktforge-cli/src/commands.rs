//! Subcommand implementations
//!
//! Each command returns the text to print so the binary stays a thin shell.

use crate::args::{Commands, CraftArgs, CraftProtocol, FirstLayer};
use pktforge_core::Error;
use pktforge_packet::hexdump::{hex_stream, pretty_hex_dump};
use pktforge_packet::{
    Decoder, EtherType, Ethernet, Icmp, IcmpVersion, Ipv4, Ipv6, Packet, PacketBuilder,
    PseudoHeader, Tcp, TcpFlags, TypeCodeRegistry, Udp,
};
use std::net::IpAddr;
use tracing::info;

pub type CliResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Run a parsed subcommand
pub fn run(command: &Commands) -> CliResult<String> {
    match command {
        Commands::Decode { hex, layer, dump } => decode(hex, *layer, *dump),
        Commands::Craft(args) => craft(args),
        Commands::Registry { v6 } => Ok(registry(*v6)),
    }
}

/// Parse hex text, ignoring whitespace and ':' separators
pub fn parse_hex(text: &str) -> CliResult<Vec<u8>> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    Ok(hex::decode(cleaned)?)
}

/// Decode `text` and describe every layer
pub fn decode(text: &str, layer: FirstLayer, dump: bool) -> CliResult<String> {
    let data = parse_hex(text)?;
    let decoder = Decoder::default();
    let packet: Box<dyn Packet> = match layer {
        FirstLayer::Ethernet => Box::new(decoder.decode_ethernet(&data)?),
        FirstLayer::Ipv4 => Box::new(decoder.decode_ipv4(&data)?),
        FirstLayer::Ipv6 => Box::new(decoder.decode_ipv6(&data)?),
    };
    info!(bytes = data.len(), layers = packet.depth(), "Decoded packet");

    let mut out = describe(packet.as_ref());
    if dump {
        out.push('\n');
        out.push_str(&pretty_hex_dump(&data));
    }
    Ok(out)
}

/// Build a frame from `args` and print it
pub fn craft(args: &CraftArgs) -> CliResult<String> {
    let builder = PacketBuilder::new().ethernet(args.src_mac, args.dst_mac, EtherType::IPv4);
    let builder = match (args.src, args.dst) {
        (IpAddr::V4(src), IpAddr::V4(dst)) => builder.ipv4(src, dst),
        (IpAddr::V6(src), IpAddr::V6(dst)) => builder.ipv6(src, dst),
        (src, dst) => {
            return Err(Error::InvalidAddress(format!(
                "{} and {} are different address families",
                src, dst
            ))
            .into())
        }
    };
    let builder = builder.ttl(args.ttl);

    let builder = match args.protocol {
        CraftProtocol::Tcp => builder.tcp(
            args.sport,
            args.dport,
            args.seq,
            args.ack,
            TcpFlags::from_bits(args.flags)?,
        ),
        CraftProtocol::Udp => builder.udp(args.sport, args.dport),
        CraftProtocol::Icmp => {
            Error::check_width("seq", args.seq as u64, 16)?;
            builder.icmp_echo(args.id, args.seq as u16)
        }
    };
    let builder = match &args.payload {
        Some(payload) => builder.payload(parse_hex(payload)?),
        None => builder,
    };

    let frame = builder.build()?;
    let bytes = frame.to_bytes();
    info!(protocol = ?args.protocol, bytes = bytes.len(), "Crafted frame");

    let mut out = describe(&frame);
    out.push('\n');
    if args.dump {
        out.push_str(&pretty_hex_dump(&bytes));
    } else {
        out.push_str(&hex_stream(&bytes));
        out.push('\n');
    }
    Ok(out)
}

/// List the default ICMPv4 or ICMPv6 table
pub fn registry(v6: bool) -> String {
    let registry = if v6 {
        TypeCodeRegistry::icmpv6()
    } else {
        TypeCodeRegistry::icmpv4()
    };

    let mut out = format!("{} ({} entries)\n", registry.label(), registry.len());
    for descriptor in registry.descriptors() {
        out.push_str(&format!(
            "  {:>3} {:>3}  {}\n",
            descriptor.key.message_type, descriptor.key.code, descriptor.name
        ));
    }
    out
}

/// One indented block per layer, with checksum validity where it can be
/// checked
pub fn describe(packet: &dyn Packet) -> String {
    let mut out = String::new();
    let mut pseudo: Option<PseudoHeader> = None;

    for (depth, layer) in packet.layers().enumerate() {
        let indent = "  ".repeat(depth);
        let status = match checksum_status(layer, pseudo.as_ref()) {
            Some(true) => " [checksum ok]",
            Some(false) => " [checksum BAD]",
            None => "",
        };

        let text = layer.to_string();
        for (i, line) in text.lines().enumerate() {
            let suffix = if i == 0 { status } else { "" };
            out.push_str(&format!("{}{}{}\n", indent, line, suffix));
        }

        if let Some(ip) = layer.downcast_ref::<Ipv4>() {
            pseudo = Some(ip.pseudo_header());
        } else if let Some(ip) = layer.downcast_ref::<Ipv6>() {
            pseudo = Some(ip.pseudo_header());
        }
    }

    if let Some(frame) = packet.downcast_ref::<Ethernet>() {
        if !frame.trailer().is_empty() {
            out.push_str(&format!("trailer: {} bytes\n", frame.trailer().len()));
        }
    }
    out
}

fn checksum_status(layer: &dyn Packet, pseudo: Option<&PseudoHeader>) -> Option<bool> {
    if let Some(ip) = layer.downcast_ref::<Ipv4>() {
        return Some(ip.verify_checksum());
    }
    if let Some(tcp) = layer.downcast_ref::<Tcp>() {
        return pseudo.map(|pseudo| tcp.verify_checksum(pseudo));
    }
    if let Some(udp) = layer.downcast_ref::<Udp>() {
        return pseudo.map(|pseudo| udp.verify_checksum(pseudo));
    }
    if let Some(icmp) = layer.downcast_ref::<Icmp>() {
        return match icmp.version() {
            IcmpVersion::V4 => Some(icmp.verify_checksum(None)),
            IcmpVersion::V6 => pseudo.map(|pseudo| icmp.verify_checksum(Some(pseudo))),
        };
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    const TCP_ACK_FRAME: &str = "4c5e0c78508f40f02fa46abe08004500003497d8400040064fe3ac1001e5\
                                 9df00723d76201bb9439b553e802b0c6801000e5816c00000101080a000b\
                                 228e5c026753";

    fn craft_args(argv: &[&str]) -> CraftArgs {
        let mut full = vec!["pktforge", "craft"];
        full.extend_from_slice(argv);
        match crate::Cli::parse_from(full).command {
            Commands::Craft(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_hex_separators() {
        assert_eq!(parse_hex("de:ad be\nef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(parse_hex("abc").is_err());
    }

    #[test]
    fn test_decode_reports_checksums() {
        let out = decode(TCP_ACK_FRAME, FirstLayer::Ethernet, false).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Ethernet["));
        assert!(lines[1].starts_with("  IPv4[") && lines[1].ends_with("[checksum ok]"));
        assert!(lines[2].starts_with("    TCP[") && lines[2].ends_with("[checksum ok]"));
    }

    #[test]
    fn test_decode_flags_bad_checksum() {
        let corrupted = TCP_ACK_FRAME.replacen("4fe3", "4fe4", 1);
        let out = decode(&corrupted, FirstLayer::Ethernet, true).unwrap();
        assert!(out.contains("[checksum BAD]"));
        assert!(out.contains("00000000 "));
    }

    #[test]
    fn test_craft_udp_decodes_back() {
        let args = craft_args(&[
            "udp", "--src", "10.0.0.1", "--dst", "10.0.0.2", "--sport", "5000", "--dport", "53",
            "--payload", "0102",
        ]);
        let out = craft(&args).unwrap();
        let stream = out.lines().last().unwrap();
        assert_eq!(stream.len(), (14 + 20 + 8 + 2) * 2);

        let decoded = decode(stream, FirstLayer::Ethernet, false).unwrap();
        assert_eq!(decoded.matches("[checksum ok]").count(), 2);
    }

    #[test]
    fn test_craft_icmpv6_echo() {
        let args = craft_args(&["icmp", "--src", "fe80::1", "--dst", "ff02::1", "--seq", "3"]);
        let out = craft(&args).unwrap();
        assert!(out.contains("ICMPv6[type=128"));
        assert!(out.contains("[checksum ok]"));
    }

    #[test]
    fn test_craft_rejects_mixed_families() {
        let args = craft_args(&["tcp", "--src", "10.0.0.1", "--dst", "::1"]);
        assert!(craft(&args).is_err());
    }

    #[test]
    fn test_registry_listing() {
        let out = registry(false);
        assert!(out.starts_with("ICMPv4"));
        assert!(out.contains("Echo request"));
        assert!(registry(true).contains("Neighbor solicitation"));
    }
}
