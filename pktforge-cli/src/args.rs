//! CLI argument parsing
//!
//! Command line interface for pktforge: decode captured bytes, craft
//! frames, and list the ICMP type/code tables.

use clap::{Args, Parser, Subcommand, ValueEnum};
use pktforge_core::MacAddr;
use std::net::IpAddr;

#[derive(Parser, Debug)]
#[command(name = "pktforge")]
#[command(version, about = "Layered network packet codec", long_about = None)]
pub struct Cli {
    /// Verbose output (-v, -vv, -vvv for increasing verbosity)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Outermost layer of a buffer handed to `decode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FirstLayer {
    Ethernet,
    Ipv4,
    Ipv6,
}

/// Transport carried by a crafted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CraftProtocol {
    Tcp,
    Udp,
    /// ICMP or ICMPv6 echo request, following the address family
    Icmp,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Decode a hex stream and print every layer
    Decode {
        /// Packet bytes as hex (whitespace and ':' separators are ignored)
        #[arg(value_name = "HEX")]
        hex: String,

        /// Layer the bytes start with
        #[arg(short, long, value_enum, default_value = "ethernet")]
        layer: FirstLayer,

        /// Also print a hex dump of the input
        #[arg(short, long)]
        dump: bool,
    },

    /// Build an Ethernet frame and print it as a hex stream
    Craft(CraftArgs),

    /// List the default ICMP type/code table
    Registry {
        /// Show ICMPv6 instead of ICMPv4
        #[arg(long)]
        v6: bool,
    },
}

/// Options of the `craft` subcommand
#[derive(Args, Debug)]
pub struct CraftArgs {
    /// Transport protocol
    #[arg(value_enum)]
    pub protocol: CraftProtocol,

    /// Source IPv4 or IPv6 address
    #[arg(short, long)]
    pub src: IpAddr,

    /// Destination IPv4 or IPv6 address (same family as --src)
    #[arg(short, long)]
    pub dst: IpAddr,

    /// Source MAC address
    #[arg(long, default_value = "00:00:00:00:00:00")]
    pub src_mac: MacAddr,

    /// Destination MAC address
    #[arg(long, default_value = "ff:ff:ff:ff:ff:ff")]
    pub dst_mac: MacAddr,

    /// Source port (TCP/UDP)
    #[arg(long, default_value = "0")]
    pub sport: u16,

    /// Destination port (TCP/UDP)
    #[arg(long, default_value = "0")]
    pub dport: u16,

    /// TCP sequence number, or ICMP echo sequence
    #[arg(long, default_value = "0")]
    pub seq: u32,

    /// TCP acknowledgment number
    #[arg(long, default_value = "0")]
    pub ack: u32,

    /// TCP flag bits (9 bits, SYN = 2)
    #[arg(long, default_value = "2")]
    pub flags: u16,

    /// ICMP echo identifier
    #[arg(long, default_value = "1")]
    pub id: u16,

    /// TTL or hop limit
    #[arg(long, default_value = "64")]
    pub ttl: u8,

    /// Payload bytes as hex
    #[arg(short, long)]
    pub payload: Option<String>,

    /// Print a hex dump instead of a hex stream
    #[arg(long)]
    pub dump: bool,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Log level selected by the number of `-v` flags
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
