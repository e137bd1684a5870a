//! TCP segment construction and parsing
//!
//! This module provides functionality for building and parsing TCP segment
//! headers, including flags, options, and the pseudo-header checksum.

use crate::checksum::{transport_checksum, validate_transport_checksum, PseudoHeader};
use crate::packet::{
    check_attach, check_depth, checked_range, pad_options, require_len, Packet, PacketKind,
};
use crate::unknown::Unknown;
use bytes::{BufMut, BytesMut};
use pktforge_core::{ip_protocols, Error, Result};
use std::any::Any;
use std::fmt;
use tracing::{debug, trace};

/// TCP flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags {
    /// FIN - No more data from sender
    pub fin: bool,
    /// SYN - Synchronize sequence numbers
    pub syn: bool,
    /// RST - Reset the connection
    pub rst: bool,
    /// PSH - Push function
    pub psh: bool,
    /// ACK - Acknowledgment field is significant
    pub ack: bool,
    /// URG - Urgent pointer field is significant
    pub urg: bool,
    /// ECE - ECN-Echo
    pub ece: bool,
    /// CWR - Congestion Window Reduced
    pub cwr: bool,
    /// NS - ECN-nonce concealment protection
    pub ns: bool,
}

impl TcpFlags {
    /// No flags set
    pub const NONE: TcpFlags = TcpFlags {
        fin: false,
        syn: false,
        rst: false,
        psh: false,
        ack: false,
        urg: false,
        ece: false,
        cwr: false,
        ns: false,
    };

    /// SYN flag (connection initiation)
    pub const SYN: TcpFlags = TcpFlags {
        syn: true,
        ..TcpFlags::NONE
    };

    /// SYN+ACK flags (connection acknowledgment)
    pub const SYN_ACK: TcpFlags = TcpFlags {
        syn: true,
        ack: true,
        ..TcpFlags::NONE
    };

    /// ACK flag
    pub const ACK: TcpFlags = TcpFlags {
        ack: true,
        ..TcpFlags::NONE
    };

    /// FIN+ACK flags (connection termination)
    pub const FIN_ACK: TcpFlags = TcpFlags {
        fin: true,
        ack: true,
        ..TcpFlags::NONE
    };

    /// RST flag (connection reset)
    pub const RST: TcpFlags = TcpFlags {
        rst: true,
        ..TcpFlags::NONE
    };

    /// PSH+ACK flags (push data)
    pub const PSH_ACK: TcpFlags = TcpFlags {
        psh: true,
        ack: true,
        ..TcpFlags::NONE
    };

    /// Convert flags to their 9-bit wire value (NS is bit 8)
    pub fn to_u16(self) -> u16 {
        let bits = [
            self.fin, self.syn, self.rst, self.psh, self.ack, self.urg, self.ece, self.cwr, self.ns,
        ];
        bits.iter()
            .enumerate()
            .filter(|(_, set)| **set)
            .fold(0u16, |acc, (i, _)| acc | (1 << i))
    }

    /// Parse flags from their 9-bit wire value; wider values are rejected
    pub fn from_bits(value: u16) -> Result<Self> {
        Error::check_width("flags", value as u64, 9)?;
        let bit = |i: u16| value & (1 << i) != 0;
        Ok(TcpFlags {
            fin: bit(0),
            syn: bit(1),
            rst: bit(2),
            psh: bit(3),
            ack: bit(4),
            urg: bit(5),
            ece: bit(6),
            cwr: bit(7),
            ns: bit(8),
        })
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (self.ns, "NS"),
            (self.cwr, "CWR"),
            (self.ece, "ECE"),
            (self.urg, "URG"),
            (self.ack, "ACK"),
            (self.psh, "PSH"),
            (self.rst, "RST"),
            (self.syn, "SYN"),
            (self.fin, "FIN"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            f.write_str("-")
        } else {
            f.write_str(&set.join("|"))
        }
    }
}

/// TCP segment
#[derive(Debug)]
pub struct Tcp {
    source_port: u16,
    destination_port: u16,
    sequence: u32,
    acknowledgment: u32,
    reserved: u8,
    flags: TcpFlags,
    window_size: u16,
    checksum: u16,
    urgent_pointer: u16,
    options: Vec<u8>,
    /// Addresses used for the checksum when no enclosing IP layer supplies them
    pseudo_header: Option<PseudoHeader>,
    payload: Option<Box<dyn Packet>>,
}

impl Tcp {
    /// TCP header size without options
    pub const HEADER_LENGTH: usize = 20;

    /// Maximum TCP header size (with maximum options)
    pub const MAX_HEADER_LENGTH: usize = 60;

    /// Maximum size of the options area
    pub const MAX_OPTIONS_LENGTH: usize = Self::MAX_HEADER_LENGTH - Self::HEADER_LENGTH;

    const CHECKSUM_OFFSET: usize = 16;

    /// Create a new TCP segment with a 65535-byte window and no payload
    pub fn new(source_port: u16, destination_port: u16) -> Self {
        Tcp {
            source_port,
            destination_port,
            sequence: 0,
            acknowledgment: 0,
            reserved: 0,
            flags: TcpFlags::NONE,
            window_size: 65535,
            checksum: 0,
            urgent_pointer: 0,
            options: Vec::new(),
            pseudo_header: None,
            payload: None,
        }
    }

    /// Parse the header; the rest of `data` becomes an opaque payload
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (mut segment, rest) = Self::parse(data)?;
        if !rest.is_empty() {
            segment.payload = Some(Box::new(Unknown::from_bytes(rest)));
        }
        Ok(segment)
    }

    /// Parse `length` bytes of `data` starting at `offset`
    pub fn new_instance(data: &[u8], offset: usize, length: usize) -> Result<Self> {
        Self::from_bytes(checked_range(data, offset, length)?)
    }

    pub(crate) fn parse(data: &[u8]) -> Result<(Self, &[u8])> {
        require_len("TCP", data, Self::HEADER_LENGTH)?;

        let data_offset = data[12] >> 4;
        if data_offset < 5 {
            return Err(Error::invalid_header(
                "TCP",
                format!("data offset {} words is below the minimum of 5", data_offset),
            ));
        }
        let header_len = (data_offset as usize) * 4;
        require_len("TCP", data, header_len)?;

        let flag_bits = (((data[12] & 0x01) as u16) << 8) | data[13] as u16;

        let segment = Tcp {
            source_port: u16::from_be_bytes([data[0], data[1]]),
            destination_port: u16::from_be_bytes([data[2], data[3]]),
            sequence: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            acknowledgment: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            reserved: (data[12] >> 1) & 0x07,
            flags: TcpFlags::from_bits(flag_bits)?,
            window_size: u16::from_be_bytes([data[14], data[15]]),
            checksum: u16::from_be_bytes([data[16], data[17]]),
            urgent_pointer: u16::from_be_bytes([data[18], data[19]]),
            options: data[Self::HEADER_LENGTH..header_len].to_vec(),
            pseudo_header: None,
            payload: None,
        };

        Ok((segment, &data[header_len..]))
    }

    pub fn source_port(&self) -> u16 {
        self.source_port
    }

    pub fn destination_port(&self) -> u16 {
        self.destination_port
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn acknowledgment(&self) -> u32 {
        self.acknowledgment
    }

    /// Header length in 32-bit words, derived from the options area
    pub fn data_offset(&self) -> u8 {
        (self.header_len() / 4) as u8
    }

    pub fn reserved(&self) -> u8 {
        self.reserved
    }

    pub fn flags(&self) -> TcpFlags {
        self.flags
    }

    pub fn window_size(&self) -> u16 {
        self.window_size
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    pub fn urgent_pointer(&self) -> u16 {
        self.urgent_pointer
    }

    pub fn options(&self) -> &[u8] {
        &self.options
    }

    pub fn with_source_port(mut self, port: u16) -> Self {
        self.source_port = port;
        self
    }

    pub fn with_destination_port(mut self, port: u16) -> Self {
        self.destination_port = port;
        self
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_acknowledgment(mut self, acknowledgment: u32) -> Self {
        self.acknowledgment = acknowledgment;
        self
    }

    pub fn with_flags(mut self, flags: TcpFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the flags from their 9-bit wire value
    pub fn with_flag_bits(mut self, bits: u16) -> Result<Self> {
        self.flags = TcpFlags::from_bits(bits)?;
        Ok(self)
    }

    /// Set the reserved bits between data offset and NS (3 bits)
    pub fn with_reserved(mut self, reserved: u8) -> Result<Self> {
        Error::check_width("reserved", reserved as u64, 3)?;
        self.reserved = reserved;
        Ok(self)
    }

    pub fn with_window_size(mut self, window_size: u16) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_urgent_pointer(mut self, pointer: u16) -> Self {
        self.urgent_pointer = pointer;
        self
    }

    /// Set TCP options, padded with zero bytes to a 4-byte boundary
    pub fn with_options(mut self, options: Vec<u8>) -> Result<Self> {
        self.options = pad_options("TCP", options, Self::MAX_OPTIONS_LENGTH)?;
        Ok(self)
    }

    /// Override the checksum; recomputed on build when addresses are known
    pub fn with_checksum(mut self, checksum: u16) -> Self {
        self.checksum = checksum;
        self
    }

    /// Addresses to checksum against when the segment is built on its own
    pub fn with_pseudo_header(mut self, pseudo: PseudoHeader) -> Self {
        self.pseudo_header = Some(pseudo);
        self
    }

    /// Attach `inner` as the segment data
    pub fn with_payload<P: Packet>(mut self, inner: P) -> Result<Self> {
        self.set_payload(Box::new(inner))?;
        Ok(self)
    }

    /// Checksum of header and payload under `pseudo`, with the checksum
    /// field taken as zero
    pub fn compute_checksum(&self, pseudo: &PseudoHeader) -> u16 {
        let mut bytes = self.to_bytes();
        bytes[Self::CHECKSUM_OFFSET..Self::CHECKSUM_OFFSET + 2].fill(0);
        transport_checksum(pseudo, ip_protocols::TCP, &bytes)
    }

    /// Check the stored checksum against header and payload under `pseudo`
    pub fn verify_checksum(&self, pseudo: &PseudoHeader) -> bool {
        validate_transport_checksum(pseudo, ip_protocols::TCP, &self.to_bytes())
    }
}

impl Packet for Tcp {
    fn kind(&self) -> PacketKind {
        PacketKind::Tcp
    }

    fn header_len(&self) -> usize {
        Self::HEADER_LENGTH + self.options.len()
    }

    fn write_header(&self, buf: &mut BytesMut) {
        buf.put_u16(self.source_port);
        buf.put_u16(self.destination_port);
        buf.put_u32(self.sequence);
        buf.put_u32(self.acknowledgment);

        // Data offset (4 bits) + Reserved (3 bits) + NS flag (1 bit)
        let flag_bits = self.flags.to_u16();
        buf.put_u8((self.data_offset() << 4) | (self.reserved << 1) | (flag_bits >> 8) as u8);
        buf.put_u8(flag_bits as u8);

        buf.put_u16(self.window_size);
        buf.put_u16(self.checksum);
        buf.put_u16(self.urgent_pointer);
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

    fn build_with(&mut self, pseudo: Option<&PseudoHeader>) -> Result<()> {
        check_depth(self)?;
        if let Some(inner) = self.payload.as_deref_mut() {
            inner.build_with(None)?;
        }

        match pseudo.copied().or(self.pseudo_header) {
            Some(pseudo) => {
                self.checksum = self.compute_checksum(&pseudo);
                trace!(checksum = self.checksum, "built TCP header");
            }
            None => {
                debug!("no pseudo-header available, TCP checksum left unchanged");
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Display for Tcp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TCP[sport={}, dport={}, seq={}, ack={}, flags={}, win={}, checksum=0x{:04x}, urg={}, options={}]",
            self.source_port,
            self.destination_port,
            self.sequence,
            self.acknowledgment,
            self.flags,
            self.window_size,
            self.checksum,
            self.urgent_pointer,
            self.options.len()
        )
    }
}
