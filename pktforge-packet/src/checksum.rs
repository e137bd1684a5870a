//! Checksum calculations for network packets
//!
//! This module provides the Internet Checksum (RFC 1071) used in IPv4, ICMP,
//! ICMPv6, TCP and UDP, together with the IPv4 and IPv6 pseudo-headers that
//! the transport checksums cover.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Adds the 16-bit big-endian words of `data` to `sum` without folding.
///
/// An odd trailing byte is treated as the high byte of a word whose low byte
/// is zero.
fn accumulate(mut sum: u64, data: &[u8]) -> u64 {
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u64;
    }

    if let Some(&byte) = chunks.remainder().first() {
        sum += (byte as u64) << 8;
    }

    sum
}

/// Folds carries above bit 16 back into the low 16 bits until none remain.
fn fold(mut sum: u64) -> u16 {
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

/// Calculates the Internet Checksum as defined in RFC 1071.
///
/// The data is treated as a sequence of 16-bit words which are summed with
/// end-around carry; the result is the one's complement of that sum. A result
/// of `0xFFFF` is returned as-is.
///
/// # Examples
///
/// ```
/// use pktforge_packet::checksum::internet_checksum;
///
/// let data = vec![0x45, 0x00, 0x00, 0x3c];
/// let checksum = internet_checksum(&data);
/// assert_eq!(checksum, !0x453c);
/// ```
pub fn internet_checksum(data: &[u8]) -> u16 {
    !fold(accumulate(0, data))
}

/// Calculates the Internet Checksum of `data` as if the two bytes at
/// `checksum_offset` were zero.
///
/// This is how a header checksum is computed over a header that already
/// carries a (possibly stale) checksum value.
pub fn checksum_excluding(data: &[u8], checksum_offset: usize) -> u16 {
    let mut sum = accumulate(0, data);
    if let Some(field) = data.get(checksum_offset..checksum_offset + 2) {
        // The field sits on an even offset in every header that uses this.
        sum -= u16::from_be_bytes([field[0], field[1]]) as u64;
    }
    !fold(sum)
}

/// The network-layer part of a transport checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoHeader {
    /// RFC 793 pseudo-header: source, destination, zero, protocol, length
    V4 {
        source: Ipv4Addr,
        destination: Ipv4Addr,
    },
    /// RFC 8200 pseudo-header: source, destination, 32-bit length, next header
    V6 {
        source: Ipv6Addr,
        destination: Ipv6Addr,
    },
}

impl PseudoHeader {
    /// Sum of the pseudo-header words for a segment of `length` bytes
    fn sum(&self, protocol: u8, length: usize) -> u64 {
        match self {
            PseudoHeader::V4 {
                source,
                destination,
            } => {
                let sum = accumulate(0, &source.octets());
                let sum = accumulate(sum, &destination.octets());
                sum + protocol as u64 + (length as u64 & 0xFFFF)
            }
            PseudoHeader::V6 {
                source,
                destination,
            } => {
                let sum = accumulate(0, &source.octets());
                let sum = accumulate(sum, &destination.octets());
                let length = length as u32;
                sum + (length >> 16) as u64 + (length & 0xFFFF) as u64 + protocol as u64
            }
        }
    }
}

/// Calculates the checksum for a TCP, UDP or ICMPv6 message including the
/// pseudo-header.
///
/// `data` is the transport header (with its checksum field zeroed) followed by
/// the payload.
///
/// # Examples
///
/// ```
/// use std::net::Ipv4Addr;
/// use pktforge_packet::checksum::{transport_checksum, PseudoHeader};
///
/// let pseudo = PseudoHeader::V4 {
///     source: Ipv4Addr::new(192, 168, 1, 1),
///     destination: Ipv4Addr::new(192, 168, 1, 2),
/// };
/// let data = vec![0x00, 0x35, 0x00, 0x35, 0x00, 0x08, 0x00, 0x00];
/// let checksum = transport_checksum(&pseudo, 17, &data);
/// assert_ne!(checksum, 0);
/// ```
pub fn transport_checksum(pseudo: &PseudoHeader, protocol: u8, data: &[u8]) -> u16 {
    let sum = pseudo.sum(protocol, data.len());
    !fold(accumulate(sum, data))
}

/// Validates an Internet checksum.
///
/// Summing the covered data including its checksum field yields 0xFFFF for a
/// correct checksum, so the complement computed here is 0 (or 0xFFFF for the
/// negative-zero representation).
pub fn validate_checksum(data: &[u8]) -> bool {
    let result = internet_checksum(data);
    result == 0 || result == 0xFFFF
}

/// Validates a pseudo-header checksum over `data` (checksum field included).
pub fn validate_transport_checksum(pseudo: &PseudoHeader, protocol: u8, data: &[u8]) -> bool {
    let result = transport_checksum(pseudo, protocol, data);
    result == 0 || result == 0xFFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internet_checksum_empty() {
        assert_eq!(internet_checksum(&[]), 0xFFFF);
    }

    #[test]
    fn test_internet_checksum_rfc1071_example() {
        // RFC 1071 section 3: the words sum to 0xddf2
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(internet_checksum(&data), !0xddf2);
    }

    #[test]
    fn test_internet_checksum_odd_length() {
        // 0x0001 + 0x0200 (odd byte padded with a zero low byte)
        let data = [0x00, 0x01, 0x02];
        assert_eq!(internet_checksum(&data), !0x0201);
    }

    #[test]
    fn test_all_ones_is_not_remapped() {
        // Sum of zero words complements to all-ones and stays that way
        assert_eq!(internet_checksum(&[0x00, 0x00, 0x00, 0x00]), 0xFFFF);
    }

    #[test]
    fn test_checksum_excluding_ignores_stale_field() {
        let header = hex::decode("4500003497d8400040064fe3ac1001e59df00723").unwrap();
        assert_eq!(checksum_excluding(&header, 10), 0x4fe3);

        let mut zeroed = header.clone();
        zeroed[10] = 0;
        zeroed[11] = 0;
        assert_eq!(internet_checksum(&zeroed), 0x4fe3);
    }

    #[test]
    fn test_validate_checksum() {
        let data = vec![0x45, 0x00, 0x00, 0x3c];
        let checksum = internet_checksum(&data);

        let mut data_with_checksum = data.clone();
        data_with_checksum.extend_from_slice(&checksum.to_be_bytes());

        assert!(validate_checksum(&data_with_checksum));
        data_with_checksum[0] ^= 0x01;
        assert!(!validate_checksum(&data_with_checksum));
    }

    #[test]
    fn test_transport_checksum_v4_matches_explicit_pseudo_header() {
        let src = Ipv4Addr::new(192, 168, 1, 1);
        let dst = Ipv4Addr::new(192, 168, 1, 2);
        let data = vec![0x00, 0x35, 0x00, 0x35, 0x00, 0x08, 0x00, 0x00];

        let mut explicit = Vec::new();
        explicit.extend_from_slice(&src.octets());
        explicit.extend_from_slice(&dst.octets());
        explicit.push(0);
        explicit.push(17);
        explicit.extend_from_slice(&(data.len() as u16).to_be_bytes());
        explicit.extend_from_slice(&data);

        let pseudo = PseudoHeader::V4 {
            source: src,
            destination: dst,
        };
        assert_eq!(
            transport_checksum(&pseudo, 17, &data),
            internet_checksum(&explicit)
        );
    }

    #[test]
    fn test_transport_checksum_v6_matches_explicit_pseudo_header() {
        let src: Ipv6Addr = "fe80::1".parse().unwrap();
        let dst: Ipv6Addr = "ff02::1".parse().unwrap();
        let data = vec![0x80, 0x00, 0x00, 0x00, 0x12, 0x34, 0x00, 0x01, 0xaa];

        let mut explicit = Vec::new();
        explicit.extend_from_slice(&src.octets());
        explicit.extend_from_slice(&dst.octets());
        explicit.extend_from_slice(&(data.len() as u32).to_be_bytes());
        explicit.extend_from_slice(&[0, 0, 0, 58]);
        explicit.extend_from_slice(&data);

        let pseudo = PseudoHeader::V6 {
            source: src,
            destination: dst,
        };
        assert_eq!(
            transport_checksum(&pseudo, 58, &data),
            internet_checksum(&explicit)
        );
    }

    #[test]
    fn test_checksum_complement_identity() {
        let data = vec![0x12, 0x34, 0x56, 0x78];
        let checksum = internet_checksum(&data);

        let mut data_with_checksum = data;
        data_with_checksum.extend_from_slice(&checksum.to_be_bytes());

        let result = internet_checksum(&data_with_checksum);
        assert!(result == 0 || result == 0xFFFF);
    }
}
