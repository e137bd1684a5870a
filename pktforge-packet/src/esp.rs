//! IPsec Encapsulating Security Payload header
//!
//! Only the cleartext SPI and sequence number are modelled. Everything after
//! them is ciphertext and is carried as an opaque [`Unknown`] payload.

use crate::checksum::PseudoHeader;
use crate::packet::{check_attach, check_depth, checked_range, require_len, Packet, PacketKind};
use crate::unknown::Unknown;
use bytes::{BufMut, BytesMut};
use pktforge_core::Result;
use std::any::Any;
use std::fmt;

/// ESP header
#[derive(Debug)]
pub struct Esp {
    spi: u32,
    sequence: u32,
    payload: Option<Box<dyn Packet>>,
}

impl Esp {
    pub const HEADER_LENGTH: usize = 8;

    pub fn new(spi: u32, sequence: u32) -> Self {
        Esp {
            spi,
            sequence,
            payload: None,
        }
    }

    /// Parse the header; the rest of `data` becomes an opaque payload
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        require_len("ESP", data, Self::HEADER_LENGTH)?;
        let mut esp = Esp::new(
            u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        );
        let rest = &data[Self::HEADER_LENGTH..];
        if !rest.is_empty() {
            esp.payload = Some(Box::new(Unknown::from_bytes(rest)));
        }
        Ok(esp)
    }

    /// Parse `length` bytes of `data` starting at `offset`
    pub fn new_instance(data: &[u8], offset: usize, length: usize) -> Result<Self> {
        Self::from_bytes(checked_range(data, offset, length)?)
    }

    /// Security parameter index
    pub fn spi(&self) -> u32 {
        self.spi
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn with_spi(mut self, spi: u32) -> Self {
        self.spi = spi;
        self
    }

    pub fn with_sequence(mut self, sequence: u32) -> Self {
        self.sequence = sequence;
        self
    }

    /// Attach `inner` as the protected data
    pub fn with_payload<P: Packet>(mut self, inner: P) -> Result<Self> {
        self.set_payload(Box::new(inner))?;
        Ok(self)
    }
}

impl Packet for Esp {
    fn kind(&self) -> PacketKind {
        PacketKind::Esp
    }

    fn header_len(&self) -> usize {
        Self::HEADER_LENGTH
    }

    fn write_header(&self, buf: &mut BytesMut) {
        buf.put_u32(self.spi);
        buf.put_u32(self.sequence);
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

    fn build_with(&mut self, _pseudo: Option<&PseudoHeader>) -> Result<()> {
        check_depth(self)?;
        // No derived fields
        match self.payload.as_deref_mut() {
            Some(inner) => inner.build_with(None),
            None => Ok(()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Display for Esp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ESP[spi=0x{:08x}, seq={}]", self.spi, self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_esp_layout() {
        let esp = Esp::new(0xDEADBEEF, 42);
        assert_eq!(esp.to_bytes(), vec![0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 42]);
        assert_eq!(esp.to_string(), "ESP[spi=0xdeadbeef, seq=42]");
    }

    #[test]
    fn test_esp_keeps_ciphertext() {
        let data = [0, 0, 1, 0, 0, 0, 0, 5, 0xAA, 0xBB, 0xCC];
        let esp = Esp::from_bytes(&data).unwrap();
        assert_eq!(esp.spi(), 256);
        assert_eq!(esp.sequence(), 5);
        assert_eq!(esp.payload().unwrap().len(), 3);
        assert_eq!(esp.to_bytes(), data);
    }

    #[test]
    fn test_esp_truncated() {
        assert!(Esp::from_bytes(&[0; 7]).is_err());
        assert!(Esp::new_instance(&[0; 8], 4, 8).is_err());
    }
}
