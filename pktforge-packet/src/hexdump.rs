//! Pretty-printing of byte buffers for diagnostics

use std::fmt::Write;

const BYTES_PER_ROW: usize = 16;

/// Render `data` as rows of offset, sixteen hex bytes and an ASCII gutter.
///
/// ```
/// use pktforge_packet::hexdump::pretty_hex_dump;
///
/// let dump = pretty_hex_dump(b"GET / HTTP/1.1\r\n");
/// assert!(dump.starts_with("00000000  47 45 54 20"));
/// assert!(dump.ends_with("|GET / HTTP/1.1..|"));
/// ```
pub fn pretty_hex_dump(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 4 + 32);

    for (row, chunk) in data.chunks(BYTES_PER_ROW).enumerate() {
        if row > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{:08x} ", row * BYTES_PER_ROW);

        for i in 0..BYTES_PER_ROW {
            match chunk.get(i) {
                Some(byte) => {
                    out.push(' ');
                    out.push_str(&hex::encode([*byte]));
                }
                None => out.push_str("   "),
            }
        }

        out.push_str("  |");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push('|');
    }

    out
}

/// Render `data` as one contiguous lowercase hex string
pub fn hex_stream(data: &[u8]) -> String {
    hex::encode(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_dump() {
        assert_eq!(pretty_hex_dump(&[]), "");
    }

    #[test]
    fn test_partial_row_is_aligned() {
        let dump = pretty_hex_dump(&[0x00, 0x41]);
        assert_eq!(
            dump,
            format!("00000000  00 41{}  |.A|", " ".repeat(3 * 14))
        );
    }

    #[test]
    fn test_multiple_rows() {
        let data: Vec<u8> = (0u8..20).collect();
        let dump = pretty_hex_dump(&data);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("00000010  10 11 12 13"));
    }

    #[test]
    fn test_hex_stream() {
        assert_eq!(hex_stream(&[0x08, 0x00, 0xff]), "0800ff");
    }
}
