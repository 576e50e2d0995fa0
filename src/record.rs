//! Fixed-size records exchanged over a channel
//!
//! The channel itself moves opaque bytes. Participants agree on a layout
//! by sharing one `Record` implementation, which pins both the length of
//! every transfer and the byte order of every field.

/// A value with a fixed-length binary encoding
pub trait Record: Sized {
    /// Encoded length in bytes
    const LEN: usize;

    /// Encode into `out`, which is exactly `LEN` bytes long
    fn encode(&self, out: &mut [u8]);

    /// Decode from `bytes`, which is exactly `LEN` bytes long
    fn decode(bytes: &[u8]) -> Self;
}

impl<const N: usize> Record for [u8; N] {
    const LEN: usize = N;

    fn encode(&self, out: &mut [u8]) {
        out.copy_from_slice(self);
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut arr = [0u8; N];
        arr.copy_from_slice(bytes);
        arr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Sample {
        id: u16,
        level: i32,
    }

    impl Record for Sample {
        const LEN: usize = 6;

        fn encode(&self, out: &mut [u8]) {
            out[..2].copy_from_slice(&self.id.to_le_bytes());
            out[2..6].copy_from_slice(&self.level.to_le_bytes());
        }

        fn decode(bytes: &[u8]) -> Self {
            Self {
                id: u16::from_le_bytes([bytes[0], bytes[1]]),
                level: i32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
            }
        }
    }

    #[test]
    fn test_layout_is_little_endian() {
        let mut out = [0u8; Sample::LEN];
        Sample { id: 0x0102, level: -2 }.encode(&mut out);
        assert_eq!(out, [0x02, 0x01, 0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(Sample::decode(&out), Sample { id: 0x0102, level: -2 });
    }

    #[test]
    fn test_byte_array_record() {
        assert_eq!(<[u8; 5] as Record>::LEN, 5);
        let decoded = <[u8; 5]>::decode(b"hello");
        assert_eq!(&decoded, b"hello");
    }
}
