//! 13-byte record shared by the writer and reader demos

use semshm::Record;

pub const KEY: i32 = 0x12;
pub const CAPACITY: usize = 64;
#[allow(dead_code)]
pub const TAG: &[u8; 8] = b"itssmasa";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Telemetry {
    pub tag: [u8; 8],
    pub data1: u8,
    pub data2: i16,
    pub data3: u16,
}

impl Telemetry {
    // Only the writer builds records from scratch
    #[allow(dead_code)]
    pub fn new(data1: u8, data2: i16, data3: u16) -> Self {
        Self {
            tag: *TAG,
            data1,
            data2,
            data3,
        }
    }

    pub fn tag_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.tag)
    }
}

impl Record for Telemetry {
    const LEN: usize = 13;

    fn encode(&self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.tag);
        out[8] = self.data1;
        out[9..11].copy_from_slice(&self.data2.to_le_bytes());
        out[11..13].copy_from_slice(&self.data3.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut tag = [0u8; 8];
        tag.copy_from_slice(&bytes[..8]);
        Self {
            tag,
            data1: bytes[8],
            data2: i16::from_le_bytes([bytes[9], bytes[10]]),
            data3: u16::from_le_bytes([bytes[11], bytes[12]]),
        }
    }
}

/// Install a `RUST_LOG`-driven subscriber, `info` by default
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
