//! Multicast endpoint configuration
//!
//! A small YAML mapping:
//!
//! ```text
//! # group to publish on
//! addr: 224.16.32.1
//! port: 5000
//! ```
//!
//! Unknown keys are ignored. Repeating a key is an error.

use crate::error::{Result, SemShmError};
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::Path;
use std::str::FromStr;

/// Default location, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/multicast.cfg";

/// File contents before required keys are checked
#[derive(Debug, Deserialize)]
struct RawMulticastConfig {
    addr: Option<Ipv4Addr>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MulticastConfig {
    pub addr: Ipv4Addr,
    pub port: u16,
}

impl MulticastConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SemShmError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = text.parse()?;
        tracing::debug!(path = %path.display(), ?config, "Loaded multicast config");
        Ok(config)
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.addr, self.port)
    }

    fn validate(raw: RawMulticastConfig) -> Result<Self> {
        Ok(Self {
            addr: raw.addr.ok_or(SemShmError::ConfigMissing("addr"))?,
            port: raw.port.ok_or(SemShmError::ConfigMissing("port"))?,
        })
    }
}

impl FromStr for MulticastConfig {
    type Err = SemShmError;

    fn from_str(text: &str) -> Result<Self> {
        let raw: RawMulticastConfig =
            serde_yaml::from_str(text).map_err(|e| SemShmError::ConfigParse {
                line: e.location().map(|loc| loc.line()),
                message: e.to_string(),
            })?;
        Self::validate(raw)
    }
}
