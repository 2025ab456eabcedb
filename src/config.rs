use crate::{Error, Result};

/// Interface name used when none is configured.
#[cfg(windows)]
pub const DEFAULT_NAME: &str = "tunwire";
#[cfg(not(windows))]
pub const DEFAULT_NAME: &str = "tun0";

/// Tunnel type reported by the Windows driver for our adapters.
pub const DEFAULT_TUNNEL_TYPE: &str = "tunwire";

/// Session ring size in bytes (4 MiB).
pub const DEFAULT_RING_CAPACITY: u32 = 0x40_0000;
pub const MIN_RING_CAPACITY: u32 = 0x2_0000;
pub const MAX_RING_CAPACITY: u32 = 0x400_0000;

// IFNAMSIZ, including the trailing NUL
const MAX_NAME_LEN: usize = 15;

/// Settings for a single channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Interface or adapter name. On Linux a `%d` pattern lets the kernel pick.
    pub name: String,
    /// Driver session ring size (Windows only).
    pub ring_capacity: u32,
    /// Driver tunnel type (Windows only).
    pub tunnel_type: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            ring_capacity: DEFAULT_RING_CAPACITY,
            tunnel_type: DEFAULT_TUNNEL_TYPE.to_string(),
        }
    }
}

impl ChannelConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_ring_capacity(mut self, capacity: u32) -> Self {
        self.ring_capacity = capacity;
        self
    }

    pub fn with_tunnel_type(mut self, tunnel_type: impl Into<String>) -> Self {
        self.tunnel_type = tunnel_type.into();
        self
    }

    /// True if the kernel picks the final name.
    pub fn is_name_pattern(&self) -> bool {
        self.name.contains('%')
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidConfig("interface name is empty".into()));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(Error::InvalidConfig(format!(
                "interface name '{}' is longer than {} bytes",
                self.name, MAX_NAME_LEN
            )));
        }
        if let Some(c) = self
            .name
            .chars()
            .find(|c| *c == '\0' || *c == '/' || c.is_whitespace())
        {
            return Err(Error::InvalidConfig(format!(
                "interface name '{}' contains {:?}",
                self.name.escape_debug(),
                c
            )));
        }

        let cap = self.ring_capacity;
        if !cap.is_power_of_two() || !(MIN_RING_CAPACITY..=MAX_RING_CAPACITY).contains(&cap) {
            return Err(Error::InvalidConfig(format!(
                "ring capacity {cap:#x} must be a power of two between {MIN_RING_CAPACITY:#x} and {MAX_RING_CAPACITY:#x}"
            )));
        }

        if self.tunnel_type.is_empty() {
            return Err(Error::InvalidConfig("tunnel type is empty".into()));
        }

        Ok(())
    }
}
