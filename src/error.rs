//! Error types for packet channels.

use std::io;
use thiserror::Error;

/// Errors surfaced by channel construction and packet I/O.
///
/// Nothing in this crate retries on its own. Callers decide whether to drop,
/// retry or tear down; [`Error::is_transient`] marks the one case where a
/// retry after a short backoff is reasonable.
#[derive(Debug, Error)]
pub enum Error {
    /// The TUN control device could not be opened.
    #[error("cannot open {path}: {reason}")]
    DeviceOpen {
        path: &'static str,
        reason: String,
        #[source]
        source: io::Error,
    },

    /// The driver refused to create the virtual adapter.
    #[error("cannot create adapter '{name}': {reason}")]
    AdapterCreate { name: String, reason: String },

    /// The kernel rejected the interface configuration request.
    #[error("cannot configure interface '{name}': {reason}")]
    InterfaceConfig {
        name: String,
        reason: String,
        #[source]
        source: Option<io::Error>,
    },

    /// The driver could not start a packet session on the adapter.
    #[error("cannot start session on adapter '{name}': {reason}")]
    SessionStart { name: String, reason: String },

    /// A read or write failed against an open channel.
    #[error("packet I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The OS handed back fewer bytes than a packet can hold.
    #[error("short read: received {received} bytes")]
    ShortRead { received: usize },

    /// The OS accepted only part of a packet.
    #[error("short write: {written} of {len} bytes accepted")]
    ShortWrite { written: usize, len: usize },

    /// An inbound packet exceeded the channel MTU.
    #[error("inbound packet of {len} bytes exceeds MTU of {mtu}")]
    PacketTooLarge { len: usize, mtu: usize },

    /// An outbound payload exceeded the channel MTU. Nothing was sent.
    #[error("outbound packet of {len} bytes exceeds MTU of {mtu}")]
    InvalidLength { len: usize, mtu: usize },

    /// The send ring had no room for the packet.
    #[error("cannot allocate {len} bytes in send ring: {reason}")]
    Allocation { len: usize, reason: String },

    /// The channel has been closed.
    #[error("channel is closed")]
    AlreadyClosed,

    /// Rejected configuration or address input.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No backend exists for the build target.
    #[error("TUN channels are not supported on {0}")]
    Unsupported(&'static str),
}

impl Error {
    /// Returns true if the failure reflects transient backpressure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Allocation { .. })
    }

    /// Returns true if the channel was torn down under the caller.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::AlreadyClosed)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
