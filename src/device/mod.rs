#[cfg(target_os = "linux")]
pub mod tun;
#[cfg(windows)]
pub mod wintun;

#[cfg(target_os = "linux")]
pub use self::tun::TunChannel;
#[cfg(windows)]
pub use self::wintun::WintunChannel;

#[cfg(test)]
pub use self::mock::MockChannel;

use crate::{AddressHint, Result};
use std::ops::Deref;

/// Largest packet a channel carries in either direction.
pub const MTU: usize = 1500;

/// A packet I/O capability over one OS-level virtual interface.
///
/// Operations block the calling thread. One reader and one writer may run in
/// parallel on the same channel; concurrent readers (or concurrent writers)
/// are serialized internally. `close` wakes any pending operation, which then
/// fails with [`Error::AlreadyClosed`](crate::Error::AlreadyClosed).
pub trait PacketChannel: Send + Sync {
    /// Block until the interface delivers one packet.
    fn read_packet(&self) -> Result<Packet>;

    /// Submit one packet of at most [`MTU`] bytes.
    fn write_packet(&self, data: &[u8]) -> Result<()>;

    /// Release the underlying OS resource. Closing twice is a no-op.
    fn close(&self) -> Result<()>;

    /// Name of the interface as the OS knows it.
    fn name(&self) -> &str;

    /// The address assignment the operator still has to perform.
    fn hint(&self) -> &AddressHint;

    fn mtu(&self) -> usize {
        MTU
    }
}

/// One IP packet, owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet(Vec<u8>);

impl Packet {
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Packet {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Packet {
    fn from(bytes: Vec<u8>) -> Self {
        Packet(bytes)
    }
}

impl From<&[u8]> for Packet {
    fn from(bytes: &[u8]) -> Self {
        Packet(bytes.to_vec())
    }
}
