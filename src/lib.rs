//! Raw IP packet I/O over an OS virtual network interface.
//!
//! [`create_channel`] opens a TUN interface (Linux, `/dev/net/tun`) or a
//! Wintun adapter (Windows) and returns it as a [`PacketChannel`]. Address
//! assignment, routing and encryption are left to the caller; the channel
//! only reports the command an operator has to run, see [`AddressHint`].

pub mod config;
pub mod device;
pub mod error;
pub mod hint;
pub mod registry;
pub mod selector;

#[cfg(test)]
mod test;

pub use config::ChannelConfig;
pub use device::{Packet, PacketChannel, MTU};
pub use error::{Error, Result};
pub use hint::{AddressHint, LocalAddr};
pub use selector::{create_channel, create_channel_with};
