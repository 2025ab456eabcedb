//! Picks the channel backend for the build target.

use crate::config::ChannelConfig;
use crate::device::{Packet, PacketChannel};
use crate::hint::{AddressHint, LocalAddr};
use crate::registry::NameLease;
use crate::{Error, Result};
use std::sync::{Mutex, PoisonError};

/// Create a channel on the default interface name.
///
/// `local_ip` (e.g. `10.0.0.2` or `10.0.0.2/24`) is only used to build the
/// [`AddressHint`] for the operator; no address is assigned here.
pub fn create_channel(local_ip: &str) -> Result<Box<dyn PacketChannel>> {
    create_channel_with(local_ip, &ChannelConfig::default())
}

pub fn create_channel_with(
    local_ip: &str,
    config: &ChannelConfig,
) -> Result<Box<dyn PacketChannel>> {
    let address = LocalAddr::parse(local_ip)?;
    config.validate()?;

    // The kernel hands out a fresh name for patterns.
    let lease = if config.is_name_pattern() {
        None
    } else {
        Some(NameLease::acquire(&config.name).ok_or_else(|| name_in_use(&config.name))?)
    };

    open_backend(config, address, lease)
}

#[cfg(target_os = "linux")]
fn open_backend(
    config: &ChannelConfig,
    address: LocalAddr,
    lease: Option<NameLease>,
) -> Result<Box<dyn PacketChannel>> {
    let channel = crate::device::TunChannel::new(&config.name, address)?;
    Ok(Box::new(Leased::new(channel, lease)))
}

#[cfg(windows)]
fn open_backend(
    config: &ChannelConfig,
    address: LocalAddr,
    lease: Option<NameLease>,
) -> Result<Box<dyn PacketChannel>> {
    let channel = crate::device::WintunChannel::new(config, address)?;
    Ok(Box::new(Leased::new(channel, lease)))
}

#[cfg(not(any(target_os = "linux", windows)))]
fn open_backend(
    _config: &ChannelConfig,
    _address: LocalAddr,
    _lease: Option<NameLease>,
) -> Result<Box<dyn PacketChannel>> {
    Err(Error::Unsupported(std::env::consts::OS))
}

fn name_in_use(name: &str) -> Error {
    let reason = "name is held by another open channel in this process".to_string();
    if cfg!(windows) {
        Error::AdapterCreate {
            name: name.to_string(),
            reason,
        }
    } else {
        Error::InterfaceConfig {
            name: name.to_string(),
            reason,
            source: None,
        }
    }
}

/// A channel that frees its name lease once closed.
struct Leased<C> {
    // Declared first so the channel drops before the lease.
    inner: C,
    lease: Mutex<Option<NameLease>>,
}

impl<C: PacketChannel> Leased<C> {
    fn new(inner: C, lease: Option<NameLease>) -> Self {
        Self {
            inner,
            lease: Mutex::new(lease),
        }
    }
}

impl<C: PacketChannel> PacketChannel for Leased<C> {
    fn read_packet(&self) -> Result<Packet> {
        self.inner.read_packet()
    }

    fn write_packet(&self, data: &[u8]) -> Result<()> {
        self.inner.write_packet(data)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()?;
        self.lease
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn hint(&self) -> &AddressHint {
        self.inner.hint()
    }

    fn mtu(&self) -> usize {
        self.inner.mtu()
    }
}
