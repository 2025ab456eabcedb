//! Windows channel over the Wintun driver.
//!
//! # Safety
//!
//! Loading `wintun.dll` is the only `unsafe` step: the library must be the
//! genuine Wintun DLL, since its exports are called without further checks.
//! Packets borrowed from the receive ring never leave this module; they are
//! copied into an owned [`Packet`] and dropped, which hands the slot back to
//! the driver.

use crate::config::ChannelConfig;
use crate::device::{Packet, PacketChannel, MTU};
use crate::hint::{AddressHint, LocalAddr};
use crate::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

// Field order is drop order: the session ends before the adapter closes.
struct Driver {
    session: wintun::Session,
    adapter: Arc<wintun::Adapter>,
}

/// A Wintun adapter with one running packet session.
pub struct WintunChannel {
    name: String,
    hint: AddressHint,
    driver: RwLock<Option<Driver>>,
    read_lock: Mutex<()>,
    write_lock: Mutex<()>,
}

impl WintunChannel {
    pub fn new(config: &ChannelConfig, address: LocalAddr) -> Result<Self> {
        let name = config.name.as_str();

        // Safety: wintun.dll is loaded from the standard search path and is
        // trusted to be the signed Wintun library.
        let wintun = unsafe { wintun::load() }.map_err(|e| Error::AdapterCreate {
            name: name.to_string(),
            reason: format!(
                "wintun.dll could not be loaded ({e}); place it next to the executable"
            ),
        })?;

        if wintun::Adapter::open(&wintun, name).is_ok() {
            return Err(Error::AdapterCreate {
                name: name.to_string(),
                reason: "an adapter with this name already exists".to_string(),
            });
        }

        let adapter = wintun::Adapter::create(&wintun, name, &config.tunnel_type, None)
            .map_err(|e| Error::AdapterCreate {
                name: name.to_string(),
                reason: format!("{e:?}; administrator rights are required"),
            })?;

        let session = adapter
            .start_session(config.ring_capacity)
            .map_err(|e| Error::SessionStart {
                name: name.to_string(),
                reason: format!("{e:?}"),
            })?;

        let hint = AddressHint::netsh(name, address);
        tracing::info!(
            name,
            ring_capacity = config.ring_capacity,
            "created Wintun adapter"
        );
        tracing::info!("{}", hint);

        Ok(Self {
            name: name.to_string(),
            hint,
            driver: RwLock::new(Some(Driver { session, adapter })),
            read_lock: Mutex::new(()),
            write_lock: Mutex::new(()),
        })
    }
}

impl PacketChannel for WintunChannel {
    fn read_packet(&self) -> Result<Packet> {
        let _serial = lock(&self.read_lock);
        let guard = self.driver.read().unwrap_or_else(PoisonError::into_inner);
        let driver = guard.as_ref().ok_or(Error::AlreadyClosed)?;

        let borrowed = driver.session.receive_blocking().map_err(|e| match e {
            wintun::Error::ShuttingDown => Error::AlreadyClosed,
            other => Error::Io(std::io::Error::other(format!("{other:?}"))),
        })?;

        let len = borrowed.bytes().len();
        let packet = Packet::from(borrowed.bytes());
        // Releases the ring slot.
        drop(borrowed);

        if len > MTU {
            return Err(Error::PacketTooLarge { len, mtu: MTU });
        }
        Ok(packet)
    }

    fn write_packet(&self, data: &[u8]) -> Result<()> {
        if data.len() > MTU {
            return Err(Error::InvalidLength {
                len: data.len(),
                mtu: MTU,
            });
        }

        let _serial = lock(&self.write_lock);
        let guard = self.driver.read().unwrap_or_else(PoisonError::into_inner);
        let driver = guard.as_ref().ok_or(Error::AlreadyClosed)?;

        let mut slot = driver
            .session
            .allocate_send_packet(data.len() as u16)
            .map_err(|e| match e {
                wintun::Error::ShuttingDown => Error::AlreadyClosed,
                other => Error::Allocation {
                    len: data.len(),
                    reason: format!("{other:?}"),
                },
            })?;
        slot.bytes_mut().copy_from_slice(data);
        driver.session.send_packet(slot);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        {
            let guard = self.driver.read().unwrap_or_else(PoisonError::into_inner);
            let Some(driver) = guard.as_ref() else {
                return Ok(());
            };
            // Wakes a reader parked in receive_blocking.
            if let Err(e) = driver.session.shutdown() {
                tracing::warn!(name = %self.name, error = ?e, "failed to shut down session");
            }
        }

        let driver = self
            .driver
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Driver { session, adapter }) = driver {
            drop(session);
            drop(adapter);
            tracing::info!(name = %self.name, "closed Wintun adapter");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn hint(&self) -> &AddressHint {
        &self.hint
    }
}

impl Drop for WintunChannel {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(name = %self.name, error = %e, "failed to close Wintun adapter");
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
