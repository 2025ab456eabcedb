//! Linux TUN channel over `/dev/net/tun`.
//!
//! The control device is opened non-blocking and every blocking operation
//! waits in `poll(2)` on the device and on a private wake pipe. `close`
//! writes to the pipe, so a reader parked in `read_packet` returns
//! [`Error::AlreadyClosed`] instead of hanging, and only then is the device
//! fd released. Once the last fd is closed the kernel removes the interface.

use crate::device::{Packet, PacketChannel, MTU};
use crate::hint::{AddressHint, LocalAddr};
use crate::{Error, Result};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

pub const TUN_PATH: &str = "/dev/net/tun";

/// `struct ifreq` restricted to the name and flags members.
#[repr(C)]
struct IfReq {
    name: [libc::c_char; libc::IFNAMSIZ],
    flags: libc::c_short,
    _pad: [u8; 22],
}

impl IfReq {
    fn new(name: &str, flags: libc::c_short) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() >= libc::IFNAMSIZ || bytes.contains(&0) {
            return Err(Error::InvalidConfig(format!(
                "'{}' is not a valid interface name",
                name.escape_debug()
            )));
        }
        let mut req = IfReq {
            name: [0; libc::IFNAMSIZ],
            flags,
            _pad: [0; 22],
        };
        for (dst, src) in req.name.iter_mut().zip(bytes) {
            *dst = *src as libc::c_char;
        }
        Ok(req)
    }

    fn name(&self) -> String {
        let bytes: Vec<u8> = self
            .name
            .iter()
            .take_while(|c| **c != 0)
            .map(|c| *c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

// TUNSETIFF is _IOW('T', 202, int) even though it takes a struct ifreq,
// and the kernel writes the resolved name back into the request.
nix::ioctl_readwrite_bad!(
    tun_set_iff,
    nix::request_code_write!(b'T', 202, std::mem::size_of::<libc::c_int>()),
    IfReq
);

struct Handles {
    device: File,
    wake_rx: OwnedFd,
    wake_tx: OwnedFd,
}

/// A TUN interface in pure-IP mode (`IFF_TUN | IFF_NO_PI`).
pub struct TunChannel {
    name: String,
    hint: AddressHint,
    handles: RwLock<Option<Handles>>,
    // one extra byte to detect oversized packets
    read_buf: Mutex<Vec<u8>>,
    write_lock: Mutex<()>,
}

impl TunChannel {
    /// Create the interface `name` and return a channel bound to it.
    ///
    /// The interface exists without an address until the operator runs the
    /// commands in [`TunChannel::hint`]. `name` may be a kernel pattern such
    /// as `tun%d`; [`PacketChannel::name`] then reports the resolved name.
    pub fn new(name: &str, address: LocalAddr) -> Result<Self> {
        let mut req = IfReq::new(name, (libc::IFF_TUN | libc::IFF_NO_PI) as libc::c_short)?;

        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(TUN_PATH)
            .map_err(|e| Error::DeviceOpen {
                path: TUN_PATH,
                reason: open_failure_reason(&e),
                source: e,
            })?;

        // Safety: `req` is a properly sized, initialized ifreq that outlives the call.
        unsafe { tun_set_iff(device.as_raw_fd(), &mut req) }.map_err(|errno| {
            Error::InterfaceConfig {
                name: name.to_string(),
                reason: config_failure_reason(errno),
                source: Some(io::Error::from(errno)),
            }
        })?;

        let actual = req.name();
        let hint = AddressHint::iproute(&actual, address);
        tracing::info!(name = %actual, "created TUN interface");
        tracing::info!("{}", hint);

        Self::from_fd(actual, hint, device.into())
    }

    /// Wrap an already configured, non-blocking packet fd.
    pub(crate) fn from_fd(name: String, hint: AddressHint, fd: OwnedFd) -> Result<Self> {
        let (wake_rx, wake_tx) = nix::unistd::pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)
            .map_err(io::Error::from)?;

        Ok(Self {
            name,
            hint,
            handles: RwLock::new(Some(Handles {
                device: File::from(fd),
                wake_rx,
                wake_tx,
            })),
            read_buf: Mutex::new(vec![0u8; MTU + 1]),
            write_lock: Mutex::new(()),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.handles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl PacketChannel for TunChannel {
    fn read_packet(&self) -> Result<Packet> {
        let mut buf = lock(&self.read_buf);
        let guard = self.handles.read().unwrap_or_else(PoisonError::into_inner);
        let handles = guard.as_ref().ok_or(Error::AlreadyClosed)?;

        loop {
            wait(handles, PollFlags::POLLIN)?;
            match (&handles.device).read(&mut buf[..]) {
                Ok(0) => return Err(Error::ShortRead { received: 0 }),
                Ok(n) if n > MTU => return Err(Error::PacketTooLarge { len: n, mtu: MTU }),
                Ok(n) => return Ok(Packet::from(&buf[..n])),
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::Interrupted =>
                {
                    continue
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn write_packet(&self, data: &[u8]) -> Result<()> {
        if data.len() > MTU {
            return Err(Error::InvalidLength {
                len: data.len(),
                mtu: MTU,
            });
        }

        let _serial = lock(&self.write_lock);
        let guard = self.handles.read().unwrap_or_else(PoisonError::into_inner);
        let handles = guard.as_ref().ok_or(Error::AlreadyClosed)?;

        loop {
            match (&handles.device).write(data) {
                Ok(n) if n == data.len() => return Ok(()),
                Ok(n) => {
                    return Err(Error::ShortWrite {
                        written: n,
                        len: data.len(),
                    })
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    wait(handles, PollFlags::POLLOUT)?;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn close(&self) -> Result<()> {
        {
            let guard = self.handles.read().unwrap_or_else(PoisonError::into_inner);
            let Some(handles) = guard.as_ref() else {
                return Ok(());
            };
            // Never drained, so every later poll sees it too.
            if let Err(e) = nix::unistd::write(&handles.wake_tx, &[1u8]) {
                tracing::warn!(name = %self.name, error = %e, "failed to signal pending operations");
            }
        }

        let handles = self
            .handles
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if handles.is_some() {
            drop(handles);
            tracing::info!(name = %self.name, "closed TUN interface");
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

impl Drop for TunChannel {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(name = %self.name, error = %e, "failed to close TUN interface");
        }
    }
}

/// Block until the device is ready for `events` or the channel is closed.
fn wait(handles: &Handles, events: PollFlags) -> Result<()> {
    loop {
        let mut fds = [
            PollFd::new(handles.device.as_fd(), events),
            PollFd::new(handles.wake_rx.as_fd(), PollFlags::POLLIN),
        ];
        match poll(&mut fds, PollTimeout::NONE) {
            Ok(_) => {}
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(io::Error::from(e).into()),
        }

        if fds[1].revents().is_some_and(|r| !r.is_empty()) {
            return Err(Error::AlreadyClosed);
        }
        // Errors and hangups surface through the following read or write.
        if fds[0].revents().is_some_and(|r| !r.is_empty()) {
            return Ok(());
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn open_failure_reason(e: &io::Error) -> String {
    match e.raw_os_error() {
        Some(libc::ENOENT) | Some(libc::ENODEV) | Some(libc::ENXIO) => {
            "TUN support is missing; load the kernel module with `modprobe tun`".to_string()
        }
        Some(libc::EACCES) | Some(libc::EPERM) => {
            "permission denied; run as root or grant CAP_NET_ADMIN".to_string()
        }
        _ => e.to_string(),
    }
}

fn config_failure_reason(errno: Errno) -> String {
    match errno {
        Errno::EBUSY => "name already in use by another interface".to_string(),
        Errno::EPERM | Errno::EACCES => {
            "permission denied; run as root or grant CAP_NET_ADMIN".to_string()
        }
        Errno::EINVAL => "the kernel rejected the interface name or flags".to_string(),
        other => other.desc().to_string(),
    }
}
