//! Operator-facing address assignment hints.
//!
//! Channels never configure addresses themselves. After creating an
//! interface they surface the command an operator has to run to give it the
//! requested address.

use crate::{Error, Result};
use std::fmt;
use std::net::IpAddr;

/// Address parsed from the `local_ip` string, optionally with a prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalAddr {
    pub ip: IpAddr,
    pub prefix: Option<u8>,
}

impl LocalAddr {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };

        let ip: IpAddr = addr
            .parse()
            .map_err(|_| Error::InvalidConfig(format!("'{s}' is not an IP address")))?;

        let max = if ip.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => match p.parse::<u8>() {
                Ok(p) if p <= max => Some(p),
                _ => {
                    return Err(Error::InvalidConfig(format!(
                        "'{p}' is not a valid prefix length for {ip}"
                    )))
                }
            },
            None => None,
        };

        Ok(Self { ip, prefix })
    }
}

impl fmt::Display for LocalAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prefix {
            Some(p) => write!(f, "{}/{}", self.ip, p),
            None => write!(f, "{}", self.ip),
        }
    }
}

/// The commands that assign `address` to the interface `interface`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressHint {
    pub interface: String,
    pub address: LocalAddr,
    commands: Vec<String>,
}

impl AddressHint {
    /// `ip(8)` commands for a Linux TUN interface.
    pub fn iproute(interface: &str, address: LocalAddr) -> Self {
        let family = if address.ip.is_ipv6() { "-6 " } else { "" };
        Self {
            interface: interface.to_string(),
            address,
            commands: vec![
                format!("sudo ip {family}addr add {address} dev {interface}"),
                format!("sudo ip link set dev {interface} up"),
            ],
        }
    }

    /// `netsh` command for a Windows adapter.
    pub fn netsh(interface: &str, address: LocalAddr) -> Self {
        let command = match address.ip {
            IpAddr::V4(ip) => {
                let mask = prefix_to_mask(address.prefix.unwrap_or(24));
                format!(
                    "netsh interface ip set address name=\"{interface}\" static {ip} {mask}"
                )
            }
            IpAddr::V6(_) => format!(
                "netsh interface ipv6 add address interface=\"{interface}\" address={address}"
            ),
        };
        Self {
            interface: interface.to_string(),
            address,
            commands: vec![command],
        }
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }
}

impl fmt::Display for AddressHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "interface {} has no address yet; assign {} with:",
            self.interface, self.address
        )?;
        for cmd in &self.commands {
            writeln!(f, "  {cmd}")?;
        }
        Ok(())
    }
}

fn prefix_to_mask(prefix: u8) -> std::net::Ipv4Addr {
    let bits = match prefix {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p.min(32))),
    };
    std::net::Ipv4Addr::from(bits)
}
