use anyhow::{Context, Result};
use clap::Parser;
use etherparse::{Ipv4HeaderSlice, Ipv6HeaderSlice};
use tracing_subscriber::EnvFilter;
use tunwire::{create_channel_with, ChannelConfig, Error};

#[derive(Debug, Parser)]
#[command(
    name = "tunwire",
    version,
    about = "Open a TUN interface and log every packet routed into it"
)]
struct Cli {
    /// Address the operator will assign to the interface (e.g. 10.0.0.2/24)
    #[arg(long, default_value = "10.0.0.2/24")]
    local_ip: String,

    /// Interface name; on Linux `tun%d` lets the kernel pick
    #[arg(long, default_value = tunwire::config::DEFAULT_NAME)]
    name: String,

    /// Wintun session ring size in bytes
    #[arg(long, default_value_t = tunwire::config::DEFAULT_RING_CAPACITY)]
    ring_capacity: u32,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tunwire={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ChannelConfig::default()
        .with_name(cli.name)
        .with_ring_capacity(cli.ring_capacity);
    let channel = create_channel_with(&cli.local_ip, &config)
        .with_context(|| format!("failed to open interface '{}'", config.name))?;

    print!("{}", channel.hint());
    println!("Listening on {} …", channel.name());

    loop {
        match channel.read_packet() {
            Ok(packet) => println!("📥 {}", summarize(&packet)),
            Err(e @ Error::PacketTooLarge { .. }) => tracing::warn!("dropped: {e}"),
            Err(e) => {
                channel.close()?;
                return Err(e).context("packet read failed");
            }
        }
    }
}

fn summarize(packet: &[u8]) -> String {
    match packet.first().map(|b| b >> 4) {
        Some(4) => match Ipv4HeaderSlice::from_slice(packet) {
            Ok(ip) => format!(
                "IPv4 {} → {} proto={:?} ({} bytes)",
                ip.source_addr(),
                ip.destination_addr(),
                ip.protocol(),
                packet.len()
            ),
            Err(_) => format!("malformed IPv4 ({} bytes)", packet.len()),
        },
        Some(6) => match Ipv6HeaderSlice::from_slice(packet) {
            Ok(ip) => format!(
                "IPv6 {} → {} next={:?} ({} bytes)",
                ip.source_addr(),
                ip.destination_addr(),
                ip.next_header(),
                packet.len()
            ),
            Err(_) => format!("malformed IPv6 ({} bytes)", packet.len()),
        },
        _ => format!("non-IP ({} bytes)", packet.len()),
    }
}
