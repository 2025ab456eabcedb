
use crate::device::MockChannel;
use crate::{Error, PacketChannel, MTU};
use packets::{is_tcp, parse_ipv4, PacketFactory};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

#[test]
fn test_mock_close_wakes_reader() {
    let mock = MockChannel::new("mock0");
    let chan: Arc<dyn PacketChannel> = Arc::new(mock.clone());

    let (tx, rx) = mpsc::channel();
    let reader = Arc::clone(&chan);
    thread::spawn(move || tx.send(reader.read_packet()).unwrap());

    thread::sleep(Duration::from_millis(50));
    chan.close().unwrap();

    let result = rx.recv_timeout(Duration::from_secs(2)).expect("reader hung");
    assert!(matches!(result, Err(Error::AlreadyClosed)));
}

#[test]
fn test_boxed_channel_shares_across_threads() {
    let mock = MockChannel::new("mock1");
    let boxed: Box<dyn PacketChannel> = Box::new(mock.clone());
    let chan: Arc<dyn PacketChannel> = Arc::from(boxed);

    let syn = PacketFactory::syn("10.0.0.2", "10.0.0.1", 12345, 80, 1000);
    mock.inject_packet("Client SYN", syn.clone());

    let writer = Arc::clone(&chan);
    let reply = syn.clone();
    let handle = thread::spawn(move || writer.write_packet(&reply));

    let got = chan.read_packet().unwrap();
    handle.join().unwrap().unwrap();

    assert_eq!(&got[..], &syn[..]);
    assert_eq!(mock.get_sent_packets(), vec![syn]);
}

#[cfg(target_os = "linux")]
mod tun_pair {
    use super::*;
    use crate::device::TunChannel;
    use crate::{AddressHint, LocalAddr};
    use rand::Rng;
    use std::io;
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixDatagram;

    // A datagram socket pair keeps packet boundaries the way a TUN fd does.
    fn channel_pair() -> (Arc<TunChannel>, UnixDatagram) {
        let (ours, peer) = UnixDatagram::pair().unwrap();
        ours.set_nonblocking(true).unwrap();
        peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        let hint = AddressHint::iproute("pair0", LocalAddr::parse("10.0.0.2").unwrap());
        let chan = TunChannel::from_fd("pair0".to_string(), hint, OwnedFd::from(ours)).unwrap();
        (Arc::new(chan), peer)
    }

    fn recv(peer: &UnixDatagram) -> Vec<u8> {
        let mut buf = vec![0u8; 4096];
        let n = peer.recv(&mut buf).unwrap();
        buf.truncate(n);
        buf
    }

    #[test]
    fn test_forty_byte_packet_passes_through() {
        let (chan, peer) = channel_pair();

        let syn = PacketFactory::syn("10.0.0.2", "10.0.0.1", 40000, 80, 7);
        assert_eq!(syn.len(), 40);
        assert!(is_tcp(&syn));

        chan.write_packet(&syn).unwrap();
        let seen = recv(&peer);
        assert_eq!(seen, syn);
        assert_eq!(parse_ipv4(&seen).destination_addr().to_string(), "10.0.0.1");
    }

    #[test]
    fn test_boundary_sizes_are_unmodified() {
        let (chan, peer) = channel_pair();

        for size in [0, 1, 20] {
            let raw = vec![0xab; size];
            chan.write_packet(&raw).unwrap();
            assert_eq!(recv(&peer), raw, "size {size}");
        }
        for size in [packets::UDP_OVERHEAD, 576, MTU] {
            let packet = PacketFactory::sized(size);
            assert_eq!(packet.len(), size);
            chan.write_packet(&packet).unwrap();
            assert_eq!(recv(&peer), packet, "size {size}");
        }
    }

    #[test]
    fn test_oversized_write_sends_nothing() {
        let (chan, peer) = channel_pair();

        let result = chan.write_packet(&vec![0u8; MTU + 1]);
        assert!(matches!(
            result,
            Err(Error::InvalidLength { len: 1501, mtu: 1500 })
        ));

        peer.set_nonblocking(true).unwrap();
        let mut buf = [0u8; 16];
        let err = peer.recv(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_read_returns_owned_copy() {
        let (chan, peer) = channel_pair();

        let first = PacketFactory::udp("10.0.0.1", "10.0.0.2", 53, 5353, b"first");
        let second = PacketFactory::udp("10.0.0.1", "10.0.0.2", 53, 5353, b"second!");
        peer.send(&first).unwrap();
        peer.send(&second).unwrap();

        let a = chan.read_packet().unwrap();
        let b = chan.read_packet().unwrap();
        // The pooled read buffer was reused for b; a must be unaffected.
        assert_eq!(&a[..], &first[..]);
        assert_eq!(&b[..], &second[..]);
    }

    #[test]
    fn test_oversized_inbound_packet() {
        let (chan, peer) = channel_pair();

        peer.send(&vec![0x45; MTU + 100]).unwrap();
        assert!(matches!(
            chan.read_packet(),
            Err(Error::PacketTooLarge { mtu: 1500, .. })
        ));

        let ok = PacketFactory::sized(MTU);
        peer.send(&ok).unwrap();
        assert_eq!(chan.read_packet().unwrap().into_vec(), ok);
    }

    #[test]
    fn test_empty_read_is_short() {
        let (chan, peer) = channel_pair();
        peer.send(&[]).unwrap();
        assert!(matches!(
            chan.read_packet(),
            Err(Error::ShortRead { received: 0 })
        ));
    }

    #[test]
    fn test_close_wakes_blocked_reader() {
        let (chan, _peer) = channel_pair();

        let (tx, rx) = mpsc::channel();
        let reader = Arc::clone(&chan);
        thread::spawn(move || tx.send(reader.read_packet()).unwrap());

        thread::sleep(Duration::from_millis(50));
        chan.close().unwrap();

        let result = rx.recv_timeout(Duration::from_secs(2)).expect("reader hung");
        assert!(matches!(result, Err(Error::AlreadyClosed)));
        assert!(chan.is_closed());
    }

    #[test]
    fn test_operations_after_close() {
        let (chan, peer) = channel_pair();

        chan.close().unwrap();
        chan.close().unwrap();

        assert!(matches!(chan.read_packet(), Err(Error::AlreadyClosed)));
        assert!(matches!(
            chan.write_packet(&[0x45; 40]),
            Err(Error::AlreadyClosed)
        ));
        // The fd is gone, so the peer has nobody to talk to.
        assert!(peer.send(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_drop_releases_fd() {
        let (chan, peer) = channel_pair();
        drop(chan);
        assert!(peer.send(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_one_reader_one_writer() {
        const COUNT: usize = 200;
        let (chan, peer) = channel_pair();
        let peer_tx = peer.try_clone().unwrap();

        let mut rng = rand::thread_rng();
        let outbound: Vec<Vec<u8>> = (0..COUNT)
            .map(|_| {
                let len = rng.gen_range(0..=MTU);
                (0..len).map(|_| rng.gen()).collect()
            })
            .collect();
        let inbound: Vec<Vec<u8>> = (0..COUNT)
            .map(|i| PacketFactory::sized(packets::UDP_OVERHEAD + i))
            .collect();

        let reader = {
            let chan = Arc::clone(&chan);
            thread::spawn(move || {
                (0..COUNT)
                    .map(|_| chan.read_packet().unwrap().into_vec())
                    .collect::<Vec<_>>()
            })
        };
        let writer = {
            let chan = Arc::clone(&chan);
            let outbound = outbound.clone();
            thread::spawn(move || {
                for packet in &outbound {
                    chan.write_packet(packet).unwrap();
                }
            })
        };
        let sender = {
            let inbound = inbound.clone();
            thread::spawn(move || {
                for packet in &inbound {
                    peer_tx.send(packet).unwrap();
                }
            })
        };

        let seen: Vec<Vec<u8>> = (0..COUNT).map(|_| recv(&peer)).collect();

        writer.join().unwrap();
        sender.join().unwrap();
        let read = reader.join().unwrap();

        assert_eq!(seen, outbound);
        assert_eq!(read, inbound);
    }
}
