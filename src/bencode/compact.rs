//! Compact peer-list codec: 4-byte big-endian IPv4 address followed by a
//! 2-byte big-endian port per peer. Non-IPv4 peers are skipped.

use crate::models::peer::Peer;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};

pub const COMPACT_PEER_LEN: usize = 6;

/// Append the compact form of every IPv4 peer to `buf`, returning how many were written
pub fn encode_compact_peers(peers: &[Peer], buf: &mut Vec<u8>) -> usize {
    let mut written = 0;

    for peer in peers {
        if let IpAddr::V4(ip) = peer.ip {
            buf.extend_from_slice(&ip.octets());
            buf.extend_from_slice(&peer.port.to_be_bytes());
            written += 1;
        }
    }

    written
}

pub fn compact_peers(peers: &[Peer]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(peers.len() * COMPACT_PEER_LEN);
    encode_compact_peers(peers, &mut buf);
    buf
}

/// Decode a compact peer string. Returns `None` if the length is not a multiple of 6.
pub fn decode_compact_peers(bytes: &[u8]) -> Option<Vec<SocketAddrV4>> {
    if bytes.len() % COMPACT_PEER_LEN != 0 {
        return None;
    }

    let peers = bytes
        .chunks_exact(COMPACT_PEER_LEN)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddrV4::new(ip, port)
        })
        .collect();

    Some(peers)
}
