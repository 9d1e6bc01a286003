use super::compact::compact_peers;
use super::encoder::{write_dict, BencodeEncode};
use crate::models::peer::{InfoHash, Peer, SwarmStats};

/// Build the announce envelope: `d8:intervali<secs>e5:peers<len>:<compact>e`
pub fn build_announce_response(peers: &[Peer], interval: u32) -> Vec<u8> {
    let compact = compact_peers(peers);
    let mut buf = Vec::with_capacity(32 + compact.len());

    write_dict(&mut buf, |buf| {
        "interval".bencode(buf);
        interval.bencode(buf);

        "peers".bencode(buf);
        compact.bencode(buf);
    });

    buf
}

/// Build the scrape envelope, one entry per hash in the given order:
/// `d5:filesd20:<hash>d8:completei<n>e10:downloadedi<n>e10:incompletei<n>ee...ee`
pub fn build_scrape_response(files: &[(InfoHash, SwarmStats)]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + files.len() * 80);

    write_dict(&mut buf, |buf| {
        "files".bencode(buf);
        write_dict(buf, |buf| {
            for (info_hash, stats) in files {
                info_hash.as_bytes().bencode(buf);
                write_dict(buf, |buf| {
                    "complete".bencode(buf);
                    stats.seeders.bencode(buf);

                    "downloaded".bencode(buf);
                    stats.completed.bencode(buf);

                    "incomplete".bencode(buf);
                    stats.leechers.bencode(buf);
                });
            }
        });
    });

    buf
}

/// `d14:failure reason<len>:<reason>e`, the standard tracker error body
pub fn build_failure_response(reason: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(24 + reason.len());

    write_dict(&mut buf, |buf| {
        "failure reason".bencode(buf);
        reason.bencode(buf);
    });

    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::peer::PeerId;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    fn peer(ip: IpAddr, port: u16) -> Peer {
        Peer::new(PeerId([0u8; 20]), InfoHash([0u8; 20]), ip, port, 0, 0, 0, 0)
    }

    #[test]
    fn test_announce_response_exact_bytes() {
        let peers = vec![peer(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), 6881)];

        let response = build_announce_response(&peers, 1800);

        let mut expected = b"d8:intervali1800e5:peers6:".to_vec();
        expected.extend_from_slice(&[1, 2, 3, 4, 0x1a, 0xe1]);
        expected.push(b'e');
        assert_eq!(response, expected);
    }

    #[test]
    fn test_announce_response_empty() {
        assert_eq!(build_announce_response(&[], 900), b"d8:intervali900e5:peers0:e");
    }

    #[test]
    fn test_announce_response_skips_ipv6() {
        let peers = vec![
            peer(IpAddr::V6(Ipv6Addr::LOCALHOST), 6881),
            peer(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 6881),
        ];

        let response = build_announce_response(&peers, 1800);
        assert!(response.starts_with(b"d8:intervali1800e5:peers6:"));
        assert_eq!(response.len(), b"d8:intervali1800e5:peers6:".len() + 6 + 1);
    }

    #[test]
    fn test_scrape_response_layout() {
        let hash = InfoHash([b'a'; 20]);
        let stats = SwarmStats {
            seeders: 2,
            leechers: 1,
            completed: 5,
        };

        let response = build_scrape_response(&[(hash, stats)]);

        let expected = format!(
            "d5:filesd20:{}d8:completei2e10:downloadedi5e10:incompletei1eeee",
            "a".repeat(20)
        );
        assert_eq!(response, expected.as_bytes());
    }

    #[test]
    fn test_scrape_response_empty() {
        assert_eq!(build_scrape_response(&[]), b"d5:filesdee");
    }

    #[test]
    fn test_scrape_response_preserves_order() {
        let first = InfoHash([b'z'; 20]);
        let second = InfoHash([b'b'; 20]);

        let response = build_scrape_response(&[
            (first, SwarmStats::default()),
            (second, SwarmStats::default()),
        ]);

        let text = String::from_utf8(response).unwrap();
        let z = text.find(&"z".repeat(20)).unwrap();
        let b = text.find(&"b".repeat(20)).unwrap();
        assert!(z < b);
    }

    #[test]
    fn test_failure_response() {
        assert_eq!(
            build_failure_response("Forbidden"),
            b"d14:failure reason9:Forbiddene"
        );
    }
}
