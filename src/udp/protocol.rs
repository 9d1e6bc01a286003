use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};
use std::net::Ipv4Addr;
use thiserror::Error;

use crate::models::peer::{AnnounceEvent, InfoHash, PeerId};

/// Magic connection ID every BEP-15 connect request carries
pub const PROTOCOL_IDENTIFIER: i64 = 0x0417_2710_1980;
pub const MAX_SCRAPE_TORRENTS: usize = 74;
pub const MAX_PACKET_SIZE: usize = 1496;

/// peer_id, info_hash, port
pub const RAW_ANNOUNCE_LEN: usize = 42;

const ACTION_CONNECT: i32 = 0;
const ACTION_ANNOUNCE: i32 = 1;
const ACTION_SCRAPE: i32 = 2;
const ACTION_ERROR: i32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct UdpAnnounce {
    pub connection_id: i64,
    pub transaction_id: i32,
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
    pub downloaded: u64,
    pub left: u64,
    pub uploaded: u64,
    pub event: Option<AnnounceEvent>,
    pub ip: Option<Ipv4Addr>,
    pub key: u32,
    /// Non-positive means "tracker default"
    pub num_want: i32,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UdpScrape {
    pub connection_id: i64,
    pub transaction_id: i32,
    pub info_hashes: Vec<InfoHash>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Connect { transaction_id: i32 },
    Announce(UdpAnnounce),
    Scrape(UdpScrape),
}

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Packet too short")]
    TooShort,

    #[error("Protocol identifier missing")]
    MissingProtocolId,

    #[error("Unknown action {action}")]
    UnknownAction { transaction_id: i32, action: i32 },

    #[error("Malformed request: {reason}")]
    Malformed { transaction_id: i32, reason: String },
}

impl ParseError {
    /// Transaction ID to answer with, if the header was readable
    pub fn transaction_id(&self) -> Option<i32> {
        match self {
            ParseError::UnknownAction { transaction_id, .. }
            | ParseError::Malformed { transaction_id, .. } => Some(*transaction_id),
            ParseError::TooShort | ParseError::MissingProtocolId => None,
        }
    }
}

fn event_from_code(code: i32) -> Option<AnnounceEvent> {
    match code {
        1 => Some(AnnounceEvent::Completed),
        2 => Some(AnnounceEvent::Started),
        3 => Some(AnnounceEvent::Stopped),
        _ => None,
    }
}

impl Request {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 16 {
            return Err(ParseError::TooShort);
        }

        let mut cursor = Cursor::new(bytes);
        let connection_id = cursor.read_i64::<NetworkEndian>().map_err(|_| ParseError::TooShort)?;
        let action = cursor.read_i32::<NetworkEndian>().map_err(|_| ParseError::TooShort)?;
        let transaction_id = cursor.read_i32::<NetworkEndian>().map_err(|_| ParseError::TooShort)?;

        let malformed = |e: io::Error| ParseError::Malformed {
            transaction_id,
            reason: e.to_string(),
        };

        match action {
            ACTION_CONNECT => {
                if connection_id == PROTOCOL_IDENTIFIER {
                    Ok(Request::Connect { transaction_id })
                } else {
                    Err(ParseError::MissingProtocolId)
                }
            }

            ACTION_ANNOUNCE => {
                let mut info_hash = [0u8; 20];
                let mut peer_id = [0u8; 20];
                let mut ip = [0u8; 4];

                cursor.read_exact(&mut info_hash).map_err(malformed)?;
                cursor.read_exact(&mut peer_id).map_err(malformed)?;

                let downloaded = cursor.read_i64::<NetworkEndian>().map_err(malformed)?;
                let left = cursor.read_i64::<NetworkEndian>().map_err(malformed)?;
                let uploaded = cursor.read_i64::<NetworkEndian>().map_err(malformed)?;
                let event = cursor.read_i32::<NetworkEndian>().map_err(malformed)?;

                cursor.read_exact(&mut ip).map_err(malformed)?;

                let key = cursor.read_u32::<NetworkEndian>().map_err(malformed)?;
                let num_want = cursor.read_i32::<NetworkEndian>().map_err(malformed)?;
                let port = cursor.read_u16::<NetworkEndian>().map_err(malformed)?;

                Ok(Request::Announce(UdpAnnounce {
                    connection_id,
                    transaction_id,
                    info_hash: InfoHash(info_hash),
                    peer_id: PeerId(peer_id),
                    // Negative counters are nonsense on the wire; treat as zero
                    downloaded: downloaded.max(0) as u64,
                    left: left.max(0) as u64,
                    uploaded: uploaded.max(0) as u64,
                    event: event_from_code(event),
                    ip: (ip != [0; 4]).then(|| Ipv4Addr::from(ip)),
                    key,
                    num_want,
                    port,
                }))
            }

            ACTION_SCRAPE => {
                let payload = &bytes[16..];
                let info_hashes: Vec<InfoHash> = payload
                    .chunks_exact(20)
                    .take(MAX_SCRAPE_TORRENTS)
                    .filter_map(InfoHash::from_slice)
                    .collect();

                if info_hashes.is_empty() {
                    return Err(ParseError::Malformed {
                        transaction_id,
                        reason: "no info_hash".to_string(),
                    });
                }

                Ok(Request::Scrape(UdpScrape {
                    connection_id,
                    transaction_id,
                    info_hashes,
                }))
            }

            action => Err(ParseError::UnknownAction {
                transaction_id,
                action,
            }),
        }
    }
}

/// Per-hash scrape row, in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeRow {
    pub seeders: i32,
    pub completed: i32,
    pub leechers: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Connect {
        transaction_id: i32,
        connection_id: i64,
    },
    Announce {
        transaction_id: i32,
        interval: i32,
        leechers: i32,
        seeders: i32,
        /// Compact IPv4 peers, 6 bytes each
        peers: Vec<u8>,
    },
    Scrape {
        transaction_id: i32,
        rows: Vec<ScrapeRow>,
    },
    Error {
        transaction_id: i32,
        message: String,
    },
}

impl Response {
    pub fn write(&self, out: &mut impl Write) -> io::Result<()> {
        match self {
            Response::Connect {
                transaction_id,
                connection_id,
            } => {
                out.write_i32::<NetworkEndian>(ACTION_CONNECT)?;
                out.write_i32::<NetworkEndian>(*transaction_id)?;
                out.write_i64::<NetworkEndian>(*connection_id)?;
            }
            Response::Announce {
                transaction_id,
                interval,
                leechers,
                seeders,
                peers,
            } => {
                out.write_i32::<NetworkEndian>(ACTION_ANNOUNCE)?;
                out.write_i32::<NetworkEndian>(*transaction_id)?;
                out.write_i32::<NetworkEndian>(*interval)?;
                out.write_i32::<NetworkEndian>(*leechers)?;
                out.write_i32::<NetworkEndian>(*seeders)?;
                out.write_all(peers)?;
            }
            Response::Scrape {
                transaction_id,
                rows,
            } => {
                out.write_i32::<NetworkEndian>(ACTION_SCRAPE)?;
                out.write_i32::<NetworkEndian>(*transaction_id)?;
                for row in rows {
                    out.write_i32::<NetworkEndian>(row.seeders)?;
                    out.write_i32::<NetworkEndian>(row.completed)?;
                    out.write_i32::<NetworkEndian>(row.leechers)?;
                }
            }
            Response::Error {
                transaction_id,
                message,
            } => {
                out.write_i32::<NetworkEndian>(ACTION_ERROR)?;
                out.write_i32::<NetworkEndian>(*transaction_id)?;
                out.write_all(message.as_bytes())?;
            }
        }

        Ok(())
    }

    pub fn to_bytes(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(64);
        self.write(&mut buf)?;
        Ok(buf)
    }
}

/// Simplified framing: `peer_id[0..20] | info_hash[20..40] | port[40..42]`.
/// Anything past byte 42 is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAnnounce {
    pub peer_id: PeerId,
    pub info_hash: InfoHash,
    pub port: u16,
}

impl RawAnnounce {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < RAW_ANNOUNCE_LEN {
            return None;
        }

        Some(Self {
            peer_id: PeerId::from_slice(&bytes[0..20])?,
            info_hash: InfoHash::from_slice(&bytes[20..40])?,
            port: u16::from_be_bytes([bytes[40], bytes[41]]),
        })
    }
}
