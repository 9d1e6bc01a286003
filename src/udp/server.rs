use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::protocol::{RawAnnounce, Request, Response, ScrapeRow, UdpAnnounce, UdpScrape, MAX_PACKET_SIZE};
use crate::bencode::compact::compact_peers;
use crate::bencode::response::{build_announce_response, build_failure_response};
use crate::core::config::UdpProtocol;
use crate::core::error::{TrackerError, ValidationError};
use crate::core::state::AppState;
use crate::engine::admit;
use crate::engine::announce::{announce, AnnounceRequest};
use crate::engine::scrape::scrape;
use crate::utils::time::current_timestamp;

/// Bind the UDP listener and serve until `shutdown` flips to true.
pub async fn spawn_udp_server(
    state: Arc<AppState>,
    bind: SocketAddr,
    shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>> {
    let socket = UdpSocket::bind(bind)
        .await
        .with_context(|| format!("Failed to bind UDP socket to {}", bind))?;

    info!(
        address = %bind,
        protocol = ?state.config.udp.protocol,
        "UDP listener bound successfully"
    );

    Ok(tokio::spawn(serve(state, Arc::new(socket), shutdown)))
}

async fn serve(state: Arc<AppState>, socket: Arc<UdpSocket>, mut shutdown: watch::Receiver<bool>) {
    let mut buf = [0u8; MAX_PACKET_SIZE];

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, addr) = match received {
                    Ok(received) => received,
                    Err(e) => {
                        error!(error = %e, "Failed to receive UDP datagram");
                        continue;
                    }
                };

                state.metrics.increment_udp_packets();

                let packet = buf[..len].to_vec();
                let state = Arc::clone(&state);
                let socket = Arc::clone(&socket);

                tokio::spawn(async move {
                    if let Some(reply) = handle_packet(&state, &packet, addr).await {
                        if let Err(e) = socket.send_to(&reply, addr).await {
                            warn!(addr = %addr, error = %e, "Failed to send UDP reply");
                        }
                    }
                });
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("UDP server stopping");
                    break;
                }
            }
        }
    }
}

/// Produce the reply for one datagram, or `None` when it should be dropped silently
pub async fn handle_packet(state: &AppState, packet: &[u8], addr: SocketAddr) -> Option<Vec<u8>> {
    match state.config.udp.protocol {
        UdpProtocol::Bep15 => handle_bep15(state, packet, addr).await,
        UdpProtocol::Raw => handle_raw(state, packet, addr).await,
    }
}

async fn handle_raw(state: &AppState, packet: &[u8], addr: SocketAddr) -> Option<Vec<u8>> {
    let Some(raw) = RawAnnounce::from_bytes(packet) else {
        warn!(addr = %addr, len = packet.len(), "Dropping short UDP announce");
        return None;
    };

    let request = AnnounceRequest {
        info_hash: raw.info_hash,
        peer_id: raw.peer_id,
        remote_ip: addr.ip(),
        ip: addr.ip(),
        port: raw.port,
        uploaded: 0,
        downloaded: 0,
        left: 0,
        event: None,
        numwant: None,
    };

    match announce(state, request).await {
        Ok(outcome) => Some(build_announce_response(&outcome.peers, outcome.interval)),
        Err(e) => Some(build_failure_response(&e.to_string())),
    }
}

async fn handle_bep15(state: &AppState, packet: &[u8], addr: SocketAddr) -> Option<Vec<u8>> {
    let response = match Request::from_bytes(packet) {
        // Only admitted clients get an entry in the connection table
        Ok(Request::Connect { transaction_id }) => match admit(state, addr.ip()).await {
            Ok(()) => Response::Connect {
                transaction_id,
                connection_id: state.udp_connections.issue(addr, current_timestamp()),
            },
            Err(e) => tracker_error(transaction_id, e),
        },
        Ok(Request::Announce(request)) => handle_announce(state, request, addr).await,
        Ok(Request::Scrape(request)) => handle_scrape(state, request, addr).await,
        Err(e) => match e.transaction_id() {
            Some(transaction_id) => {
                debug!(addr = %addr, error = %e, "Rejecting malformed UDP request");
                Response::Error {
                    transaction_id,
                    message: e.to_string(),
                }
            }
            None => {
                debug!(addr = %addr, error = %e, "Dropping unanswerable UDP packet");
                return None;
            }
        },
    };

    match response.to_bytes() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!(addr = %addr, error = %e, "Failed to encode UDP response");
            None
        }
    }
}

fn connection_error(transaction_id: i32) -> Response {
    Response::Error {
        transaction_id,
        message: "Connection ID invalid or expired".to_string(),
    }
}

fn tracker_error(transaction_id: i32, e: TrackerError) -> Response {
    Response::Error {
        transaction_id,
        message: e.to_string(),
    }
}

fn clamp_i32(value: u64) -> i32 {
    value.min(i32::MAX as u64) as i32
}

async fn handle_announce(state: &AppState, request: UdpAnnounce, addr: SocketAddr) -> Response {
    if !state
        .udp_connections
        .validate(request.connection_id, addr, current_timestamp())
    {
        return connection_error(request.transaction_id);
    }

    if request.port == 0 {
        state.metrics.increment_announces();
        state.metrics.increment_failed();
        debug!(addr = %addr, "Rejecting UDP announce with port 0");
        return tracker_error(request.transaction_id, ValidationError::OutOfRange("port").into());
    }

    // The optional IP field is ignored; peers are registered at their source address
    let announce_request = AnnounceRequest {
        info_hash: request.info_hash,
        peer_id: request.peer_id,
        remote_ip: addr.ip(),
        ip: addr.ip(),
        port: request.port,
        uploaded: request.uploaded,
        downloaded: request.downloaded,
        left: request.left,
        event: request.event,
        numwant: (request.num_want > 0).then_some(request.num_want as u32),
    };

    match announce(state, announce_request).await {
        Ok(outcome) => Response::Announce {
            transaction_id: request.transaction_id,
            interval: clamp_i32(outcome.interval as u64),
            leechers: clamp_i32(outcome.leechers as u64),
            seeders: clamp_i32(outcome.seeders as u64),
            peers: compact_peers(&outcome.peers),
        },
        Err(e) => tracker_error(request.transaction_id, e),
    }
}

async fn handle_scrape(state: &AppState, request: UdpScrape, addr: SocketAddr) -> Response {
    if !state
        .udp_connections
        .validate(request.connection_id, addr, current_timestamp())
    {
        return connection_error(request.transaction_id);
    }

    let files = match scrape(state, addr.ip(), &request.info_hashes).await {
        Ok(files) => files,
        Err(e) => return tracker_error(request.transaction_id, e),
    };

    // Rows are positional, so a hash whose lookup failed reports zeros
    let rows = request
        .info_hashes
        .iter()
        .map(|hash| {
            files
                .iter()
                .find(|(h, _)| h == hash)
                .map(|(_, stats)| ScrapeRow {
                    seeders: clamp_i32(stats.seeders as u64),
                    completed: clamp_i32(stats.completed),
                    leechers: clamp_i32(stats.leechers as u64),
                })
                .unwrap_or(ScrapeRow {
                    seeders: 0,
                    completed: 0,
                    leechers: 0,
                })
        })
        .collect();

    Response::Scrape {
        transaction_id: request.transaction_id,
        rows,
    }
}
