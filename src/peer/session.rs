//! Peer session driver
//!
//! Runs a [`PeerConnection`] over a real stream: connects, shuttles bytes
//! between the socket and the state machine, and enforces timeouts.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use crate::error::TorrentError;
use crate::peer::connection::{Outbound, PeerConnection};
use crate::peer::state::PeerStats;
use crate::protocol::Message;
use crate::storage::DownloadState;

/// Size of the socket read buffer
const READ_BUFFER_SIZE: usize = 32 * 1024;

/// Timeouts applied to every peer session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    /// Time allowed from connect until the handshake completes
    pub handshake_timeout: Duration,
    /// Longest silence tolerated once established
    pub idle_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(20),
            idle_timeout: Duration::from_secs(180),
            keepalive_interval: Duration::from_secs(120),
        }
    }
}

/// How a session ended
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub addr: SocketAddr,
    pub remote_peer_id: Option<[u8; 20]>,
    /// Whether the handshake completed
    pub established: bool,
    pub error: Option<TorrentError>,
    pub stats: PeerStats,
}

impl SessionSummary {
    fn from_connection(conn: &PeerConnection, established: bool) -> Self {
        Self {
            addr: conn.addr(),
            remote_peer_id: conn.remote_peer_id(),
            established,
            error: conn.error().cloned(),
            stats: conn.stats().clone(),
        }
    }
}

/// Connect to `addr` over TCP and run the session until it ends
pub async fn run_peer(
    addr: SocketAddr,
    download: Arc<Mutex<DownloadState>>,
    config: SessionConfig,
    shutdown: watch::Receiver<bool>,
) -> SessionSummary {
    let mut conn = {
        let state = download.lock().await;
        PeerConnection::for_download(addr, &state)
    };

    debug!("Connecting to peer: {}", addr);
    let stream = match time::timeout(config.connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            conn.on_connect_failed(TorrentError::network_error_full("Failed to connect", addr.to_string(), e.to_string()));
            return SessionSummary::from_connection(&conn, false);
        }
        Err(_) => {
            conn.on_connect_failed(TorrentError::network_error_full(
                "Connection timeout",
                addr.to_string(),
                format!("no answer within {:?}", config.connect_timeout),
            ));
            return SessionSummary::from_connection(&conn, false);
        }
    };

    drive(conn, stream, download, config, shutdown).await
}

/// Run an already-connected stream through the state machine
pub async fn drive<S>(
    mut conn: PeerConnection,
    stream: S,
    download: Arc<Mutex<DownloadState>>,
    config: SessionConfig,
    mut shutdown: watch::Receiver<bool>,
) -> SessionSummary
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let addr = conn.addr();
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut established = false;

    let greeting = conn.on_connected();
    if let Err(e) = write_units(&mut writer, &greeting).await {
        let mut state = download.lock().await;
        conn.fail(TorrentError::peer_error_full("Failed to send handshake", addr.to_string(), e.to_string()), &mut state);
    }

    let deadline = time::sleep(config.handshake_timeout);
    tokio::pin!(deadline);
    let mut keepalive = time::interval_at(Instant::now() + config.keepalive_interval, config.keepalive_interval);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    while conn.state().is_open() && !*shutdown.borrow() {
        tokio::select! {
            read = reader.read(&mut buf) => {
                let n = match read {
                    Ok(0) => {
                        debug!("Peer {} closed the connection", addr);
                        break;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        let mut state = download.lock().await;
                        conn.fail(TorrentError::network_error_full("Read failed", addr.to_string(), e.to_string()), &mut state);
                        break;
                    }
                };
                trace!("Read {} bytes from {}", n, addr);

                let (out, complete) = {
                    let mut state = download.lock().await;
                    let out = conn.on_read(Bytes::copy_from_slice(&buf[..n]), &mut state);
                    (out, state.is_complete())
                };

                if let Err(e) = write_units(&mut writer, &out).await {
                    let mut state = download.lock().await;
                    conn.fail(TorrentError::network_error_full("Write failed", addr.to_string(), e.to_string()), &mut state);
                    break;
                }

                if conn.state().is_established() {
                    established = true;
                    deadline.as_mut().reset(Instant::now() + config.idle_timeout);
                }
                if complete {
                    info!("Download complete, leaving {}", addr);
                    break;
                }
            }
            _ = &mut deadline => {
                let phase = if established { "Idle timeout" } else { "Handshake timeout" };
                let mut state = download.lock().await;
                conn.fail(TorrentError::peer_error_with_peer(phase, addr.to_string()), &mut state);
            }
            _ = keepalive.tick() => {
                if conn.state().is_established() {
                    trace!("Sending KeepAlive to peer: {}", addr);
                    if let Err(e) = write_units(&mut writer, &[Outbound::Message(Message::KeepAlive)]).await {
                        let mut state = download.lock().await;
                        conn.fail(TorrentError::network_error_full("Write failed", addr.to_string(), e.to_string()), &mut state);
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    debug!("Shutdown channel dropped, leaving {}", addr);
                    break;
                }
            }
        }
    }

    {
        let mut state = download.lock().await;
        conn.close(&mut state);
    }
    if let Err(e) = writer.shutdown().await {
        trace!("Shutdown of {} failed: {}", addr, e);
    }
    conn.on_closed();

    if let Some(error) = conn.error() {
        warn!("Session with {} ended: {}", addr, error);
    }
    SessionSummary::from_connection(&conn, established)
}

async fn write_units<W>(writer: &mut W, units: &[Outbound]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if units.is_empty() {
        return Ok(());
    }
    let bytes: Vec<u8> = units.iter().flat_map(Outbound::to_bytes).collect();
    writer.write_all(&bytes).await?;
    writer.flush().await
}
