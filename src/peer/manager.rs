//! Peer manager module
//!
//! Runs one session per tracker-supplied peer with bounded concurrency and
//! stops every session once the download completes.

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{watch, Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::peer::session::{run_peer, SessionConfig, SessionSummary};
use crate::storage::DownloadState;

/// Aggregate result of a swarm run
#[derive(Debug, Clone, Default)]
pub struct SwarmSummary {
    /// Sessions started
    pub attempted: usize,
    /// Sessions that completed the handshake
    pub established: usize,
    /// Ended sessions per error label
    pub failures: BTreeMap<&'static str, usize>,
    /// Whether every piece was verified
    pub completed: bool,
}

impl SwarmSummary {
    fn record(&mut self, summary: &SessionSummary) {
        if summary.established {
            self.established += 1;
        }
        if let Some(error) = &summary.error {
            *self.failures.entry(error.label()).or_default() += 1;
        }
    }
}

/// Manages all peer sessions for a torrent
pub struct PeerManager {
    download: Arc<Mutex<DownloadState>>,
    /// Maximum concurrent connections
    max_connections: usize,
    session_config: SessionConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl PeerManager {
    /// Create a new peer manager
    pub fn new(download: Arc<Mutex<DownloadState>>, max_connections: usize, session_config: SessionConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            download,
            max_connections: max_connections.max(1),
            session_config,
            shutdown_tx,
        }
    }

    /// Receiver that flips to `true` when sessions must stop
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Ask every session to stop
    pub fn shutdown(&self) {
        info!("Stopping all peer sessions");
        self.shutdown_tx.send_replace(true);
    }

    /// Connect to every peer and run until the download completes or all
    /// sessions have ended.
    pub async fn run(&self, peers: Vec<SocketAddr>) -> SwarmSummary {
        let mut summary = SwarmSummary::default();
        let semaphore = Arc::new(Semaphore::new(self.max_connections));
        let mut sessions = JoinSet::new();
        let mut seen = HashSet::new();

        for addr in peers {
            if !seen.insert(addr) {
                debug!("Skipping duplicate peer {}", addr);
                continue;
            }
            summary.attempted += 1;

            let semaphore = semaphore.clone();
            let download = self.download.clone();
            let config = self.session_config;
            let shutdown = self.subscribe();
            sessions.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return None;
                };
                if *shutdown.borrow() {
                    return None;
                }
                Some(run_peer(addr, download, config, shutdown).await)
            });
        }
        info!(
            "Started {} peer sessions (at most {} concurrent)",
            summary.attempted, self.max_connections
        );

        while let Some(joined) = sessions.join_next().await {
            match joined {
                Ok(Some(session)) => {
                    summary.record(&session);
                    debug!(
                        "Session with {} finished: {} blocks, error: {:?}",
                        session.addr,
                        session.stats.blocks_received,
                        session.error.as_ref().map(|e| e.label())
                    );
                }
                Ok(None) => {}
                Err(e) => error!("Peer session task failed: {}", e),
            }

            if !summary.completed && self.download.lock().await.is_complete() {
                summary.completed = true;
                self.shutdown();
            }
        }

        if !summary.completed {
            summary.completed = self.download.lock().await.is_complete();
        }
        if !summary.completed {
            warn!(
                "All {} peer sessions ended before the download completed ({} established)",
                summary.attempted, summary.established
            );
        }
        summary
    }
}
