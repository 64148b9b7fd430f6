//! torrent-fetch - Main entry point
//!
//! Loads a single-file torrent, asks its tracker for peers and downloads the
//! content from them.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use torrent_fetch::bencode;
use torrent_fetch::{
    CliArgs, Config, DownloadState, Handshake, Metainfo, PeerManager, ProgressDisplay, ProgressStats,
    TorrentError, TorrentParser, TrackerClient,
};

/// Log panics through tracing before the default hook runs
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        match panic_info.location() {
            Some(location) => error!(
                "PANIC occurred at {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            ),
            None => error!("PANIC occurred at unknown location"),
        }
        default_hook(panic_info);
    }));
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse_args();
    init_logging(&args);
    setup_panic_handler();
    debug!("CLI arguments: {:?}", args);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize logging; `RUST_LOG` overrides the verbosity flags
fn init_logging(args: &CliArgs) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_directive()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if args.is_verbose() {
        subscriber.pretty().init();
    } else {
        subscriber.compact().init();
    }
}

/// Print the error kind label and the context chain to stderr
fn report_error(err: &anyhow::Error) {
    error!("{:#}", err);
    match err.downcast_ref::<TorrentError>() {
        Some(kind) => eprintln!("error [{}]: {:#}", kind.label(), err),
        None => eprintln!("error: {:#}", err),
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let config = Config::from_args(&args).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let data = read_torrent_file(&config.torrent_file).await?;

    if config.dump {
        let value = bencode::decode(&data)
            .map_err(TorrentError::from)
            .context("Failed to decode torrent file")?;
        println!("{}", bencode::dump(&value));
        return Ok(());
    }

    let metainfo = TorrentParser::parse_bytes(&data)
        .with_context(|| format!("Failed to parse torrent file {}", config.torrent_file.display()))?;
    info!("Successfully loaded torrent file: {}", metainfo.display_name());
    display_torrent_info(&metainfo, &config);

    let metainfo = Arc::new(metainfo);
    let peer_id = Handshake::generate_peer_id();

    let tracker = TrackerClient::http_with_timeout(config.tracker_timeout)
        .map_err(TorrentError::from)
        .context("Failed to set up tracker client")?;
    info!("Contacting tracker: {}", metainfo.announce);
    let peers = tracker
        .announce(&metainfo, peer_id, config.port, metainfo.total_size())
        .await
        .map_err(|e| TorrentError::from(e).with_context(metainfo.announce.clone()))
        .context("Tracker announce failed")?;
    if peers.is_empty() {
        return Err(TorrentError::no_peers(metainfo.announce.clone()).into());
    }

    let download = Arc::new(Mutex::new(DownloadState::new(metainfo.clone(), peer_id)?));
    let addrs: Vec<SocketAddr> = peers.iter().map(|p| p.to_socket_addr()).collect();
    download_from_swarm(&config, download.clone(), addrs).await?;

    let path = config.output_path(&output_file_name(&metainfo));
    download
        .lock()
        .await
        .write_to(&path)
        .await
        .context("Failed to save download")?;

    ProgressDisplay::new(config.is_quiet()).print_complete(metainfo.total_size(), &path)?;
    info!("torrent-fetch finished");
    Ok(())
}

async fn read_torrent_file(path: &Path) -> Result<Vec<u8>> {
    info!("Loading torrent file: {}", path.display());
    let data = tokio::fs::read(path).await.map_err(|e| {
        TorrentError::storage_error_full("Failed to read torrent file", path.display().to_string(), e.to_string())
    })?;
    debug!("Torrent file size: {} bytes", data.len());
    Ok(data)
}

/// Run the peer manager while redrawing progress, until the swarm is done
async fn download_from_swarm(config: &Config, download: Arc<Mutex<DownloadState>>, peers: Vec<SocketAddr>) -> Result<()> {
    let total = download.lock().await.metainfo().total_size();
    let manager = PeerManager::new(download.clone(), config.max_connections, config.session);
    let mut progress = ProgressDisplay::new(config.is_quiet());
    progress.print_status(&format!("Downloading from {} peers...", peers.len()))?;

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let mut interrupted = false;
    let swarm = manager.run(peers);
    tokio::pin!(swarm);

    let summary = loop {
        tokio::select! {
            summary = &mut swarm => break summary,
            _ = ticker.tick() => {
                let stats = {
                    let state = download.lock().await;
                    ProgressStats::from_download(&state, progress.elapsed())
                };
                progress.update(&stats, total)?;
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                warn!("Interrupted, stopping peer sessions");
                interrupted = true;
                manager.shutdown();
            }
        }
    };

    info!(
        "Swarm finished: {} attempted, {} established, failures: {:?}",
        summary.attempted, summary.established, summary.failures
    );
    if !summary.completed {
        let remaining = download.lock().await.bytes_remaining();
        return Err(TorrentError::peer_error_full(
            "Swarm exhausted before the download completed",
            format!("{} peers", summary.attempted),
            format!("{} bytes remaining", remaining),
        )
        .into());
    }
    Ok(())
}

/// Last path component of the torrent's name, so a hostile name cannot
/// escape the output directory
fn output_file_name(metainfo: &Metainfo) -> PathBuf {
    let name = metainfo.display_name();
    match Path::new(&name).file_name() {
        Some(file_name) => PathBuf::from(file_name),
        None => PathBuf::from(metainfo.info_hash_hex()),
    }
}

fn display_torrent_info(metainfo: &Metainfo, config: &Config) {
    if config.is_quiet() {
        return;
    }
    println!("Torrent Information:");
    println!("  Name: {}", metainfo.display_name());
    println!(
        "  Size: {} ({})",
        metainfo.total_size(),
        ProgressStats::format_bytes(metainfo.total_size())
    );
    println!("  Pieces: {}", metainfo.piece_count());
    println!("  Piece length: {}", ProgressStats::format_bytes(metainfo.piece_length));
    println!("  Info hash: {}", metainfo.info_hash_hex());
    println!("  Tracker: {}", metainfo.announce);
    println!();
    println!("Configuration:");
    println!("  Output directory: {}", config.output_dir.display());
    println!("  Listen port: {}", config.port);
    println!("  Max connections: {}", config.max_connections);
    println!();
}
