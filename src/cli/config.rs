//! CLI configuration module
//!
//! Built-in defaults, overlaid by an optional JSON file, overlaid by
//! explicitly given command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::cli::args::CliArgs;
use crate::error::TorrentError;
use crate::peer::SessionConfig;
use crate::tracker::transport::DEFAULT_TRACKER_TIMEOUT;

pub const DEFAULT_PORT: u16 = 6881;
pub const DEFAULT_MAX_CONNECTIONS: usize = 50;

/// Values accepted in the JSON configuration file. Durations are in seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub output_dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub max_connections: Option<usize>,
    pub tracker_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub handshake_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub keepalive_interval_secs: Option<u64>,
}

impl FileConfig {
    /// Load a configuration file
    pub fn load(path: &Path) -> Result<Self, TorrentError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            TorrentError::storage_error_full("Failed to read config file", path.display().to_string(), e.to_string())
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, TorrentError> {
        serde_json::from_str(text).map_err(TorrentError::from)
    }
}

/// Configuration for the torrent downloader
#[derive(Debug, Clone)]
pub struct Config {
    pub torrent_file: PathBuf,
    /// Download directory
    pub output_dir: PathBuf,
    /// Port reported to the tracker
    pub port: u16,
    /// Maximum number of concurrent peer connections
    pub max_connections: usize,
    pub tracker_timeout: Duration,
    /// Per-peer timeouts
    pub session: SessionConfig,
    pub dump: bool,
    pub verbose: bool,
    pub quiet: bool,
}

impl Config {
    /// Create configuration from CLI arguments, reading `--config` if given
    pub fn from_args(args: &CliArgs) -> Result<Self, TorrentError> {
        let file = match &args.config {
            Some(path) => {
                debug!("Loading config file {}", path.display());
                FileConfig::load(path)?
            }
            None => FileConfig::default(),
        };
        Ok(Self::merge(args, file))
    }

    /// Layer `args` over `file` over the defaults
    pub fn merge(args: &CliArgs, file: FileConfig) -> Self {
        let defaults = SessionConfig::default();
        let secs = |value: Option<u64>, default: Duration| value.map(Duration::from_secs).unwrap_or(default);

        Self {
            torrent_file: args.torrent_file.clone(),
            output_dir: args
                .output_dir
                .clone()
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            max_connections: args
                .max_connections
                .or(file.max_connections)
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            tracker_timeout: secs(file.tracker_timeout_secs, DEFAULT_TRACKER_TIMEOUT),
            session: SessionConfig {
                connect_timeout: secs(file.connect_timeout_secs, defaults.connect_timeout),
                handshake_timeout: secs(file.handshake_timeout_secs, defaults.handshake_timeout),
                idle_timeout: secs(file.idle_timeout_secs, defaults.idle_timeout),
                keepalive_interval: secs(file.keepalive_interval_secs, defaults.keepalive_interval),
            },
            dump: args.dump,
            verbose: args.verbose,
            quiet: args.quiet,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), TorrentError> {
        if self.port == 0 {
            return Err(TorrentError::config_error_with_field("Port cannot be 0", "port"));
        }

        if self.max_connections == 0 {
            return Err(TorrentError::config_error_with_field(
                "max_connections must be at least 1",
                "max_connections",
            ));
        }

        let timeouts = [
            ("tracker_timeout", self.tracker_timeout),
            ("connect_timeout", self.session.connect_timeout),
            ("handshake_timeout", self.session.handshake_timeout),
            ("idle_timeout", self.session.idle_timeout),
            ("keepalive_interval", self.session.keepalive_interval),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, value)| value.is_zero()) {
            return Err(TorrentError::config_error_with_field("Timeout must be non-zero", *name));
        }

        if self.output_dir.as_os_str().is_empty() {
            return Err(TorrentError::config_error_with_field("output_dir cannot be empty", "output_dir"));
        }

        Ok(())
    }

    /// Where the downloaded file is written
    pub fn output_path(&self, name: impl AsRef<Path>) -> PathBuf {
        self.output_dir.join(name)
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["torrent-fetch", "test.torrent"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::merge(&args(&[]), FileConfig::default());

        assert_eq!(config.output_dir, PathBuf::from("."));
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.tracker_timeout, DEFAULT_TRACKER_TIMEOUT);
        assert_eq!(config.session, SessionConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_overrides_defaults_and_flags_override_file() {
        let file = FileConfig::from_json(
            r#"{"port": 7000, "max_connections": 4, "output_dir": "/srv/dl", "idle_timeout_secs": 30}"#,
        )
        .unwrap();
        let config = Config::merge(&args(&["-p", "7001"]), file);

        assert_eq!(config.port, 7001);
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.output_dir, PathBuf::from("/srv/dl"));
        assert_eq!(config.session.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.session.connect_timeout, SessionConfig::default().connect_timeout);
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let err = FileConfig::from_json(r#"{"seed": true}"#).unwrap_err();
        assert_eq!(err.label(), "config-error");
    }

    #[test]
    fn test_from_args_reads_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_connections": 9}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = Config::from_args(&args(&["--config", &path])).unwrap();
        assert_eq!(config.max_connections, 9);
    }

    #[test]
    fn test_missing_config_file() {
        let err = Config::from_args(&args(&["--config", "/nonexistent/cfg.json"])).unwrap_err();
        assert_eq!(err.label(), "storage-error");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::merge(&args(&[]), FileConfig::default());
        config.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::merge(&args(&["-m", "0"]), FileConfig::default());
        assert!(config.validate().is_err());
        config.max_connections = 1;
        assert!(config.validate().is_ok());

        let file = FileConfig {
            handshake_timeout_secs: Some(0),
            ..FileConfig::default()
        };
        let config = Config::merge(&args(&[]), file);
        assert_eq!(config.validate().unwrap_err().label(), "config-error");
    }

    #[test]
    fn test_output_path() {
        let config = Config::merge(&args(&["-o", "/tmp/out"]), FileConfig::default());
        assert_eq!(config.output_path("file.iso"), PathBuf::from("/tmp/out/file.iso"));
    }
}
