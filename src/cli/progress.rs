//! Progress display module
//!
//! Handles displaying download progress in the CLI.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use crate::storage::DownloadState;

/// Snapshot of download progress for display
#[derive(Debug, Clone, Default)]
pub struct ProgressStats {
    /// Total bytes downloaded
    pub downloaded: u64,
    /// Download speed in bytes per second
    pub download_speed: f64,
    pub pieces_verified: usize,
    pub piece_count: usize,
    /// Download progress (0.0 to 1.0)
    pub progress: f64,
}

impl ProgressStats {
    /// Take a snapshot of `download`, averaging speed over `elapsed`
    pub fn from_download(download: &DownloadState, elapsed: Duration) -> Self {
        let stats = download.stats();
        let secs = elapsed.as_secs_f64();
        Self {
            downloaded: stats.downloaded_bytes,
            download_speed: if secs > 0.0 { stats.downloaded_bytes as f64 / secs } else { 0.0 },
            pieces_verified: stats.pieces_verified,
            piece_count: download.piece_count(),
            progress: download.progress(),
        }
    }

    /// Format bytes to human readable string
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_index])
    }

    /// Format speed to human readable string
    pub fn format_speed(bytes_per_sec: f64) -> String {
        format!("{}/s", Self::format_bytes(bytes_per_sec as u64))
    }

    /// Format duration to human readable string
    pub fn format_duration(duration: Duration) -> String {
        let total_secs = duration.as_secs();
        let hours = total_secs / 3600;
        let minutes = (total_secs % 3600) / 60;
        let seconds = total_secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Calculate ETA based on download speed and remaining bytes
    pub fn calculate_eta(downloaded: u64, total: u64, speed: f64) -> Option<Duration> {
        if speed <= 0.0 || downloaded >= total {
            return None;
        }

        let remaining = total.saturating_sub(downloaded) as f64;
        Some(Duration::from_secs_f64(remaining / speed))
    }
}

/// Progress display for CLI
pub struct ProgressDisplay {
    start_time: Instant,
    last_update: Option<Instant>,
    update_interval: Duration,
    /// Quiet mode (no progress output)
    quiet: bool,
}

impl ProgressDisplay {
    /// Create a new progress display
    pub fn new(quiet: bool) -> Self {
        Self::with_interval(quiet, Duration::from_millis(500))
    }

    /// Create a progress display with custom update interval
    pub fn with_interval(quiet: bool, interval: Duration) -> Self {
        Self {
            start_time: Instant::now(),
            last_update: None,
            update_interval: interval,
            quiet,
        }
    }

    /// Redraw the progress line if the update interval has passed
    pub fn update(&mut self, stats: &ProgressStats, total: u64) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        if self.last_update.is_some_and(|t| t.elapsed() < self.update_interval) {
            return Ok(());
        }
        self.last_update = Some(Instant::now());

        let mut stdout = io::stdout().lock();
        write!(stdout, "\r\x1b[2K{}", Self::render_line(stats, total))?;
        stdout.flush()
    }

    /// Build the progress bar line
    pub fn render_line(stats: &ProgressStats, total: u64) -> String {
        let progress_percent = stats.progress * 100.0;

        let bar_width: usize = 40;
        let filled = ((stats.progress * bar_width as f64) as usize).min(bar_width);
        let bar = "=".repeat(filled) + &" ".repeat(bar_width - filled);

        let eta_str = ProgressStats::calculate_eta(stats.downloaded, total, stats.download_speed)
            .map(ProgressStats::format_duration)
            .unwrap_or_else(|| "∞".to_string());

        format!(
            "[{}] {:.1}% | {} / {} | {} | Pieces: {}/{} | ETA: {}",
            bar,
            progress_percent,
            ProgressStats::format_bytes(stats.downloaded),
            ProgressStats::format_bytes(total),
            ProgressStats::format_speed(stats.download_speed),
            stats.pieces_verified,
            stats.piece_count,
            eta_str,
        )
    }

    /// Print completion message
    pub fn print_complete(&self, total: u64, path: &std::path::Path) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        println!("\r\x1b[2K");
        println!("Download Complete!");
        println!("  Size: {}", ProgressStats::format_bytes(total));
        println!("  Saved to: {}", path.display());
        println!("  Elapsed Time: {}", ProgressStats::format_duration(self.start_time.elapsed()));

        Ok(())
    }

    /// Print a status message
    pub fn print_status(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        println!("\r\x1b[2K{}", message);
        Ok(())
    }

    /// Get the elapsed time since start
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }
}
