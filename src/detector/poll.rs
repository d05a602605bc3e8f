//! Interval-based change detection.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::detector::fingerprint::{ChangeTracker, Fingerprint};
use crate::observability::metrics;
use crate::reload::{ReloadSender, ReloadTrigger};
use crate::supervisor::spec::Role;

/// Fingerprints the rendered file on a fixed interval and requests a
/// reload whenever the content changes.
pub struct PollingDetector {
    path: PathBuf,
    interval: Duration,
    role: Role,
    tracker: ChangeTracker,
    reloads: ReloadSender,
}

impl PollingDetector {
    pub fn new(path: &Path, interval: Duration, role: Role, reloads: ReloadSender) -> Self {
        Self {
            path: path.to_path_buf(),
            interval,
            role,
            tracker: ChangeTracker::default(),
            reloads,
        }
    }

    /// Fingerprint the current content without emitting a change, so
    /// that start-up does not trigger a reload.
    pub async fn seed(&mut self) {
        match Fingerprint::of_file(&self.path).await {
            Ok(fp) => {
                tracing::debug!(path = ?self.path, fingerprint = %fp, "Seeded config fingerprint");
                self.tracker = ChangeTracker::new(Some(fp));
            }
            Err(e) => {
                tracing::debug!(path = ?self.path, error = %e, "Config file not readable yet");
            }
        }
    }

    /// Run one polling cycle. Returns whether a reload was requested.
    pub async fn check(&mut self) -> bool {
        let fp = match Fingerprint::of_file(&self.path).await {
            Ok(fp) => fp,
            Err(e) => {
                tracing::warn!(path = ?self.path, error = %e, "Failed to read config file, skipping cycle");
                return false;
            }
        };

        if !self.tracker.observe(fp) {
            return false;
        }

        tracing::info!(path = ?self.path, fingerprint = %fp, "Config file changed");
        metrics::record_config_change("poll");
        self.reloads.request(self.role, ReloadTrigger::FileChanged { fingerprint: Some(fp) });
        true
    }

    pub async fn run(mut self, stop: CancellationToken) {
        self.seed().await;

        tracing::info!(
            path = ?self.path,
            interval_ms = self.interval.as_millis() as u64,
            "Polling config detector started"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and the file was just seeded.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check().await;
                }
                _ = stop.cancelled() => {
                    tracing::info!("Config detector received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
