//! Filesystem-notification change detection.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio_util::sync::CancellationToken;

use crate::detector::fingerprint::Fingerprint;
use crate::observability::metrics;
use crate::reload::{ReloadSender, ReloadTrigger};
use crate::supervisor::spec::Role;

/// A watcher that requests a reload whenever the rendered file is written.
pub struct WatchDetector {
    path: PathBuf,
    role: Role,
    reload_on_attrib: bool,
    reloads: ReloadSender,
}

impl WatchDetector {
    pub fn new(path: &Path, role: Role, reload_on_attrib: bool, reloads: ReloadSender) -> Self {
        Self {
            path: path.to_path_buf(),
            role,
            reload_on_attrib,
            reloads,
        }
    }

    /// Start watching in the notifier's background thread.
    ///
    /// The parent directory is watched rather than the file itself so
    /// that replace-by-rename writes keep being observed.
    pub fn start(&self) -> Result<RecommendedWatcher, notify::Error> {
        let target = self.path.clone();
        let role = self.role;
        let reload_on_attrib = self.reload_on_attrib;
        let reloads = self.reloads.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if is_qualifying(&event, &target, reload_on_attrib) {
                        tracing::info!(path = ?target, kind = ?event.kind, "Config file change detected");
                        metrics::record_config_change("watch");
                        let fingerprint = match event.kind {
                            // Attribute changes leave content alone; always signal.
                            EventKind::Modify(ModifyKind::Metadata(_)) => None,
                            _ => std::fs::read(&target).ok().map(|content| Fingerprint::of(&content)),
                        };
                        reloads.request(role, ReloadTrigger::FileChanged { fingerprint });
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Watching config file");
        Ok(watcher)
    }
}

/// Keep a started watch alive until `stop` is cancelled.
pub async fn hold_until(watcher: RecommendedWatcher, stop: CancellationToken) {
    stop.cancelled().await;
    drop(watcher);
    tracing::info!("Config watcher stopped");
}

/// Whether `event` is a content change (or, optionally, an attribute
/// change) of `target`.
pub fn is_qualifying(event: &Event, target: &Path, reload_on_attrib: bool) -> bool {
    let touches_target = event
        .paths
        .iter()
        .any(|p| p.file_name().is_some() && p.file_name() == target.file_name());
    if !touches_target {
        return false;
    }

    match event.kind {
        EventKind::Modify(ModifyKind::Metadata(_)) => reload_on_attrib,
        EventKind::Modify(_) | EventKind::Create(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_content_write_qualifies() {
        let target = Path::new("/etc/opencopilot/services/LB/haproxy.cfg");
        let ev = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/etc/opencopilot/services/LB/haproxy.cfg",
        );
        assert!(is_qualifying(&ev, target, false));
    }

    #[test]
    fn test_rename_onto_target_qualifies() {
        let target = Path::new("/srv/haproxy.cfg");
        let ev = event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), "/srv/haproxy.cfg");
        assert!(is_qualifying(&ev, target, false));
        let ev = event(EventKind::Create(CreateKind::File), "/srv/haproxy.cfg");
        assert!(is_qualifying(&ev, target, false));
    }

    #[test]
    fn test_other_files_ignored() {
        let target = Path::new("/srv/haproxy.cfg");
        let ev = event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/srv/haproxy.ctmpl",
        );
        assert!(!is_qualifying(&ev, target, false));
    }

    #[test]
    fn test_attribute_change_is_opt_in() {
        let target = Path::new("/srv/haproxy.cfg");
        let ev = event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)),
            "/srv/haproxy.cfg",
        );
        assert!(!is_qualifying(&ev, target, false));
        assert!(is_qualifying(&ev, target, true));
    }

    #[test]
    fn test_removal_ignored() {
        let target = Path::new("/srv/haproxy.cfg");
        let ev = event(EventKind::Remove(RemoveKind::File), "/srv/haproxy.cfg");
        assert!(!is_qualifying(&ev, target, false));
    }
}
