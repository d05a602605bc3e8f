//! Atomic writes of the rendered configuration file.

use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use crate::detector::Fingerprint;

/// Result of applying a payload to the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file already held exactly this content.
    Unchanged(Fingerprint),
    /// New content was written.
    Written(Fingerprint),
}

impl WriteOutcome {
    pub fn fingerprint(&self) -> Fingerprint {
        match self {
            WriteOutcome::Unchanged(fp) | WriteOutcome::Written(fp) => *fp,
        }
    }

    pub fn changed(&self) -> bool {
        matches!(self, WriteOutcome::Written(_))
    }
}

/// Writes configuration payloads to the file the load balancer reads.
///
/// Compare-and-write is serialized so that concurrent callers never
/// interleave partial writes.
#[derive(Debug)]
pub struct ConfigWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ConfigWriter {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    /// Replace the file content with `content` unless it is already
    /// identical. The file is swapped in by rename, so readers see
    /// either the old or the new content.
    pub async fn apply(&self, content: &[u8]) -> io::Result<WriteOutcome> {
        let _guard = self.lock.lock().await;
        let incoming = Fingerprint::of(content);

        match Fingerprint::of_file(&self.path).await {
            Ok(current) if current == incoming => return Ok(WriteOutcome::Unchanged(incoming)),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, content).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        tracing::info!(path = ?self.path, fingerprint = %incoming, bytes = content.len(), "Wrote new configuration");
        Ok(WriteOutcome::Written(incoming))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
