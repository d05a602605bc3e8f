//! Content fingerprints of the rendered configuration.

use std::fmt;
use std::path::Path;

use sha2::{Digest, Sha256};

/// SHA-256 digest of a file's content at one point in time.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self(hasher.finalize().into())
    }

    /// Read and fingerprint `path`.
    pub async fn of_file(path: &Path) -> std::io::Result<Self> {
        let content = tokio::fs::read(path).await?;
        Ok(Self::of(&content))
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

/// Last observed fingerprint, owned by a single detector.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    last: Option<Fingerprint>,
}

impl ChangeTracker {
    pub fn new(initial: Option<Fingerprint>) -> Self {
        Self { last: initial }
    }

    /// Record `current` and report whether it differs from the previous
    /// observation.
    pub fn observe(&mut self, current: Fingerprint) -> bool {
        if self.last == Some(current) {
            return false;
        }
        self.last = Some(current);
        true
    }

    pub fn last(&self) -> Option<Fingerprint> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digest() {
        assert_eq!(
            Fingerprint::of(b"").to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_tracker_reports_transitions_only() {
        let a = Fingerprint::of(b"global\n  maxconn 256\n");
        let b = Fingerprint::of(b"global\n  maxconn 512\n");
        let mut tracker = ChangeTracker::new(Some(a));

        assert!(!tracker.observe(a));
        assert!(tracker.observe(b));
        assert!(!tracker.observe(b));
        assert!(tracker.observe(a));
        assert_eq!(tracker.last(), Some(a));
    }

    #[test]
    fn test_first_observation_is_a_change() {
        let mut tracker = ChangeTracker::default();
        assert!(tracker.observe(Fingerprint::of(b"x")));
    }

    #[tokio::test]
    async fn test_of_file_matches_of() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("haproxy.cfg");
        tokio::fs::write(&path, b"defaults\n").await.unwrap();

        let fp = Fingerprint::of_file(&path).await.unwrap();
        assert_eq!(fp, Fingerprint::of(b"defaults\n"));
    }
}
