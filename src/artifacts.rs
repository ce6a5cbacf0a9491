//! Artifact Tracker - per-job ownership of temporary files
//!
//! Every file a job creates is registered here right after (or just before)
//! it is written. Cleanup is best-effort: it never fails and never stops
//! early.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Outcome of a cleanup pass. Failures are warnings, not errors.
#[derive(Debug, Default, Clone)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn absorb(&mut self, path: &Path, outcome: RemoveOutcome) {
        match outcome {
            RemoveOutcome::Removed => self.removed.push(path.to_path_buf()),
            RemoveOutcome::Missing => self.missing.push(path.to_path_buf()),
            RemoveOutcome::Failed(reason) => self.failed.push((path.to_path_buf(), reason)),
        }
    }
}

enum RemoveOutcome {
    Removed,
    Missing,
    Failed(String),
}

/// Paths created during one job, in creation order. Never shared across jobs.
#[derive(Debug, Default)]
pub struct ArtifactTracker {
    paths: Vec<PathBuf>,
}

impl ArtifactTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path. It does not have to exist yet.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!(path = %path.display(), "tracking artifact");
        self.paths.push(path);
    }

    /// Stop tracking `path` without touching the file.
    pub fn release(&mut self, path: &Path) {
        self.paths.retain(|p| p != path);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Delete a single path now, if present. The path stays tracked.
    pub fn cleanup_one(&self, path: &Path) -> CleanupReport {
        let mut report = CleanupReport::default();
        report.absorb(path, remove(path));
        report
    }

    /// Delete every tracked path and forget them. Safe to call repeatedly.
    pub fn cleanup_all(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();
        if self.paths.is_empty() {
            return report;
        }

        debug!(count = self.paths.len(), "cleaning up artifacts");
        for path in &self.paths {
            report.absorb(path, remove(path));
        }
        self.paths.clear();
        report
    }
}

fn remove(path: &Path) -> RemoveOutcome {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed artifact");
            RemoveOutcome::Removed
        }
        Err(e) if e.kind() == ErrorKind::NotFound => RemoveOutcome::Missing,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove artifact");
            RemoveOutcome::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_cleanup_all_removes_everything() {
        let dir = TempDir::new().unwrap();
        let mut tracker = ArtifactTracker::new();
        let a = touch(&dir, "a.xlsx");
        let b = touch(&dir, "b.png");
        tracker.track(&a);
        tracker.track(&b);

        let report = tracker.cleanup_all();

        assert_eq!(report.removed.len(), 2);
        assert!(!a.exists());
        assert!(!b.exists());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_cleanup_twice_is_noop() {
        let dir = TempDir::new().unwrap();
        let mut tracker = ArtifactTracker::new();
        tracker.track(touch(&dir, "a.xlsx"));

        tracker.cleanup_all();
        let second = tracker.cleanup_all();

        assert!(second.removed.is_empty());
        assert!(second.missing.is_empty());
        assert!(second.is_clean());
    }

    #[test]
    fn test_missing_and_duplicate_paths_tolerated() {
        let dir = TempDir::new().unwrap();
        let mut tracker = ArtifactTracker::new();
        let a = touch(&dir, "a.xlsx");
        tracker.track(&a);
        tracker.track(&a);
        tracker.track(dir.path().join("never-written.png"));

        let report = tracker.cleanup_all();

        assert_eq!(report.removed, vec![a]);
        assert_eq!(report.missing.len(), 2);
        assert!(report.is_clean());
    }

    #[test]
    fn test_failed_removal_does_not_stop_the_rest() {
        let dir = TempDir::new().unwrap();
        let mut tracker = ArtifactTracker::new();
        // A directory cannot be removed with remove_file.
        let sub = dir.path().join("subdir");
        std::fs::create_dir(&sub).unwrap();
        tracker.track(&sub);
        let b = touch(&dir, "b.png");
        tracker.track(&b);

        let report = tracker.cleanup_all();

        assert_eq!(report.failed.len(), 1);
        assert!(!b.exists());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_cleanup_one_keeps_tracking() {
        let dir = TempDir::new().unwrap();
        let mut tracker = ArtifactTracker::new();
        let a = touch(&dir, "a.png");
        tracker.track(&a);

        let report = tracker.cleanup_one(&a);

        assert_eq!(report.removed, vec![a.clone()]);
        assert!(!a.exists());
        assert_eq!(tracker.paths(), &[a]);
    }

    #[test]
    fn test_release_forgets_path_only() {
        let dir = TempDir::new().unwrap();
        let mut tracker = ArtifactTracker::new();
        let out = touch(&dir, "out.png");
        tracker.track(&out);

        tracker.release(&out);
        tracker.cleanup_all();

        assert!(out.exists());
    }
}
