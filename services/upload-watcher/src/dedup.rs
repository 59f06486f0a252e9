//! Short-lived suppression of repeated events for an unchanged file.
//!
//! A single write commonly produces both a create and a modify notification.
//! When enabled, the window drops the second one if the file's modification
//! time has not changed since the first was accepted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

pub struct DedupWindow {
    window: Duration,
    seen: HashMap<PathBuf, (SystemTime, Instant)>,
}

impl DedupWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    /// True if `(path, mtime)` was recorded within the window.
    pub fn is_duplicate(&mut self, path: &Path, mtime: SystemTime, now: Instant) -> bool {
        self.prune(now);

        self.seen
            .get(path)
            .is_some_and(|(seen_mtime, _)| *seen_mtime == mtime)
    }

    /// Remember a handled `(path, mtime)`; call only once the upload succeeded.
    pub fn record(&mut self, path: &Path, mtime: SystemTime, now: Instant) {
        self.seen.insert(path.to_path_buf(), (mtime, now));
    }

    fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.seen
            .retain(|_, (_, seen_at)| now.saturating_duration_since(*seen_at) < window);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mtime() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[test]
    fn test_repeat_within_window_is_suppressed() {
        let mut dedup = DedupWindow::new(Duration::from_millis(500));
        let path = Path::new("/sync/detect_001.txt");
        let now = Instant::now();

        assert!(!dedup.is_duplicate(path, mtime(), now));
        dedup.record(path, mtime(), now);
        assert!(dedup.is_duplicate(path, mtime(), now + Duration::from_millis(100)));
    }

    #[test]
    fn test_unrecorded_state_is_not_duplicate() {
        let mut dedup = DedupWindow::new(Duration::from_millis(500));
        let path = Path::new("/sync/detect_001.txt");
        let now = Instant::now();

        assert!(!dedup.is_duplicate(path, mtime(), now));
        assert!(!dedup.is_duplicate(path, mtime(), now + Duration::from_millis(100)));
        assert!(dedup.is_empty());
    }

    #[test]
    fn test_new_mtime_is_accepted() {
        let mut dedup = DedupWindow::new(Duration::from_millis(500));
        let path = Path::new("/sync/detect_001.txt");
        let now = Instant::now();

        dedup.record(path, mtime(), now);
        assert!(!dedup.is_duplicate(path, mtime() + Duration::from_secs(1), now));
    }

    #[test]
    fn test_entries_expire() {
        let mut dedup = DedupWindow::new(Duration::from_millis(500));
        let path = Path::new("/sync/detect_001.txt");
        let now = Instant::now();

        dedup.record(path, mtime(), now);
        assert!(!dedup.is_duplicate(path, mtime(), now + Duration::from_secs(1)));
        assert_eq!(dedup.len(), 0);
    }
}
