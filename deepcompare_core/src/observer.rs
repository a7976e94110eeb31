use crate::engine::EngineState;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives phase changes, totals and errors from a running engine.
///
/// Called synchronously from the engine's own thread, in phase order.
pub trait StatusObserver: Send {
    /// The engine entered `state`; `message` is a human-readable description
    fn status(&mut self, state: EngineState, message: &str);

    /// Total files found in both trees, reported once after scanning
    fn total_files(&mut self, _count: u64) {}

    /// Total bytes found in both trees, reported once after scanning
    fn total_bytes(&mut self, _bytes: u64) {}

    fn error(&mut self, message: &str);
}

/// Receives byte counts while files are hashed
pub trait HashProgressObserver: Send {
    /// A new file is about to be hashed
    fn new_file(&mut self, _path: &Path) {}

    /// `bytes` more bytes of the current file have been digested
    fn progress(&mut self, bytes: u64);
}

/// Observer that discards every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StatusObserver for NoopObserver {
    fn status(&mut self, _state: EngineState, _message: &str) {}

    fn error(&mut self, _message: &str) {}
}

impl HashProgressObserver for NoopObserver {
    fn progress(&mut self, _bytes: u64) {}
}

/// Shared flag asking a running engine to stop
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What a skipped entry was doing when it failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    Scan,
    Hash,
}

/// A recoverable failure on a single file or directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryIssue {
    pub path: PathBuf,
    pub kind: IssueKind,
    pub message: String,
}

impl EntryIssue {
    pub fn scan(path: &Path, err: &std::io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: IssueKind::Scan,
            message: err.to_string(),
        }
    }

    pub fn hash(path: &Path, err: &std::io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: IssueKind::Hash,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
    }
}
