use crate::hashing::{finalize_hex, HASH_CHUNK_SIZE};
use crate::observer::{CancelToken, EntryIssue, HashProgressObserver};
use deepcompare_common::DeepCompareError;
use digest::DynDigest;
use std::ffi::OsStr;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Everything a hashing pass needs, shared across every file in a tree
pub struct HashPass<'a> {
    /// Digest reused for every file; reset before each one
    pub hasher: &'a mut (dyn DynDigest + Send),
    pub progress: &'a mut dyn HashProgressObserver,
    pub cancel: &'a CancelToken,
    pub issues: &'a mut Vec<EntryIssue>,
}

/// Where a compared file ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// No same-named file in the companion directory
    Missing,
    /// Present on both sides, contents differ (or could not be read)
    Changed,
    /// Present on both sides with identical digests
    Matching,
}

/// A single file in a comparison tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    path: PathBuf,
    size: u64,
    hash: Option<String>,
    path_match: bool,
    hash_match: bool,
}

enum HashFailure {
    Io(io::Error),
    Cancelled,
}

impl From<io::Error> for HashFailure {
    fn from(err: io::Error) -> Self {
        HashFailure::Io(err)
    }
}

impl FileEntry {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            size: 0,
            hash: None,
            path_match: false,
            hash_match: false,
        }
    }

    /// Absolute path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Simple name used to pair the file with its companion
    pub fn name(&self) -> &OsStr {
        self.path.file_name().unwrap_or(self.path.as_os_str())
    }

    /// Path below `root`, or the full path if the file is not under it
    pub fn relative_path(&self, root: &Path) -> &Path {
        self.path.strip_prefix(root).unwrap_or(&self.path)
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Hex digest, `None` before hashing or when the file could not be read
    pub fn hash(&self) -> Option<&str> {
        self.hash.as_deref()
    }

    pub fn path_match(&self) -> bool {
        self.path_match
    }

    pub fn hash_match(&self) -> bool {
        self.hash_match
    }

    /// Record the file's current size
    pub fn scan(&mut self) -> io::Result<()> {
        self.size = fs::metadata(&self.path)?.len();
        Ok(())
    }

    /// Stream the file through the pass's digest.
    ///
    /// Read failures leave the hash unset and are recorded as issues; only
    /// cancellation is returned as an error.
    pub fn compute_hash(&mut self, pass: &mut HashPass<'_>) -> Result<(), DeepCompareError> {
        self.hash = None;
        pass.progress.new_file(&self.path);

        match self.digest_contents(pass) {
            Ok(digest) => {
                debug!("Hashed {:?}: {}", self.path, digest);
                self.hash = Some(digest);
                Ok(())
            }
            Err(HashFailure::Cancelled) => Err(DeepCompareError::Cancelled),
            Err(HashFailure::Io(err)) => {
                warn!("Failed to hash {:?}: {}", self.path, err);
                pass.issues.push(EntryIssue::hash(&self.path, &err));
                Ok(())
            }
        }
    }

    fn digest_contents(&self, pass: &mut HashPass<'_>) -> Result<String, HashFailure> {
        let mut file = fs::File::open(&self.path)?;
        pass.hasher.reset();
        let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

        loop {
            let n = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    pass.hasher.reset();
                    return Err(err.into());
                }
            };
            pass.hasher.update(&buffer[..n]);
            pass.progress.progress(n as u64);

            if pass.cancel.is_cancelled() {
                pass.hasher.reset();
                return Err(HashFailure::Cancelled);
            }
        }

        Ok(finalize_hex(&mut *pass.hasher))
    }

    /// Compare digests with the same-named file from the other tree.
    ///
    /// A missing digest on either side never matches.
    pub fn compare(&mut self, companion: &FileEntry) {
        self.hash_match = match (&self.hash, &companion.hash) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => false,
        };
    }

    pub(crate) fn set_path_match(&mut self, path_match: bool) {
        self.path_match = path_match;
    }

    /// Clear both flags; used when the whole parent has no companion
    pub(crate) fn mark_unmatched(&mut self) {
        self.path_match = false;
        self.hash_match = false;
    }

    /// Bucket for result compilation. `hash_match` only counts when the
    /// path matched.
    pub fn status(&self) -> FileStatus {
        if !self.path_match {
            FileStatus::Missing
        } else if !self.hash_match {
            FileStatus::Changed
        } else {
            FileStatus::Matching
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::{hash_bytes, new_hasher};
    use crate::observer::NoopObserver;
    use deepcompare_common::HashAlgorithm;
    use tempfile::TempDir;

    struct Recorder {
        files: usize,
        chunks: Vec<u64>,
        cancel_after: Option<(CancelToken, usize)>,
    }

    impl HashProgressObserver for Recorder {
        fn new_file(&mut self, _path: &Path) {
            self.files += 1;
        }

        fn progress(&mut self, bytes: u64) {
            self.chunks.push(bytes);
            if let Some((token, after)) = &self.cancel_after {
                if self.chunks.len() >= *after {
                    token.cancel();
                }
            }
        }
    }

    fn hash_file(entry: &mut FileEntry, issues: &mut Vec<EntryIssue>) {
        let mut hasher = new_hasher(HashAlgorithm::Sha1).unwrap();
        let mut progress = NoopObserver;
        let cancel = CancelToken::new();
        let mut pass = HashPass {
            hasher: hasher.as_mut(),
            progress: &mut progress,
            cancel: &cancel,
            issues,
        };
        entry.compute_hash(&mut pass).unwrap();
    }

    #[test]
    fn test_scan_records_size() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.txt");
        fs::write(&path, b"hello").unwrap();

        let mut entry = FileEntry::new(path);
        entry.scan().unwrap();
        assert_eq!(entry.size(), 5);
        assert_eq!(entry.name(), "a.txt");
    }

    #[test]
    fn test_hash_matches_in_memory_digest() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.txt");
        fs::write(&path, b"abc").unwrap();

        let mut entry = FileEntry::new(path);
        let mut issues = Vec::new();
        hash_file(&mut entry, &mut issues);

        assert!(issues.is_empty());
        assert_eq!(
            entry.hash(),
            Some(hash_bytes(HashAlgorithm::Sha1, b"abc").unwrap().as_str())
        );
    }

    #[test]
    fn test_hash_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        fs::write(&path, vec![7u8; 3 * HASH_CHUNK_SIZE + 11]).unwrap();

        let mut first = FileEntry::new(path.clone());
        let mut second = FileEntry::new(path);
        let mut issues = Vec::new();
        hash_file(&mut first, &mut issues);
        hash_file(&mut second, &mut issues);

        assert!(first.hash().is_some());
        assert_eq!(first.hash(), second.hash());
    }

    #[test]
    fn test_progress_reports_every_chunk() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        let len = 2 * HASH_CHUNK_SIZE + 100;
        fs::write(&path, vec![1u8; len]).unwrap();

        let mut hasher = new_hasher(HashAlgorithm::Sha1).unwrap();
        let mut recorder = Recorder { files: 0, chunks: Vec::new(), cancel_after: None };
        let cancel = CancelToken::new();
        let mut issues = Vec::new();
        let mut entry = FileEntry::new(path);
        {
            let mut pass = HashPass {
                hasher: hasher.as_mut(),
                progress: &mut recorder,
                cancel: &cancel,
                issues: &mut issues,
            };
            entry.compute_hash(&mut pass).unwrap();
        }

        assert_eq!(recorder.files, 1);
        assert_eq!(recorder.chunks.iter().sum::<u64>(), len as u64);
        assert!(recorder.chunks.iter().all(|&n| n > 0));
    }

    #[test]
    fn test_missing_file_leaves_hash_absent() {
        let temp = TempDir::new().unwrap();
        let mut entry = FileEntry::new(temp.path().join("gone.txt"));
        let mut issues = Vec::new();
        hash_file(&mut entry, &mut issues);

        assert!(entry.hash().is_none());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, crate::observer::IssueKind::Hash);
    }

    #[test]
    fn test_cancel_stops_hashing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.bin");
        fs::write(&path, vec![0u8; 4 * HASH_CHUNK_SIZE]).unwrap();

        let cancel = CancelToken::new();
        let mut hasher = new_hasher(HashAlgorithm::Sha1).unwrap();
        let mut recorder = Recorder {
            files: 0,
            chunks: Vec::new(),
            cancel_after: Some((cancel.clone(), 1)),
        };
        let mut issues = Vec::new();
        let mut entry = FileEntry::new(path);
        let result = {
            let mut pass = HashPass {
                hasher: hasher.as_mut(),
                progress: &mut recorder,
                cancel: &cancel,
                issues: &mut issues,
            };
            entry.compute_hash(&mut pass)
        };

        assert!(matches!(result, Err(DeepCompareError::Cancelled)));
        assert_eq!(recorder.chunks.len(), 1);
        assert!(entry.hash().is_none());
    }

    #[test]
    fn test_absent_hash_never_matches() {
        let mut left = FileEntry::new(PathBuf::from("/l/a.txt"));
        let right = FileEntry::new(PathBuf::from("/r/a.txt"));
        left.set_path_match(true);
        left.compare(&right);

        assert!(!left.hash_match());
        assert_eq!(left.status(), FileStatus::Changed);
    }

    #[test]
    fn test_status_ignores_hash_without_path_match() {
        let mut entry = FileEntry::new(PathBuf::from("/l/a.txt"));
        entry.hash_match = true;
        assert_eq!(entry.status(), FileStatus::Missing);

        entry.set_path_match(true);
        assert_eq!(entry.status(), FileStatus::Matching);
    }

    #[test]
    fn test_relative_path() {
        let entry = FileEntry::new(PathBuf::from("/root/sub/file.txt"));
        assert_eq!(entry.relative_path(Path::new("/root")), Path::new("sub/file.txt"));
        assert_eq!(entry.relative_path(Path::new("/other")), Path::new("/root/sub/file.txt"));
    }
}
