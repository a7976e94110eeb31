use crate::directory::DirectoryEntry;
use crate::file_entry::FileEntry;
use crate::observer::EntryIssue;
use deepcompare_common::HashAlgorithm;
use std::path::{Path, PathBuf};

/// Outcome of a completed comparison: every file sorted into a bucket
#[derive(Debug, Clone)]
pub struct ComparisonResult {
    source_root: PathBuf,
    target_root: PathBuf,
    algorithm: HashAlgorithm,
    source_missing: Vec<FileEntry>,
    target_missing: Vec<FileEntry>,
    changed: Vec<FileEntry>,
    matching: Vec<FileEntry>,
    total_files: u64,
    total_bytes: u64,
    issues: Vec<EntryIssue>,
}

impl ComparisonResult {
    /// Classify two trees that have both been compared against each other.
    ///
    /// Changed and matching files are only collected from the source side so
    /// that each pair is counted once.
    pub fn compile(
        source: &DirectoryEntry,
        target: &DirectoryEntry,
        algorithm: HashAlgorithm,
        issues: Vec<EntryIssue>,
    ) -> Self {
        let mut source_missing = Vec::new();
        let mut changed = Vec::new();
        let mut matching = Vec::new();
        source.compile_results(&mut source_missing, Some(&mut changed), Some(&mut matching));

        let mut target_missing = Vec::new();
        target.compile_results(&mut target_missing, None, None);

        Self {
            source_root: source.path().to_path_buf(),
            target_root: target.path().to_path_buf(),
            algorithm,
            source_missing,
            target_missing,
            changed,
            matching,
            total_files: source.count() + target.count(),
            total_bytes: source.size() + target.size(),
            issues,
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Files in the source tree with no counterpart in the target
    pub fn source_missing(&self) -> &[FileEntry] {
        &self.source_missing
    }

    /// Files in the target tree with no counterpart in the source
    pub fn target_missing(&self) -> &[FileEntry] {
        &self.target_missing
    }

    /// Source-side entries whose content differs from the target
    pub fn changed(&self) -> &[FileEntry] {
        &self.changed
    }

    pub fn matching(&self) -> &[FileEntry] {
        &self.matching
    }

    /// Files scanned across both trees
    pub fn total_files(&self) -> u64 {
        self.total_files
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Entries skipped during scanning or hashing
    pub fn issues(&self) -> &[EntryIssue] {
        &self.issues
    }

    /// True when no file is missing or changed on either side
    pub fn is_match(&self) -> bool {
        self.source_missing.is_empty() && self.target_missing.is_empty() && self.changed.is_empty()
    }

    pub fn discrepancy_count(&self) -> usize {
        self.source_missing.len() + self.target_missing.len() + self.changed.len()
    }
}
