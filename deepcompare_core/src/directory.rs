use crate::exclusion::ExclusionMatcher;
use crate::file_entry::{FileEntry, FileStatus, HashPass};
use crate::observer::{CancelToken, EntryIssue};
use deepcompare_common::DeepCompareError;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Settings and sinks shared by every level of a recursive scan
pub struct ScanContext<'a> {
    pub matcher: &'a ExclusionMatcher,
    pub check_hidden_files: bool,
    pub follow_symlinks: bool,
    pub cancel: &'a CancelToken,
    pub issues: &'a mut Vec<EntryIssue>,
}

impl ScanContext<'_> {
    fn skip(&mut self, path: &Path, err: &io::Error) {
        warn!("Skipping {:?}: {}", path, err);
        self.issues.push(EntryIssue::scan(path, err));
    }
}

/// A directory in a comparison tree, owning its children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    path: PathBuf,
    is_match: bool,
    subdirectories: Vec<DirectoryEntry>,
    files: Vec<FileEntry>,
    size: u64,
    count: u64,
}

impl DirectoryEntry {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            is_match: false,
            subdirectories: Vec::new(),
            files: Vec::new(),
            size: 0,
            count: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &OsStr {
        self.path.file_name().unwrap_or(self.path.as_os_str())
    }

    /// True once compared, if every descendant matched its companion
    pub fn is_match(&self) -> bool {
        self.is_match
    }

    /// Child directories, sorted by name
    pub fn subdirectories(&self) -> &[DirectoryEntry] {
        &self.subdirectories
    }

    /// Child files, sorted by name
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Total bytes of every file in the subtree
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of files in the subtree
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Rebuild the subtree from disk, discarding anything from a previous scan.
    ///
    /// Failing to list this directory is returned as `DeepCompareError::Scan`.
    /// Problems with individual children are recorded in the context and the
    /// child is left out.
    ///
    /// A followed symlink that leads back to a directory already on the
    /// current scan path is recorded as an issue and not descended into.
    pub fn scan(&mut self, ctx: &mut ScanContext<'_>) -> Result<(), DeepCompareError> {
        let mut ancestors = Vec::new();
        self.scan_within(ctx, &mut ancestors)
    }

    fn scan_within(
        &mut self,
        ctx: &mut ScanContext<'_>,
        ancestors: &mut Vec<PathBuf>,
    ) -> Result<(), DeepCompareError> {
        self.subdirectories.clear();
        self.files.clear();
        self.size = 0;
        self.count = 0;
        self.is_match = false;

        let read_dir = fs::read_dir(&self.path).map_err(|source| DeepCompareError::Scan {
            path: self.path.clone(),
            source,
        })?;

        let mut children = Vec::new();
        for entry in read_dir {
            match entry {
                Ok(entry) => children.push(entry.path()),
                Err(err) => ctx.skip(&self.path, &err),
            }
        }
        children.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        ancestors.push(fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone()));
        let scanned = self.scan_children(children, ctx, ancestors);
        ancestors.pop();
        scanned?;

        debug!(
            "Scanned {:?}: {} files, {} bytes",
            self.path, self.count, self.size
        );
        Ok(())
    }

    fn scan_children(
        &mut self,
        children: Vec<PathBuf>,
        ctx: &mut ScanContext<'_>,
        ancestors: &mut Vec<PathBuf>,
    ) -> Result<(), DeepCompareError> {
        for child in children {
            if ctx.cancel.is_cancelled() {
                return Err(DeepCompareError::Cancelled);
            }
            self.scan_child(child, ctx, ancestors)?;
        }
        Ok(())
    }

    fn scan_child(
        &mut self,
        path: PathBuf,
        ctx: &mut ScanContext<'_>,
        ancestors: &mut Vec<PathBuf>,
    ) -> Result<(), DeepCompareError> {
        let link_meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(err) => {
                ctx.skip(&path, &err);
                return Ok(());
            }
        };
        let is_symlink = link_meta.file_type().is_symlink();
        let meta = if is_symlink {
            match fs::metadata(&path) {
                Ok(meta) => meta,
                Err(err) => {
                    ctx.skip(&path, &err);
                    return Ok(());
                }
            }
        } else {
            link_meta
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !ctx.check_hidden_files && is_hidden(&name, &meta) {
            debug!("Skipping hidden entry {:?}", path);
            return Ok(());
        }
        if ctx.matcher.should_exclude(&name) {
            debug!("Excluded {:?}", path);
            return Ok(());
        }

        if meta.is_dir() {
            if is_symlink && !ctx.follow_symlinks {
                debug!("Not following symlinked directory {:?}", path);
                return Ok(());
            }
            if is_symlink {
                if let Ok(resolved) = fs::canonicalize(&path) {
                    if ancestors.contains(&resolved) {
                        let err = io::Error::other(format!(
                            "symlink loops back to {}",
                            resolved.display()
                        ));
                        ctx.skip(&path, &err);
                        return Ok(());
                    }
                }
            }

            let mut dir = DirectoryEntry::new(path);
            match dir.scan_within(ctx, ancestors) {
                Ok(()) => {
                    self.size += dir.size;
                    self.count += dir.count;
                    self.subdirectories.push(dir);
                }
                Err(DeepCompareError::Scan { path, source }) => ctx.skip(&path, &source),
                Err(err) => return Err(err),
            }
        } else if meta.is_file() {
            let mut file = FileEntry::new(path);
            match file.scan() {
                Ok(()) => {
                    self.size += file.size();
                    self.count += 1;
                    self.files.push(file);
                }
                Err(err) => ctx.skip(file.path(), &err),
            }
        } else {
            debug!("Ignoring special file {:?}", path);
        }

        Ok(())
    }

    /// Hash every file in the subtree: this directory's files first, then
    /// each subdirectory in order
    pub fn hash(&mut self, pass: &mut HashPass<'_>) -> Result<(), DeepCompareError> {
        for file in &mut self.files {
            file.compute_hash(pass)?;
        }
        for dir in &mut self.subdirectories {
            dir.hash(pass)?;
        }
        Ok(())
    }

    /// Match this subtree against `companion`, the same logical directory in
    /// the other tree.
    ///
    /// Only this side's flags are updated, so the comparison has to be run
    /// from both sides to find files missing in either direction.
    pub fn compare(&mut self, companion: &DirectoryEntry) {
        self.is_match = true;

        for file in &mut self.files {
            match companion.find_file(file.name()) {
                Some(other) => {
                    file.set_path_match(true);
                    file.compare(other);
                    if !file.hash_match() {
                        self.is_match = false;
                    }
                }
                None => {
                    file.set_path_match(false);
                    self.is_match = false;
                }
            }
        }

        for dir in &mut self.subdirectories {
            match companion.find_subdirectory(dir.name()) {
                Some(other) => {
                    dir.compare(other);
                    if !dir.is_match {
                        self.is_match = false;
                    }
                }
                None => {
                    dir.mark_unmatched();
                    self.is_match = false;
                }
            }
        }
    }

    /// Exact, case-sensitive lookup by simple name
    pub fn find_file(&self, name: &OsStr) -> Option<&FileEntry> {
        self.files
            .binary_search_by(|f| f.name().cmp(name))
            .ok()
            .map(|idx| &self.files[idx])
    }

    pub fn find_subdirectory(&self, name: &OsStr) -> Option<&DirectoryEntry> {
        self.subdirectories
            .binary_search_by(|d| d.name().cmp(name))
            .ok()
            .map(|idx| &self.subdirectories[idx])
    }

    fn mark_unmatched(&mut self) {
        self.is_match = false;
        for file in &mut self.files {
            file.mark_unmatched();
        }
        for dir in &mut self.subdirectories {
            dir.mark_unmatched();
        }
    }

    /// Sort every file of the compared subtree into the given lists.
    ///
    /// `changed` and `matching` may be left out when the caller does not
    /// collect them; missing files are always collected.
    pub fn compile_results(
        &self,
        missing: &mut Vec<FileEntry>,
        mut changed: Option<&mut Vec<FileEntry>>,
        mut matching: Option<&mut Vec<FileEntry>>,
    ) {
        for file in &self.files {
            match file.status() {
                FileStatus::Missing => missing.push(file.clone()),
                FileStatus::Changed => {
                    if let Some(list) = changed.as_deref_mut() {
                        list.push(file.clone());
                    }
                }
                FileStatus::Matching => {
                    if let Some(list) = matching.as_deref_mut() {
                        list.push(file.clone());
                    }
                }
            }
        }
        for dir in &self.subdirectories {
            dir.compile_results(missing, changed.as_deref_mut(), matching.as_deref_mut());
        }
    }

    /// Every file in the subtree, in scan order
    pub fn all_files(&self) -> Vec<&FileEntry> {
        let mut out = Vec::with_capacity(self.count as usize);
        self.collect_files(&mut out);
        out
    }

    fn collect_files<'a>(&'a self, out: &mut Vec<&'a FileEntry>) {
        out.extend(self.files.iter());
        for dir in &self.subdirectories {
            dir.collect_files(out);
        }
    }
}

#[cfg(unix)]
fn is_hidden(name: &str, _meta: &fs::Metadata) -> bool {
    name.starts_with('.')
}

#[cfg(windows)]
fn is_hidden(_name: &str, meta: &fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    const FILE_ATTRIBUTE_HIDDEN: u32 = 0x2;
    meta.file_attributes() & FILE_ATTRIBUTE_HIDDEN != 0
}

#[cfg(not(any(unix, windows)))]
fn is_hidden(name: &str, _meta: &fs::Metadata) -> bool {
    name.starts_with('.')
}
