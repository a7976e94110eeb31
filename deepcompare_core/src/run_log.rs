use crate::observer::{EntryIssue, IssueKind};
use crate::result::ComparisonResult;
use chrono::Local;
use deepcompare_common::{ComparisonOptions, DeepCompareError};
use std::error::Error as _;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Name of the log file written into the configured log directory
pub const LOG_FILE_NAME: &str = "deep-compare.log";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Plain-text record of a single run.
///
/// The first write failure is kept for the caller to report and every later
/// write is skipped.
pub struct RunLog {
    path: PathBuf,
    writer: BufWriter<File>,
    broken: bool,
    write_error: Option<io::Error>,
}

impl RunLog {
    /// Create (or truncate) `<dir>/deep-compare.log`
    pub fn create(dir: &Path) -> Result<Self, DeepCompareError> {
        let path = dir.join(LOG_FILE_NAME);
        let file = File::create(&path).map_err(|source| DeepCompareError::Log {
            path: path.clone(),
            source,
        })?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            broken: false,
            write_error: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&mut self, text: &str) {
        if self.broken {
            return;
        }
        if let Err(err) = writeln!(self.writer, "{}", text) {
            self.broken = true;
            self.write_error = Some(err);
        }
    }

    /// The first write failure, returned at most once
    pub fn take_write_error(&mut self) -> Option<DeepCompareError> {
        self.write_error.take().map(|source| DeepCompareError::Log {
            path: self.path.clone(),
            source,
        })
    }

    pub fn preamble(&mut self, source: &Path, target: &Path, options: &ComparisonOptions) {
        self.line(&format!("deepcompare {}", env!("CARGO_PKG_VERSION")));
        self.line(&format!("Started:   {}", Local::now().format(TIMESTAMP_FORMAT)));
        self.line(&format!("Source:    {}", source.display()));
        self.line(&format!("Target:    {}", target.display()));
        self.line(&format!("Algorithm: {}", options.hash_algorithm()));

        let mode = if options.exclusions_regex() { "regex" } else { "wildcard" };
        if options.exclusions().is_empty() {
            self.line("Exclusions: none");
        } else {
            self.line(&format!("Exclusions ({}):", mode));
            for pattern in options.exclusions() {
                self.line(&format!("  {}", pattern));
            }
        }

        self.line(&format!(
            "Hidden files: {}",
            if options.check_hidden_files { "included" } else { "skipped" }
        ));
        self.line(&format!(
            "Symlinked directories: {}",
            if options.follow_symlinks { "followed" } else { "not followed" }
        ));
        self.line("");
    }

    pub fn issues(&mut self, issues: &[EntryIssue]) {
        for issue in issues {
            let action = match issue.kind {
                IssueKind::Scan => "scan",
                IssueKind::Hash => "hash",
            };
            self.line(&format!(
                "Skipped ({}): {}: {}",
                action,
                issue.path.display(),
                issue.message
            ));
        }
    }

    pub fn report(&mut self, result: &ComparisonResult) {
        self.line("");
        if result.is_match() {
            self.line("All files match.");
        } else {
            self.section(
                "Missing from target",
                result.source_root(),
                result.source_missing().iter().map(|f| f.path()),
            );
            self.section(
                "Missing from source",
                result.target_root(),
                result.target_missing().iter().map(|f| f.path()),
            );
            self.section(
                "Changed",
                result.source_root(),
                result.changed().iter().map(|f| f.path()),
            );
        }
    }

    fn section<'a>(&mut self, title: &str, root: &Path, paths: impl ExactSizeIterator<Item = &'a Path>) {
        if paths.len() == 0 {
            return;
        }
        self.line(&format!("{} ({}):", title, paths.len()));
        for path in paths {
            let relative = path.strip_prefix(root).unwrap_or(path);
            self.line(&format!("  {}", relative.display()));
        }
        self.line("");
    }

    /// Record a fatal error; with `debug` the whole source chain is written
    pub fn failure(&mut self, err: &DeepCompareError, debug: bool) {
        self.line(&format!("Comparison failed: {}", err));
        if debug {
            self.line(&format!("  {:?}", err));
            let mut source = err.source();
            while let Some(cause) = source {
                self.line(&format!("  caused by: {}", cause));
                source = cause.source();
            }
        }
    }

    /// Stamp the end time and flush everything to disk
    pub fn finish(mut self) -> Result<(), DeepCompareError> {
        self.line(&format!("Finished:  {}", Local::now().format(TIMESTAMP_FORMAT)));
        if let Some(err) = self.take_write_error() {
            return Err(err);
        }
        self.writer
            .flush()
            .and_then(|_| self.writer.get_ref().sync_all())
            .map_err(|source| DeepCompareError::Log {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepcompare_common::{AvailableAlgorithms, HashAlgorithm};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_create_truncates_previous_log() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(LOG_FILE_NAME), "old run\n").unwrap();

        let mut log = RunLog::create(temp.path()).unwrap();
        log.line("new run");
        log.finish().unwrap();

        let content = fs::read_to_string(temp.path().join(LOG_FILE_NAME)).unwrap();
        assert!(content.starts_with("new run\n"));
        assert!(!content.contains("old run"));
        assert!(content.contains("Finished:"));
    }

    #[test]
    fn test_create_in_missing_directory() {
        let temp = TempDir::new().unwrap();
        let result = RunLog::create(&temp.path().join("missing"));
        assert!(matches!(result, Err(DeepCompareError::Log { .. })));
    }

    #[test]
    fn test_preamble_lists_settings() {
        let temp = TempDir::new().unwrap();
        let available = AvailableAlgorithms::new(vec![HashAlgorithm::Sha1]);
        let mut options = ComparisonOptions::new(&available)
            .with_exclusions(vec!["*.bak".to_string()], false);
        options.check_hidden_files = true;

        let mut log = RunLog::create(temp.path()).unwrap();
        log.preamble(Path::new("/data/left"), Path::new("/data/right"), &options);
        log.finish().unwrap();

        let content = fs::read_to_string(temp.path().join(LOG_FILE_NAME)).unwrap();
        assert!(content.contains(env!("CARGO_PKG_VERSION")));
        assert!(content.contains("Source:    /data/left"));
        assert!(content.contains("Target:    /data/right"));
        assert!(content.contains("Algorithm: SHA-1"));
        assert!(content.contains("Exclusions (wildcard):"));
        assert!(content.contains("  *.bak"));
        assert!(content.contains("Hidden files: included"));
    }

    #[test]
    fn test_failure_detail_depends_on_debug() {
        let temp = TempDir::new().unwrap();
        let err = DeepCompareError::Scan {
            path: PathBuf::from("/gone"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such directory"),
        };

        let mut log = RunLog::create(temp.path()).unwrap();
        log.failure(&err, false);
        log.failure(&err, true);
        log.finish().unwrap();

        let content = fs::read_to_string(temp.path().join(LOG_FILE_NAME)).unwrap();
        assert_eq!(content.matches("Comparison failed").count(), 2);
        assert_eq!(content.matches("caused by: no such directory").count(), 1);
    }
}
