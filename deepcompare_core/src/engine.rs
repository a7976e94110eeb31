use crate::directory::{DirectoryEntry, ScanContext};
use crate::exclusion::ExclusionMatcher;
use crate::file_entry::HashPass;
use crate::hashing::new_hasher;
use crate::observer::{CancelToken, EntryIssue, HashProgressObserver, NoopObserver, StatusObserver};
use crate::result::ComparisonResult;
use crate::run_log::RunLog;
use crate::size::format_size;
use deepcompare_common::{ComparisonOptions, DeepCompareError};
use std::any::Any;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Phases a comparison run moves through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    ScanningSource,
    ScanningTarget,
    HashingSource,
    HashingTarget,
    Comparing,
    ClassifyingResults,
    Done,
    Failed,
    Cancelled,
}

impl EngineState {
    pub fn description(&self) -> &'static str {
        match self {
            EngineState::Idle => "Idle",
            EngineState::ScanningSource => "Scanning source directory",
            EngineState::ScanningTarget => "Scanning target directory",
            EngineState::HashingSource => "Hashing source files",
            EngineState::HashingTarget => "Hashing target files",
            EngineState::Comparing => "Comparing directory trees",
            EngineState::ClassifyingResults => "Compiling results",
            EngineState::Done => "Comparison complete",
            EngineState::Failed => "Comparison failed",
            EngineState::Cancelled => "Comparison cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineState::Done | EngineState::Failed | EngineState::Cancelled
        )
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// How a run that did not fail ended
#[derive(Debug)]
pub enum Outcome {
    Completed(ComparisonResult),
    Cancelled,
}

/// Drives two directory trees through scan, hash, compare and classify.
///
/// Consumed by [`run`](Self::run); a fresh engine is needed for every
/// comparison.
pub struct ComparisonEngine {
    source: DirectoryEntry,
    target: DirectoryEntry,
    options: ComparisonOptions,
    matcher: ExclusionMatcher,
    status: Box<dyn StatusObserver>,
    progress: Box<dyn HashProgressObserver>,
    cancel: CancelToken,
    state: EngineState,
    log: Option<RunLog>,
    issues: Vec<EntryIssue>,
    logged_issues: usize,
}

impl ComparisonEngine {
    /// Set up a comparison of `source` against `target`.
    ///
    /// The roots are expected to have passed
    /// [`validate_inputs`](crate::validate_inputs).
    pub fn new(source: PathBuf, target: PathBuf, options: ComparisonOptions) -> Self {
        let matcher = ExclusionMatcher::new(&options);
        Self {
            source: DirectoryEntry::new(source),
            target: DirectoryEntry::new(target),
            options,
            matcher,
            status: Box::new(NoopObserver),
            progress: Box::new(NoopObserver),
            cancel: CancelToken::new(),
            state: EngineState::Idle,
            log: None,
            issues: Vec::new(),
            logged_issues: 0,
        }
    }

    pub fn with_status_observer(mut self, observer: impl StatusObserver + 'static) -> Self {
        self.status = Box::new(observer);
        self
    }

    pub fn with_progress_observer(mut self, observer: impl HashProgressObserver + 'static) -> Self {
        self.progress = Box::new(observer);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that stops this engine once it is running
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Phase the engine is in; `Idle` until it is run
    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn source_root(&self) -> &Path {
        self.source.path()
    }

    pub fn target_root(&self) -> &Path {
        self.target.path()
    }

    /// Run every phase on the current thread.
    ///
    /// Cancellation is not an error and yields `Outcome::Cancelled`. Any
    /// failure is reported to the status observer and written to the log
    /// before being returned.
    pub fn run(mut self) -> Result<Outcome, DeepCompareError> {
        info!(
            "Comparing {} with {}",
            self.source.path().display(),
            self.target.path().display()
        );

        let executed = panic::catch_unwind(AssertUnwindSafe(|| self.execute()))
            .unwrap_or_else(|payload| Err(DeepCompareError::Comparison(panic_message(payload))));

        let outcome = match executed {
            Ok(result) => {
                self.transition(EngineState::Done);
                Ok(Outcome::Completed(result))
            }
            Err(DeepCompareError::Cancelled) => {
                self.write_pending_issues();
                self.transition(EngineState::Cancelled);
                Ok(Outcome::Cancelled)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        };

        self.close_log();
        outcome
    }

    /// Run the engine on its own named worker thread
    pub fn spawn(self) -> io::Result<JoinHandle<Result<Outcome, DeepCompareError>>> {
        thread::Builder::new()
            .name("deepcompare-engine".to_string())
            .spawn(move || self.run())
    }

    fn execute(&mut self) -> Result<ComparisonResult, DeepCompareError> {
        if let Some(dir) = self.options.log_dir.clone() {
            let mut log = RunLog::create(&dir)?;
            info!("Writing log to {}", log.path().display());
            log.preamble(self.source.path(), self.target.path(), &self.options);
            self.log = Some(log);
            self.check_log();
        }

        let algorithm = self.options.hash_algorithm();
        let mut hasher = new_hasher(algorithm)?;

        self.transition(EngineState::ScanningSource);
        {
            let mut ctx = ScanContext {
                matcher: &self.matcher,
                check_hidden_files: self.options.check_hidden_files,
                follow_symlinks: self.options.follow_symlinks,
                cancel: &self.cancel,
                issues: &mut self.issues,
            };
            self.source.scan(&mut ctx)?;
        }
        self.write_pending_issues();

        self.transition(EngineState::ScanningTarget);
        {
            let mut ctx = ScanContext {
                matcher: &self.matcher,
                check_hidden_files: self.options.check_hidden_files,
                follow_symlinks: self.options.follow_symlinks,
                cancel: &self.cancel,
                issues: &mut self.issues,
            };
            self.target.scan(&mut ctx)?;
        }
        self.write_pending_issues();

        let total_files = self.source.count() + self.target.count();
        let total_bytes = self.source.size() + self.target.size();
        info!("Found {} files ({})", total_files, format_size(total_bytes));
        self.status.total_files(total_files);
        self.status.total_bytes(total_bytes);
        self.log_line(&format!(
            "Files: {} in source, {} in target, {} total",
            self.source.count(),
            self.target.count(),
            format_size(total_bytes)
        ));

        self.transition(EngineState::HashingSource);
        {
            let mut pass = HashPass {
                hasher: hasher.as_mut(),
                progress: self.progress.as_mut(),
                cancel: &self.cancel,
                issues: &mut self.issues,
            };
            self.source.hash(&mut pass)?;
        }
        self.write_pending_issues();

        self.transition(EngineState::HashingTarget);
        {
            let mut pass = HashPass {
                hasher: hasher.as_mut(),
                progress: self.progress.as_mut(),
                cancel: &self.cancel,
                issues: &mut self.issues,
            };
            self.target.hash(&mut pass)?;
        }
        self.write_pending_issues();

        if self.cancel.is_cancelled() {
            return Err(DeepCompareError::Cancelled);
        }

        self.transition(EngineState::Comparing);
        self.source.compare(&self.target);
        self.target.compare(&self.source);

        self.transition(EngineState::ClassifyingResults);
        let issues = std::mem::take(&mut self.issues);
        self.logged_issues = 0;
        let result = ComparisonResult::compile(&self.source, &self.target, algorithm, issues);

        info!(
            "{} missing from target, {} missing from source, {} changed, {} matching",
            result.source_missing().len(),
            result.target_missing().len(),
            result.changed().len(),
            result.matching().len()
        );
        if let Some(log) = self.log.as_mut() {
            log.report(&result);
        }
        self.check_log();

        Ok(result)
    }

    fn transition(&mut self, state: EngineState) {
        debug!("{} -> {}", self.state, state);
        self.state = state;
        let message = state.description();
        info!("{}", message);
        self.status.status(state, message);
        self.log_line(message);
    }

    fn fail(&mut self, err: &DeepCompareError) {
        debug!("Comparison failed: {}", err);
        self.transition(EngineState::Failed);
        self.status.error(&err.to_string());
        let debug = self.options.debug_mode;
        if let Some(log) = self.log.as_mut() {
            log.failure(err, debug);
        }
        self.check_log();
    }

    fn log_line(&mut self, text: &str) {
        if let Some(log) = self.log.as_mut() {
            log.line(text);
        }
        self.check_log();
    }

    fn write_pending_issues(&mut self) {
        if self.logged_issues >= self.issues.len() {
            return;
        }
        if let Some(log) = self.log.as_mut() {
            log.issues(&self.issues[self.logged_issues..]);
        }
        self.logged_issues = self.issues.len();
        self.check_log();
    }

    /// Forward the log's first write failure to the status observer
    fn check_log(&mut self) {
        if let Some(err) = self.log.as_mut().and_then(RunLog::take_write_error) {
            warn!("{}", err);
            self.status.error(&err.to_string());
        }
    }

    fn close_log(&mut self) {
        if let Some(log) = self.log.take() {
            if let Err(err) = log.finish() {
                warn!("Failed to close log: {}", err);
                self.status.error(&err.to_string());
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("unexpected panic: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("unexpected panic: {}", msg)
    } else {
        "unexpected panic".to_string()
    }
}
