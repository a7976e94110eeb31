use clap::{Args, Parser, Subcommand};
use crossbeam::channel::{self, Sender};
use deepcompare_common::{
    ensure_config, glob_to_regex, load_config, load_explicit_config, ComparisonOptions, HashAlgorithm,
};
use deepcompare_core::{
    format_size, probe_algorithms, read_exclusion_file, validate_inputs, ComparisonEngine,
    ComparisonResult, EngineState, HashProgressObserver, IssueKind, Outcome, StatusObserver,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status when the trees differ
const EXIT_DISCREPANCIES: i32 = 2;

#[derive(Parser)]
#[command(name = "deepcompare")]
#[command(author = "DeepCompare Contributors")]
#[command(version)]
#[command(about = "Compare two directory trees by file content digests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash and compare two directory trees
    Compare(CompareArgs),

    /// List the hash algorithms this build supports
    Hashes,

    /// Create the config file if needed and print its location
    Config {
        /// Use a config file next to the executable
        #[arg(long)]
        portable: bool,
    },
}

#[derive(Args, Debug, Default)]
struct CompareArgs {
    /// Source directory
    source: PathBuf,

    /// Target directory
    target: PathBuf,

    /// Exclusion pattern (can be specified multiple times)
    #[arg(short = 'x', long = "exclude")]
    exclude: Vec<String>,

    /// Read exclusion patterns from a file, one per line
    #[arg(long)]
    exclusions_file: Option<PathBuf>,

    /// Treat exclusion patterns as regular expressions
    #[arg(long)]
    regex: bool,

    /// Hash algorithm, e.g. SHA-256
    #[arg(short = 'a', long = "hash")]
    hash: Option<String>,

    /// Include hidden files and directories
    #[arg(short = 'H', long)]
    hidden: bool,

    /// Descend into symbolically linked directories
    #[arg(short = 'L', long)]
    follow_symlinks: bool,

    /// Write deep-compare.log into this directory
    #[arg(short = 'l', long)]
    log: Option<PathBuf>,

    /// Verbose diagnostics
    #[arg(long)]
    debug: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Use a config file next to the executable
    #[arg(long)]
    portable: bool,

    /// Read defaults from this config file instead of the standard one
    #[arg(short = 'c', long, value_name = "FILE", conflicts_with = "portable")]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = match &cli.command {
        Commands::Compare(args) if args.debug => "debug",
        _ => "warn",
    };

    // Logs go to stderr so JSON output stays clean on stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let code = match cli.command {
        Commands::Compare(args) => run_compare(args).unwrap_or_else(|e| {
            error!("Comparison failed: {}", e);
            1
        }),
        Commands::Hashes => {
            run_hashes();
            0
        }
        Commands::Config { portable } => match ensure_config(portable) {
            Ok(loaded) => {
                println!("{}", loaded.path.display());
                0
            }
            Err(e) => {
                error!("Unable to create config: {}", e);
                1
            }
        },
    };

    std::process::exit(code);
}

fn run_hashes() {
    let available = probe_algorithms();
    let default = available.preferred_default();
    for algorithm in available.iter() {
        if algorithm == default {
            println!("{} (default)", algorithm);
        } else {
            println!("{}", algorithm);
        }
    }
}

fn run_compare(args: CompareArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let available = probe_algorithms();
    let loaded = match &args.config {
        Some(path) => load_explicit_config(path)?,
        None => load_config(args.portable)?,
    };
    debug!("Using config {}", loaded.path.display());
    let options = build_options(&args, loaded.config.comparison_options(&available)?, &available)?;

    let (source, target) = validate_inputs(&args.source, &args.target, options.log_dir.as_deref())?;

    info!("Comparing:");
    info!("  Source: {}", source.display());
    info!("  Target: {}", target.display());
    info!("  Algorithm: {}", options.hash_algorithm());

    let (tx, rx) = channel::unbounded();
    let engine = ComparisonEngine::new(source, target, options)
        .with_status_observer(ChannelObserver { tx: tx.clone() })
        .with_progress_observer(ChannelObserver { tx });
    let handle = engine.spawn()?;

    let mut display = ProgressDisplay::new(!args.json && std::io::stderr().is_terminal());
    // Ends once the engine drops both observers
    for event in rx.iter() {
        display.handle(event);
    }
    display.finish();

    let outcome = handle
        .join()
        .map_err(|_| "comparison engine thread panicked")??;

    let result = match outcome {
        Outcome::Completed(result) => result,
        Outcome::Cancelled => return Err("comparison was cancelled".into()),
    };

    if args.json {
        let report = build_json_report(&result);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&result);
    }

    Ok(exit_code(&result))
}

/// Layer command-line flags over the stored defaults
fn build_options(
    args: &CompareArgs,
    mut options: ComparisonOptions,
    available: &deepcompare_common::AvailableAlgorithms,
) -> Result<ComparisonOptions, Box<dyn std::error::Error>> {
    let mut patterns = args.exclude.clone();
    if let Some(file) = &args.exclusions_file {
        patterns.extend(read_exclusion_file(file)?);
    }
    options = merge_exclusions(options, patterns, args.regex);

    if let Some(name) = &args.hash {
        let algorithm: HashAlgorithm = name.parse()?;
        options.set_hash_algorithm(algorithm, available)?;
    }

    options.check_hidden_files |= args.hidden;
    options.follow_symlinks |= args.follow_symlinks;
    options.debug_mode = args.debug;
    if let Some(log) = &args.log {
        options.log_dir = Some(log.clone());
    }

    Ok(options)
}

/// Add command-line patterns to the configured ones.
///
/// When the two lists use different syntaxes everything is moved over to
/// regular expressions.
fn merge_exclusions(options: ComparisonOptions, patterns: Vec<String>, regex: bool) -> ComparisonOptions {
    if patterns.is_empty() {
        return options;
    }
    if options.exclusions().is_empty() {
        return options.with_exclusions(patterns, regex);
    }
    if options.exclusions_regex() == regex {
        let mut merged = options.exclusions().to_vec();
        merged.extend(patterns);
        return options.with_exclusions(merged, regex);
    }

    let options = options.into_regex_exclusions();
    let mut merged = options.exclusions().to_vec();
    if regex {
        merged.extend(patterns);
    } else {
        merged.extend(patterns.iter().map(|p| glob_to_regex(p)));
    }
    options.with_exclusions(merged, true)
}

fn exit_code(result: &ComparisonResult) -> i32 {
    if result.is_match() {
        0
    } else {
        EXIT_DISCREPANCIES
    }
}

enum EngineEvent {
    Status(EngineState, String),
    TotalFiles(u64),
    TotalBytes(u64),
    Error(String),
    NewFile(PathBuf),
    Progress(u64),
}

/// Forwards engine notifications to the main thread
struct ChannelObserver {
    tx: Sender<EngineEvent>,
}

impl ChannelObserver {
    fn send(&self, event: EngineEvent) {
        // The receiver only goes away when the main thread is exiting
        let _ = self.tx.send(event);
    }
}

impl StatusObserver for ChannelObserver {
    fn status(&mut self, state: EngineState, message: &str) {
        self.send(EngineEvent::Status(state, message.to_string()));
    }

    fn total_files(&mut self, count: u64) {
        self.send(EngineEvent::TotalFiles(count));
    }

    fn total_bytes(&mut self, bytes: u64) {
        self.send(EngineEvent::TotalBytes(bytes));
    }

    fn error(&mut self, message: &str) {
        self.send(EngineEvent::Error(message.to_string()));
    }
}

impl HashProgressObserver for ChannelObserver {
    fn new_file(&mut self, path: &Path) {
        self.send(EngineEvent::NewFile(path.to_path_buf()));
    }

    fn progress(&mut self, bytes: u64) {
        self.send(EngineEvent::Progress(bytes));
    }
}

/// Byte-based progress bar on stderr, or nothing when not on a terminal
struct ProgressDisplay {
    bar: Option<ProgressBar>,
    failed: bool,
    warnings: usize,
}

impl ProgressDisplay {
    fn new(enabled: bool) -> Self {
        let bar = enabled.then(|| {
            let bar = ProgressBar::new(0);
            let style = ProgressStyle::with_template(
                "{spinner} {msg:24} [{bar:40}] {bytes}/{total_bytes} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
            bar.set_style(style);
            bar
        });
        Self {
            bar,
            failed: false,
            warnings: 0,
        }
    }

    fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Status(state, message) => {
                debug!("{}", message);
                self.failed |= state == EngineState::Failed;
                if let Some(bar) = &self.bar {
                    if state.is_terminal() {
                        bar.finish_and_clear();
                    } else {
                        bar.set_message(message);
                    }
                }
            }
            EngineEvent::TotalFiles(count) => info!("{} files to hash", count),
            EngineEvent::TotalBytes(bytes) => {
                info!("{} to hash", format_size(bytes));
                if let Some(bar) = &self.bar {
                    bar.set_length(bytes);
                }
            }
            EngineEvent::Error(message) => {
                // Fatal errors come back from the engine thread and are reported by main
                if self.failed {
                    return;
                }
                self.warnings += 1;
                if let Some(bar) = &self.bar {
                    bar.suspend(|| warn!("{}", message));
                } else {
                    warn!("{}", message);
                }
            }
            EngineEvent::NewFile(path) => debug!("Hashing {}", path.display()),
            EngineEvent::Progress(bytes) => {
                if let Some(bar) = &self.bar {
                    bar.inc(bytes);
                }
            }
        }
    }

    fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

fn print_report(result: &ComparisonResult) {
    println!("\n{}", "=".repeat(80));
    println!("Comparison Results ({})", result.algorithm());
    println!("{}", "=".repeat(80));
    println!("Source: {}", result.source_root().display());
    println!("Target: {}", result.target_root().display());

    if result.is_match() {
        println!("\nAll files match.");
    } else {
        print_section("Missing from target", result.source_root(), result.source_missing());
        print_section("Missing from source", result.target_root(), result.target_missing());
        print_section("Changed", result.source_root(), result.changed());
    }

    if !result.issues().is_empty() {
        println!("\nSkipped entries:");
        for issue in result.issues() {
            println!("  {} ({})", issue.path.display(), issue.message);
        }
    }

    println!("\n{}", "=".repeat(80));
    println!("Summary:");
    println!(
        "  Files scanned:       {} ({})",
        result.total_files(),
        format_size(result.total_bytes())
    );
    println!("  Matching:            {}", result.matching().len());
    println!("  Changed:             {}", result.changed().len());
    println!("  Missing from target: {}", result.source_missing().len());
    println!("  Missing from source: {}", result.target_missing().len());
    println!("{}", "=".repeat(80));
}

fn print_section(title: &str, root: &Path, files: &[deepcompare_core::FileEntry]) {
    if files.is_empty() {
        return;
    }
    println!("\n{} ({}):", title, files.len());
    for file in files {
        println!("  {}", file.relative_path(root).display());
    }
}

#[derive(Serialize)]
struct JsonReport {
    source: String,
    target: String,
    algorithm: String,
    is_match: bool,
    summary: JsonSummary,
    source_missing: Vec<JsonFile>,
    target_missing: Vec<JsonFile>,
    changed: Vec<JsonFile>,
    issues: Vec<JsonIssue>,
}

#[derive(Serialize)]
struct JsonSummary {
    total_files: u64,
    total_bytes: u64,
    matching: usize,
    changed: usize,
    source_missing: usize,
    target_missing: usize,
}

#[derive(Serialize)]
struct JsonFile {
    path: String,
    size: u64,
    hash: Option<String>,
}

#[derive(Serialize)]
struct JsonIssue {
    path: String,
    kind: &'static str,
    message: String,
}

fn build_json_report(result: &ComparisonResult) -> JsonReport {
    let files = |root: &Path, entries: &[deepcompare_core::FileEntry]| -> Vec<JsonFile> {
        entries
            .iter()
            .map(|entry| JsonFile {
                path: entry.relative_path(root).to_string_lossy().into_owned(),
                size: entry.size(),
                hash: entry.hash().map(str::to_string),
            })
            .collect()
    };

    JsonReport {
        source: result.source_root().to_string_lossy().into_owned(),
        target: result.target_root().to_string_lossy().into_owned(),
        algorithm: result.algorithm().to_string(),
        is_match: result.is_match(),
        summary: JsonSummary {
            total_files: result.total_files(),
            total_bytes: result.total_bytes(),
            matching: result.matching().len(),
            changed: result.changed().len(),
            source_missing: result.source_missing().len(),
            target_missing: result.target_missing().len(),
        },
        source_missing: files(result.source_root(), result.source_missing()),
        target_missing: files(result.target_root(), result.target_missing()),
        changed: files(result.source_root(), result.changed()),
        issues: result
            .issues()
            .iter()
            .map(|issue| JsonIssue {
                path: issue.path.to_string_lossy().into_owned(),
                kind: match issue.kind {
                    IssueKind::Scan => "scan",
                    IssueKind::Hash => "hash",
                },
                message: issue.message.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepcompare_common::AvailableAlgorithms;
    use std::fs;
    use tempfile::TempDir;

    fn available() -> AvailableAlgorithms {
        AvailableAlgorithms::new(vec![HashAlgorithm::Sha1, HashAlgorithm::Sha256])
    }

    fn args(source: &Path, target: &Path) -> CompareArgs {
        CompareArgs {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_into_empty_keeps_syntax() {
        let options = ComparisonOptions::new(&available());
        let merged = merge_exclusions(options, vec!["*.tmp".to_string()], false);

        assert_eq!(merged.exclusions(), ["*.tmp".to_string()]);
        assert!(!merged.exclusions_regex());
    }

    #[test]
    fn test_merge_same_syntax_appends() {
        let options = ComparisonOptions::new(&available())
            .with_exclusions(vec!["*.bak".to_string()], false);
        let merged = merge_exclusions(options, vec!["*.tmp".to_string()], false);

        assert_eq!(merged.exclusions(), ["*.bak".to_string(), "*.tmp".to_string()]);
    }

    #[test]
    fn test_merge_mixed_syntax_converts_to_regex() {
        let options = ComparisonOptions::new(&available())
            .with_exclusions(vec!["*.bak".to_string()], false);
        let merged = merge_exclusions(options, vec![r".*\.tmp".to_string()], true);

        assert!(merged.exclusions_regex());
        assert_eq!(
            merged.exclusions(),
            [r"^.*\.bak$".to_string(), r".*\.tmp".to_string()]
        );
    }

    #[test]
    fn test_merge_glob_into_regex_config() {
        let options = ComparisonOptions::new(&available())
            .with_exclusions(vec!["cache".to_string()], true);
        let merged = merge_exclusions(options, vec!["*.o".to_string()], false);

        assert!(merged.exclusions_regex());
        assert_eq!(merged.exclusions(), ["cache".to_string(), r"^.*\.o$".to_string()]);
    }

    #[test]
    fn test_build_options_overrides() {
        let temp = TempDir::new().unwrap();
        let mut cli = args(temp.path(), temp.path());
        cli.hash = Some("sha-1".to_string());
        cli.hidden = true;
        cli.log = Some(temp.path().join("logs"));

        let options = build_options(&cli, ComparisonOptions::new(&available()), &available()).unwrap();

        assert_eq!(options.hash_algorithm(), HashAlgorithm::Sha1);
        assert!(options.check_hidden_files);
        assert_eq!(options.log_dir, Some(temp.path().join("logs")));
    }

    #[test]
    fn test_build_options_rejects_unavailable_hash() {
        let temp = TempDir::new().unwrap();
        let mut cli = args(temp.path(), temp.path());
        cli.hash = Some("BLAKE3".to_string());

        assert!(build_options(&cli, ComparisonOptions::new(&available()), &available()).is_err());
    }

    #[test]
    fn test_build_options_reads_exclusions_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("exclusions.txt");
        fs::write(&file, "# comment\n*.log\n").unwrap();
        let mut cli = args(temp.path(), temp.path());
        cli.exclude = vec!["*.tmp".to_string()];
        cli.exclusions_file = Some(file);

        let options = build_options(&cli, ComparisonOptions::new(&available()), &available()).unwrap();
        assert_eq!(options.exclusions(), ["*.tmp".to_string(), "*.log".to_string()]);
    }

    #[test]
    fn test_fatal_error_not_repeated_by_display() {
        let mut display = ProgressDisplay::new(false);
        display.handle(EngineEvent::Error("Failed to write log".to_string()));
        assert_eq!(display.warnings, 1);

        display.handle(EngineEvent::Status(
            EngineState::Failed,
            EngineState::Failed.description().to_string(),
        ));
        display.handle(EngineEvent::Error("Cannot read directory".to_string()));

        assert!(display.failed);
        assert_eq!(display.warnings, 1);
    }

    #[test]
    fn test_config_flag_conflicts_with_portable() {
        let parsed = Cli::try_parse_from([
            "deepcompare", "compare", "a", "b", "--config", "custom.toml", "--portable",
        ]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from(["deepcompare", "compare", "a", "b", "-c", "custom.toml"]).unwrap();
        match parsed.command {
            Commands::Compare(args) => assert_eq!(args.config, Some(PathBuf::from("custom.toml"))),
            _ => panic!("expected compare"),
        }
    }

    #[test]
    fn test_json_report_and_exit_code() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("source");
        let target = temp.path().join("target");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(source.join("sub/only.txt"), "s").unwrap();
        fs::write(source.join("same.txt"), "same").unwrap();
        fs::write(target.join("same.txt"), "same").unwrap();

        let options = ComparisonOptions::new(&available());
        let result = match ComparisonEngine::new(source, target, options).run().unwrap() {
            Outcome::Completed(result) => result,
            Outcome::Cancelled => panic!("cancelled"),
        };

        let report = build_json_report(&result);
        assert!(!report.is_match);
        assert_eq!(report.summary.matching, 1);
        assert_eq!(report.source_missing.len(), 1);
        assert_eq!(report.source_missing[0].path, Path::new("sub").join("only.txt").to_string_lossy());
        assert!(report.source_missing[0].hash.is_some());
        assert_eq!(exit_code(&result), EXIT_DISCREPANCIES);
    }
}
