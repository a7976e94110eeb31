use deepcompare_common::{ComparisonOptions, DeepCompareError};
use regex::{Regex, RegexBuilder};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Whether exclusion patterns ignore case.
///
/// Follows the host's native filesystem convention and is fixed for the
/// whole process.
pub const CASE_INSENSITIVE: bool = cfg!(any(windows, target_os = "macos"));

/// Compiled exclusion patterns, tested against simple file names
#[derive(Debug, Clone, Default)]
pub struct ExclusionMatcher {
    patterns: Vec<Regex>,
}

impl ExclusionMatcher {
    /// Compile the exclusions of `options`, converting wildcards first if needed
    pub fn new(options: &ComparisonOptions) -> Self {
        let options = options.clone().into_regex_exclusions();
        Self::from_regex_patterns(options.exclusions())
    }

    /// Compile already-converted regular expressions.
    ///
    /// Each pattern must match the whole name. Patterns that fail to compile
    /// are dropped and never match anything.
    pub fn from_regex_patterns(patterns: &[String]) -> Self {
        let compiled = patterns
            .iter()
            .filter_map(|pattern| {
                match RegexBuilder::new(&format!("^(?:{})$", pattern))
                    .case_insensitive(CASE_INSENSITIVE)
                    .build()
                {
                    Ok(regex) => {
                        debug!("Added exclusion pattern: {}", pattern);
                        Some(regex)
                    }
                    Err(err) => {
                        debug!("Ignoring invalid exclusion pattern '{}': {}", pattern, err);
                        None
                    }
                }
            })
            .collect();

        Self { patterns: compiled }
    }

    /// True when any pattern matches `name`
    pub fn should_exclude(&self, name: &str) -> bool {
        self.patterns.iter().any(|regex| regex.is_match(name))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Read exclusion patterns from a text file.
///
/// One pattern per line; blank lines and lines starting with `#` are skipped.
pub fn read_exclusion_file(path: &Path) -> Result<Vec<String>, DeepCompareError> {
    let data = fs::read_to_string(path).map_err(|e| {
        DeepCompareError::Config(format!(
            "Unable to read exclusions file {}: {}",
            path.display(),
            e
        ))
    })?;

    Ok(data
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
