use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Cryptographic digests a comparison can be run with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Sha512_224,
    Sha512_256,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
    Blake3,
}

impl HashAlgorithm {
    /// Every algorithm the tool knows about, whether or not this build can use it
    pub const ALL: [HashAlgorithm; 12] = [
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
        HashAlgorithm::Sha512_224,
        HashAlgorithm::Sha512_256,
        HashAlgorithm::Sha3_224,
        HashAlgorithm::Sha3_256,
        HashAlgorithm::Sha3_384,
        HashAlgorithm::Sha3_512,
        HashAlgorithm::Blake3,
    ];

    /// Canonical display name, e.g. `SHA-256`
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
            HashAlgorithm::Sha512 => "SHA-512",
            HashAlgorithm::Sha512_224 => "SHA-512/224",
            HashAlgorithm::Sha512_256 => "SHA-512/256",
            HashAlgorithm::Sha3_224 => "SHA3-224",
            HashAlgorithm::Sha3_256 => "SHA3-256",
            HashAlgorithm::Sha3_384 => "SHA3-384",
            HashAlgorithm::Sha3_512 => "SHA3-512",
            HashAlgorithm::Blake3 => "BLAKE3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        HashAlgorithm::ALL
            .iter()
            .copied()
            .find(|alg| alg.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("Unknown hash algorithm: {}", wanted))
    }
}

impl TryFrom<String> for HashAlgorithm {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HashAlgorithm> for String {
    fn from(alg: HashAlgorithm) -> Self {
        alg.name().to_string()
    }
}

/// The algorithms this build can actually instantiate.
///
/// Produced once at startup by a capability probe and passed down from there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableAlgorithms(Vec<HashAlgorithm>);

impl AvailableAlgorithms {
    pub fn new(algorithms: Vec<HashAlgorithm>) -> Self {
        Self(algorithms)
    }

    pub fn contains(&self, algorithm: HashAlgorithm) -> bool {
        self.0.contains(&algorithm)
    }

    pub fn iter(&self) -> impl Iterator<Item = HashAlgorithm> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// SHA-256 when present, SHA-1 otherwise
    pub fn preferred_default(&self) -> HashAlgorithm {
        if self.contains(HashAlgorithm::Sha256) {
            HashAlgorithm::Sha256
        } else {
            HashAlgorithm::Sha1
        }
    }
}

/// Options controlling a single comparison run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonOptions {
    exclusions: Vec<String>,
    exclusions_regex: bool,
    hash_algorithm: HashAlgorithm,
    /// Include hidden files and directories
    pub check_hidden_files: bool,
    /// Descend into directories reached through symbolic links
    pub follow_symlinks: bool,
    /// Directory receiving `deep-compare.log`
    pub log_dir: Option<PathBuf>,
    /// Verbose diagnostics in the log; never changes the outcome
    pub debug_mode: bool,
}

impl ComparisonOptions {
    pub fn new(available: &AvailableAlgorithms) -> Self {
        Self {
            exclusions: Vec::new(),
            exclusions_regex: false,
            hash_algorithm: available.preferred_default(),
            check_hidden_files: false,
            follow_symlinks: false,
            log_dir: None,
            debug_mode: false,
        }
    }

    pub fn exclusions(&self) -> &[String] {
        &self.exclusions
    }

    pub fn exclusions_regex(&self) -> bool {
        self.exclusions_regex
    }

    /// Replace the exclusion list; `regex` says whether the patterns are
    /// regular expressions or simple wildcards
    pub fn set_exclusions(&mut self, patterns: Vec<String>, regex: bool) {
        self.exclusions = patterns;
        self.exclusions_regex = regex;
    }

    pub fn with_exclusions(mut self, patterns: Vec<String>, regex: bool) -> Self {
        self.set_exclusions(patterns, regex);
        self
    }

    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    pub fn set_hash_algorithm(
        &mut self,
        algorithm: HashAlgorithm,
        available: &AvailableAlgorithms,
    ) -> crate::Result<()> {
        if !available.contains(algorithm) {
            return Err(crate::DeepCompareError::UnsupportedAlgorithm(
                algorithm.name().to_string(),
            ));
        }
        self.hash_algorithm = algorithm;
        Ok(())
    }

    /// Convert wildcard exclusions into anchored regular expressions.
    ///
    /// One way: once converted the flag stays set and calling this again
    /// returns the options untouched.
    pub fn into_regex_exclusions(mut self) -> Self {
        if !self.exclusions_regex {
            self.exclusions = self.exclusions.iter().map(|p| glob_to_regex(p)).collect();
            self.exclusions_regex = true;
        }
        self
    }
}

/// Translate a `?`/`*` wildcard pattern into an anchored regular expression
pub fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');
    for ch in pattern.chars() {
        match ch {
            '?' => out.push('.'),
            '*' => out.push_str(".*"),
            '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out.push('$');
    out
}

/// Application configuration persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Default exclusion patterns (e.g., "*.tmp", "Thumbs.db")
    #[serde(default)]
    pub exclusions: Vec<String>,

    /// Whether the default exclusions are regular expressions
    #[serde(default)]
    pub exclusions_regex: bool,

    /// Preferred hash algorithm; the build default is used when unset
    #[serde(default)]
    pub hash_algorithm: Option<HashAlgorithm>,

    /// Whether to include hidden files
    #[serde(default)]
    pub check_hidden_files: bool,

    /// Whether to follow symbolic links to directories
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Default directory for the comparison log
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Enable portable mode (config alongside binary)
    #[serde(default)]
    pub portable_mode: bool,
}

impl AppConfig {
    /// Build run options from the stored defaults
    pub fn comparison_options(
        &self,
        available: &AvailableAlgorithms,
    ) -> crate::Result<ComparisonOptions> {
        let mut options = ComparisonOptions::new(available)
            .with_exclusions(self.exclusions.clone(), self.exclusions_regex);
        if let Some(algorithm) = self.hash_algorithm {
            options.set_hash_algorithm(algorithm, available).map_err(|_| {
                crate::DeepCompareError::Config(format!(
                    "Configured hash algorithm {} is not available",
                    algorithm
                ))
            })?;
        }
        options.check_hidden_files = self.check_hidden_files;
        options.follow_symlinks = self.follow_symlinks;
        options.log_dir = self.log_dir.clone();
        Ok(options)
    }
}
