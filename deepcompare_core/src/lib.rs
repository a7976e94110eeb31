pub mod directory;
pub mod engine;
pub mod exclusion;
pub mod file_entry;
pub mod hashing;
pub mod observer;
pub mod result;
pub mod run_log;
pub mod size;
pub mod validate;

pub use directory::{DirectoryEntry, ScanContext};
pub use engine::{ComparisonEngine, EngineState, Outcome};
pub use exclusion::{read_exclusion_file, ExclusionMatcher, CASE_INSENSITIVE};
pub use file_entry::{FileEntry, FileStatus, HashPass};
pub use hashing::{hash_bytes, new_hasher, probe_algorithms, BoxedHasher, HASH_CHUNK_SIZE};
pub use observer::{
    CancelToken, EntryIssue, HashProgressObserver, IssueKind, NoopObserver, StatusObserver,
};
pub use result::ComparisonResult;
pub use run_log::{RunLog, LOG_FILE_NAME};
pub use size::format_size;
pub use validate::validate_inputs;
