use deepcompare_common::DeepCompareError;
use std::path::{Path, PathBuf};

/// Check the preconditions of a comparison and return both roots in
/// canonical form.
///
/// Both roots must be existing directories, distinct, and not nested in one
/// another. A log directory must exist and sit outside both trees, otherwise
/// the log itself would show up as a discrepancy.
pub fn validate_inputs(
    source: &Path,
    target: &Path,
    log_dir: Option<&Path>,
) -> Result<(PathBuf, PathBuf), DeepCompareError> {
    let source = canonical_dir(source, "Source")?;
    let target = canonical_dir(target, "Target")?;

    if source == target {
        return Err(DeepCompareError::Path(format!(
            "Source and target are the same directory: {}",
            source.display()
        )));
    }
    if target.starts_with(&source) {
        return Err(DeepCompareError::Path(format!(
            "Target {} is inside source {}",
            target.display(),
            source.display()
        )));
    }
    if source.starts_with(&target) {
        return Err(DeepCompareError::Path(format!(
            "Source {} is inside target {}",
            source.display(),
            target.display()
        )));
    }

    if let Some(log_dir) = log_dir {
        let log_dir = canonical_dir(log_dir, "Log")?;
        if log_dir.starts_with(&source) || log_dir.starts_with(&target) {
            return Err(DeepCompareError::Path(format!(
                "Log directory {} must not be inside source or target",
                log_dir.display()
            )));
        }
    }

    Ok((source, target))
}

fn canonical_dir(path: &Path, role: &str) -> Result<PathBuf, DeepCompareError> {
    if !path.exists() {
        return Err(DeepCompareError::Path(format!(
            "{} path does not exist: {}",
            role,
            path.display()
        )));
    }
    if !path.is_dir() {
        return Err(DeepCompareError::Path(format!(
            "{} path is not a directory: {}",
            role,
            path.display()
        )));
    }
    Ok(path.canonicalize()?)
}
