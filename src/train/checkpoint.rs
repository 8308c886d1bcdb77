//! Checkpoint discovery in a work directory.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::DetbridgeError;

const CHECKPOINT_EXT: &str = "pth";
const LATEST: &str = "latest.pth";

/// Finds the checkpoint to resume from in `dir`.
///
/// `latest.pth` wins when present. Otherwise the `.pth` file whose stem
/// ends in the largest `_<n>` (as in `epoch_12.pth`) is picked. Returns
/// `None` when the directory is missing or holds no checkpoint.
pub fn find_latest_checkpoint(dir: &Path) -> Result<Option<PathBuf>, DetbridgeError> {
    if !dir.is_dir() {
        tracing::warn!(path = %dir.display(), "The path of checkpoints does not exist.");
        return Ok(None);
    }

    let latest = dir.join(LATEST);
    if latest.is_file() {
        return Ok(Some(latest));
    }

    let mut best: Option<(u64, PathBuf)> = None;
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| DetbridgeError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(CHECKPOINT_EXT) {
            continue;
        }
        let Some(count) = checkpoint_count(path) else {
            continue;
        };
        if best.as_ref().map_or(true, |(n, _)| count > *n) {
            best = Some((count, path.to_path_buf()));
        }
    }

    Ok(best.map(|(_, path)| path))
}

fn checkpoint_count(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let (_, count) = stem.rsplit_once('_')?;
    count.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").expect("write checkpoint");
    }

    #[test]
    fn test_latest_wins() {
        let temp = tempfile::tempdir().expect("create temp dir");
        touch(temp.path(), "epoch_3.pth");
        touch(temp.path(), "latest.pth");
        assert_eq!(
            find_latest_checkpoint(temp.path()).unwrap(),
            Some(temp.path().join("latest.pth"))
        );
    }

    #[test]
    fn test_highest_count_wins() {
        let temp = tempfile::tempdir().expect("create temp dir");
        touch(temp.path(), "epoch_2.pth");
        touch(temp.path(), "epoch_10.pth");
        touch(temp.path(), "epoch_9.pth");
        touch(temp.path(), "epoch_11.log");
        touch(temp.path(), "best.pth");
        assert_eq!(
            find_latest_checkpoint(temp.path()).unwrap(),
            Some(temp.path().join("epoch_10.pth"))
        );
    }

    #[test]
    fn test_nested_checkpoints_ignored() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let nested = temp.path().join("old");
        fs::create_dir(&nested).unwrap();
        touch(&nested, "iter_500.pth");
        assert_eq!(find_latest_checkpoint(temp.path()).unwrap(), None);
    }

    #[test]
    fn test_missing_dir() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let missing = temp.path().join("nope");
        assert_eq!(find_latest_checkpoint(&missing).unwrap(), None);
    }
}
