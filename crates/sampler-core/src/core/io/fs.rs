use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum FsError {
    #[error("Failed to create directory {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to move {from} to {to}: {source}")]
    Backup {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Timestamped sibling name used when backing up `path`, e.g. `runs/3#20240101-1200`.
pub fn backup_name(path: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M");
    let trimmed = path.to_string_lossy().trim_end_matches('/').to_string();
    PathBuf::from(format!("{trimmed}#{stamp}"))
}

/// Moves an existing path out of the way, returning where it went.
///
/// A backup target that already exists is itself backed up first.
pub fn backup_path(path: &Path) -> Result<Option<PathBuf>, FsError> {
    if !path.exists() {
        return Ok(None);
    }
    let target = backup_name(path);
    if target.exists() {
        backup_path(&target)?;
    }
    fs::rename(path, &target).map_err(|source| FsError::Backup {
        from: path.to_path_buf(),
        to: target.clone(),
        source,
    })?;
    info!("Backed up {} to {}", path.display(), target.display());
    Ok(Some(target))
}

/// Creates `path` and its parents.
///
/// An existing directory is kept unless `overwrite` is set, in which case it is
/// either backed up (`backup`) or removed before an empty one is created.
pub fn makedirs(path: &Path, overwrite: bool, backup: bool) -> Result<(), FsError> {
    if path.exists() {
        if !overwrite {
            return Ok(());
        }
        if backup {
            backup_path(path)?;
        } else {
            debug!("Removing existing directory {}", path.display());
            fs::remove_dir_all(path).map_err(|source| FsError::Remove {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }
    fs::create_dir_all(path).map_err(|source| FsError::Create {
        path: path.to_path_buf(),
        source,
    })
}

/// Creates the parent directory of a file path if needed.
pub fn make_parent_dirs(file_path: &Path) -> Result<(), FsError> {
    match file_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => makedirs(parent, false, false),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn makedirs_keeps_existing_directory_without_overwrite() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("1");
        makedirs(&target, false, true).unwrap();
        fs::write(target.join("in-0.gro"), "x").unwrap();

        makedirs(&target, false, true).unwrap();
        assert!(target.join("in-0.gro").exists());
    }

    #[test]
    fn makedirs_backs_up_existing_directory_on_overwrite() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("2");
        makedirs(&target, false, true).unwrap();
        fs::write(target.join("in-0.gro"), "old").unwrap();

        makedirs(&target, true, true).unwrap();
        assert!(target.is_dir());
        assert!(!target.join("in-0.gro").exists());

        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with("2#"))
            .collect();
        assert_eq!(backups.len(), 1);
        let backup = dir.path().join(&backups[0]);
        assert_eq!(fs::read_to_string(backup.join("in-0.gro")).unwrap(), "old");
    }

    #[test]
    fn makedirs_removes_existing_directory_without_backup() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("3");
        makedirs(&target, false, false).unwrap();
        fs::write(target.join("stale"), "x").unwrap();

        makedirs(&target, true, false).unwrap();
        assert!(target.is_dir());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
        assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
    }

    #[test]
    fn backup_of_missing_path_is_a_no_op() {
        let dir = tempdir().unwrap();
        assert!(backup_path(&dir.path().join("absent")).unwrap().is_none());
    }

    #[test]
    fn make_parent_dirs_creates_nested_parents() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a").join("b").join("cvs.json");
        make_parent_dirs(&file).unwrap();
        assert!(dir.path().join("a").join("b").is_dir());
    }
}
