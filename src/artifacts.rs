//! Generic object persistence: serde JSON artifacts written atomically

use crate::error::{CensusError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Serialize `object` as JSON to `path`
pub fn save_object<T: Serialize>(path: impl AsRef<Path>, object: &T) -> Result<()> {
    let path = path.as_ref();
    stage_object(path, object)?.commit()?;
    tracing::debug!(path = %path.display(), "Saved object");
    Ok(())
}

/// Deserialize a JSON artifact written by [`save_object`]
pub fn load_object<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T> {
    let path = path.as_ref();
    let json = fs::read_to_string(path).map_err(|e| {
        CensusError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot read {}: {}", path.display(), e),
        ))
    })?;
    Ok(serde_json::from_str(&json)?)
}

/// Write through a temp file next to `path`, then rename over it.
///
/// Parent directories are created. On failure the temp file is removed and
/// `path` is left untouched.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    stage_file(path, write)?.commit()
}

/// A fully written temp file waiting to be moved over its target.
///
/// Dropping it without committing removes the temp file.
#[derive(Debug)]
pub struct StagedFile {
    tmp: PathBuf,
    path: PathBuf,
}

impl StagedFile {
    /// Final location of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename the temp file over the target
    pub fn commit(self) -> Result<()> {
        fs::rename(&self.tmp, &self.path)?;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.tmp.exists() {
            let _ = fs::remove_file(&self.tmp);
        }
    }
}

/// Write `path`'s content to its temp file without touching `path`
pub fn stage_file<F>(path: &Path, write: F) -> Result<StagedFile>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    // dropped on any failure below, removing the temp file
    let staged = StagedFile {
        tmp: tmp_path(path),
        path: path.to_path_buf(),
    };
    let mut file = File::create(&staged.tmp)?;
    write(&mut file)?;
    file.sync_all()?;
    Ok(staged)
}

/// Serialize `object` as JSON into a staged file
pub fn stage_object<T: Serialize>(path: impl AsRef<Path>, object: &T) -> Result<StagedFile> {
    stage_file(path.as_ref(), |file| {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, object)?;
        writer.flush()?;
        Ok(())
    })
}

/// Move every staged file into place, or none of them.
///
/// Existing target files are set aside first; if any rename fails, the files
/// already committed are removed and the set-aside targets restored.
pub fn commit_all(files: Vec<StagedFile>) -> Result<()> {
    let mut committed: Vec<(PathBuf, Option<PathBuf>)> = Vec::with_capacity(files.len());
    let mut failure = None;

    for staged in files {
        let path = staged.path.clone();
        match commit_with_backup(staged) {
            Ok(backup) => committed.push((path, backup)),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    match failure {
        None => {
            for (_, backup) in committed {
                if let Some(backup) = backup {
                    let _ = fs::remove_file(backup);
                }
            }
            Ok(())
        }
        Some(e) => {
            for (path, backup) in committed.into_iter().rev() {
                let _ = fs::remove_file(&path);
                if let Some(backup) = backup {
                    let _ = fs::rename(&backup, &path);
                }
            }
            tracing::warn!(error = %e, "Staged files rolled back");
            Err(e)
        }
    }
}

/// Commit one file, returning where the replaced file was set aside
fn commit_with_backup(staged: StagedFile) -> Result<Option<PathBuf>> {
    let path = staged.path.clone();
    let backup = if path.is_file() {
        let backup = backup_path(&path);
        fs::rename(&path, &backup)?;
        Some(backup)
    } else {
        None
    };

    match staged.commit() {
        Ok(()) => Ok(backup),
        Err(e) => {
            if let Some(backup) = backup {
                let _ = fs::rename(&backup, &path);
            }
            Err(e)
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
