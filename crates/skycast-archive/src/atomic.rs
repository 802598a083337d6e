//! Write-to-temp-then-rename helpers

use crate::{ArchiveError, ArchiveResult};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Write a complete file into a temporary sibling of `dir`, synced to disk.
///
/// The caller decides how the staged file is moved into place.
pub fn stage<F>(dir: &Path, write: F) -> ArchiveResult<NamedTempFile>
where
    F: FnOnce(&mut dyn Write) -> ArchiveResult<()>,
{
    fs::create_dir_all(dir).map_err(|e| ArchiveError::io(dir, e))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| ArchiveError::io(dir, e))?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer.flush().map_err(|e| ArchiveError::io(dir, e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| ArchiveError::io(tmp.path(), e))?;

    Ok(tmp)
}

/// Atomically replace `path` with the bytes produced by `write`.
///
/// If anything fails, the previous content of `path` is left untouched.
pub fn write_atomic<F>(path: &Path, write: F) -> ArchiveResult<()>
where
    F: FnOnce(&mut dyn Write) -> ArchiveResult<()>,
{
    let dir = parent_dir(path);
    let tmp = stage(dir, write)?;
    tmp.persist(path).map_err(|e| ArchiveError::io(path, e.error))?;
    Ok(())
}

/// Atomically replace `path` with `value` serialized as pretty JSON
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> ArchiveResult<()> {
    write_atomic(path, |w| {
        serde_json::to_writer_pretty(w, value).map_err(|e| ArchiveError::json(path, e))
    })
}

/// Read a JSON file written by [`write_json_atomic`]
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> ArchiveResult<T> {
    let bytes = fs::read(path).map_err(|e| ArchiveError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| ArchiveError::json(path, e))
}

pub(crate) fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
