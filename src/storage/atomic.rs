use crate::storage::{StorageError, StorageResult};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Path of the scratch file a write to `path` goes through
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces the file at `path` with `bytes`
///
/// The bytes are written to a sibling `.tmp` file, synced, then renamed over the target,
/// so readers observe either the old content or the new content, never a partial file.
/// Missing parent directories are created.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let write_err = |source| StorageError::Write {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
    }

    let temp_path = temp_path_for(path);
    let mut file = fs::File::create(&temp_path).map_err(write_err)?;
    file.write_all(bytes).map_err(write_err)?;
    file.sync_all().map_err(write_err)?;
    drop(file);

    fs::rename(&temp_path, path).map_err(write_err)?;
    Ok(())
}
