use std::{
    fs,
    io::{self, Write},
    path::Path,
};

use keylock_core::{LockError, Result};
use tempfile::NamedTempFile;

/// Write via a temp file in the target directory and rename over `path`.
/// `owner_only` forces 0600; otherwise an existing file's mode is kept.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8], owner_only: bool) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(LockError::storage)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(LockError::storage)?;
    if owner_only {
        restrict_to_owner(tmp.path())?;
    } else if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(tmp.path(), meta.permissions()).map_err(LockError::storage)?;
    }
    tmp.write_all(bytes).map_err(LockError::storage)?;
    tmp.flush().map_err(LockError::storage)?;
    tmp.as_file().sync_all().map_err(LockError::storage)?;
    tmp.persist(path).map_err(|e| LockError::storage(e.error))?;
    Ok(())
}

/// `Ok(None)` when the file does not exist.
pub(crate) fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(LockError::storage(err)),
    }
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(LockError::storage(err)),
    }
}

#[cfg(unix)]
pub(crate) fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(LockError::storage)
}

#[cfg(not(unix))]
pub(crate) fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_parents_and_replaces_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a/b/c.txt");

        write_atomic(&path, b"first", false).expect("write");
        write_atomic(&path, b"second", false).expect("overwrite");

        assert_eq!(fs::read(&path).expect("read"), b"second");
    }

    #[test]
    fn read_optional_reports_missing_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(read_optional(&dir.path().join("nope")).expect("read"), None);
    }

    #[cfg(unix)]
    #[test]
    fn keeps_existing_mode_when_not_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("shared.txt");
        fs::write(&path, b"x").expect("seed");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod");

        write_atomic(&path, b"y", false).expect("write");

        let mode = fs::metadata(&path).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
