use std::path::{Path, PathBuf};

use keylock_core::{
    binding::{BindingRecord, KeyStatus},
    identity::validate_operator,
    LockError, Result,
};
use tracing::{debug, instrument};

use crate::{
    atomic::{read_optional, write_atomic},
    key_store::KeyRecord,
};

const METADATA_SUFFIX: &str = ".keylock.json";

/// `.env` -> `.env.keylock.json`, in the same directory.
pub fn metadata_path_for(protected: &Path) -> PathBuf {
    let mut name = protected
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(METADATA_SUFFIX);
    protected.with_file_name(name)
}

/// Reads and writes the binding record for one protected file.
#[derive(Debug, Clone)]
pub struct BindingFile {
    path: PathBuf,
}

impl BindingFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_protected(protected: &Path) -> Self {
        Self::new(metadata_path_for(protected))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrites any previous record.
    #[instrument(skip_all, fields(path = %self.path.display(), rotated = rotated))]
    pub fn record(
        &self,
        operator: &str,
        key_path: &Path,
        validation_token: &str,
        rotated: bool,
    ) -> Result<BindingRecord> {
        let operator = validate_operator(operator)?;
        let record = BindingRecord::new(
            operator,
            key_path.display().to_string(),
            validation_token,
            KeyStatus::from_rotated(rotated),
        );
        let body = serde_json::to_vec_pretty(&record).map_err(LockError::storage)?;
        write_atomic(&self.path, &body, false)?;
        debug!(status = record.key_status.as_str(), "binding recorded");
        Ok(record)
    }

    pub fn load(&self) -> Result<BindingRecord> {
        self.load_optional()?.ok_or_else(|| LockError::BindingMissing {
            path: self.path.clone(),
        })
    }

    pub fn load_optional(&self) -> Result<Option<BindingRecord>> {
        let Some(bytes) = read_optional(&self.path)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| LockError::BindingCorrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }
}

/// Ok only if `binding` was written under `key`.
pub fn check(key: &KeyRecord, binding: &BindingRecord, protected: &Path) -> Result<()> {
    binding.verify(&key.validation_token(), protected)
}
