use std::path::{Path, PathBuf};

use keylock_core::{binding::BindingRecord, identity::validate_operator, LockError, Result};
use tracing::{info, instrument, warn};

use crate::{
    atomic::{read_optional, remove_if_exists, write_atomic},
    binding_file::{check, BindingFile},
    envelope,
    key_store::KeyStore,
};

/// Whether the protected file currently holds plaintext or an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Unencrypted,
    Encrypted,
}

/// Snapshot reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub state: FileState,
    pub key_present: bool,
    pub binding: Option<BindingRecord>,
    /// `None` when there is no key or no binding to compare.
    pub binding_matches: Option<bool>,
}

/// One protected file together with its key store and binding metadata.
/// Every operation reads key and metadata fresh from disk.
///
/// Concurrent invocations against the same project are not coordinated; the
/// last writer wins on the key file and the protected file.
pub struct ProtectedFile<K: KeyStore> {
    path: PathBuf,
    keys: K,
    binding: BindingFile,
}

impl<K: KeyStore> ProtectedFile<K> {
    pub fn new(path: impl Into<PathBuf>, keys: K) -> Self {
        let path = path.into();
        let binding = BindingFile::for_protected(&path);
        Self {
            path,
            keys,
            binding,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    pub fn binding(&self) -> &BindingFile {
        &self.binding
    }

    pub fn state(&self) -> Result<FileState> {
        let contents = self.read()?;
        Ok(classify(&contents))
    }

    /// Unencrypted -> Encrypted under the current (or newly created) key.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn encrypt(&self, operator: &str) -> Result<BindingRecord> {
        let operator = validate_operator(operator)?;
        let contents = self.read()?;
        if classify(&contents) == FileState::Encrypted {
            return Err(LockError::AlreadyEncrypted {
                path: self.path.clone(),
            });
        }

        let key = self.keys.ensure()?;
        let sealed = envelope::encrypt(&contents, key.secret())?;

        // Binding before envelope: an envelope with no metadata never passes the gate.
        let record = self.binding.record(
            operator,
            &self.keys.location(),
            &key.validation_token(),
            false,
        )?;
        write_atomic(&self.path, sealed.as_bytes(), false)?;
        info!("file encrypted");
        Ok(record)
    }

    /// Encrypted -> Unencrypted, only if the stored key is the one the
    /// metadata names. The binding gate runs before any cipher work.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn decrypt(&self) -> Result<BindingRecord> {
        let contents = self.read()?;
        let (plaintext, binding) = self.open(&contents)?;
        write_atomic(&self.path, &plaintext, false)?;
        info!(last_encrypted_by = %binding.last_encrypted_by, "file decrypted");
        Ok(binding)
    }

    /// Re-encrypts under a brand-new key. The new key is staged next to the
    /// old one and only promoted once the file and its metadata have been
    /// rewritten; any failure before that restores the file and metadata
    /// and drops the staged key.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn rotate(&self, operator: &str) -> Result<BindingRecord> {
        let operator = validate_operator(operator)?;
        let contents = self.read()?;
        let plaintext = match classify(&contents) {
            FileState::Encrypted => self.open(&contents)?.0,
            FileState::Unencrypted => contents.clone(),
        };
        let previous_binding = read_optional(self.binding.path())?;

        let fresh = self.keys.stage()?;
        let sealed = match envelope::encrypt(&plaintext, fresh.secret()) {
            Ok(sealed) => sealed,
            Err(err) => return Err(self.abandon_rotation(err)),
        };
        if let Err(err) = write_atomic(&self.path, sealed.as_bytes(), false) {
            return Err(self.abandon_rotation(err));
        }

        let record = match self.binding.record(
            operator,
            &self.keys.location(),
            &fresh.validation_token(),
            true,
        ) {
            Ok(record) => record,
            Err(err) => {
                return Err(self.roll_back_rotation(&contents, previous_binding.as_deref(), err))
            }
        };
        if let Err(err) = self.keys.commit() {
            return Err(self.roll_back_rotation(&contents, previous_binding.as_deref(), err));
        }

        info!("key rotated and file re-encrypted");
        Ok(record)
    }

    pub fn status(&self) -> Result<Status> {
        let state = self.state()?;
        let key = match self.keys.load() {
            Ok(key) => Some(key),
            Err(LockError::KeyNotFound { .. }) => None,
            Err(err) => return Err(err),
        };
        let binding = self.binding.load_optional()?;
        let binding_matches = match (&key, &binding) {
            (Some(key), Some(binding)) => Some(binding.matches(&key.validation_token())),
            _ => None,
        };
        Ok(Status {
            state,
            key_present: key.is_some(),
            binding,
            binding_matches,
        })
    }

    fn read(&self) -> Result<Vec<u8>> {
        read_optional(&self.path)?.ok_or_else(|| LockError::FileNotFound {
            path: self.path.clone(),
        })
    }

    /// Loads key and binding, runs the gate, then decrypts.
    fn open(&self, contents: &[u8]) -> Result<(Vec<u8>, BindingRecord)> {
        let key = self.keys.load()?;
        let binding = self.binding.load()?;
        check(&key, &binding, &self.path)?;

        let text = std::str::from_utf8(contents).map_err(|e| LockError::DecryptionFailed {
            reason: format!("envelope is not text: {e}"),
        })?;
        let plaintext = envelope::decrypt(text, key.secret())?;
        Ok((plaintext, binding))
    }

    /// Puts back the file and metadata as they were before `rotate`, then
    /// drops the staged key. If the file cannot be restored it is still
    /// sealed under the staged key, so that key is kept.
    fn roll_back_rotation(
        &self,
        original: &[u8],
        previous_binding: Option<&[u8]>,
        err: LockError,
    ) -> LockError {
        if let Err(restore_err) = write_atomic(&self.path, original, false) {
            warn!("failed to restore {}: {restore_err}", self.path.display());
            return LockError::Storage {
                reason: format!(
                    "{err}; {} is left encrypted under the staged key, which was kept: {restore_err}",
                    self.path.display()
                ),
            };
        }
        let restored = match previous_binding {
            Some(bytes) => write_atomic(self.binding.path(), bytes, false),
            None => remove_if_exists(self.binding.path()),
        };
        if let Err(restore_err) = restored {
            warn!("failed to restore binding metadata: {restore_err}");
        }
        self.abandon_rotation(err)
    }

    fn abandon_rotation(&self, err: LockError) -> LockError {
        if let Err(discard_err) = self.keys.discard() {
            warn!("failed to discard staged key: {discard_err}");
        }
        err
    }
}

fn classify(contents: &[u8]) -> FileState {
    match std::str::from_utf8(contents) {
        Ok(text) if envelope::is_envelope(text) => FileState::Encrypted,
        _ => FileState::Unencrypted,
    }
}
