use std::{
    fmt,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use keylock_core::{environment::Environment, LockError, Result};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    atomic::{read_optional, remove_if_exists, restrict_to_owner, write_atomic},
    envelope::SECRET_LEN,
};

pub const TOKEN_LEN: usize = 16;

/// A symmetric key and the validation token that travels with it. The two
/// are only ever replaced together.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyRecord {
    secret: [u8; SECRET_LEN],
    validation_token: [u8; TOKEN_LEN],
}

impl KeyRecord {
    /// Two independent draws from the OS RNG.
    pub fn generate() -> Self {
        let mut secret = [0u8; SECRET_LEN];
        OsRng.fill_bytes(&mut secret);
        let mut validation_token = [0u8; TOKEN_LEN];
        OsRng.fill_bytes(&mut validation_token);
        Self {
            secret,
            validation_token,
        }
    }

    pub fn from_parts(secret: [u8; SECRET_LEN], validation_token: [u8; TOKEN_LEN]) -> Self {
        Self {
            secret,
            validation_token,
        }
    }

    pub fn secret(&self) -> &[u8; SECRET_LEN] {
        &self.secret
    }

    /// Hex form, as stored in the key file and echoed into binding metadata.
    pub fn validation_token(&self) -> String {
        hex::encode(self.validation_token)
    }
}

// Never print key bytes.
impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("secret", &"<redacted>")
            .field("validation_token", &self.validation_token())
            .finish()
    }
}

/// Owns the key lifecycle for one project.
pub trait KeyStore {
    /// Where the key lives, for metadata and messages.
    fn location(&self) -> PathBuf;

    /// Explicit load: `KeyNotFound` if absent, `KeyCorrupt` if unparsable.
    fn load(&self) -> Result<KeyRecord>;

    /// Loads the existing record, or generates and persists one.
    fn ensure(&self) -> Result<KeyRecord>;

    /// Generates a fresh record and holds it aside without touching the
    /// current key.
    fn stage(&self) -> Result<KeyRecord>;

    /// Promotes the staged record to current.
    fn commit(&self) -> Result<()>;

    /// Drops the staged record, if any.
    fn discard(&self) -> Result<()>;

    /// Unconditionally replaces the current record with a fresh one.
    fn rotate(&self) -> Result<KeyRecord> {
        let fresh = self.stage()?;
        self.commit()?;
        Ok(fresh)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredKey {
    key: String,
    validation_token: String,
}

/// JSON key file outside the project tree, readable by the owner only.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_environment(env: &Environment) -> Self {
        Self::new(env.key_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn staged_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".pending");
        self.path.with_file_name(name)
    }

    fn write(&self, path: &Path, record: &KeyRecord) -> Result<()> {
        let body = serde_json::to_vec_pretty(&encode_key(record)).map_err(LockError::storage)?;
        write_atomic(path, &body, true)?;
        restrict_to_owner(path)
    }
}

impl KeyStore for FileKeyStore {
    fn location(&self) -> PathBuf {
        self.path.clone()
    }

    fn load(&self) -> Result<KeyRecord> {
        let bytes = read_optional(&self.path)?.ok_or_else(|| LockError::KeyNotFound {
            path: self.path.clone(),
        })?;
        decode_key(&bytes).map_err(|reason| LockError::KeyCorrupt {
            path: self.path.clone(),
            reason,
        })
    }

    fn ensure(&self) -> Result<KeyRecord> {
        match self.load() {
            Ok(record) => Ok(record),
            Err(LockError::KeyNotFound { .. }) => {
                let record = KeyRecord::generate();
                self.write(&self.path, &record)?;
                info!(path = %self.path.display(), "generated new key");
                Ok(record)
            }
            Err(err) => Err(err),
        }
    }

    fn stage(&self) -> Result<KeyRecord> {
        let record = KeyRecord::generate();
        let staged = self.staged_path();
        self.write(&staged, &record)?;
        debug!(path = %staged.display(), "staged replacement key");
        Ok(record)
    }

    fn commit(&self) -> Result<()> {
        let staged = self.staged_path();
        if !staged.exists() {
            return Err(LockError::Storage {
                reason: format!("no staged key at {}", staged.display()),
            });
        }
        std::fs::rename(&staged, &self.path).map_err(LockError::storage)?;
        info!(path = %self.path.display(), "promoted staged key");
        Ok(())
    }

    fn discard(&self) -> Result<()> {
        remove_if_exists(&self.staged_path())
    }
}

/// In-memory key store for tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyStore {
    inner: Arc<Mutex<Slots>>,
}

#[derive(Debug, Default)]
struct Slots {
    current: Option<KeyRecord>,
    staged: Option<KeyRecord>,
}

impl InMemoryKeyStore {
    pub fn with_key(record: KeyRecord) -> Self {
        let store = Self::default();
        if let Ok(mut slots) = store.inner.lock() {
            slots.current = Some(record);
        }
        store
    }

    /// Swaps in a different key without going through rotation.
    pub fn replace(&self, record: KeyRecord) -> Result<()> {
        self.slots()?.current = Some(record);
        Ok(())
    }

    fn slots(&self) -> Result<std::sync::MutexGuard<'_, Slots>> {
        self.inner.lock().map_err(|err| LockError::Storage {
            reason: format!("lock poisoned: {err}"),
        })
    }
}

impl KeyStore for InMemoryKeyStore {
    fn location(&self) -> PathBuf {
        PathBuf::from("<memory>")
    }

    fn load(&self) -> Result<KeyRecord> {
        self.slots()?
            .current
            .clone()
            .ok_or_else(|| LockError::KeyNotFound {
                path: self.location(),
            })
    }

    fn ensure(&self) -> Result<KeyRecord> {
        let mut slots = self.slots()?;
        Ok(slots.current.get_or_insert_with(KeyRecord::generate).clone())
    }

    fn stage(&self) -> Result<KeyRecord> {
        let record = KeyRecord::generate();
        self.slots()?.staged = Some(record.clone());
        Ok(record)
    }

    fn commit(&self) -> Result<()> {
        let mut slots = self.slots()?;
        let staged = slots.staged.take().ok_or_else(|| LockError::Storage {
            reason: "no staged key".to_string(),
        })?;
        slots.current = Some(staged);
        Ok(())
    }

    fn discard(&self) -> Result<()> {
        self.slots()?.staged = None;
        Ok(())
    }
}

fn encode_key(record: &KeyRecord) -> StoredKey {
    StoredKey {
        key: hex::encode(&record.secret),
        validation_token: record.validation_token(),
    }
}

fn decode_key(bytes: &[u8]) -> std::result::Result<KeyRecord, String> {
    let stored: StoredKey = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    let secret = decode_fixed::<SECRET_LEN>("key", &stored.key)?;
    let validation_token = decode_fixed::<TOKEN_LEN>("validation_token", &stored.validation_token)?;
    Ok(KeyRecord::from_parts(secret, validation_token))
}

fn decode_fixed<const N: usize>(field: &str, value: &str) -> std::result::Result<[u8; N], String> {
    let mut bytes = hex::decode(value).map_err(|e| format!("{field}: {e}"))?;
    if bytes.len() != N {
        let len = bytes.len();
        bytes.zeroize();
        return Err(format!("{field}: expected {N} bytes, got {len}"));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn store_in(dir: &Path) -> FileKeyStore {
        let env = Environment::new(dir, "demo").expect("env");
        FileKeyStore::for_environment(&env)
    }

    #[test]
    fn ensure_creates_then_reuses() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());

        let first = store.ensure().expect("create");
        assert!(store.path().exists());
        assert!(store.path().starts_with(dir.path().join(".keylock/demo")));

        let second = store.ensure().expect("reuse");
        assert_eq!(first, second);
    }

    #[test]
    fn key_file_has_expected_shape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let record = store.ensure().expect("create");

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(store.path()).expect("read")).expect("json");
        assert_eq!(raw["key"].as_str().map(str::len), Some(SECRET_LEN * 2));
        assert_eq!(
            raw["validation_token"].as_str(),
            Some(record.validation_token().as_str())
        );
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        store.ensure().expect("create");

        let mode = fs::metadata(store.path()).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn load_without_file_is_key_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = store_in(dir.path()).load().expect_err("missing");
        assert!(matches!(err, LockError::KeyNotFound { .. }));
    }

    #[test]
    fn corrupt_file_is_reported_not_replaced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        for body in [
            "not json",
            r#"{"key": "abcd", "validation_token": "00"}"#,
            r#"{"key": 1}"#,
        ] {
            fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
            fs::write(store.path(), body).expect("seed");

            assert!(matches!(store.load(), Err(LockError::KeyCorrupt { .. })));
            assert!(matches!(store.ensure(), Err(LockError::KeyCorrupt { .. })));
            assert_eq!(fs::read_to_string(store.path()).expect("read"), body);
        }
    }

    #[test]
    fn rotate_replaces_secret_and_token_together() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let before = store.ensure().expect("create");

        let after = store.rotate().expect("rotate");

        assert_ne!(before.secret(), after.secret());
        assert_ne!(before.validation_token(), after.validation_token());
        assert_eq!(store.load().expect("load"), after);
        assert!(!store.staged_path().exists());
    }

    #[test]
    fn staged_key_leaves_current_untouched_until_commit() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store_in(dir.path());
        let current = store.ensure().expect("create");

        let staged = store.stage().expect("stage");
        assert_eq!(store.load().expect("load"), current);

        store.discard().expect("discard");
        assert!(!store.staged_path().exists());
        assert!(store.commit().is_err());

        store.stage().expect("stage again");
        store.commit().expect("commit");
        assert_ne!(store.load().expect("load"), staged);
    }

    #[test]
    fn debug_output_redacts_secret() {
        let record = KeyRecord::from_parts([0xAB; SECRET_LEN], [0x01; TOKEN_LEN]);
        let debug = format!("{record:?}");
        assert!(!debug.contains("abab"));
        assert!(!debug.contains("171"));
        assert!(debug.contains(&"01".repeat(TOKEN_LEN)));
    }

    #[test]
    fn memory_store_round_trips_rotation() {
        let store = InMemoryKeyStore::default();
        assert!(matches!(store.load(), Err(LockError::KeyNotFound { .. })));

        let first = store.ensure().expect("ensure");
        assert_eq!(store.ensure().expect("ensure again"), first);

        let rotated = store.rotate().expect("rotate");
        assert_ne!(rotated.validation_token(), first.validation_token());
        assert_eq!(store.load().expect("load"), rotated);
    }
}
