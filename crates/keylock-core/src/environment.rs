use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{LockError, Result};

const KEY_ROOT_DIR: &str = ".keylock";
const KEY_FILE_NAME: &str = "key.json";

/// Where keys live for one project. Built once by the caller (from the home
/// directory and the working directory in production, a temp dir in tests)
/// and handed to the key store, so nothing reads process globals ad hoc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    key_root: PathBuf,
    project_id: String,
}

impl Environment {
    /// Keys under `<home>/.keylock/<project_id>/`.
    pub fn new(home: impl AsRef<Path>, project_id: impl Into<String>) -> Result<Self> {
        Self::with_key_root(home.as_ref().join(KEY_ROOT_DIR), project_id)
    }

    pub fn with_key_root(key_root: impl Into<PathBuf>, project_id: impl Into<String>) -> Result<Self> {
        let project_id = project_id.into();
        validate_project_id(&project_id)?;
        Ok(Self {
            key_root: key_root.into(),
            project_id,
        })
    }

    /// Uses the project directory's own name as the identifier.
    pub fn for_project_dir(home: impl AsRef<Path>, project_dir: &Path) -> Result<Self> {
        let name = project_dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| LockError::Storage {
                reason: format!("cannot derive project name from {}", project_dir.display()),
            })?;
        debug!(project = name, "derived project identifier");
        Self::new(home, name)
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn key_dir(&self) -> PathBuf {
        self.key_root.join(&self.project_id)
    }

    pub fn key_path(&self) -> PathBuf {
        self.key_dir().join(KEY_FILE_NAME)
    }
}

fn validate_project_id(id: &str) -> Result<()> {
    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(LockError::Storage {
            reason: format!("invalid project identifier: {id:?}"),
        }),
    }
}
