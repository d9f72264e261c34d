use std::path::{Path, PathBuf};

use crate::config::Config;
use color_eyre::Result;
use dirs::home_dir;
use keylock_core::environment::Environment;
use keylock_storage::{key_store::FileKeyStore, protected_file::ProtectedFile};
use tracing::debug;

/// Build the key environment from config overrides, the home directory and
/// the working directory.
pub fn environment(config: &Config, cwd: &Path) -> Result<Environment> {
    let home = home_dir().ok_or_else(|| color_eyre::eyre::eyre!("no home dir available"))?;
    environment_with_home(config, &home, cwd)
}

fn environment_with_home(config: &Config, home: &Path, cwd: &Path) -> Result<Environment> {
    let env = match (&config.key_root, &config.project) {
        (Some(root), Some(project)) => Environment::with_key_root(root.clone(), project.clone())?,
        (Some(root), None) => {
            let project = Environment::for_project_dir(home, cwd)?;
            Environment::with_key_root(root.clone(), project.project_id())?
        }
        (None, Some(project)) => Environment::new(home, project.clone())?,
        (None, None) => Environment::for_project_dir(home, cwd)?,
    };
    Ok(env)
}

/// Build the protected file handle backed by the on-disk key store.
pub fn protected_file(
    config: &Config,
    file_flag: Option<PathBuf>,
) -> Result<ProtectedFile<FileKeyStore>> {
    let cwd = std::env::current_dir()?;
    let env = environment(config, &cwd)?;
    let target = config.protected_file(file_flag);
    debug!(file = %target.display(), key = %env.key_path().display(), "resolved paths");
    Ok(ProtectedFile::new(target, FileKeyStore::for_environment(&env)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_home_and_directory_name() {
        let env = environment_with_home(
            &Config::default(),
            Path::new("/home/ada"),
            Path::new("/work/billing"),
        )
        .expect("env");
        assert_eq!(
            env.key_path(),
            PathBuf::from("/home/ada/.keylock/billing/key.json")
        );
    }

    #[test]
    fn config_overrides_root_and_project() {
        let config = Config {
            key_root: Some(PathBuf::from("/srv/keys")),
            project: Some("payments".into()),
            ..Config::default()
        };
        let env = environment_with_home(&config, Path::new("/home/ada"), Path::new("/work/x"))
            .expect("env");
        assert_eq!(env.key_path(), PathBuf::from("/srv/keys/payments/key.json"));
    }

    #[test]
    fn root_override_keeps_directory_name() {
        let config = Config {
            key_root: Some(PathBuf::from("/srv/keys")),
            ..Config::default()
        };
        let env = environment_with_home(&config, Path::new("/home/ada"), Path::new("/work/billing"))
            .expect("env");
        assert_eq!(env.key_path(), PathBuf::from("/srv/keys/billing/key.json"));
    }
}
