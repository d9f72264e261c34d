use std::{
    fs, io,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

pub const DEFAULT_FILE: &str = ".env";

/// User-level configuration loaded from `~/.config/keylock/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Protected file, relative to the working directory.
    pub file: Option<PathBuf>,
    /// Override for the key root (defaults to `~/.keylock`).
    pub key_root: Option<PathBuf>,
    /// Override for the project identifier (defaults to the directory name).
    pub project: Option<String>,
    /// Override for the operator identity (defaults to git's user).
    pub operator: Option<String>,
}

impl Config {
    /// CLI flag first, then config, then `.env`.
    pub fn protected_file(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.file.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FILE))
    }
}

const APP_DIR: &str = "keylock";
const CONFIG_FILE: &str = "config.toml";

/// Settings from the user's config file, or defaults when there is none.
pub fn load() -> Result<Config> {
    load_from_path(default_path()?)
}

/// A missing file and a blank file both mean "no overrides".
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let contents = match fs::read_to_string(path.as_ref()) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(err) => return Err(err.into()),
    };
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(toml::from_str(&contents)?)
}

/// `<config_dir>/keylock/config.toml`, e.g. `~/.config/keylock/config.toml` on Linux.
pub fn default_path() -> Result<PathBuf> {
    config_dir()
        .map(|base| base.join(APP_DIR).join(CONFIG_FILE))
        .ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))
}

/// Backs `keylock config init`: serializes the settings currently in effect
/// (every field unset on a fresh install) to the default path. An existing
/// file is never overwritten; its path is returned instead.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_default_when_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_from_path(dir.path().join("config.toml")).expect("load");
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn returns_default_when_blank() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "  \n").expect("write");
        assert_eq!(load_from_path(&path).expect("load"), Config::default());
    }

    #[test]
    fn parses_custom_config() {
        let contents = r#"
            file = "config/secrets.env"
            key_root = "/srv/keylock"
            project = "billing"
            operator = "Ada <ada@example.com>"
        "#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, contents).expect("write temp config");

        let cfg = load_from_path(&path).expect("load");
        assert_eq!(
            cfg,
            Config {
                file: Some(PathBuf::from("config/secrets.env")),
                key_root: Some(PathBuf::from("/srv/keylock")),
                project: Some("billing".into()),
                operator: Some("Ada <ada@example.com>".into()),
            }
        );
    }

    #[test]
    fn flag_beats_config_beats_default() {
        let cfg = Config {
            file: Some(PathBuf::from("from-config.env")),
            ..Config::default()
        };
        assert_eq!(
            cfg.protected_file(Some(PathBuf::from("flag.env"))),
            PathBuf::from("flag.env")
        );
        assert_eq!(cfg.protected_file(None), PathBuf::from("from-config.env"));
        assert_eq!(
            Config::default().protected_file(None),
            PathBuf::from(DEFAULT_FILE)
        );
    }

    #[test]
    fn write_default_creates_file_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/config.toml");
        let cfg = Config {
            project: Some("billing".into()),
            ..Config::default()
        };

        write_to_path_if_missing(&cfg, &path).expect("write should succeed");
        let other = Config::default();
        let second = write_to_path_if_missing(&other, &path).expect("second write ok");
        assert_eq!(second, path);
        let loaded = load_from_path(&path).expect("load");
        assert_eq!(loaded, cfg);
    }
}
