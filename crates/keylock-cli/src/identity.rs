use std::process::Command;

use keylock_core::{identity::validate_operator, LockError};
use tracing::debug;

use crate::config::Config;

/// Who is running this operation: the config override, otherwise git's
/// `user.name` / `user.email`.
pub fn resolve_operator(config: &Config) -> Result<String, LockError> {
    if let Some(operator) = config.operator.as_deref() {
        return validate_operator(operator).map(str::to_string);
    }
    let name = git_config("user.name");
    let email = git_config("user.email");
    compose(name, email)
}

fn git_config(key: &str) -> Option<String> {
    let output = Command::new("git")
        .args(["config", "--get", key])
        .output()
        .map_err(|err| debug!("git unavailable: {err}"))
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8(output.stdout).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn compose(name: Option<String>, email: Option<String>) -> Result<String, LockError> {
    let operator = match (name, email) {
        (Some(name), Some(email)) => format!("{name} <{email}>"),
        (Some(name), None) => name,
        (None, Some(email)) => email,
        (None, None) => {
            return Err(LockError::IdentityUnavailable {
                reason: "set `git config user.name`/`user.email` or `operator` in the keylock config"
                    .to_string(),
            })
        }
    };
    let operator = validate_operator(&operator)?.to_string();
    Ok(operator)
}
