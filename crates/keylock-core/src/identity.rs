use crate::error::{LockError, Result};

/// Validates an operator identity supplied by the caller. Blank identities
/// are refused so every binding record names a real person.
pub fn validate_operator(operator: &str) -> Result<&str> {
    let trimmed = operator.trim();
    if trimmed.is_empty() {
        return Err(LockError::IdentityUnavailable {
            reason: "operator identity is empty".to_string(),
        });
    }
    Ok(trimmed)
}
