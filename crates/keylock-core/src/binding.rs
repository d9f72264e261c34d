use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LockError, Result};

/// Whether the last write came from a plain encrypt or a key rotation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Stable,
    Rotated,
}

impl KeyStatus {
    pub fn from_rotated(rotated: bool) -> Self {
        if rotated {
            KeyStatus::Rotated
        } else {
            KeyStatus::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Stable => "stable",
            KeyStatus::Rotated => "rotated",
        }
    }
}

/// Metadata written next to the protected file after every encrypt or
/// rotate. Overwritten wholesale, never merged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BindingRecord {
    pub last_encrypted_by: String,
    pub key_path: String,
    pub key_status: KeyStatus,
    /// Hex copy of the key record's validation token at time of writing.
    pub validation_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl BindingRecord {
    pub fn new(
        operator: impl Into<String>,
        key_path: impl Into<String>,
        validation_token: impl Into<String>,
        key_status: KeyStatus,
    ) -> Self {
        Self {
            last_encrypted_by: operator.into(),
            key_path: key_path.into(),
            key_status,
            validation_token: validation_token.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn matches(&self, validation_token: &str) -> bool {
        self.validation_token == validation_token
    }

    /// Gate run before any decrypt: fails with `BindingMismatch` naming the
    /// last operator unless `validation_token` is the one recorded here.
    pub fn verify(&self, validation_token: &str, protected: &Path) -> Result<()> {
        if self.matches(validation_token) {
            return Ok(());
        }
        Err(LockError::BindingMismatch {
            path: protected.to_path_buf(),
            operator: self.last_encrypted_by.clone(),
            timestamp: self.timestamp_label(),
        })
    }

    pub fn timestamp_label(&self) -> String {
        self.timestamp
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_else(|| "an unknown time".to_string())
    }
}
