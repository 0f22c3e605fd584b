//! Opaque user identity.
//!
//! Every storage path and history collection is namespaced by a `UserId`.
//! The id either comes from configuration or is an anonymous UUID created
//! on first use and kept in the data directory.

use crate::config::IdentityConfig;
use crate::error::AuthError;
use std::fmt;
use std::fs;
use std::path::Path;

const ANONYMOUS_ID_FILE: &str = "anonymous-id";

/// Validated user identifier, safe to embed in a path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    /// Validate an id.
    ///
    /// Rejects empty ids and anything that could escape a path segment.
    pub fn new(id: impl Into<String>) -> Result<Self, AuthError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(AuthError::new("user id is empty"));
        }
        if trimmed == "." || trimmed == ".." {
            return Err(AuthError::new(format!("invalid user id: {trimmed}")));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(AuthError::new(format!(
                "user id contains unsupported characters: {trimmed}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve the identity for this process.
///
/// Uses the configured id when set; otherwise loads (or creates) the anonymous
/// id stored under `data_dir`.
pub fn resolve(config: &IdentityConfig, data_dir: &Path) -> Result<UserId, AuthError> {
    if let Some(id) = &config.user_id {
        return UserId::new(id.as_str());
    }
    load_or_create_anonymous(data_dir)
}

fn load_or_create_anonymous(data_dir: &Path) -> Result<UserId, AuthError> {
    let path = data_dir.join(ANONYMOUS_ID_FILE);
    match fs::read_to_string(&path) {
        Ok(contents) => UserId::new(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let id = uuid::Uuid::new_v4().to_string();
            fs::create_dir_all(data_dir).map_err(|e| {
                AuthError::new(format!("cannot create {}: {e}", data_dir.display()))
            })?;
            fs::write(&path, &id).map_err(|e| {
                AuthError::new(format!("cannot store anonymous id at {}: {e}", path.display()))
            })?;
            tracing::info!(user = %id, "created anonymous identity");
            UserId::new(id)
        }
        Err(e) => Err(AuthError::new(format!(
            "cannot read anonymous id at {}: {e}",
            path.display()
        ))),
    }
}
