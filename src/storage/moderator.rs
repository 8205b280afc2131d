//! Persisted moderator role.
//!
//! A moderator record is JSON stored under a single namespaced key. Its
//! presence at startup restores elevated privileges; a 401 from any admin
//! call clears it by writing an empty value.

use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::schema::Database;

/// Elevated-privilege credentials, held in memory with the token redacted.
#[derive(Clone)]
pub struct Moderator {
    pub name: Option<String>,
    pub token: SecretString,
}

/// Mask the token in Debug output.
impl std::fmt::Debug for Moderator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Moderator")
            .field("name", &self.name)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct StoredModerator {
    #[serde(default)]
    name: Option<String>,
    token: String,
}

impl Database {
    /// Read the moderator record under `key`.
    ///
    /// Missing keys, empty values (a cleared record) and unparseable JSON
    /// all yield `None`; the last case is logged.
    pub async fn load_moderator(&self, key: &str) -> Result<Option<Moderator>> {
        let Some(raw) = self.get_preference(key).await? else {
            return Ok(None);
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str::<StoredModerator>(&raw) {
            Ok(stored) if !stored.token.is_empty() => Ok(Some(Moderator {
                name: stored.name,
                token: SecretString::from(stored.token),
            })),
            Ok(_) => {
                tracing::warn!(key, "Moderator record has an empty token, ignoring");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Moderator record is not valid JSON, ignoring");
                Ok(None)
            }
        }
    }

    pub async fn save_moderator(&self, key: &str, moderator: &Moderator) -> Result<()> {
        let stored = StoredModerator {
            name: moderator.name.clone(),
            token: moderator.token.expose_secret().to_string(),
        };
        self.set_preference(key, &serde_json::to_string(&stored)?)
            .await
    }

    /// Drop elevated privileges by blanking the record.
    pub async fn clear_moderator(&self, key: &str) -> Result<()> {
        self.set_preference(key, "").await
    }
}
