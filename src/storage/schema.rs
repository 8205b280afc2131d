use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use super::types::{is_lock_message, DatabaseError};

// ============================================================================
// Database
// ============================================================================

/// Local key-value store for state that must survive restarts.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

/// Create the database file readable by the owner only. The moderator token
/// is stored in it.
#[cfg(unix)]
fn create_private_file(path: &std::path::Path) {
    use std::os::unix::fs::OpenOptionsExt;

    if path.exists() || !path.parent().is_some_and(|dir| dir.exists()) {
        return;
    }
    // On failure SQLite reports the problem when connecting
    let _ = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path);
}

impl Database {
    /// Open (creating if needed) the database at `path` and migrate it.
    /// `":memory:"` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// `DatabaseError::InstanceLocked` when another process holds the file,
    /// `DatabaseError::Migration` when the schema cannot be created.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        #[cfg(unix)]
        if path != ":memory:" {
            create_private_file(std::path::Path::new(path));
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path))
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        // Preference traffic is a handful of tiny reads and writes
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self { pool };
        if let Err(e) = db.migrate().await {
            let message = e.to_string();
            return Err(if is_lock_message(&message) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(message)
            });
        }
        Ok(db)
    }

    /// Create the schema in one transaction. Safe to repeat.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Keys are namespaced as `<namespace>:<name>`
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
