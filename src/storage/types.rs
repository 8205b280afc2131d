use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from opening or migrating the preferences database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another feedsync process holds the database
    #[error("The preferences database is locked by another process")]
    InstanceLocked,

    #[error("Database migration failed: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

/// SQLite messages meaning the file is held by someone else
/// (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
const LOCK_MARKERS: &[&str] = &[
    "database is locked",
    "database table is locked",
    "sqlite_busy",
    "sqlite_locked",
    "unable to open database file",
];

pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    LOCK_MARKERS.iter().any(|marker| message.contains(marker))
}

impl DatabaseError {
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            DatabaseError::InstanceLocked
        } else {
            DatabaseError::Other(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_messages_detected() {
        assert!(is_lock_message("error returned from database: (code: 5) database is locked"));
        assert!(is_lock_message("SQLITE_BUSY"));
        assert!(!is_lock_message("no such table: user_preferences"));
    }
}
