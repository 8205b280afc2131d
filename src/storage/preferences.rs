use anyhow::Result;

use super::schema::Database;

impl Database {
    // ========================================================================
    // Namespaced Key-Value Store
    // ========================================================================

    /// Value stored under `key` (e.g. `feedsync:mod`), or `None` if the key
    /// was never written. A cleared value reads back as `Some("")`.
    pub async fn get_preference(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM user_preferences WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    /// Insert or overwrite `key`, bumping its timestamp.
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (key, value, updated_at)
            VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(key) DO UPDATE
                SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every entry whose key starts with `prefix`, sorted by key.
    ///
    /// Matching is literal, so `_` and `%` in a namespace are not wildcards.
    pub async fn get_preferences_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let entries = sqlx::query_as::<_, (String, String)>(
            "SELECT key, value FROM user_preferences WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
