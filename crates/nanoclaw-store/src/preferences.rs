// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::pool::StorePool;

/// The only preference keys that may be written. Every consumer (tool schema,
/// validation, display) imports this single list rather than keeping its own
/// copy, so it cannot drift out of sync with itself (§14).
pub const ALLOWED_PREFERENCE_KEYS: &[&str] = &[
    "language",
    "nickname",
    "response_style",
    "interests",
    "timezone",
    "custom_instructions",
];

pub fn is_allowed_preference_key(key: &str) -> bool {
    ALLOWED_PREFERENCE_KEYS.contains(&key)
}

pub fn set_preference_sync(
    conn: &Connection,
    group_folder: &str,
    key: &str,
    value: &str,
    now: i64,
) -> Result<()> {
    if !is_allowed_preference_key(key) {
        return Err(anyhow!("preference key {key:?} is not recognised"));
    }
    conn.execute(
        "INSERT INTO preferences (group_folder, key, value, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(group_folder, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![group_folder, key, value, now],
    )?;
    Ok(())
}

pub fn get_preference_sync(conn: &Connection, group_folder: &str, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM preferences WHERE group_folder = ?1 AND key = ?2",
        params![group_folder, key],
        |row| row.get(0),
    )
    .optional()
}

pub fn all_preferences_sync(conn: &Connection, group_folder: &str) -> rusqlite::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT key, value FROM preferences WHERE group_folder = ?1 ORDER BY key")?;
    let rows = stmt.query_map(params![group_folder], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

impl StorePool {
    pub async fn set_preference(&self, group_folder: String, key: String, value: String, now: i64) -> Result<()> {
        self.interact_with_retry(move |conn| set_preference_sync(conn, &group_folder, &key, &value, now))
            .await
    }

    pub async fn get_preference(&self, group_folder: String, key: String) -> Result<Option<String>> {
        self.interact(move |conn| Ok(get_preference_sync(conn, &group_folder, &key)?))
            .await
    }

    pub async fn all_preferences(&self, group_folder: String) -> Result<Vec<(String, String)>> {
        self.interact(move |conn| Ok(all_preferences_sync(conn, &group_folder)?))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get_allowed_key_round_trips() {
        let store = StorePool::open_in_memory().await.unwrap();
        store
            .set_preference("main".into(), "nickname".into(), "Andy".into(), 100)
            .await
            .unwrap();
        let value = store.get_preference("main".into(), "nickname".into()).await.unwrap();
        assert_eq!(value.as_deref(), Some("Andy"));
    }

    #[tokio::test]
    async fn set_rejects_unrecognised_key() {
        let store = StorePool::open_in_memory().await.unwrap();
        let result = store
            .set_preference("main".into(), "favorite_color".into(), "blue".into(), 100)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn set_overwrites_existing_value() {
        let store = StorePool::open_in_memory().await.unwrap();
        store.set_preference("main".into(), "language".into(), "en".into(), 100).await.unwrap();
        store.set_preference("main".into(), "language".into(), "sv".into(), 200).await.unwrap();
        let value = store.get_preference("main".into(), "language".into()).await.unwrap();
        assert_eq!(value.as_deref(), Some("sv"));
    }

    #[tokio::test]
    async fn all_preferences_lists_every_set_key_sorted() {
        let store = StorePool::open_in_memory().await.unwrap();
        store.set_preference("main".into(), "timezone".into(), "UTC".into(), 100).await.unwrap();
        store.set_preference("main".into(), "language".into(), "en".into(), 100).await.unwrap();
        let all = store.all_preferences("main".into()).await.unwrap();
        assert_eq!(all, vec![("language".to_string(), "en".to_string()), ("timezone".to_string(), "UTC".to_string())]);
    }
}
