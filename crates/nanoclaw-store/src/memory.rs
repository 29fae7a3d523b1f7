// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::pool::StorePool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySummary {
    pub group_folder: String,
    pub summary: String,
    pub messages_archived: i64,
    pub chars_archived: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

pub fn get_memory_summary_sync(conn: &Connection, group_folder: &str) -> rusqlite::Result<Option<MemorySummary>> {
    conn.query_row(
        "SELECT group_folder, summary, messages_archived, chars_archived, created_at, updated_at
         FROM memory_summaries WHERE group_folder = ?1",
        params![group_folder],
        |row| {
            Ok(MemorySummary {
                group_folder: row.get(0)?,
                summary: row.get(1)?,
                messages_archived: row.get(2)?,
                chars_archived: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        },
    )
    .optional()
}

/// Replace the narrative summary while **accumulating** the archived counters
/// on top of whatever was already recorded for this group.
pub fn upsert_memory_summary_sync(
    conn: &Connection,
    group_folder: &str,
    summary: &str,
    messages_archived_delta: i64,
    chars_archived_delta: i64,
    now: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO memory_summaries
         (group_folder, summary, messages_archived, chars_archived, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(group_folder) DO UPDATE SET
             summary           = excluded.summary,
             messages_archived = memory_summaries.messages_archived + ?3,
             chars_archived    = memory_summaries.chars_archived + ?4,
             updated_at        = ?5",
        params![group_folder, summary, messages_archived_delta, chars_archived_delta, now],
    )?;
    Ok(())
}

impl StorePool {
    pub async fn get_memory_summary(&self, group_folder: String) -> Result<Option<MemorySummary>> {
        self.interact(move |conn| Ok(get_memory_summary_sync(conn, &group_folder)?))
            .await
    }

    pub async fn upsert_memory_summary(
        &self,
        group_folder: String,
        summary: String,
        messages_archived_delta: i64,
        chars_archived_delta: i64,
        now: i64,
    ) -> Result<()> {
        self.interact_with_retry(move |conn| {
            Ok(upsert_memory_summary_sync(
                conn,
                &group_folder,
                &summary,
                messages_archived_delta,
                chars_archived_delta,
                now,
            )?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_upsert_creates_summary_with_given_counters() {
        let store = StorePool::open_in_memory().await.unwrap();
        store
            .upsert_memory_summary("main".into(), "first summary".into(), 10, 500, 100)
            .await
            .unwrap();

        let summary = store.get_memory_summary("main".into()).await.unwrap().unwrap();
        assert_eq!(summary.summary, "first summary");
        assert_eq!(summary.messages_archived, 10);
        assert_eq!(summary.chars_archived, 500);
        assert_eq!(summary.created_at, 100);
    }

    #[tokio::test]
    async fn second_upsert_accumulates_counters_and_replaces_narrative() {
        let store = StorePool::open_in_memory().await.unwrap();
        store
            .upsert_memory_summary("main".into(), "first".into(), 10, 500, 100)
            .await
            .unwrap();
        store
            .upsert_memory_summary("main".into(), "second, now longer".into(), 5, 200, 200)
            .await
            .unwrap();

        let summary = store.get_memory_summary("main".into()).await.unwrap().unwrap();
        assert_eq!(summary.summary, "second, now longer");
        assert_eq!(summary.messages_archived, 15);
        assert_eq!(summary.chars_archived, 700);
        assert_eq!(summary.updated_at, 200);
        assert_eq!(summary.created_at, 100);
    }

    #[tokio::test]
    async fn missing_summary_returns_none() {
        let store = StorePool::open_in_memory().await.unwrap();
        assert!(store.get_memory_summary("main".into()).await.unwrap().is_none());
    }
}
