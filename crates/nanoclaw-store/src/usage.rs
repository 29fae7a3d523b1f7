// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::pool::StorePool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub group_folder: String,
    pub timestamp: i64,
    pub prompt_tokens: Option<i64>,
    pub response_tokens: Option<i64>,
    pub duration_ms: i64,
    pub model: Option<String>,
    pub is_scheduled: bool,
}

pub fn insert_usage_sync(conn: &Connection, rec: &UsageRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO usage_records
         (group_folder, timestamp, prompt_tokens, response_tokens, duration_ms, model, is_scheduled)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            rec.group_folder,
            rec.timestamp,
            rec.prompt_tokens,
            rec.response_tokens,
            rec.duration_ms,
            rec.model,
            rec.is_scheduled as i64,
        ],
    )?;
    Ok(())
}

/// Percentile of `duration_ms` within `[since, until)` for a group, computed
/// by an offset query over the ordered column (no window functions required).
pub fn duration_percentile_sync(
    conn: &Connection,
    group_folder: &str,
    since: i64,
    until: i64,
    percentile: f64,
) -> rusqlite::Result<Option<i64>> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM usage_records WHERE group_folder = ?1 AND timestamp >= ?2 AND timestamp < ?3",
        params![group_folder, since, until],
        |r| r.get(0),
    )?;
    if count == 0 {
        return Ok(None);
    }
    let offset = (((count as f64) * percentile).ceil() as i64 - 1).clamp(0, count - 1);
    conn.query_row(
        "SELECT duration_ms FROM usage_records
         WHERE group_folder = ?1 AND timestamp >= ?2 AND timestamp < ?3
         ORDER BY duration_ms ASC
         LIMIT 1 OFFSET ?4",
        params![group_folder, since, until, offset],
        |r| r.get(0),
    )
    .optional()
}

pub fn total_tokens_sync(
    conn: &Connection,
    group_folder: &str,
    since: i64,
    until: i64,
) -> rusqlite::Result<(i64, i64)> {
    conn.query_row(
        "SELECT COALESCE(SUM(prompt_tokens), 0), COALESCE(SUM(response_tokens), 0)
         FROM usage_records
         WHERE group_folder = ?1 AND timestamp >= ?2 AND timestamp < ?3",
        params![group_folder, since, until],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )
}

impl StorePool {
    pub async fn insert_usage(&self, rec: UsageRecord) -> Result<()> {
        self.interact_with_retry(move |conn| Ok(insert_usage_sync(conn, &rec)?)).await
    }

    pub async fn duration_p50(&self, group_folder: String, since: i64, until: i64) -> Result<Option<i64>> {
        self.interact(move |conn| Ok(duration_percentile_sync(conn, &group_folder, since, until, 0.5)?))
            .await
    }

    pub async fn duration_p95(&self, group_folder: String, since: i64, until: i64) -> Result<Option<i64>> {
        self.interact(move |conn| Ok(duration_percentile_sync(conn, &group_folder, since, until, 0.95)?))
            .await
    }

    pub async fn total_tokens(&self, group_folder: String, since: i64, until: i64) -> Result<(i64, i64)> {
        self.interact(move |conn| Ok(total_tokens_sync(conn, &group_folder, since, until)?))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(group: &str, ts: i64, duration_ms: i64) -> UsageRecord {
        UsageRecord {
            group_folder: group.into(),
            timestamp: ts,
            prompt_tokens: Some(10),
            response_tokens: Some(20),
            duration_ms,
            model: Some("gemini-2.0-flash".into()),
            is_scheduled: false,
        }
    }

    #[tokio::test]
    async fn percentile_with_no_records_is_none() {
        let store = StorePool::open_in_memory().await.unwrap();
        assert_eq!(store.duration_p50("main".into(), 0, 1000).await.unwrap(), None);
    }

    #[tokio::test]
    async fn p50_of_ten_evenly_spaced_durations() {
        let store = StorePool::open_in_memory().await.unwrap();
        for i in 1..=10 {
            store.insert_usage(rec("main", i, i * 100)).await.unwrap();
        }
        let p50 = store.duration_p50("main".into(), 0, 100).await.unwrap().unwrap();
        assert_eq!(p50, 500);
    }

    #[tokio::test]
    async fn p95_picks_near_top_of_range() {
        let store = StorePool::open_in_memory().await.unwrap();
        for i in 1..=20 {
            store.insert_usage(rec("main", i, i * 100)).await.unwrap();
        }
        let p95 = store.duration_p95("main".into(), 0, 100).await.unwrap().unwrap();
        assert_eq!(p95, 1900);
    }

    #[tokio::test]
    async fn total_tokens_sums_within_window() {
        let store = StorePool::open_in_memory().await.unwrap();
        store.insert_usage(rec("main", 10, 100)).await.unwrap();
        store.insert_usage(rec("main", 20, 100)).await.unwrap();
        store.insert_usage(rec("main", 999, 100)).await.unwrap();

        let (prompt, response) = store.total_tokens("main".into(), 0, 100).await.unwrap();
        assert_eq!(prompt, 20);
        assert_eq!(response, 40);
    }
}
