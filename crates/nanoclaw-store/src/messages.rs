// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::Result;
use rusqlite::{params, Connection};

use crate::pool::StorePool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub chat_id: String,
    pub message_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    pub timestamp: i64,
    pub from_self: bool,
}

/// Insert a message, or replace it in place if the same `(chat_id, message_id)`
/// was already recorded (e.g. an edited message delivered twice).
pub fn insert_message_sync(conn: &Connection, msg: &Message) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO messages (chat_id, message_id, sender_id, sender_name, content, timestamp, from_self)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(chat_id, message_id) DO UPDATE SET
             sender_id   = excluded.sender_id,
             sender_name = excluded.sender_name,
             content     = excluded.content,
             timestamp   = excluded.timestamp,
             from_self   = excluded.from_self",
        params![
            msg.chat_id,
            msg.message_id,
            msg.sender_id,
            msg.sender_name,
            msg.content,
            msg.timestamp,
            msg.from_self as i64,
        ],
    )?;
    Ok(())
}

/// Messages for `chat_id` strictly newer than `since`, excluding content that
/// begins with `bot_prefix` (self-sent replies on a shared chat account),
/// ordered oldest-first.
pub fn messages_since_sync(
    conn: &Connection,
    chat_id: &str,
    since: i64,
    bot_prefix: &str,
) -> rusqlite::Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT chat_id, message_id, sender_id, sender_name, content, timestamp, from_self
         FROM messages
         WHERE chat_id = ?1 AND timestamp > ?2
         ORDER BY timestamp ASC",
    )?;
    let rows = stmt.query_map(params![chat_id, since], |row| {
        Ok(Message {
            chat_id: row.get(0)?,
            message_id: row.get(1)?,
            sender_id: row.get(2)?,
            sender_name: row.get(3)?,
            content: row.get(4)?,
            timestamp: row.get(5)?,
            from_self: row.get::<_, i64>(6)? != 0,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        let msg = row?;
        if bot_prefix.is_empty() || !msg.content.starts_with(bot_prefix) {
            out.push(msg);
        }
    }
    Ok(out)
}

/// Total character count and row count for `chat_id`, used to decide
/// whether the memory summariser's threshold has been crossed (§4.12).
pub fn chat_message_stats_sync(conn: &Connection, chat_id: &str) -> rusqlite::Result<(i64, i64)> {
    conn.query_row(
        "SELECT COALESCE(SUM(LENGTH(content)), 0), COUNT(*) FROM messages WHERE chat_id = ?1",
        params![chat_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}

/// The `limit` oldest messages for `chat_id`, ascending by timestamp — the
/// batch the memory summariser folds into a narrative summary.
pub fn oldest_messages_sync(conn: &Connection, chat_id: &str, limit: usize) -> rusqlite::Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT chat_id, message_id, sender_id, sender_name, content, timestamp, from_self
         FROM messages
         WHERE chat_id = ?1
         ORDER BY timestamp ASC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![chat_id, limit as i64], |row| {
        Ok(Message {
            chat_id: row.get(0)?,
            message_id: row.get(1)?,
            sender_id: row.get(2)?,
            sender_name: row.get(3)?,
            content: row.get(4)?,
            timestamp: row.get(5)?,
            from_self: row.get::<_, i64>(6)? != 0,
        })
    })?;
    rows.collect()
}

/// Deletes every message for `chat_id` strictly older than `timestamp` —
/// the consolidation half of the memory summariser's atomic upsert-and-delete
/// (§4.12).
pub fn delete_messages_older_than_sync(conn: &Connection, chat_id: &str, timestamp: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM messages WHERE chat_id = ?1 AND timestamp < ?2",
        params![chat_id, timestamp],
    )
}

impl StorePool {
    pub async fn insert_message(&self, msg: Message) -> Result<()> {
        self.interact_with_retry(move |conn| {
            insert_message_sync(conn, &msg)?;
            Ok(())
        })
        .await
    }

    pub async fn messages_since(&self, chat_id: String, since: i64, bot_prefix: String) -> Result<Vec<Message>> {
        self.interact(move |conn| Ok(messages_since_sync(conn, &chat_id, since, &bot_prefix)?))
            .await
    }

    pub async fn chat_message_stats(&self, chat_id: String) -> Result<(i64, i64)> {
        self.interact(move |conn| Ok(chat_message_stats_sync(conn, &chat_id)?)).await
    }

    pub async fn oldest_messages(&self, chat_id: String, limit: usize) -> Result<Vec<Message>> {
        self.interact(move |conn| Ok(oldest_messages_sync(conn, &chat_id, limit)?))
            .await
    }

    pub async fn delete_messages_older_than(&self, chat_id: String, timestamp: i64) -> Result<usize> {
        self.interact_with_retry(move |conn| Ok(delete_messages_older_than_sync(conn, &chat_id, timestamp)?))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(chat: &str, id: &str, content: &str, ts: i64, from_self: bool) -> Message {
        Message {
            chat_id: chat.into(),
            message_id: id.into(),
            sender_id: "u1".into(),
            sender_name: "Alice".into(),
            content: content.into(),
            timestamp: ts,
            from_self,
        }
    }

    #[tokio::test]
    async fn messages_since_excludes_older_and_bot_prefixed() {
        let store = StorePool::open_in_memory().await.unwrap();
        store.insert_message(msg("c1", "m1", "hello", 100, false)).await.unwrap();
        store
            .insert_message(msg("c1", "m2", "[bot] reply", 200, true))
            .await
            .unwrap();
        store.insert_message(msg("c1", "m3", "world", 300, false)).await.unwrap();

        let out = store
            .messages_since("c1".into(), 100, "[bot]".into())
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message_id, "m3");
    }

    #[tokio::test]
    async fn messages_since_orders_oldest_first() {
        let store = StorePool::open_in_memory().await.unwrap();
        store.insert_message(msg("c1", "m2", "second", 200, false)).await.unwrap();
        store.insert_message(msg("c1", "m1", "first", 100, false)).await.unwrap();

        let out = store.messages_since("c1".into(), 0, "".into()).await.unwrap();
        assert_eq!(out.iter().map(|m| m.message_id.as_str()).collect::<Vec<_>>(), vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn insert_upserts_on_duplicate_id() {
        let store = StorePool::open_in_memory().await.unwrap();
        store.insert_message(msg("c1", "m1", "original", 100, false)).await.unwrap();
        store.insert_message(msg("c1", "m1", "edited", 100, false)).await.unwrap();

        let out = store.messages_since("c1".into(), 0, "".into()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "edited");
    }

    #[tokio::test]
    async fn chat_message_stats_sums_content_length() {
        let store = StorePool::open_in_memory().await.unwrap();
        store.insert_message(msg("c1", "m1", "abc", 100, false)).await.unwrap();
        store.insert_message(msg("c1", "m2", "de", 200, false)).await.unwrap();
        store.insert_message(msg("c2", "m3", "unrelated", 100, false)).await.unwrap();

        let (chars, count) = store.chat_message_stats("c1".into()).await.unwrap();
        assert_eq!(chars, 5);
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn oldest_messages_respects_limit_and_order() {
        let store = StorePool::open_in_memory().await.unwrap();
        store.insert_message(msg("c1", "m3", "third", 300, false)).await.unwrap();
        store.insert_message(msg("c1", "m1", "first", 100, false)).await.unwrap();
        store.insert_message(msg("c1", "m2", "second", 200, false)).await.unwrap();

        let out = store.oldest_messages("c1".into(), 2).await.unwrap();
        assert_eq!(out.iter().map(|m| m.message_id.as_str()).collect::<Vec<_>>(), vec!["m1", "m2"]);
    }

    #[tokio::test]
    async fn delete_messages_older_than_removes_only_older_rows() {
        let store = StorePool::open_in_memory().await.unwrap();
        store.insert_message(msg("c1", "m1", "first", 100, false)).await.unwrap();
        store.insert_message(msg("c1", "m2", "second", 200, false)).await.unwrap();
        store.insert_message(msg("c1", "m3", "third", 300, false)).await.unwrap();

        let deleted = store.delete_messages_older_than("c1".into(), 300).await.unwrap();
        assert_eq!(deleted, 2);

        let remaining = store.messages_since("c1".into(), 0, "".into()).await.unwrap();
        assert_eq!(remaining.iter().map(|m| m.message_id.as_str()).collect::<Vec<_>>(), vec!["m3"]);
    }
}
