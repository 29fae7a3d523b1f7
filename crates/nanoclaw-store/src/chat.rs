// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::pool::StorePool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub chat_id: String,
    pub display_name: String,
    pub last_message_time: i64,
}

/// Insert or update a chat's display name, advancing `last_message_time`
/// monotonically (never moving it backwards on an out-of-order upsert).
pub fn upsert_chat_sync(
    conn: &Connection,
    chat_id: &str,
    display_name: &str,
    message_time: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO chats (chat_id, display_name, last_message_time)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(chat_id) DO UPDATE SET
             display_name = excluded.display_name,
             last_message_time = MAX(chats.last_message_time, excluded.last_message_time)",
        params![chat_id, display_name, message_time],
    )?;
    Ok(())
}

pub fn get_chat_sync(conn: &Connection, chat_id: &str) -> rusqlite::Result<Option<Chat>> {
    conn.query_row(
        "SELECT chat_id, display_name, last_message_time FROM chats WHERE chat_id = ?1",
        params![chat_id],
        |row| {
            Ok(Chat {
                chat_id: row.get(0)?,
                display_name: row.get(1)?,
                last_message_time: row.get(2)?,
            })
        },
    )
    .optional()
}

impl StorePool {
    pub async fn upsert_chat(&self, chat_id: String, display_name: String, message_time: i64) -> Result<()> {
        self.interact_with_retry(move |conn| {
            upsert_chat_sync(conn, &chat_id, &display_name, message_time)?;
            Ok(())
        })
        .await
    }

    pub async fn get_chat(&self, chat_id: String) -> Result<Option<Chat>> {
        self.interact(move |conn| Ok(get_chat_sync(conn, &chat_id)?)).await
    }
}
