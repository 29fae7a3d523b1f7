// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use rusqlite::Connection;

/// Current schema version. Bump when adding a new `migrate_*` step below.
const SCHEMA_VERSION: i64 = 2;

/// Run every additive migration up to [`SCHEMA_VERSION`], idempotently.
///
/// Each step checks `sqlite_master`/column existence before altering so the
/// function is safe to call on every process start, regardless of the
/// database's current version.
pub fn run_all_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_meta (version INTEGER NOT NULL);",
    )?;
    let current: i64 = conn
        .query_row("SELECT version FROM schema_meta LIMIT 1", [], |r| r.get(0))
        .unwrap_or(0);

    if current < 1 {
        migrate_initial_schema(conn)?;
    }
    if current < 2 {
        migrate_add_preferences_and_knowledge(conn)?;
    }

    conn.execute("DELETE FROM schema_meta", [])?;
    conn.execute("INSERT INTO schema_meta (version) VALUES (?1)", [SCHEMA_VERSION])?;
    Ok(())
}

fn migrate_initial_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS chats (
            chat_id           TEXT PRIMARY KEY,
            display_name      TEXT NOT NULL DEFAULT '',
            last_message_time INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS messages (
            chat_id    TEXT NOT NULL,
            message_id TEXT NOT NULL,
            sender_id  TEXT NOT NULL,
            sender_name TEXT NOT NULL DEFAULT '',
            content    TEXT NOT NULL DEFAULT '',
            timestamp  INTEGER NOT NULL,
            from_self  INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (chat_id, message_id)
        );
        CREATE INDEX IF NOT EXISTS idx_messages_chat_ts ON messages (chat_id, timestamp);

        CREATE TABLE IF NOT EXISTS scheduled_tasks (
            id             TEXT PRIMARY KEY,
            group_folder   TEXT NOT NULL,
            chat_id        TEXT NOT NULL,
            prompt         TEXT NOT NULL,
            schedule_kind  TEXT NOT NULL,
            schedule_value TEXT NOT NULL,
            context_mode   TEXT NOT NULL DEFAULT 'isolated',
            next_run       INTEGER,
            last_run       INTEGER,
            last_result    TEXT,
            status         TEXT NOT NULL DEFAULT 'active',
            created_at     INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_due ON scheduled_tasks (status, next_run);

        CREATE TABLE IF NOT EXISTS task_run_logs (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id     TEXT NOT NULL REFERENCES scheduled_tasks(id) ON DELETE CASCADE,
            status      TEXT NOT NULL,
            duration_ms INTEGER NOT NULL,
            result_text TEXT,
            created_at  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS usage_records (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            group_folder    TEXT NOT NULL,
            timestamp       INTEGER NOT NULL,
            prompt_tokens   INTEGER,
            response_tokens INTEGER,
            duration_ms     INTEGER NOT NULL,
            model           TEXT,
            is_scheduled    INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_usage_group_ts ON usage_records (group_folder, timestamp);

        CREATE TABLE IF NOT EXISTS memory_summaries (
            group_folder      TEXT PRIMARY KEY,
            summary           TEXT NOT NULL DEFAULT '',
            messages_archived INTEGER NOT NULL DEFAULT 0,
            chars_archived    INTEGER NOT NULL DEFAULT 0,
            created_at        INTEGER NOT NULL,
            updated_at        INTEGER NOT NULL
        );
        ",
    )
}

fn migrate_add_preferences_and_knowledge(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS preferences (
            group_folder TEXT NOT NULL,
            key          TEXT NOT NULL,
            value        TEXT NOT NULL,
            updated_at   INTEGER NOT NULL,
            PRIMARY KEY (group_folder, key)
        );

        CREATE TABLE IF NOT EXISTS knowledge_docs (
            group_folder TEXT NOT NULL,
            filename     TEXT NOT NULL,
            title        TEXT NOT NULL DEFAULT '',
            content      TEXT NOT NULL DEFAULT '',
            size_chars   INTEGER NOT NULL DEFAULT 0,
            created_at   INTEGER NOT NULL,
            updated_at   INTEGER NOT NULL,
            PRIMARY KEY (group_folder, filename)
        );
        ",
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_all_migrations(&conn).unwrap();
        run_all_migrations(&conn).unwrap();
        let version: i64 = conn
            .query_row("SELECT version FROM schema_meta", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn all_tables_exist_after_migration() {
        let conn = Connection::open_in_memory().unwrap();
        run_all_migrations(&conn).unwrap();
        for table in [
            "chats",
            "messages",
            "scheduled_tasks",
            "task_run_logs",
            "usage_records",
            "memory_summaries",
            "preferences",
            "knowledge_docs",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT count(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}
