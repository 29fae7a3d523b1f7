// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::pool::StorePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl TaskStatus {
    fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "paused" => TaskStatus::Paused,
            "completed" => TaskStatus::Completed,
            "cancelled" => TaskStatus::Cancelled,
            _ => TaskStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    Isolated,
    Group,
}

impl ContextMode {
    fn as_str(self) -> &'static str {
        match self {
            ContextMode::Isolated => "isolated",
            ContextMode::Group => "group",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "group" => ContextMode::Group,
            _ => ContextMode::Isolated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub id: String,
    pub group_folder: String,
    pub chat_id: String,
    pub prompt: String,
    pub schedule_kind: String,
    pub schedule_value: String,
    pub context_mode: ContextMode,
    pub next_run: Option<i64>,
    pub last_run: Option<i64>,
    pub last_result: Option<String>,
    pub status: TaskStatus,
    pub created_at: i64,
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<ScheduledTask> {
    Ok(ScheduledTask {
        id: row.get(0)?,
        group_folder: row.get(1)?,
        chat_id: row.get(2)?,
        prompt: row.get(3)?,
        schedule_kind: row.get(4)?,
        schedule_value: row.get(5)?,
        context_mode: ContextMode::from_str(&row.get::<_, String>(6)?),
        next_run: row.get(7)?,
        last_run: row.get(8)?,
        last_result: row.get(9)?,
        status: TaskStatus::from_str(&row.get::<_, String>(10)?),
        created_at: row.get(11)?,
    })
}

const TASK_COLUMNS: &str = "id, group_folder, chat_id, prompt, schedule_kind, schedule_value, \
     context_mode, next_run, last_run, last_result, status, created_at";

pub fn create_task_sync(conn: &Connection, task: &ScheduledTask) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO scheduled_tasks
         (id, group_folder, chat_id, prompt, schedule_kind, schedule_value, context_mode,
          next_run, last_run, last_result, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            task.id,
            task.group_folder,
            task.chat_id,
            task.prompt,
            task.schedule_kind,
            task.schedule_value,
            task.context_mode.as_str(),
            task.next_run,
            task.last_run,
            task.last_result,
            task.status.as_str(),
            task.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_task_sync(conn: &Connection, id: &str) -> rusqlite::Result<Option<ScheduledTask>> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE id = ?1"),
        params![id],
        row_to_task,
    )
    .optional()
}

/// Tasks due to fire: `status = active AND next_run <= now`, ordered by `next_run`.
pub fn due_tasks_sync(conn: &Connection, now: i64) -> rusqlite::Result<Vec<ScheduledTask>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM scheduled_tasks
         WHERE status = 'active' AND next_run IS NOT NULL AND next_run <= ?1
         ORDER BY next_run ASC"
    ))?;
    let rows = stmt.query_map(params![now], row_to_task)?;
    rows.collect()
}

pub fn set_task_status_sync(conn: &Connection, id: &str, status: TaskStatus) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE scheduled_tasks SET status = ?2 WHERE id = ?1",
        params![id, status.as_str()],
    )?;
    Ok(())
}

/// Record the outcome of a run: updates `last_run`/`last_result`/`next_run`,
/// and marks the task `completed` iff the newly-computed `next_run` is null
/// (a one-shot or exhausted recurring schedule).
pub fn update_after_run_sync(
    conn: &Connection,
    id: &str,
    next_run: Option<i64>,
    last_run: i64,
    result_summary: &str,
) -> rusqlite::Result<()> {
    let status = if next_run.is_none() {
        TaskStatus::Completed.as_str()
    } else {
        TaskStatus::Active.as_str()
    };
    conn.execute(
        "UPDATE scheduled_tasks
         SET next_run = ?2, last_run = ?3, last_result = ?4, status =
             CASE WHEN status = 'active' OR status = ?5 THEN ?5 ELSE status END
         WHERE id = ?1",
        params![id, next_run, last_run, result_summary, status],
    )?;
    Ok(())
}

pub fn delete_task_sync(conn: &Connection, id: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM scheduled_tasks WHERE id = ?1", params![id])?;
    Ok(())
}

pub fn append_run_log_sync(
    conn: &Connection,
    task_id: &str,
    status: &str,
    duration_ms: i64,
    result_text: Option<&str>,
    created_at: i64,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO task_run_logs (task_id, status, duration_ms, result_text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![task_id, status, duration_ms, result_text, created_at],
    )?;
    Ok(())
}

impl StorePool {
    pub async fn create_task(&self, task: ScheduledTask) -> Result<()> {
        self.interact_with_retry(move |conn| Ok(create_task_sync(conn, &task)?)).await
    }

    pub async fn get_task(&self, id: String) -> Result<Option<ScheduledTask>> {
        self.interact(move |conn| Ok(get_task_sync(conn, &id)?)).await
    }

    pub async fn due_tasks(&self, now: i64) -> Result<Vec<ScheduledTask>> {
        self.interact(move |conn| Ok(due_tasks_sync(conn, now)?)).await
    }

    pub async fn set_task_status(&self, id: String, status: TaskStatus) -> Result<()> {
        self.interact_with_retry(move |conn| Ok(set_task_status_sync(conn, &id, status)?))
            .await
    }

    pub async fn update_after_run(
        &self,
        id: String,
        next_run: Option<i64>,
        last_run: i64,
        result_summary: String,
    ) -> Result<()> {
        self.interact_with_retry(move |conn| {
            Ok(update_after_run_sync(conn, &id, next_run, last_run, &result_summary)?)
        })
        .await
    }

    pub async fn delete_task(&self, id: String) -> Result<()> {
        self.interact_with_retry(move |conn| Ok(delete_task_sync(conn, &id)?)).await
    }

    pub async fn append_run_log(
        &self,
        task_id: String,
        status: String,
        duration_ms: i64,
        result_text: Option<String>,
        created_at: i64,
    ) -> Result<()> {
        self.interact_with_retry(move |conn| {
            Ok(append_run_log_sync(conn, &task_id, &status, duration_ms, result_text.as_deref(), created_at)?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, next_run: Option<i64>) -> ScheduledTask {
        ScheduledTask {
            id: id.into(),
            group_folder: "main".into(),
            chat_id: "c1".into(),
            prompt: "say hello".into(),
            schedule_kind: "cron".into(),
            schedule_value: "0 9 * * *".into(),
            context_mode: ContextMode::Isolated,
            next_run,
            last_run: None,
            last_result: None,
            status: TaskStatus::Active,
            created_at: 0,
        }
    }

    #[tokio::test]
    async fn due_tasks_returns_only_active_past_due() {
        let store = StorePool::open_in_memory().await.unwrap();
        store.create_task(sample("t1", Some(100))).await.unwrap();
        store.create_task(sample("t2", Some(200))).await.unwrap();
        store.create_task(sample("t3", None)).await.unwrap();

        let due = store.due_tasks(150).await.unwrap();
        assert_eq!(due.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["t1"]);
    }

    #[tokio::test]
    async fn update_after_run_with_null_next_run_completes_task() {
        let store = StorePool::open_in_memory().await.unwrap();
        store.create_task(sample("t1", Some(100))).await.unwrap();
        store
            .update_after_run("t1".into(), None, 100, "done".into())
            .await
            .unwrap();

        let task = store.get_task("t1".into()).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.next_run, None);
        assert_eq!(task.last_result.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn update_after_run_with_next_run_stays_active() {
        let store = StorePool::open_in_memory().await.unwrap();
        store.create_task(sample("t1", Some(100))).await.unwrap();
        store
            .update_after_run("t1".into(), Some(200), 100, "ok".into())
            .await
            .unwrap();

        let task = store.get_task("t1".into()).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Active);
        assert_eq!(task.next_run, Some(200));
    }

    #[tokio::test]
    async fn paused_task_is_not_due() {
        let store = StorePool::open_in_memory().await.unwrap();
        store.create_task(sample("t1", Some(100))).await.unwrap();
        store.set_task_status("t1".into(), TaskStatus::Paused).await.unwrap();
        assert!(store.due_tasks(1000).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_task_cascades_run_logs() {
        let store = StorePool::open_in_memory().await.unwrap();
        store.create_task(sample("t1", Some(100))).await.unwrap();
        store
            .append_run_log("t1".into(), "ok".into(), 10, Some("result".into()), 100)
            .await
            .unwrap();
        store.delete_task("t1".into()).await.unwrap();

        let count: i64 = store
            .interact(|conn| {
                Ok(conn.query_row("SELECT count(*) FROM task_run_logs", [], |r| r.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
