// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};

use crate::pool::StorePool;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeDoc {
    pub group_folder: String,
    pub filename: String,
    pub title: String,
    pub content: String,
    pub size_chars: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

fn row_to_doc(row: &rusqlite::Row) -> rusqlite::Result<KnowledgeDoc> {
    Ok(KnowledgeDoc {
        group_folder: row.get(0)?,
        filename: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        size_chars: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const DOC_COLUMNS: &str = "group_folder, filename, title, content, size_chars, created_at, updated_at";

pub fn upsert_knowledge_doc_sync(
    conn: &Connection,
    group_folder: &str,
    filename: &str,
    title: &str,
    content: &str,
    now: i64,
) -> rusqlite::Result<()> {
    let size_chars = content.chars().count() as i64;
    conn.execute(
        "INSERT INTO knowledge_docs (group_folder, filename, title, content, size_chars, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(group_folder, filename) DO UPDATE SET
             title      = excluded.title,
             content    = excluded.content,
             size_chars = excluded.size_chars,
             updated_at = ?6",
        params![group_folder, filename, title, content, size_chars, now],
    )?;
    Ok(())
}

pub fn get_knowledge_doc_sync(
    conn: &Connection,
    group_folder: &str,
    filename: &str,
) -> rusqlite::Result<Option<KnowledgeDoc>> {
    conn.query_row(
        &format!("SELECT {DOC_COLUMNS} FROM knowledge_docs WHERE group_folder = ?1 AND filename = ?2"),
        params![group_folder, filename],
        row_to_doc,
    )
    .optional()
}

pub fn delete_knowledge_doc_sync(conn: &Connection, group_folder: &str, filename: &str) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM knowledge_docs WHERE group_folder = ?1 AND filename = ?2",
        params![group_folder, filename],
    )?;
    Ok(())
}

pub fn list_knowledge_docs_sync(conn: &Connection, group_folder: &str) -> rusqlite::Result<Vec<KnowledgeDoc>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOC_COLUMNS} FROM knowledge_docs WHERE group_folder = ?1 ORDER BY filename"
    ))?;
    let rows = stmt.query_map(params![group_folder], row_to_doc)?;
    rows.collect()
}

/// Relevance search: docs whose title or content contains the query
/// (case-insensitive), ranked by title match first, then by match count in
/// the content, ties broken by most recently updated.
pub fn search_knowledge_sync(
    conn: &Connection,
    group_folder: &str,
    query: &str,
) -> rusqlite::Result<Vec<KnowledgeDoc>> {
    let needle = query.to_lowercase();
    let mut stmt = conn.prepare(&format!("SELECT {DOC_COLUMNS} FROM knowledge_docs WHERE group_folder = ?1"))?;
    let rows = stmt.query_map(params![group_folder], row_to_doc)?;

    let mut matches: Vec<(bool, usize, i64, KnowledgeDoc)> = Vec::new();
    for row in rows {
        let doc = row?;
        let title_hit = doc.title.to_lowercase().contains(&needle);
        let content_lower = doc.content.to_lowercase();
        let content_hits = if needle.is_empty() { 0 } else { content_lower.matches(&needle).count() };
        if title_hit || content_hits > 0 {
            matches.push((title_hit, content_hits, doc.updated_at, doc));
        }
    }
    matches.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then(b.1.cmp(&a.1))
            .then(b.2.cmp(&a.2))
    });
    Ok(matches.into_iter().map(|(_, _, _, doc)| doc).collect())
}

impl StorePool {
    pub async fn upsert_knowledge_doc(
        &self,
        group_folder: String,
        filename: String,
        title: String,
        content: String,
        now: i64,
    ) -> Result<()> {
        self.interact_with_retry(move |conn| {
            Ok(upsert_knowledge_doc_sync(conn, &group_folder, &filename, &title, &content, now)?)
        })
        .await
    }

    pub async fn get_knowledge_doc(&self, group_folder: String, filename: String) -> Result<Option<KnowledgeDoc>> {
        self.interact(move |conn| Ok(get_knowledge_doc_sync(conn, &group_folder, &filename)?))
            .await
    }

    pub async fn delete_knowledge_doc(&self, group_folder: String, filename: String) -> Result<()> {
        self.interact_with_retry(move |conn| Ok(delete_knowledge_doc_sync(conn, &group_folder, &filename)?))
            .await
    }

    pub async fn list_knowledge_docs(&self, group_folder: String) -> Result<Vec<KnowledgeDoc>> {
        self.interact(move |conn| Ok(list_knowledge_docs_sync(conn, &group_folder)?))
            .await
    }

    pub async fn search_knowledge(&self, group_folder: String, query: String) -> Result<Vec<KnowledgeDoc>> {
        self.interact(move |conn| Ok(search_knowledge_sync(conn, &group_folder, &query)?))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_get_round_trips_and_computes_size() {
        let store = StorePool::open_in_memory().await.unwrap();
        store
            .upsert_knowledge_doc("main".into(), "notes.md".into(), "Notes".into(), "hello world".into(), 100)
            .await
            .unwrap();
        let doc = store.get_knowledge_doc("main".into(), "notes.md".into()).await.unwrap().unwrap();
        assert_eq!(doc.size_chars, 11);
        assert_eq!(doc.created_at, 100);
    }

    #[tokio::test]
    async fn second_upsert_preserves_created_at() {
        let store = StorePool::open_in_memory().await.unwrap();
        store
            .upsert_knowledge_doc("main".into(), "notes.md".into(), "Notes".into(), "v1".into(), 100)
            .await
            .unwrap();
        store
            .upsert_knowledge_doc("main".into(), "notes.md".into(), "Notes".into(), "v2, longer".into(), 200)
            .await
            .unwrap();
        let doc = store.get_knowledge_doc("main".into(), "notes.md".into()).await.unwrap().unwrap();
        assert_eq!(doc.created_at, 100);
        assert_eq!(doc.updated_at, 200);
        assert_eq!(doc.content, "v2, longer");
    }

    #[tokio::test]
    async fn search_ranks_title_match_above_content_only_match() {
        let store = StorePool::open_in_memory().await.unwrap();
        store
            .upsert_knowledge_doc("main".into(), "a.md".into(), "unrelated".into(), "mentions rust once".into(), 100)
            .await
            .unwrap();
        store
            .upsert_knowledge_doc("main".into(), "b.md".into(), "Rust Notes".into(), "no match here".into(), 100)
            .await
            .unwrap();

        let results = store.search_knowledge("main".into(), "rust".into()).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].filename, "b.md");
    }

    #[tokio::test]
    async fn search_excludes_non_matching_docs() {
        let store = StorePool::open_in_memory().await.unwrap();
        store
            .upsert_knowledge_doc("main".into(), "a.md".into(), "Cooking".into(), "recipes".into(), 100)
            .await
            .unwrap();
        let results = store.search_knowledge("main".into(), "rust".into()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_doc() {
        let store = StorePool::open_in_memory().await.unwrap();
        store
            .upsert_knowledge_doc("main".into(), "a.md".into(), "A".into(), "x".into(), 100)
            .await
            .unwrap();
        store.delete_knowledge_doc("main".into(), "a.md".into()).await.unwrap();
        assert!(store.get_knowledge_doc("main".into(), "a.md".into()).await.unwrap().is_none());
    }
}
