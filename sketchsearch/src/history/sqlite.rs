//! SQLite-backed history store

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;

use super::{check_parent, HistoryStore, NewSearchNode, NodeAnnotation, SearchHistoryNode};
use crate::{Error, Result};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS search_nodes (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        sketch_id          INTEGER NOT NULL,
        query_string       TEXT,
        query_dsl          TEXT,
        query_filter       TEXT NOT NULL,
        query_result_count INTEGER NOT NULL,
        description        TEXT,
        labels             TEXT NOT NULL DEFAULT '[]',
        created_at         INTEGER NOT NULL,
        query_time         INTEGER NOT NULL,
        parent_id          INTEGER REFERENCES search_nodes(id)
    );
    CREATE INDEX IF NOT EXISTS idx_search_nodes_parent ON search_nodes(parent_id);
    CREATE INDEX IF NOT EXISTS idx_search_nodes_sketch ON search_nodes(sketch_id);
"#;

const COLUMNS: &str = "id, sketch_id, query_string, query_dsl, query_filter, query_result_count, \
                       description, labels, created_at, query_time, parent_id";

/// Row as stored, before JSON columns are decoded.
struct StoredRow {
    id: i64,
    sketch_id: i64,
    query_string: Option<String>,
    query_dsl: Option<String>,
    query_filter: String,
    query_result_count: i64,
    description: Option<String>,
    labels: String,
    created_at: i64,
    query_time: i64,
    parent_id: Option<i64>,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sketch_id: row.get(1)?,
            query_string: row.get(2)?,
            query_dsl: row.get(3)?,
            query_filter: row.get(4)?,
            query_result_count: row.get(5)?,
            description: row.get(6)?,
            labels: row.get(7)?,
            created_at: row.get(8)?,
            query_time: row.get(9)?,
            parent_id: row.get(10)?,
        })
    }

    fn into_node(self) -> Result<SearchHistoryNode> {
        let query_dsl = self
            .query_dsl
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()?;
        let labels: BTreeSet<String> = serde_json::from_str(&self.labels)?;
        Ok(SearchHistoryNode {
            id: self.id,
            sketch_id: self.sketch_id,
            query_string: self.query_string,
            query_dsl,
            query_filter: self.query_filter,
            query_result_count: self.query_result_count.max(0) as u64,
            description: self.description,
            labels,
            created_at: DateTime::from_timestamp_micros(self.created_at).unwrap_or_default(),
            query_time: self.query_time.max(0) as u64,
            parent: self.parent_id,
        })
    }
}

/// History store persisted in a single SQLite database.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Open (or create) the database at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        // WAL mode + performance pragmas
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub async fn len(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM search_nodes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn select(conn: &Connection, id: i64) -> Result<Option<SearchHistoryNode>> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM search_nodes WHERE id = ?", COLUMNS),
                params![id],
                StoredRow::from_row,
            )
            .optional()?;
        row.map(StoredRow::into_node).transpose()
    }

    fn select_many(
        conn: &Connection,
        filter: &str,
        key: i64,
    ) -> Result<Vec<SearchHistoryNode>> {
        let sql = format!(
            "SELECT {} FROM search_nodes WHERE {} = ? ORDER BY id ASC",
            COLUMNS, filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![key], StoredRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(StoredRow::into_node).collect()
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn insert(&self, new: NewSearchNode) -> Result<SearchHistoryNode> {
        let query_dsl = new.query_dsl.as_ref().map(serde_json::to_string).transpose()?;
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        if let Some(parent_id) = new.parent {
            let parent = Self::select(&tx, parent_id)?;
            check_parent(new.sketch_id, parent_id, parent.as_ref())?;
        }

        tx.execute(
            r#"
            INSERT INTO search_nodes
            (sketch_id, query_string, query_dsl, query_filter, query_result_count,
             description, labels, created_at, query_time, parent_id)
            VALUES (?, ?, ?, ?, ?, NULL, '[]', ?, ?, ?)
            "#,
            params![
                new.sketch_id,
                &new.query_string,
                &query_dsl,
                &new.query_filter,
                new.query_result_count as i64,
                new.created_at.timestamp_micros(),
                new.query_time as i64,
                new.parent,
            ],
        )?;
        let id = tx.last_insert_rowid();
        let node = Self::select(&tx, id)?.ok_or(Error::NodeNotFound(id))?;
        tx.commit()?;
        Ok(node)
    }

    async fn get(&self, id: i64) -> Result<Option<SearchHistoryNode>> {
        let conn = self.conn.lock().await;
        Self::select(&conn, id)
    }

    async fn children(&self, id: i64) -> Result<Vec<SearchHistoryNode>> {
        let conn = self.conn.lock().await;
        Self::select_many(&conn, "parent_id", id)
    }

    async fn list(&self, sketch_id: i64) -> Result<Vec<SearchHistoryNode>> {
        let conn = self.conn.lock().await;
        Self::select_many(&conn, "sketch_id", sketch_id)
    }

    async fn annotate(&self, id: i64, annotation: NodeAnnotation) -> Result<SearchHistoryNode> {
        let labels = annotation
            .labels
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE search_nodes SET labels = COALESCE(?, labels), \
             description = COALESCE(?, description) WHERE id = ?",
            params![&labels, &annotation.description, id],
        )?;
        if updated == 0 {
            return Err(Error::NodeNotFound(id));
        }
        Self::select(&conn, id)?.ok_or(Error::NodeNotFound(id))
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}
