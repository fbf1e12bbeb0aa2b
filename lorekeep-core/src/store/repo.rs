//! Store operations
//!
//! Request/response semantics only: add, get (by ids and/or metadata
//! equality), update-metadata. Each write creates or replaces a whole
//! document under its id; there is no partial document update.

use crate::error::{Error, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// Result of a `get`: parallel vectors, one entry per matched document.
#[derive(Debug, Clone, Default)]
pub struct GetResult {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<serde_json::Value>,
}

impl GetResult {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Store handle (single connection behind a mutex)
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create a store at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Ensure a collection exists.
    pub fn get_or_create_collection(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO collections (name, created_at) VALUES (?1, ?2)",
            params![name, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Whether a collection exists (explicit Option semantics, never
    /// inferred from a caught error).
    pub fn find_collection(&self, name: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name FROM collections WHERE name = ?1")?;
        let mut rows = stmt.query([name])?;
        Ok(rows.next()?.map(|_| name.to_string()))
    }

    /// Add documents to a collection.
    ///
    /// The three slices are parallel and must be the same length. Adding
    /// an existing id replaces that document (learnings and evidence are
    /// written once under fresh ids, so in practice this is insert-only).
    pub fn add(
        &self,
        collection: &str,
        ids: &[String],
        documents: &[String],
        metadatas: &[serde_json::Value],
    ) -> Result<()> {
        if ids.len() != documents.len() || ids.len() != metadatas.len() {
            return Err(Error::Store(format!(
                "add batch shape mismatch: {} ids, {} documents, {} metadatas",
                ids.len(),
                documents.len(),
                metadatas.len()
            )));
        }
        self.get_or_create_collection(collection)?;

        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        for ((id, document), metadata) in ids.iter().zip(documents).zip(metadatas) {
            conn.execute(
                r#"
                INSERT INTO documents (collection, id, document, metadata, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                ON CONFLICT(collection, id) DO UPDATE SET
                    document = excluded.document,
                    metadata = excluded.metadata,
                    updated_at = excluded.updated_at
                "#,
                params![collection, id, document, metadata.to_string(), now],
            )?;
        }
        Ok(())
    }

    /// Fetch documents by ids and/or metadata equality.
    ///
    /// `where_meta` matches documents whose metadata contains every given
    /// key with an equal scalar value. With neither filter, the whole
    /// collection is returned.
    pub fn get(
        &self,
        collection: &str,
        ids: Option<&[String]>,
        where_meta: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<GetResult> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, document, metadata FROM documents WHERE collection = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([collection], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut result = GetResult::default();
        for row in rows {
            let (id, document, metadata_raw) = row?;
            if let Some(wanted) = ids {
                if !wanted.contains(&id) {
                    continue;
                }
            }
            let metadata: serde_json::Value = serde_json::from_str(&metadata_raw)?;
            if let Some(filter) = where_meta {
                let matches = filter
                    .iter()
                    .all(|(key, value)| metadata.get(key) == Some(value));
                if !matches {
                    continue;
                }
            }
            result.ids.push(id);
            result.documents.push(document);
            result.metadatas.push(metadata);
        }
        Ok(result)
    }

    /// Replace the metadata sidecars of existing documents.
    pub fn update_metadata(
        &self,
        collection: &str,
        ids: &[String],
        metadatas: &[serde_json::Value],
    ) -> Result<()> {
        if ids.len() != metadatas.len() {
            return Err(Error::Store(format!(
                "update batch shape mismatch: {} ids, {} metadatas",
                ids.len(),
                metadatas.len()
            )));
        }
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        for (id, metadata) in ids.iter().zip(metadatas) {
            let updated = conn.execute(
                "UPDATE documents SET metadata = ?1, updated_at = ?2
                 WHERE collection = ?3 AND id = ?4",
                params![metadata.to_string(), now, collection, id],
            )?;
            if updated == 0 {
                return Err(Error::Store(format!(
                    "no document {} in collection {}",
                    id, collection
                )));
            }
        }
        Ok(())
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE collection = ?1",
            [collection],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }
}
