//! SQLite-backed settings store.

use super::SettingsStore;
use crate::document::Document;
use crate::error::StoreError;
use crate::types::now_ms;
use async_trait::async_trait;
use rusqlite::{Connection, params};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Settings store wrapping a SQLite connection.
///
/// Every operation runs on tokio's blocking pool so the async callers never
/// stall the runtime on disk I/O.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // WAL lets several processes share the file
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout=5000;",
        )?;

        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, StoreError> {
        embedded::migrations::runner()
            .run(&mut conn)
            .map_err(StoreError::backend)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with exclusive access to the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::backend("connection mutex poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|err| StoreError::Task(err.to_string()))?
    }
}

fn read_fields(conn: &Connection, key: &str) -> Result<Document, StoreError> {
    let mut stmt =
        conn.prepare("SELECT field, value_json FROM settings_fields WHERE namespace = ?1")?;
    let rows = stmt.query_map(params![key], |row| {
        let field: String = row.get(0)?;
        let value_json: String = row.get(1)?;
        Ok((field, value_json))
    })?;

    let mut document = Document::new();
    for row in rows {
        let (field, value_json) = row?;
        let value: Value =
            serde_json::from_str(&value_json).map_err(|err| StoreError::Corrupt {
                namespace: key.to_string(),
                field: field.clone(),
                reason: err.to_string(),
            })?;
        document.insert(field, value);
    }
    Ok(document)
}

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn load_namespace(&self, key: &str) -> Result<Document, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| read_fields(conn, &key)).await
    }

    async fn save_namespace(&self, key: &str, document: &Document) -> Result<(), StoreError> {
        let key = key.to_string();
        let mut encoded = Vec::with_capacity(document.len());
        for (field, value) in document {
            let json = serde_json::to_string(value).map_err(StoreError::backend)?;
            encoded.push((field.clone(), json));
        }

        self.with_conn(move |conn| {
            let now = now_ms();
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM settings_fields WHERE namespace = ?1",
                params![key],
            )?;
            {
                let mut insert = tx.prepare(
                    "INSERT INTO settings_fields (namespace, field, value_json, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                )?;
                for (field, json) in &encoded {
                    insert.execute(params![key, field, json, now])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_namespace(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "DELETE FROM settings_fields WHERE namespace = ?1",
                params![key],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT namespace FROM settings_fields ORDER BY namespace",
            )?;
            let keys = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys)
        })
        .await
    }
}
