//! SQLite persistence for license and identity records.
//!
//! One row per client holds the JSON license record and its revision; the
//! revision column is what compare-and-swap checks.

use crate::backend::{IdentityRecord, LicenseBackend};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tollgate_types::{ClientId, License};

/// License backend stored in a SQLite file.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Opens (or creates) a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| StoreError::Storage(format!("failed to open license store: {e}")))?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            StoreError::Storage(format!("failed to open in-memory license store: {e}"))
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        let backend = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        backend.init_schema()?;
        Ok(backend)
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.conn()
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS licenses (
                    client_id TEXT PRIMARY KEY,
                    revision INTEGER NOT NULL,
                    record TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS identities (
                    identity TEXT PRIMARY KEY,
                    client_id TEXT NOT NULL,
                    secret_hash TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                ",
            )
            .map_err(|e| StoreError::Storage(format!("failed to init license schema: {e}")))?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LicenseBackend for SqliteBackend {
    fn load(&self, client_id: &ClientId) -> StoreResult<Option<License>> {
        let record: Option<String> = self
            .conn()
            .query_row(
                "SELECT record FROM licenses WHERE client_id = ?1",
                params![client_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        record
            .map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }

    fn compare_and_swap(&self, expected: Option<u64>, license: &License) -> StoreResult<bool> {
        let record = serde_json::to_string(license)?;
        let revision = license.revision as i64;
        let conn = self.conn();
        let changed = match expected {
            None => conn.execute(
                "INSERT INTO licenses (client_id, revision, record) VALUES (?1, ?2, ?3)
                 ON CONFLICT(client_id) DO NOTHING",
                params![license.client_id.as_str(), revision, record],
            )?,
            Some(expected) => conn.execute(
                "UPDATE licenses SET revision = ?2, record = ?3
                 WHERE client_id = ?1 AND revision = ?4",
                params![license.client_id.as_str(), revision, record, expected as i64],
            )?,
        };
        Ok(changed == 1)
    }

    fn list(&self) -> StoreResult<Vec<License>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT record FROM licenses ORDER BY client_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut licenses = Vec::new();
        for row in rows {
            licenses.push(serde_json::from_str(&row?)?);
        }
        Ok(licenses)
    }

    fn load_identity(&self, identity: &str) -> StoreResult<Option<IdentityRecord>> {
        let row: Option<(String, String, String, String)> = self
            .conn()
            .query_row(
                "SELECT identity, client_id, secret_hash, created_at FROM identities WHERE identity = ?1",
                params![identity],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        row.map(|(identity, client_id, secret_hash, created_at)| -> StoreResult<IdentityRecord> {
            let created_at = DateTime::parse_from_rfc3339(&created_at)
                .map_err(|e| StoreError::Storage(format!("invalid created_at in identities: {e}")))?
                .with_timezone(&Utc);
            Ok(IdentityRecord {
                identity,
                client_id: ClientId::new(client_id),
                secret_hash,
                created_at,
            })
        })
        .transpose()
    }

    fn insert_identity(&self, record: &IdentityRecord) -> StoreResult<bool> {
        let changed = self.conn().execute(
            "INSERT INTO identities (identity, client_id, secret_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(identity) DO NOTHING",
            params![
                record.identity,
                record.client_id.as_str(),
                record.secret_hash,
                record.created_at.to_rfc3339(),
            ],
        )?;
        Ok(changed == 1)
    }

    fn delete_identity(&self, identity: &str) -> StoreResult<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM identities WHERE identity = ?1", params![identity])?;
        Ok(changed == 1)
    }
}
