//! SQLite-backed transfer history
//!
//! Durable record of transfer sessions across daemon restarts,
//! independent of the live in-memory session table. One row per session
//! id with `created_at`/`updated_at` stamps and a schema version.
//!
//! ## Schema
//!
//! ```sql
//! CREATE TABLE transfers (
//!     session_id TEXT PRIMARY KEY,
//!     sender_ip TEXT NOT NULL,
//!     sender_id TEXT NOT NULL,
//!     device_name TEXT NOT NULL,
//!     direction TEXT NOT NULL,
//!     status TEXT NOT NULL,
//!     start_time INTEGER NOT NULL,
//!     end_time INTEGER,
//!     last_update_time INTEGER NOT NULL,
//!     total_file_count INTEGER NOT NULL,
//!     received_file_count INTEGER NOT NULL,
//!     total_size INTEGER NOT NULL,
//!     received_size INTEGER NOT NULL,
//!     current_file_name TEXT,
//!     current_file_size INTEGER,
//!     error_message TEXT,
//!     error_code INTEGER,
//!     schema_version INTEGER NOT NULL,
//!     created_at INTEGER NOT NULL,
//!     updated_at INTEGER NOT NULL
//! );
//! ```
//!
//! The connection mutex serializes writes: at most one write is in
//! progress at a time, concurrent writers block until it finishes.
//! Optional columns absent in rows written by older schema revisions
//! read back as NULL and default on load, so adding optional fields
//! never needs a destructive migration.
//!
//! Default path: `~/.local/share/nearshare/transfers.db`

use crate::error::{CoreError, Result};
use crate::session::{now_millis, TransferDirection, TransferSession, TransferStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Current schema revision, stored per row and in `PRAGMA user_version`
pub const SCHEMA_VERSION: i32 = 1;

/// Durable store of transfer session records
pub struct TransferStore {
    conn: Arc<Mutex<Connection>>,
}

impl TransferStore {
    /// Open (or create) the store at the default data path
    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    /// Open (or create) the store at an explicit path
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;

        info!("Transfer history store opened at {}", db_path.display());
        Ok(store)
    }

    /// In-memory store, used by tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn default_path() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir().ok_or_else(|| {
            CoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "could not determine local data directory",
            ))
        })?;
        Ok(data_dir.join("nearshare").join("transfers.db"))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().expect("store connection poisoned");

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS transfers (
                session_id TEXT PRIMARY KEY,
                sender_ip TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                device_name TEXT NOT NULL,
                direction TEXT NOT NULL,
                status TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                last_update_time INTEGER NOT NULL,
                total_file_count INTEGER NOT NULL,
                received_file_count INTEGER NOT NULL,
                total_size INTEGER NOT NULL,
                received_size INTEGER NOT NULL,
                current_file_name TEXT,
                current_file_size INTEGER,
                error_message TEXT,
                error_code INTEGER,
                schema_version INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transfers_start_time
                ON transfers(start_time DESC);
            "#,
        )?;

        let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        }

        debug!("Transfer store schema initialized (version {SCHEMA_VERSION})");
        Ok(())
    }

    /// Insert the session if unseen, otherwise overwrite stored fields
    /// in place. `created_at` is preserved on overwrite.
    pub fn upsert(&self, session: &TransferSession) -> Result<()> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let now = now_millis();

        conn.execute(
            r#"
            INSERT INTO transfers (
                session_id, sender_ip, sender_id, device_name, direction,
                status, start_time, end_time, last_update_time,
                total_file_count, received_file_count, total_size,
                received_size, current_file_name, current_file_size,
                error_message, error_code, schema_version, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                    ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?19)
            ON CONFLICT(session_id) DO UPDATE SET
                sender_ip = excluded.sender_ip,
                sender_id = excluded.sender_id,
                device_name = excluded.device_name,
                direction = excluded.direction,
                status = excluded.status,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                last_update_time = excluded.last_update_time,
                total_file_count = excluded.total_file_count,
                received_file_count = excluded.received_file_count,
                total_size = excluded.total_size,
                received_size = excluded.received_size,
                current_file_name = excluded.current_file_name,
                current_file_size = excluded.current_file_size,
                error_message = excluded.error_message,
                error_code = excluded.error_code,
                schema_version = excluded.schema_version,
                updated_at = excluded.updated_at
            "#,
            params![
                session.session_id,
                session.sender_ip,
                session.sender_id,
                session.device_name,
                session.direction.as_str(),
                session.status.as_str(),
                session.start_time,
                session.end_time,
                session.last_update_time,
                session.total_file_count,
                session.received_file_count,
                session.total_size as i64,
                session.received_size as i64,
                session.current_file_name,
                session.current_file_size as i64,
                session.error_message,
                session.error_code,
                SCHEMA_VERSION,
                now,
            ],
        )?;

        debug!("Upserted transfer record {}", session.session_id);
        Ok(())
    }

    /// Remove one session record; absent id is a no-op
    pub fn delete(&self, session_id: &str) -> Result<()> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let rows = conn.execute(
            "DELETE FROM transfers WHERE session_id = ?1",
            params![session_id],
        )?;
        debug!("Deleted {} transfer record(s) for {}", rows, session_id);
        Ok(())
    }

    /// Clear the whole history
    pub fn delete_all(&self) -> Result<()> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let rows = conn.execute("DELETE FROM transfers", [])?;
        info!("Cleared transfer history ({} records)", rows);
        Ok(())
    }

    /// Load every stored session, newest first
    pub fn load_all(&self) -> Result<Vec<TransferSession>> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let mut stmt = conn.prepare(
            r#"
            SELECT session_id, sender_ip, sender_id, device_name, direction,
                   status, start_time, end_time, last_update_time,
                   total_file_count, received_file_count, total_size,
                   received_size, current_file_name, current_file_size,
                   error_message, error_code
            FROM transfers
            ORDER BY start_time DESC
            "#,
        )?;

        let sessions = stmt
            .query_map([], row_to_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    /// Load a single session record by id
    pub fn load(&self, session_id: &str) -> Result<Option<TransferSession>> {
        let conn = self.conn.lock().expect("store connection poisoned");
        let mut stmt = conn.prepare(
            r#"
            SELECT session_id, sender_ip, sender_id, device_name, direction,
                   status, start_time, end_time, last_update_time,
                   total_file_count, received_file_count, total_size,
                   received_size, current_file_name, current_file_size,
                   error_message, error_code
            FROM transfers
            WHERE session_id = ?1
            "#,
        )?;

        Ok(stmt
            .query_row(params![session_id], row_to_session)
            .optional()?)
    }
}

/// Map one row to a session; absent optional columns default rather
/// than failing the read
fn row_to_session(row: &Row<'_>) -> rusqlite::Result<TransferSession> {
    let direction: String = row.get(4)?;
    let status: String = row.get(5)?;

    Ok(TransferSession {
        session_id: row.get(0)?,
        sender_ip: row.get(1)?,
        sender_id: row.get(2)?,
        device_name: row.get(3)?,
        direction: TransferDirection::parse(&direction).unwrap_or(TransferDirection::Receive),
        status: TransferStatus::parse(&status).unwrap_or(TransferStatus::Failed),
        start_time: row.get(6)?,
        end_time: row.get(7)?,
        last_update_time: row.get(8)?,
        total_file_count: row.get(9)?,
        received_file_count: row.get(10)?,
        total_size: row.get::<_, i64>(11)? as u64,
        received_size: row.get::<_, i64>(12)? as u64,
        current_file_name: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
        current_file_size: row.get::<_, Option<i64>>(14)?.unwrap_or(0) as u64,
        error_message: row.get(15)?,
        error_code: row.get(16)?,
    })
}
