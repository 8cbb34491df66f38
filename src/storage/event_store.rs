//! SQLite-backed store of inbound webhook events.
//!
//! One `webhooks_events` table, append-only. The receiver inserts through a
//! single long-lived writer connection; every query opens its own
//! connection, and the database runs in WAL mode so readers and the writer
//! never wait on each other.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, Row};

use crate::utilities::errors::StoreError;
use crate::webhooks::{EventType, NewWebhookEvent, WebhookEvent};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS webhooks_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type TEXT NOT NULL,
        app_id TEXT NOT NULL,
        event_time TEXT NOT NULL,
        message_id TEXT NOT NULL,
        channel_identity TEXT NOT NULL,
        status TEXT,
        reason TEXT,
        submitted_message TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_webhooks_events_message_id
        ON webhooks_events (message_id);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persisted table of webhook events, exclusively owned by this process.
pub struct EventStore {
    /// Path to the SQLite database file.
    path: PathBuf,
    writer: Mutex<Option<Connection>>,
    closed: AtomicBool,
}

impl EventStore {
    /// Open the store at `path`, creating the file and schema if absent.
    /// Opening an existing store keeps its rows.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            log::warn!("Event store journal mode is '{}', not WAL", mode);
        }
        conn.execute_batch(SCHEMA)?;

        log::debug!("Event store opened at {}", path.display());
        Ok(Self {
            path,
            writer: Mutex::new(Some(conn)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Append one event. Returns its id.
    pub fn insert(&self, event: &NewWebhookEvent) -> Result<i64, StoreError> {
        let guard = self.writer.lock();
        let conn = guard.as_ref().ok_or(StoreError::Closed)?;
        conn.execute(
            "INSERT INTO webhooks_events (
                type, app_id, event_time, message_id, channel_identity, status, reason, submitted_message
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.event_type.as_str(),
                event.owner_id,
                event.event_time_text(),
                event.message_id,
                event.channel_identity,
                event.status,
                event.reason,
                event.submitted_payload,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Every event of `message_id`, oldest event time first. Ties keep
    /// insertion order. No match yields an empty vector.
    pub fn query_by_message_id(&self, message_id: &str) -> Result<Vec<WebhookEvent>, StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let mut stmt = conn.prepare(
            "SELECT id, type, app_id, event_time, message_id, channel_identity,
                    status, reason, submitted_message
             FROM webhooks_events
             WHERE message_id = ?1
             ORDER BY event_time ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![message_id], row_to_event)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    /// Close the writer connection. Later operations fail with
    /// [`StoreError::Closed`]. Closing twice is a no-op.
    pub fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        let conn = self.writer.lock().take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| StoreError::Sqlite(e))?;
            log::debug!("Event store closed");
        }
        Ok(())
    }

    /// Close the store and delete its file, along with the WAL side files.
    /// Must not run concurrently with a query.
    pub fn destroy(&self) -> Result<(), StoreError> {
        self.close()?;
        for path in [
            self.path.clone(),
            sidecar(&self.path, "-wal"),
            sidecar(&self.path, "-shm"),
        ] {
            match std::fs::remove_file(&path) {
                Ok(()) => log::debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// [`insert`](Self::insert) on the blocking pool.
    pub async fn insert_async(
        self: &Arc<Self>,
        event: NewWebhookEvent,
    ) -> Result<i64, StoreError> {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || store.insert(&event)).await?
    }

    /// [`query_by_message_id`](Self::query_by_message_id) on the blocking pool.
    pub async fn query_by_message_id_async(
        self: &Arc<Self>,
        message_id: &str,
    ) -> Result<Vec<WebhookEvent>, StoreError> {
        let store = Arc::clone(self);
        let message_id = message_id.to_string();
        tokio::task::spawn_blocking(move || store.query_by_message_id(&message_id)).await?
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<WebhookEvent> {
    let trigger: String = row.get(1)?;
    let event_type = EventType::from_trigger(&trigger).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unknown event type '{}'", trigger).into(),
        )
    })?;
    Ok(WebhookEvent {
        id: row.get(0)?,
        event_type,
        owner_id: row.get(2)?,
        event_time: row.get(3)?,
        message_id: row.get(4)?,
        channel_identity: row.get(5)?,
        status: row.get(6)?,
        reason: row.get(7)?,
        submitted_payload: row.get(8)?,
    })
}
