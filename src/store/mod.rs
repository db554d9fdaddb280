//! SQLite-backed message repository and ingestion failure log.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use wa_relay_core::{
    FailureRecorder, IngestFailure, Message, MessageKind, MessageProps, MessageRepository,
    RelayError, RelayResult, SaveOutcome,
};

/// Failure rows kept; older ones are purged on insert.
const MAX_FAILURE_ROWS: i64 = 1000;

const MESSAGE_COLUMNS: &str = "id, tenant_id, external_id, sender, recipient, content, kind, \
     timestamp_ms, is_outbound, has_media, created_at_ms";

/// A stored ingestion failure.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub id: i64,
    pub stage: String,
    pub tenant_id: Option<String>,
    pub external_id: Option<String>,
    pub error: String,
    pub payload: Option<String>,
    pub failed_at: DateTime<Utc>,
}

/// Clones share one connection.
#[derive(Clone)]
pub struct SqliteMessageStore {
    conn: Arc<Mutex<Connection>>,
}

struct MessageRow {
    id: String,
    tenant_id: String,
    external_id: String,
    sender: String,
    recipient: Option<String>,
    content: String,
    kind: String,
    timestamp_ms: i64,
    is_outbound: bool,
    has_media: bool,
    created_at_ms: i64,
}

impl MessageRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            external_id: row.get(2)?,
            sender: row.get(3)?,
            recipient: row.get(4)?,
            content: row.get(5)?,
            kind: row.get(6)?,
            timestamp_ms: row.get(7)?,
            is_outbound: row.get(8)?,
            has_media: row.get(9)?,
            created_at_ms: row.get(10)?,
        })
    }

    fn into_message(self) -> Result<Message> {
        let props = MessageProps {
            sender: self.sender,
            recipient: self.recipient,
            content: self.content,
            kind: MessageKind::from_name(&self.kind),
            timestamp: DateTime::from_timestamp_millis(self.timestamp_ms),
            external_id: self.external_id,
            tenant_id: self.tenant_id,
            is_outbound: self.is_outbound,
            has_media: Some(self.has_media),
            created_at: DateTime::from_timestamp_millis(self.created_at_ms),
        };
        Message::create(props, Some(self.id.clone()))
            .with_context(|| format!("stored message {} is invalid", self.id))
    }
}

impl SqliteMessageStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create database parent directory: {}",
                    parent.display()
                )
            })?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at: {}", db_path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=3000;",
        )?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.ensure_schema().with_context(|| {
            format!(
                "Failed to initialize database schema at: {}",
                db_path.display()
            )
        })?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))
    }

    fn ensure_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                external_id TEXT NOT NULL,
                sender TEXT NOT NULL,
                recipient TEXT,
                content TEXT NOT NULL,
                kind TEXT NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                is_outbound INTEGER NOT NULL,
                has_media INTEGER NOT NULL,
                created_at_ms INTEGER NOT NULL,
                UNIQUE (tenant_id, external_id)
            );
            CREATE INDEX IF NOT EXISTS idx_messages_tenant_time
                ON messages (tenant_id, timestamp_ms);
            CREATE TABLE IF NOT EXISTS ingest_failures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stage TEXT NOT NULL,
                tenant_id TEXT,
                external_id TEXT,
                error TEXT NOT NULL,
                payload TEXT,
                failed_at_ms INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Insert unless `(tenant_id, external_id)` already exists. The conflict
    /// check and the write are one statement, so racing inserts of the same
    /// pair produce exactly one row.
    pub fn insert(&self, message: &Message) -> Result<SaveOutcome> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "INSERT INTO messages (id, tenant_id, external_id, sender, recipient, content, kind,
                                   timestamp_ms, is_outbound, has_media, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (tenant_id, external_id) DO NOTHING",
            params![
                message.id(),
                message.tenant_id(),
                message.external_id(),
                message.sender(),
                message.recipient(),
                message.content(),
                message.kind().as_str(),
                message.timestamp().timestamp_millis(),
                message.is_outbound(),
                message.has_media(),
                message.created_at().timestamp_millis(),
            ],
        )?;
        if changed == 0 {
            debug!(
                "insert skipped: tenant={} external_id={} already stored",
                message.tenant_id(),
                message.external_id()
            );
            Ok(SaveOutcome::Duplicate)
        } else {
            Ok(SaveOutcome::Inserted)
        }
    }

    pub fn message_by_external_id(
        &self,
        tenant_id: &str,
        external_id: &str,
    ) -> Result<Option<Message>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE tenant_id = ?1 AND external_id = ?2"
                ),
                params![tenant_id, external_id],
                MessageRow::from_row,
            )
            .optional()?;
        row.map(MessageRow::into_message).transpose()
    }

    /// A tenant's messages in event order. With `limit`, only the most recent
    /// `limit` messages are returned, still oldest first.
    pub fn messages_for_tenant(&self, tenant_id: &str, limit: Option<usize>) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        let rows = if let Some(limit) = limit {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM (
                    SELECT rowid AS row_order, * FROM messages WHERE tenant_id = ?1
                    ORDER BY timestamp_ms DESC, created_at_ms DESC, row_order DESC
                    LIMIT ?2
                 ) ORDER BY timestamp_ms ASC, created_at_ms ASC, row_order ASC"
            ))?;
            stmt.query_map(params![tenant_id, limit as i64], MessageRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE tenant_id = ?1
                 ORDER BY timestamp_ms ASC, created_at_ms ASC, rowid ASC"
            ))?;
            stmt.query_map(params![tenant_id], MessageRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        drop(conn);
        rows.into_iter().map(MessageRow::into_message).collect()
    }

    pub fn count_messages(&self, tenant_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn insert_failure(&self, failure: &IngestFailure) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO ingest_failures (stage, tenant_id, external_id, error, payload, failed_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                failure.stage.as_str(),
                failure.tenant_id,
                failure.external_id,
                failure.error,
                failure.payload,
                Utc::now().timestamp_millis(),
            ],
        )?;
        let id = conn.last_insert_rowid();

        conn.execute(
            "DELETE FROM ingest_failures WHERE id NOT IN (
                SELECT id FROM ingest_failures ORDER BY id DESC LIMIT ?1
            )",
            params![MAX_FAILURE_ROWS],
        )?;

        Ok(id)
    }

    /// Most recent failures first.
    pub fn recent_failures(&self, limit: usize) -> Result<Vec<FailureRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, stage, tenant_id, external_id, error, payload, failed_at_ms
             FROM ingest_failures ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let failed_at_ms: i64 = row.get(6)?;
                Ok(FailureRecord {
                    id: row.get(0)?,
                    stage: row.get(1)?,
                    tenant_id: row.get(2)?,
                    external_id: row.get(3)?,
                    error: row.get(4)?,
                    payload: row.get(5)?,
                    failed_at: DateTime::from_timestamp_millis(failed_at_ms).unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl SqliteMessageStore {
    /// Run a store operation on the blocking pool so a busy database never
    /// stalls a runtime worker.
    async fn blocking<T, F>(&self, op: F) -> RelayResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| RelayError::storage(anyhow::anyhow!("storage task failed: {}", e)))?
            .map_err(RelayError::storage)
    }
}

#[async_trait]
impl MessageRepository for SqliteMessageStore {
    async fn save(&self, message: &Message) -> RelayResult<SaveOutcome> {
        let message = message.clone();
        self.blocking(move |store| store.insert(&message)).await
    }

    async fn find_by_external_id(
        &self,
        tenant_id: &str,
        external_id: &str,
    ) -> RelayResult<Option<Message>> {
        let tenant_id = tenant_id.to_string();
        let external_id = external_id.to_string();
        self.blocking(move |store| store.message_by_external_id(&tenant_id, &external_id))
            .await
    }

    async fn find_by_tenant(&self, tenant_id: &str) -> RelayResult<Vec<Message>> {
        let tenant_id = tenant_id.to_string();
        self.blocking(move |store| store.messages_for_tenant(&tenant_id, None))
            .await
    }
}

#[async_trait]
impl FailureRecorder for SqliteMessageStore {
    async fn record_failure(&self, failure: &IngestFailure) -> RelayResult<()> {
        let failure = failure.clone();
        self.blocking(move |store| store.insert_failure(&failure).map(|_| ()))
            .await
    }
}
