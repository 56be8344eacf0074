//! SQLite read model using `sqlx`.
//!
//! Each read transaction is a deferred SQLite transaction on a WAL database.
//! The first statement issued at `begin` pins the read snapshot, so later
//! reads never observe projection batches committed after acquisition.
//! Secret payloads contain secret values. The database file is created with
//! mode 0600 on Unix.

use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, instrument};

use crate::error::{ReadDbError, ReadDbResult, UnknownNodeType};
use crate::traits::{ProjectionSink, ReadModel, ReadTx};
use crate::types::{
    Node, NodeId, NodeType, ParentRef, ProjectionEvent, Secret, SecretData, SecretId,
};

/// SQLite-backed read model.
#[derive(Debug, Clone)]
pub struct SqliteReadDb {
    pool: SqlitePool,
}

impl SqliteReadDb {
    /// Opens (creating if needed) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or the schema cannot
    /// be initialised.
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> ReadDbResult<Self> {
        let pool = Self::connect_db(path.as_ref(), max_connections).await?;
        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    async fn connect_db(path: &Path, max_connections: u32) -> ReadDbResult<SqlitePool> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    ReadDbError::Connection(format!("failed to create database directory: {e}"))
                })?;
            }
        }

        // Create the file with restrictive permissions before SQLite opens it
        #[cfg(unix)]
        if !path.exists() {
            use std::os::unix::fs::OpenOptionsExt;
            fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(path)
                .map_err(|e| {
                    ReadDbError::Connection(format!("failed to create database file: {e}"))
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| ReadDbError::Connection(format!("failed to connect: {e}")))
    }

    async fn init_schema(pool: &SqlitePool) -> ReadDbResult<()> {
        let statements = [
            r"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                node_type TEXT NOT NULL,
                name TEXT NOT NULL,
                parent_id TEXT
            )
            ",
            r"
            CREATE INDEX IF NOT EXISTS idx_nodes_children
            ON nodes(parent_id, node_type, name)
            ",
            r"
            CREATE TABLE IF NOT EXISTS secrets (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                owner_type TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                payload TEXT NOT NULL
            )
            ",
            r"
            CREATE INDEX IF NOT EXISTS idx_secrets_owner
            ON secrets(owner_id, name)
            ",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(pool)
                .await
                .map_err(|e| ReadDbError::Database(format!("failed to initialise schema: {e}")))?;
        }

        Ok(())
    }

    async fn apply_event(
        tx: &mut Transaction<'static, Sqlite>,
        event: &ProjectionEvent,
    ) -> ReadDbResult<()> {
        let query = match event {
            ProjectionEvent::NodePut(node) => sqlx::query(
                r"
                INSERT INTO nodes (id, node_type, name, parent_id) VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    node_type = excluded.node_type,
                    name = excluded.name,
                    parent_id = excluded.parent_id
                ",
            )
            .bind(node.id.as_str().to_owned())
            .bind(node.node_type.as_str())
            .bind(node.name.clone())
            .bind(node.parent.as_ref().map(|p| p.as_str().to_owned())),
            ProjectionEvent::NodeRemoved(id) => {
                sqlx::query("DELETE FROM nodes WHERE id = ?").bind(id.as_str().to_owned())
            }
            ProjectionEvent::SecretPut(secret) => {
                let payload = serde_json::to_string(&secret.data)
                    .map_err(|e| ReadDbError::Serialisation(e.to_string()))?;
                sqlx::query(
                    r"
                    INSERT INTO secrets (id, name, owner_type, owner_id, payload)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        name = excluded.name,
                        owner_type = excluded.owner_type,
                        owner_id = excluded.owner_id,
                        payload = excluded.payload
                    ",
                )
                .bind(secret.id.as_str().to_owned())
                .bind(secret.name.clone())
                .bind(secret.parent.node_type.as_str())
                .bind(secret.parent.id.as_str().to_owned())
                .bind(payload)
            }
            ProjectionEvent::SecretRemoved(id) => {
                sqlx::query("DELETE FROM secrets WHERE id = ?").bind(id.as_str().to_owned())
            }
        };

        query
            .execute(&mut **tx)
            .await
            .map_err(|e| ReadDbError::Database(format!("failed to apply event: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl ReadModel for SqliteReadDb {
    async fn begin(&self) -> ReadDbResult<Box<dyn ReadTx>> {
        let mut tx = self.pool.begin().await.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => ReadDbError::Timeout,
            other => ReadDbError::Connection(format!("failed to begin transaction: {other}")),
        })?;

        sqlx::query("SELECT COUNT(*) FROM nodes")
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| ReadDbError::Database(format!("failed to pin snapshot: {e}")))?;

        Ok(Box::new(SqliteTx { tx: Some(tx) }))
    }
}

#[async_trait]
impl ProjectionSink for SqliteReadDb {
    #[instrument(skip(self, events), fields(events = events.len()))]
    async fn apply(&self, events: &[ProjectionEvent]) -> ReadDbResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ReadDbError::Database(format!("failed to begin transaction: {e}")))?;

        for event in events {
            Self::apply_event(&mut tx, event).await?;
        }

        tx.commit()
            .await
            .map_err(|e| ReadDbError::Database(format!("failed to commit: {e}")))?;

        debug!("Projection batch applied");
        Ok(())
    }
}

struct SqliteTx {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteTx {
    fn conn(&mut self) -> ReadDbResult<&mut Transaction<'static, Sqlite>> {
        self.tx.as_mut().ok_or(ReadDbError::Closed)
    }

    fn node_from_row(row: &SqliteRow) -> ReadDbResult<Node> {
        let node_type: String = row.try_get("node_type").map_err(decode_error)?;
        let parent: Option<String> = row.try_get("parent_id").map_err(decode_error)?;
        Ok(Node {
            id: NodeId::new(row.try_get::<String, _>("id").map_err(decode_error)?),
            node_type: node_type
                .parse()
                .map_err(|e: UnknownNodeType| ReadDbError::Serialisation(e.to_string()))?,
            name: row.try_get("name").map_err(decode_error)?,
            parent: parent.map(NodeId::new),
        })
    }

    fn secret_from_row(row: &SqliteRow) -> ReadDbResult<Secret> {
        let owner_type: String = row.try_get("owner_type").map_err(decode_error)?;
        let owner_type: NodeType = owner_type
            .parse()
            .map_err(|e: UnknownNodeType| ReadDbError::Serialisation(e.to_string()))?;
        let payload: String = row.try_get("payload").map_err(decode_error)?;
        let data: SecretData = serde_json::from_str(&payload)
            .map_err(|e| ReadDbError::Serialisation(format!("invalid secret payload: {e}")))?;

        Ok(Secret {
            id: SecretId::new(row.try_get::<String, _>("id").map_err(decode_error)?),
            name: row.try_get("name").map_err(decode_error)?,
            parent: ParentRef::new(
                owner_type,
                NodeId::new(row.try_get::<String, _>("owner_id").map_err(decode_error)?),
            ),
            data,
        })
    }
}

fn decode_error(e: sqlx::Error) -> ReadDbError {
    ReadDbError::Serialisation(format!("invalid row: {e}"))
}

fn query_error(e: sqlx::Error) -> ReadDbError {
    ReadDbError::Database(format!("query failed: {e}"))
}

#[async_trait]
impl ReadTx for SqliteTx {
    async fn node(&mut self, id: &NodeId) -> ReadDbResult<Option<Node>> {
        let tx = self.conn()?;
        let row = sqlx::query("SELECT id, node_type, name, parent_id FROM nodes WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut **tx)
            .await
            .map_err(query_error)?;

        row.as_ref().map(Self::node_from_row).transpose()
    }

    async fn child_by_name(
        &mut self,
        parent: Option<&NodeId>,
        node_type: NodeType,
        name: &str,
    ) -> ReadDbResult<Option<Node>> {
        let tx = self.conn()?;
        let row = sqlx::query(
            r"
            SELECT id, node_type, name, parent_id FROM nodes
            WHERE parent_id IS ? AND node_type = ? AND name = ?
            ",
        )
        .bind(parent.map(NodeId::as_str))
        .bind(node_type.as_str())
        .bind(name)
        .fetch_optional(&mut **tx)
        .await
        .map_err(query_error)?;

        row.as_ref().map(Self::node_from_row).transpose()
    }

    async fn secret(&mut self, id: &SecretId) -> ReadDbResult<Option<Secret>> {
        let tx = self.conn()?;
        let row = sqlx::query(
            "SELECT id, name, owner_type, owner_id, payload FROM secrets WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&mut **tx)
        .await
        .map_err(query_error)?;

        row.as_ref().map(Self::secret_from_row).transpose()
    }

    async fn secret_by_name(
        &mut self,
        owner: &NodeId,
        name: &str,
    ) -> ReadDbResult<Option<Secret>> {
        let tx = self.conn()?;
        let row = sqlx::query(
            r"
            SELECT id, name, owner_type, owner_id, payload FROM secrets
            WHERE owner_id = ? AND name = ?
            ",
        )
        .bind(owner.as_str())
        .bind(name)
        .fetch_optional(&mut **tx)
        .await
        .map_err(query_error)?;

        row.as_ref().map(Self::secret_from_row).transpose()
    }

    async fn secrets_owned_by(&mut self, owner: &NodeId) -> ReadDbResult<Vec<Secret>> {
        let tx = self.conn()?;
        let rows = sqlx::query(
            r"
            SELECT id, name, owner_type, owner_id, payload FROM secrets
            WHERE owner_id = ?
            ORDER BY name
            ",
        )
        .bind(owner.as_str())
        .fetch_all(&mut **tx)
        .await
        .map_err(query_error)?;

        rows.iter().map(Self::secret_from_row).collect()
    }

    async fn release(&mut self) -> ReadDbResult<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback()
                .await
                .map_err(|e| ReadDbError::Database(format!("failed to release snapshot: {e}")))?;
        }
        Ok(())
    }
}
