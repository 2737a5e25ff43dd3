use crate::types::{AppError, Result};
use libsql::params::IntoParams;
use libsql::{Builder, Connection, Database, Row, Rows, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};

/// Durable store for every OpenLab entity.
///
/// All access goes through one libsql connection guarded by an async mutex.
/// Reads take the lock for the duration of a [`StoreConn`]; writes open a
/// `BEGIN IMMEDIATE` transaction on it, so at most one transaction is ever in
/// flight and transactions are serializable.
pub struct EntityStore {
    conn: Mutex<Connection>,
    /// Set when a transaction guard was dropped without commit or rollback.
    needs_rollback: AtomicBool,
    _db: Database,
}

impl EntityStore {
    /// Ephemeral in-memory database, used by tests and `DATABASE_PATH=:memory:`.
    pub async fn new_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to open in-memory database: {}", e)))?;
        Self::from_database(db).await
    }

    pub async fn new_local(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Database(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to open database '{}': {}", path, e)))?;
        Self::from_database(db).await
    }

    #[cfg(feature = "turso")]
    pub async fn new_remote(url: String, auth_token: String) -> Result<Self> {
        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Turso: {}", e)))?;
        Self::from_database(db).await
    }

    async fn from_database(db: Database) -> Result<Self> {
        let conn = db
            .connect()
            .map_err(|e| AppError::Database(format!("Failed to get connection: {}", e)))?;

        for statement in super::schema::SCHEMA {
            conn.execute(statement, ())
                .await
                .map_err(|e| AppError::Database(format!("Failed to initialize schema: {}", e)))?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
            needs_rollback: AtomicBool::new(false),
            _db: db,
        })
    }

    async fn acquire(&self) -> MutexGuard<'_, Connection> {
        let conn = self.conn.lock().await;
        if self.needs_rollback.swap(false, Ordering::AcqRel) {
            tracing::warn!("rolling back transaction abandoned by a cancelled caller");
            if let Err(e) = conn.execute("ROLLBACK", ()).await {
                tracing::debug!(error = %e, "rollback of abandoned transaction failed");
            }
        }
        conn
    }

    /// Exclusive read access outside a transaction.
    pub async fn read(&self) -> Result<StoreConn<'_>> {
        Ok(StoreConn {
            conn: self.acquire().await,
            needs_rollback: &self.needs_rollback,
            in_tx: false,
        })
    }

    /// Opens a write transaction. Finish it with [`StoreConn::finish`],
    /// [`StoreConn::commit`] or [`StoreConn::rollback`].
    pub async fn begin(&self) -> Result<StoreConn<'_>> {
        let conn = self.acquire().await;
        conn.execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        Ok(StoreConn {
            conn,
            needs_rollback: &self.needs_rollback,
            in_tx: true,
        })
    }
}

/// A locked handle on the store connection, optionally inside a transaction.
///
/// Repository methods for each entity are implemented on this type in the
/// sibling modules.
pub struct StoreConn<'a> {
    conn: MutexGuard<'a, Connection>,
    needs_rollback: &'a AtomicBool,
    in_tx: bool,
}

impl StoreConn<'_> {
    pub fn in_transaction(&self) -> bool {
        self.in_tx
    }

    pub(crate) async fn execute(&self, sql: &str, params: impl IntoParams) -> Result<u64> {
        self.conn
            .execute(sql, params)
            .await
            .map_err(|e| AppError::Database(format!("Statement failed: {}", e)))
    }

    pub(crate) async fn query(&self, sql: &str, params: impl IntoParams) -> Result<Rows> {
        self.conn
            .query(sql, params)
            .await
            .map_err(|e| AppError::Database(format!("Query failed: {}", e)))
    }

    /// Runs `sql` and decodes every row with `decode`.
    pub(crate) async fn query_all<T>(
        &self,
        sql: &str,
        params: impl IntoParams,
        decode: fn(&Row) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut rows = self.query(sql, params).await?;
        let mut out = Vec::new();
        while let Some(row) = next_row(&mut rows).await? {
            out.push(decode(&row)?);
        }
        Ok(out)
    }

    pub(crate) async fn query_opt<T>(
        &self,
        sql: &str,
        params: impl IntoParams,
        decode: fn(&Row) -> Result<T>,
    ) -> Result<Option<T>> {
        let mut rows = self.query(sql, params).await?;
        match next_row(&mut rows).await? {
            Some(row) => Ok(Some(decode(&row)?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn query_count(&self, sql: &str, params: impl IntoParams) -> Result<i64> {
        Ok(self.query_opt(sql, params, |row| int(row, 0)).await?.unwrap_or(0))
    }

    pub async fn commit(mut self) -> Result<()> {
        if !self.in_tx {
            return Ok(());
        }
        self.conn
            .execute("COMMIT", ())
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit transaction: {}", e)))?;
        self.in_tx = false;
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<()> {
        if !self.in_tx {
            return Ok(());
        }
        self.conn
            .execute("ROLLBACK", ())
            .await
            .map_err(|e| AppError::Database(format!("Failed to roll back transaction: {}", e)))?;
        self.in_tx = false;
        Ok(())
    }

    /// Commits on `Ok`, rolls back on `Err`, and passes the result through.
    pub async fn finish<T>(self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rb) = self.rollback().await {
                    tracing::warn!(error = %rb, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

impl Drop for StoreConn<'_> {
    fn drop(&mut self) {
        if self.in_tx {
            self.needs_rollback.store(true, Ordering::Release);
        }
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ============= Row decoding =============

pub(crate) async fn next_row(rows: &mut Rows) -> Result<Option<Row>> {
    rows.next()
        .await
        .map_err(|e| AppError::Database(format!("Failed to read row: {}", e)))
}

fn value(row: &Row, idx: i32) -> Result<Value> {
    row.get_value(idx)
        .map_err(|e| AppError::Database(format!("Failed to read column {}: {}", idx, e)))
}

pub(crate) fn text(row: &Row, idx: i32) -> Result<String> {
    match value(row, idx)? {
        Value::Text(s) => Ok(s),
        Value::Integer(i) => Ok(i.to_string()),
        other => Err(AppError::Database(format!(
            "column {} is not text: {:?}",
            idx, other
        ))),
    }
}

pub(crate) fn opt_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match value(row, idx)? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(AppError::Database(format!(
            "column {} is not text: {:?}",
            idx, other
        ))),
    }
}

pub(crate) fn int(row: &Row, idx: i32) -> Result<i64> {
    match value(row, idx)? {
        Value::Integer(i) => Ok(i),
        other => Err(AppError::Database(format!(
            "column {} is not an integer: {:?}",
            idx, other
        ))),
    }
}

pub(crate) fn opt_int(row: &Row, idx: i32) -> Result<Option<i64>> {
    match value(row, idx)? {
        Value::Null => Ok(None),
        Value::Integer(i) => Ok(Some(i)),
        other => Err(AppError::Database(format!(
            "column {} is not an integer: {:?}",
            idx, other
        ))),
    }
}

/// Decodes a wire-named enum column.
pub(crate) fn parsed<T>(row: &Row, idx: i32) -> Result<T>
where
    T: std::str::FromStr<Err = AppError>,
{
    text(row, idx)?.parse()
}

/// Decodes a JSON column.
pub(crate) fn json<T: serde::de::DeserializeOwned>(row: &Row, idx: i32) -> Result<T> {
    let raw = text(row, idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| AppError::Database(format!("Malformed JSON in column {}: {}", idx, e)))
}

pub(crate) fn opt_json<T: serde::de::DeserializeOwned>(row: &Row, idx: i32) -> Result<Option<T>> {
    match opt_text(row, idx)? {
        Some(raw) => serde_json::from_str(&raw).map(Some).map_err(|e| {
            AppError::Database(format!("Malformed JSON in column {}: {}", idx, e))
        }),
        None => Ok(None),
    }
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}
