//! SQLite-backed assignment store.
//!
//! Table-backed durable storage: the `(experiment_id, actor_key)` primary
//! key with `INSERT OR IGNORE` is the unique-insert primitive, so
//! concurrent first calls (even from separate processes sharing the file)
//! agree on one variant. Blocking SQLite calls run on tokio's blocking pool.

use super::{Assignment, AssignmentStore, ConversionEvent, ConversionStore, Insertion};
use crate::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const SCHEMA_SQL: &str = r"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS assignments (
    experiment_id TEXT NOT NULL,
    actor_key TEXT NOT NULL,
    variant_id TEXT NOT NULL,
    assigned_at TEXT NOT NULL,
    PRIMARY KEY (experiment_id, actor_key)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS conversions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id TEXT NOT NULL,
    variant_id TEXT NOT NULL,
    actor_key TEXT NOT NULL,
    metric TEXT NOT NULL,
    value REAL,
    occurred_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversions_experiment
    ON conversions(experiment_id, id);
";

/// Durable assignment store on a SQLite database file.
///
/// # Example
///
/// ```rust,no_run
/// use splitbench::store::{AssignmentStore, SqliteAssignmentStore};
///
/// # async fn example() -> splitbench::Result<()> {
/// let store = SqliteAssignmentStore::open("assignments.db")?;
/// store.create_assignment_if_absent("exp-1", "user-1", "green").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SqliteAssignmentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAssignmentStore {
    /// Open (or create) a database file and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if the file cannot be opened or
    /// the schema cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX; // We handle our own locking
        let path = path.as_ref();
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            Error::store(format!("failed to open database at {}: {e}", path.display()))
        })?;
        Self::with_connection(conn)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StoreUnavailable`] if SQLite cannot be initialized.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL).map_err(sql_error)?;
        debug!("sqlite assignment store schema ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            op(&guard)
        })
        .await
        .map_err(|e| Error::store(format!("sqlite worker failed: {e}")))?
    }
}

#[allow(clippy::needless_pass_by_value)]
fn sql_error(err: rusqlite::Error) -> Error {
    Error::store(format!("sqlite: {err}"))
}

// Fixed-width so text order matches time order
fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::store(format!("corrupt timestamp {raw:?}: {e}")))
}

fn select_assignment(
    conn: &Connection,
    experiment_id: &str,
    actor_key: &str,
) -> Result<Option<Assignment>> {
    let row = conn
        .query_row(
            "SELECT variant_id, assigned_at FROM assignments
             WHERE experiment_id = ?1 AND actor_key = ?2",
            params![experiment_id, actor_key],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()
        .map_err(sql_error)?;

    row.map(|(variant_id, assigned_at)| {
        Ok(Assignment::at(
            experiment_id,
            actor_key,
            variant_id,
            parse_time(&assigned_at)?,
        ))
    })
    .transpose()
}

impl AssignmentStore for SqliteAssignmentStore {
    async fn get_assignment(&self, experiment_id: &str, actor_key: &str) -> Result<Option<Assignment>> {
        let experiment_id = experiment_id.to_string();
        let actor_key = actor_key.to_string();
        self.with_conn(move |conn| select_assignment(conn, &experiment_id, &actor_key))
            .await
    }

    async fn create_assignment_if_absent(
        &self,
        experiment_id: &str,
        actor_key: &str,
        variant_id: &str,
    ) -> Result<Insertion> {
        let candidate = Assignment::new(experiment_id, actor_key, variant_id);
        self.with_conn(move |conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO assignments
                     (experiment_id, actor_key, variant_id, assigned_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        candidate.experiment_id(),
                        candidate.actor_key(),
                        candidate.variant_id(),
                        format_time(candidate.assigned_at()),
                    ],
                )
                .map_err(sql_error)?;

            if inserted == 1 {
                return Ok(Insertion::Created(candidate));
            }
            select_assignment(conn, candidate.experiment_id(), candidate.actor_key())?
                .map(Insertion::Existing)
                .ok_or_else(|| Error::store("assignment vanished after conflicting insert"))
        })
        .await
    }

    async fn list_assignments(&self, experiment_id: &str) -> Result<Vec<Assignment>> {
        let experiment_id = experiment_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT actor_key, variant_id, assigned_at FROM assignments
                     WHERE experiment_id = ?1 ORDER BY assigned_at, actor_key",
                )
                .map_err(sql_error)?;
            let rows = stmt
                .query_map(params![experiment_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(sql_error)?;

            let mut assignments = Vec::new();
            for row in rows {
                let (actor_key, variant_id, assigned_at) = row.map_err(sql_error)?;
                assignments.push(Assignment::at(
                    experiment_id.as_str(),
                    actor_key,
                    variant_id,
                    parse_time(&assigned_at)?,
                ));
            }
            Ok(assignments)
        })
        .await
    }
}

impl ConversionStore for SqliteAssignmentStore {
    async fn record_conversion(&self, event: ConversionEvent) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO conversions
                 (experiment_id, variant_id, actor_key, metric, value, occurred_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.experiment_id(),
                    event.variant_id(),
                    event.actor_key(),
                    event.metric(),
                    event.value(),
                    format_time(event.occurred_at()),
                ],
            )
            .map_err(sql_error)?;
            Ok(())
        })
        .await
    }

    async fn list_conversions(&self, experiment_id: &str) -> Result<Vec<ConversionEvent>> {
        let experiment_id = experiment_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare_cached(
                    "SELECT variant_id, actor_key, metric, value, occurred_at FROM conversions
                     WHERE experiment_id = ?1 ORDER BY id",
                )
                .map_err(sql_error)?;
            let rows = stmt
                .query_map(params![experiment_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<f64>>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .map_err(sql_error)?;

            let mut events = Vec::new();
            for row in rows {
                let (variant_id, actor_key, metric, value, occurred_at) = row.map_err(sql_error)?;
                events.push(
                    ConversionEvent::new(experiment_id.as_str(), variant_id, actor_key, metric, value)
                        .occurred_at_time(parse_time(&occurred_at)?),
                );
            }
            Ok(events)
        })
        .await
    }
}
