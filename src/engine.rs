use crate::error::{MysqliteError, Result};
use crate::model::{Cell, EngineColumn, EngineRows, ExecSummary};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Source of per-connection sessions on the local engine.
pub trait Engine: Send + Sync {
    fn open_session(&self) -> Result<Box<dyn EngineSession>>;
}

/// One exclusively owned engine handle.
pub trait EngineSession: Send {
    fn query(&mut self, sql: &str, args: &[Cell]) -> Result<EngineRows>;
    fn exec(&mut self, sql: &str, args: &[Cell]) -> Result<ExecSummary>;
    fn close(self: Box<Self>) -> Result<()>;
}

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static MEMORY_DB_SEQ: AtomicU64 = AtomicU64::new(1);

/// Builds a `file:` URI for a named shared-cache in-memory database that is
/// unique within this process.
pub fn unique_memory_uri(prefix: &str) -> String {
    let seq = MEMORY_DB_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "file:{prefix}_{}_{seq}?mode=memory&cache=shared",
        std::process::id()
    )
}

fn open_flags() -> OpenFlags {
    OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX
}

pub struct SqliteEngine {
    target: String,
    // Backing directory of an in-memory engine, removed on drop.
    _scratch: Option<tempfile::TempDir>,
}

impl SqliteEngine {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let target = path
            .as_ref()
            .to_str()
            .ok_or_else(|| MysqliteError::Config("database path is not valid UTF-8".into()))?
            .to_string();
        // Fail on a bad path now rather than on the first client.
        let probe = Connection::open_with_flags(&target, open_flags())?;
        probe.close().map_err(|(_, e)| e)?;
        Ok(Self {
            target,
            _scratch: None,
        })
    }

    /// A throwaway WAL database in a private temp directory, gone with the
    /// engine. Not a shared-cache memory database: those lock whole tables
    /// across sessions.
    pub fn in_memory() -> Result<Self> {
        let scratch = tempfile::Builder::new().prefix("mysqlite").tempdir()?;
        let target = scratch
            .path()
            .join("main.db")
            .to_str()
            .ok_or_else(|| MysqliteError::Config("temp path is not valid UTF-8".into()))?
            .to_string();
        let conn = Connection::open_with_flags(&target, open_flags())?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(target = %target, journal_mode = %mode, "opened scratch database");
        conn.close().map_err(|(_, e)| e)?;
        Ok(Self {
            target,
            _scratch: Some(scratch),
        })
    }
}

impl Engine for SqliteEngine {
    fn open_session(&self) -> Result<Box<dyn EngineSession>> {
        let conn = Connection::open_with_flags(&self.target, open_flags())?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Box::new(SqliteSession { conn }))
    }
}

/// Writers serialize on SQLite's own file locks, waiting up to the busy
/// timeout.
pub struct SqliteSession {
    conn: Connection,
}

impl EngineSession for SqliteSession {
    fn query(&mut self, sql: &str, args: &[Cell]) -> Result<EngineRows> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<EngineColumn> = stmt
            .columns()
            .iter()
            .map(|c| EngineColumn {
                name: c.name().to_string(),
                decl_type: c.decl_type().map(str::to_string),
            })
            .collect();
        let width = columns.len();

        let mut rows = stmt.query(params_from_iter(args.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(Cell::from(row.get_ref(i)?));
            }
            out.push(values);
        }
        Ok(EngineRows { columns, rows: out })
    }

    fn exec(&mut self, sql: &str, args: &[Cell]) -> Result<ExecSummary> {
        let affected_rows = {
            let mut stmt = self.conn.prepare(sql)?;
            if stmt.column_count() == 0 {
                stmt.execute(params_from_iter(args.iter()))? as u64
            } else {
                // e.g. PRAGMA assignments that echo the new value
                let mut rows = stmt.query(params_from_iter(args.iter()))?;
                while rows.next()?.is_some() {}
                0
            }
        };
        Ok(ExecSummary {
            affected_rows,
            last_insert_id: self.conn.last_insert_rowid().max(0) as u64,
        })
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().map_err(|(_, e)| MysqliteError::Sqlite(e))
    }
}
