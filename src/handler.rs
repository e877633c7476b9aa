//! Per-connection session tracking and the single query path every protocol
//! command goes through.

use crate::auth::AuthStrategy;
use crate::classify::classify;
use crate::engine::{Engine, EngineSession};
use crate::error::{MysqliteError, Result};
use crate::mapper;
use crate::metadata::{self, Catalogs};
use crate::model::{Cell, ExecOutput};
use crate::rewrite::{mode_for, rewrite, Mode, Rewrite};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

type SharedSession = Arc<Mutex<Box<dyn EngineSession>>>;

struct Session {
    principal: String,
    handle: SharedSession,
    /// Fired by shutdown to end the connection's protocol loop.
    kill: Option<oneshot::Sender<()>>,
}

pub struct Handler {
    engine: Arc<dyn Engine>,
    auth: AuthStrategy,
    rewrite_mysql: bool,
    catalogs: Catalogs,
    // Holds the catalogs alive once bootstrapped; `Some` means done.
    catalog_keeper: Mutex<Option<Box<dyn EngineSession>>>,
    sessions: Mutex<HashMap<u32, Session>>,
    shutting_down: AtomicBool,
}

/// Registration of one live connection. Dropping it closes the session.
pub struct ConnectionGuard {
    handler: Arc<Handler>,
    conn_id: u32,
}

impl ConnectionGuard {
    pub fn conn_id(&self) -> u32 {
        self.conn_id
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.handler.connection_closed(self.conn_id);
    }
}

impl Handler {
    pub fn new(engine: Arc<dyn Engine>, auth: AuthStrategy, rewrite_mysql: bool) -> Self {
        Self {
            engine,
            auth,
            rewrite_mysql,
            catalogs: Catalogs::new(),
            catalog_keeper: Mutex::new(None),
            sessions: Mutex::new(HashMap::new()),
            shutting_down: AtomicBool::new(false),
        }
    }

    fn ensure_catalogs(&self) -> Result<()> {
        let mut keeper = self.catalog_keeper.lock();
        if keeper.is_some() {
            return Ok(());
        }
        let mut session = self.engine.open_session()?;
        if let Err(err) = metadata::bootstrap(session.as_mut(), &self.catalogs) {
            error!(error = %err, "metadata bootstrap failed");
            return Err(err);
        }
        *keeper = Some(session);
        Ok(())
    }

    /// Opens and registers the session of a new connection.
    pub fn new_connection(
        self: &Arc<Self>,
        conn_id: u32,
        kill: Option<oneshot::Sender<()>>,
    ) -> Result<ConnectionGuard> {
        if self.rewrite_mysql {
            self.ensure_catalogs()?;
        }
        let mut handle = self.engine.open_session().map_err(|err| {
            error!(conn_id, error = %err, "failed to open session");
            err
        })?;
        if self.rewrite_mysql {
            metadata::attach(handle.as_mut(), &self.catalogs)?;
        }
        {
            let mut sessions = self.sessions.lock();
            // close_all raises the flag before draining, under this lock
            if self.shutting_down.load(Ordering::Acquire) {
                drop(sessions);
                if let Err(err) = handle.close() {
                    error!(conn_id, error = %err, "failed to close session");
                }
                return Err(MysqliteError::NotStarted);
            }
            sessions.insert(
                conn_id,
                Session {
                    principal: String::new(),
                    handle: Arc::new(Mutex::new(handle)),
                    kill,
                },
            );
        }
        info!(conn_id, "connection opened");
        Ok(ConnectionGuard {
            handler: Arc::clone(self),
            conn_id,
        })
    }

    pub fn authenticate(
        &self,
        conn_id: u32,
        plugin: &str,
        user: &str,
        salt: &[u8],
        auth_data: &[u8],
    ) -> bool {
        let ok = self.auth.authenticate(plugin, user, salt, auth_data);
        if ok {
            self.set_principal(conn_id, user);
        } else {
            info!(conn_id, user, "authentication failed");
        }
        ok
    }

    pub fn set_principal(&self, conn_id: u32, user: &str) {
        if let Some(session) = self.sessions.lock().get_mut(&conn_id) {
            session.principal = user.to_string();
        }
    }

    /// Closes and forgets a connection's session.
    pub fn connection_closed(&self, conn_id: u32) {
        let Some(session) = self.sessions.lock().remove(&conn_id) else {
            if self.shutting_down.load(Ordering::Acquire) {
                debug!(conn_id, "session already closed by shutdown");
            } else {
                error!(conn_id, "no session to close");
            }
            return;
        };
        info!(conn_id, user = %session.principal, "connection closed");
        close_handle(conn_id, session.handle);
    }

    /// Ends every tracked connection and closes its session.
    pub fn close_all(&self) {
        self.shutting_down.store(true, Ordering::Release);
        let drained: Vec<(u32, Session)> = self.sessions.lock().drain().collect();
        for (conn_id, mut session) in drained {
            if let Some(kill) = session.kill.take() {
                let _ = kill.send(());
            }
            close_handle(conn_id, session.handle);
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    fn session_handle(&self, conn_id: u32) -> Result<SharedSession> {
        self.sessions
            .lock()
            .get(&conn_id)
            .map(|s| Arc::clone(&s.handle))
            .ok_or_else(|| MysqliteError::NotFound(format!("session {conn_id}")))
    }

    /// Classifies, rewrites and runs one statement on the connection's own
    /// session.
    pub fn run_query(&self, conn_id: u32, text: &str, args: Vec<Cell>) -> Result<ExecOutput> {
        let handle = self.session_handle(conn_id)?;
        let classified = classify(text);
        let kind = classified.kind;
        debug!(conn_id, ?kind, "classified");

        let plan = if self.rewrite_mysql {
            rewrite(classified, text, args)?
        } else {
            Rewrite::Run {
                sql: text.to_string(),
                args,
                mode: mode_for(kind, text),
            }
        };

        let Rewrite::Run { sql, args, mode } = plan else {
            return Ok(ExecOutput::empty_ok());
        };
        debug!(conn_id, sql = %sql, ?mode, "running");

        let mut session = handle.lock();
        match mode {
            Mode::Query => Ok(mapper::convert(session.query(&sql, &args)?)),
            Mode::Exec => {
                let summary = session.exec(&sql, &args)?;
                Ok(ExecOutput::Ok {
                    affected_rows: summary.affected_rows,
                    last_insert_id: summary.last_insert_id,
                    info: String::new(),
                })
            }
        }
    }

    pub fn com_query(&self, conn_id: u32, text: &str) -> Result<ExecOutput> {
        self.run_query(conn_id, text, Vec::new())
    }

    /// Runs a prepared statement with its already decoded parameters, in
    /// placeholder order.
    pub fn com_stmt_execute(&self, conn_id: u32, text: &str, args: Vec<Cell>) -> Result<ExecOutput> {
        self.run_query(conn_id, text, args)
    }

    pub fn com_register_replica(&self, _conn_id: u32) -> Result<()> {
        Err(MysqliteError::ReplicationNotSupported)
    }

    pub fn com_binlog_dump(&self, _conn_id: u32) -> Result<()> {
        Err(MysqliteError::ReplicationNotSupported)
    }

    pub fn com_binlog_dump_gtid(&self, _conn_id: u32) -> Result<()> {
        Err(MysqliteError::ReplicationNotSupported)
    }

    /// There is no warning subsystem.
    pub fn warning_count(&self, _conn_id: u32) -> u16 {
        0
    }
}

fn close_handle(conn_id: u32, handle: SharedSession) {
    match Arc::try_unwrap(handle) {
        Ok(session) => {
            if let Err(err) = session.into_inner().close() {
                error!(conn_id, error = %err, "failed to close session");
            }
        }
        // A statement is still running; the handle closes when it lets go.
        Err(_) => debug!(conn_id, "session busy, closing on release"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SqliteEngine;

    struct Fixture {
        _dir: tempfile::TempDir,
        handler: Arc<Handler>,
    }

    fn fixture(rewrite_mysql: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let engine = SqliteEngine::open(dir.path().join("handler.db")).unwrap();
        let handler = Arc::new(Handler::new(
            Arc::new(engine),
            AuthStrategy::AcceptAll,
            rewrite_mysql,
        ));
        Fixture {
            _dir: dir,
            handler,
        }
    }

    fn rows(out: ExecOutput) -> Vec<Vec<Cell>> {
        match out {
            ExecOutput::ResultSet { rows, .. } => rows,
            other => panic!("expected result set, got {other:?}"),
        }
    }

    fn affected(out: ExecOutput) -> u64 {
        match out {
            ExecOutput::Ok { affected_rows, .. } => affected_rows,
            other => panic!("expected ok, got {other:?}"),
        }
    }

    #[test]
    fn test_literal_functions_do_not_touch_catalog() {
        let f = fixture(true);
        let _conn = f.handler.new_connection(1, None).unwrap();
        let out = f.handler.com_query(1, "SELECT database(), user()").unwrap();
        assert_eq!(rows(out), vec![vec![Cell::from("main"), Cell::from("root")]]);
    }

    #[test]
    fn test_set_and_use_are_noops() {
        let f = fixture(true);
        let _conn = f.handler.new_connection(1, None).unwrap();
        for q in ["SET NAMES utf8mb4", "SET autocommit = 1", "USE whatever"] {
            assert_eq!(f.handler.com_query(1, q).unwrap(), ExecOutput::empty_ok(), "{q}");
        }
    }

    #[test]
    fn test_dml_reports_affected_rows() {
        let f = fixture(true);
        let _conn = f.handler.new_connection(1, None).unwrap();
        f.handler
            .com_query(1, "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        let out = f
            .handler
            .com_query(1, "INSERT INTO t (name) VALUES ('a'), ('b')")
            .unwrap();
        assert_eq!(affected(out), 2);

        let out = f
            .handler
            .com_stmt_execute(1, "SELECT name FROM t WHERE id = ?", vec![Cell::Int(2)])
            .unwrap();
        assert_eq!(rows(out), vec![vec![Cell::from("b")]]);
    }

    #[test]
    fn test_prepared_expression_is_sampled() {
        let f = fixture(true);
        let _conn = f.handler.new_connection(1, None).unwrap();
        let out = f
            .handler
            .com_stmt_execute(1, "SELECT ? + 1", vec![Cell::Int(41)])
            .unwrap();
        assert_eq!(rows(out), vec![vec![Cell::Int(42)]]);
    }

    #[test]
    fn test_prepared_arguments_follow_swapped_calls() {
        let f = fixture(true);
        let _conn = f.handler.new_connection(1, None).unwrap();
        let args = vec![Cell::from("b"), Cell::from("abc")];
        for q in ["SELECT LOCATE(?, ?)", "SELECT POSITION(? IN ?)"] {
            let out = f.handler.com_stmt_execute(1, q, args.clone()).unwrap();
            assert_eq!(rows(out), vec![vec![Cell::Int(2)]], "{q}");
        }

        let out = f
            .handler
            .com_stmt_execute(
                1,
                "SELECT GET_LOCK(?, ?), ?",
                vec![Cell::from("l"), Cell::Int(5), Cell::Int(9)],
            )
            .unwrap();
        assert_eq!(rows(out), vec![vec![Cell::Int(1), Cell::Int(9)]]);

        let out = f
            .handler
            .com_stmt_execute(1, "SELECT ?, MASTER_POS_WAIT(?, ?)", args)
            .unwrap();
        assert_eq!(rows(out), vec![vec![Cell::from("b"), Cell::Null]]);
    }

    #[test]
    fn test_in_memory_sessions_are_isolated() {
        let engine = SqliteEngine::in_memory().unwrap();
        let handler = Arc::new(Handler::new(
            Arc::new(engine),
            AuthStrategy::AcceptAll,
            true,
        ));
        let _a = handler.new_connection(1, None).unwrap();
        let _b = handler.new_connection(2, None).unwrap();
        handler
            .com_query(1, "CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .unwrap();
        handler.com_query(1, "BEGIN").unwrap();
        handler.com_query(1, "INSERT INTO t VALUES (1)").unwrap();

        let out = handler.com_query(2, "SELECT count(*) FROM t").unwrap();
        assert_eq!(rows(out), vec![vec![Cell::Int(0)]]);

        handler.com_query(1, "COMMIT").unwrap();
        let out = handler.com_query(2, "SELECT count(*) FROM t").unwrap();
        assert_eq!(rows(out), vec![vec![Cell::Int(1)]]);
    }

    #[test]
    fn test_engine_errors_surface() {
        let f = fixture(true);
        let _conn = f.handler.new_connection(1, None).unwrap();
        let err = f.handler.com_query(1, "SELECT * FROM missing").unwrap_err();
        assert_eq!(err.kind(), opensrv_mysql::ErrorKind::ER_NO_SUCH_TABLE);
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn test_closing_one_session_keeps_other_transaction() {
        let f = fixture(true);
        let first = f.handler.new_connection(1, None).unwrap();
        let second = f.handler.new_connection(2, None).unwrap();
        f.handler
            .com_query(1, "CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .unwrap();

        f.handler.com_query(1, "BEGIN").unwrap();
        f.handler.com_query(1, "INSERT INTO t VALUES (1)").unwrap();
        drop(second);
        assert_eq!(f.handler.session_count(), 1);

        f.handler.com_query(1, "INSERT INTO t VALUES (2)").unwrap();
        f.handler.com_query(1, "COMMIT").unwrap();
        let out = f.handler.com_query(1, "SELECT count(*) FROM t").unwrap();
        assert_eq!(rows(out), vec![vec![Cell::Int(2)]]);
        drop(first);
        assert_eq!(f.handler.session_count(), 0);
    }

    #[test]
    fn test_sessions_have_own_transactions() {
        let f = fixture(true);
        let _a = f.handler.new_connection(1, None).unwrap();
        let _b = f.handler.new_connection(2, None).unwrap();
        f.handler
            .com_query(1, "CREATE TABLE t (id INTEGER PRIMARY KEY)")
            .unwrap();
        f.handler.com_query(1, "BEGIN").unwrap();
        f.handler.com_query(1, "INSERT INTO t VALUES (1)").unwrap();

        let out = f.handler.com_query(2, "SELECT count(*) FROM t").unwrap();
        assert_eq!(rows(out), vec![vec![Cell::Int(0)]]);

        f.handler.com_query(1, "ROLLBACK").unwrap();
        let out = f.handler.com_query(1, "SELECT count(*) FROM t").unwrap();
        assert_eq!(rows(out), vec![vec![Cell::Int(0)]]);
    }

    #[test]
    fn test_catalogs_visible_to_every_session() {
        let f = fixture(true);
        let _a = f.handler.new_connection(1, None).unwrap();
        let _b = f.handler.new_connection(2, None).unwrap();
        for conn_id in [1, 2] {
            let out = f
                .handler
                .com_query(conn_id, "SELECT Host FROM mysql.user")
                .unwrap();
            assert_eq!(rows(out), vec![vec![Cell::from("localhost")]]);
        }
    }

    #[test]
    fn test_without_rewrite_statements_pass_through() {
        let f = fixture(false);
        let _conn = f.handler.new_connection(1, None).unwrap();
        let err = f.handler.com_query(1, "SELECT @@version").unwrap_err();
        assert!(matches!(err, MysqliteError::Sqlite(_)));
        let out = f.handler.com_query(1, "SELECT sqlite_version() IS NOT NULL").unwrap();
        assert_eq!(rows(out), vec![vec![Cell::Int(1)]]);
        assert!(f.handler.com_query(1, "SELECT 1 FROM mysql.user").is_err());
    }

    #[test]
    fn test_replication_is_rejected() {
        let f = fixture(true);
        let _conn = f.handler.new_connection(1, None).unwrap();
        assert!(matches!(
            f.handler.com_register_replica(1),
            Err(MysqliteError::ReplicationNotSupported)
        ));
        assert!(f.handler.com_binlog_dump(1).is_err());
        assert!(f.handler.com_binlog_dump_gtid(1).is_err());
        assert!(matches!(
            f.handler.com_query(1, "START SLAVE"),
            Err(MysqliteError::ReplicationNotSupported)
        ));
        assert_eq!(f.handler.warning_count(1), 0);
    }

    #[test]
    fn test_close_all_fires_kill_switches() {
        let f = fixture(true);
        let (tx, mut rx) = oneshot::channel();
        let conn = f.handler.new_connection(1, Some(tx)).unwrap();

        f.handler.close_all();
        assert!(rx.try_recv().is_ok());
        assert_eq!(f.handler.session_count(), 0);
        // The late close from the connection itself is harmless.
        drop(conn);
        assert!(matches!(
            f.handler.com_query(1, "SELECT 1"),
            Err(MysqliteError::NotFound(_))
        ));
    }
}
