//! `information_schema` and `mysql` catalogs emulated with views over SQLite's
//! introspection pragmas.
//!
//! Both catalogs live in named shared-cache in-memory databases. The views are
//! created once per server; every session only attaches them.

use crate::engine::{unique_memory_uri, EngineSession};
use crate::error::Result;
use crate::model::Cell;
use tracing::debug;

pub const INFORMATION_SCHEMA: &str = "information_schema";
pub const MYSQL_SCHEMA: &str = "mysql";

/// Locations of the two companion catalogs.
#[derive(Debug, Clone)]
pub struct Catalogs {
    information_schema: String,
    mysql: String,
}

impl Catalogs {
    pub fn new() -> Self {
        Self {
            information_schema: unique_memory_uri("mysqlite_information_schema"),
            mysql: unique_memory_uri("mysqlite_mysql"),
        }
    }

    fn entries(&self) -> [(&'static str, &str); 2] {
        [
            (INFORMATION_SCHEMA, self.information_schema.as_str()),
            (MYSQL_SCHEMA, self.mysql.as_str()),
        ]
    }
}

impl Default for Catalogs {
    fn default() -> Self {
        Self::new()
    }
}

const USER_TABLES: &str = r"tl.type <> 'shadow' AND tl.name NOT LIKE 'sqlite\_%' ESCAPE '\'";

const IS_TEXT: &str = "(ti.type LIKE '%CHAR%' OR ti.type LIKE '%CLOB%' OR ti.type LIKE '%TEXT%')";

const IS_INT: &str = "(ti.type LIKE '%INT%')";

const IS_REAL: &str = "(ti.type LIKE '%REAL%' OR ti.type LIKE '%FLOA%' OR ti.type LIKE '%DOUB%')";

const DATA_TYPE: &str = "CASE
        WHEN {is_int} THEN 'bigint'
        WHEN {is_text} THEN 'varchar'
        WHEN ti.type = '' OR ti.type LIKE '%BLOB%' THEN 'blob'
        WHEN {is_real} THEN 'double'
        WHEN instr(ti.type, '(') > 0 THEN lower(rtrim(substr(ti.type, 1, instr(ti.type, '(') - 1)))
        ELSE lower(ti.type)
    END";

const TABLES: &str = "SELECT
    'def' AS TABLE_CATALOG,
    tl.schema AS TABLE_SCHEMA,
    tl.name AS TABLE_NAME,
    CASE
        WHEN tl.schema IN ('information_schema', 'mysql') THEN 'SYSTEM VIEW'
        WHEN tl.type = 'view' THEN 'VIEW'
        ELSE 'BASE TABLE'
    END AS TABLE_TYPE,
    'SQLite' AS ENGINE,
    10 AS VERSION,
    'Dynamic' AS ROW_FORMAT,
    0 AS TABLE_ROWS,
    0 AS AVG_ROW_LENGTH,
    0 AS DATA_LENGTH,
    0 AS MAX_DATA_LENGTH,
    0 AS INDEX_LENGTH,
    0 AS DATA_FREE,
    NULL AS AUTO_INCREMENT,
    '1970-01-01 00:00:00' AS CREATE_TIME,
    NULL AS UPDATE_TIME,
    NULL AS CHECK_TIME,
    'utf8mb4_general_ci' AS TABLE_COLLATION,
    NULL AS CHECKSUM,
    '' AS CREATE_OPTIONS,
    '' AS TABLE_COMMENT
FROM pragma_table_list tl
WHERE {user_tables}";

const COLUMNS: &str = "SELECT
    'def' AS TABLE_CATALOG,
    tl.schema AS TABLE_SCHEMA,
    tl.name AS TABLE_NAME,
    ti.name AS COLUMN_NAME,
    ti.cid + 1 AS ORDINAL_POSITION,
    ti.dflt_value AS COLUMN_DEFAULT,
    iif(ti.\"notnull\" OR ti.pk > 0, 'NO', 'YES') AS IS_NULLABLE,
    {data_type} AS DATA_TYPE,
    iif({is_text}, 65535, NULL) AS CHARACTER_MAXIMUM_LENGTH,
    iif({is_text}, 262140, NULL) AS CHARACTER_OCTET_LENGTH,
    iif({is_int}, 19, iif({is_real}, 22, NULL)) AS NUMERIC_PRECISION,
    iif({is_int}, 0, NULL) AS NUMERIC_SCALE,
    NULL AS DATETIME_PRECISION,
    iif({is_text}, 'utf8mb4', NULL) AS CHARACTER_SET_NAME,
    iif({is_text}, 'utf8mb4_general_ci', NULL) AS COLLATION_NAME,
    lower(iif(ti.type = '', 'blob', ti.type)) AS COLUMN_TYPE,
    iif(ti.pk > 0, 'PRI', '') AS COLUMN_KEY,
    '' AS EXTRA,
    'select,insert,update,references' AS PRIVILEGES,
    '' AS COLUMN_COMMENT,
    '' AS GENERATION_EXPRESSION,
    NULL AS SRS_ID
FROM pragma_table_list tl, pragma_table_info(tl.name, tl.schema) ti
WHERE {user_tables}";

const STATISTICS: &str = "SELECT
    'def' AS TABLE_CATALOG,
    tl.schema AS TABLE_SCHEMA,
    tl.name AS TABLE_NAME,
    0 AS NON_UNIQUE,
    tl.schema AS INDEX_SCHEMA,
    'PRIMARY' AS INDEX_NAME,
    ti.pk AS SEQ_IN_INDEX,
    ti.name AS COLUMN_NAME,
    'A' AS COLLATION,
    0 AS CARDINALITY,
    NULL AS SUB_PART,
    NULL AS PACKED,
    '' AS NULLABLE,
    'BTREE' AS INDEX_TYPE,
    '' AS COMMENT,
    '' AS INDEX_COMMENT,
    'YES' AS IS_VISIBLE,
    NULL AS EXPRESSION
FROM pragma_table_list tl, pragma_table_info(tl.name, tl.schema) ti
WHERE {user_tables} AND tl.type = 'table' AND ti.pk > 0
UNION ALL
SELECT
    'def', tl.schema, tl.name, iif(il.\"unique\", 0, 1), tl.schema, il.name,
    ii.seqno + 1, ii.name, 'A', 0, NULL, NULL, 'YES', 'BTREE', '', '', 'YES', NULL
FROM pragma_table_list tl,
    pragma_index_list(tl.name, tl.schema) il,
    pragma_index_info(il.name, tl.schema) ii
WHERE {user_tables} AND tl.type = 'table' AND il.origin <> 'pk'";

const KEY_COLUMN_USAGE: &str = "SELECT
    'def' AS CONSTRAINT_CATALOG,
    tl.schema AS CONSTRAINT_SCHEMA,
    'PRIMARY' AS CONSTRAINT_NAME,
    'def' AS TABLE_CATALOG,
    tl.schema AS TABLE_SCHEMA,
    tl.name AS TABLE_NAME,
    ti.name AS COLUMN_NAME,
    ti.pk AS ORDINAL_POSITION,
    NULL AS POSITION_IN_UNIQUE_CONSTRAINT,
    NULL AS REFERENCED_TABLE_SCHEMA,
    NULL AS REFERENCED_TABLE_NAME,
    NULL AS REFERENCED_COLUMN_NAME
FROM pragma_table_list tl, pragma_table_info(tl.name, tl.schema) ti
WHERE {user_tables} AND tl.type = 'table' AND ti.pk > 0
UNION ALL
SELECT
    'def', tl.schema, tl.name || '_ibfk_' || (fk.id + 1), 'def', tl.schema, tl.name,
    fk.\"from\", fk.seq + 1, fk.seq + 1, tl.schema, fk.\"table\", fk.\"to\"
FROM pragma_table_list tl, pragma_foreign_key_list(tl.name, tl.schema) fk
WHERE {user_tables} AND tl.type = 'table'";

const TABLE_CONSTRAINTS: &str = "SELECT DISTINCT
    'def' AS CONSTRAINT_CATALOG,
    tl.schema AS CONSTRAINT_SCHEMA,
    'PRIMARY' AS CONSTRAINT_NAME,
    tl.schema AS TABLE_SCHEMA,
    tl.name AS TABLE_NAME,
    'PRIMARY KEY' AS CONSTRAINT_TYPE,
    'YES' AS ENFORCED
FROM pragma_table_list tl, pragma_table_info(tl.name, tl.schema) ti
WHERE {user_tables} AND tl.type = 'table' AND ti.pk > 0
UNION ALL
SELECT 'def', tl.schema, il.name, tl.schema, tl.name, 'UNIQUE', 'YES'
FROM pragma_table_list tl, pragma_index_list(tl.name, tl.schema) il
WHERE {user_tables} AND tl.type = 'table' AND il.origin = 'u'
UNION ALL
SELECT DISTINCT 'def', tl.schema, tl.name || '_ibfk_' || (fk.id + 1), tl.schema, tl.name, 'FOREIGN KEY', 'YES'
FROM pragma_table_list tl, pragma_foreign_key_list(tl.name, tl.schema) fk
WHERE {user_tables} AND tl.type = 'table'";

const REFERENTIAL_CONSTRAINTS: &str = "SELECT DISTINCT
    'def' AS CONSTRAINT_CATALOG,
    tl.schema AS CONSTRAINT_SCHEMA,
    tl.name || '_ibfk_' || (fk.id + 1) AS CONSTRAINT_NAME,
    'def' AS UNIQUE_CONSTRAINT_CATALOG,
    tl.schema AS UNIQUE_CONSTRAINT_SCHEMA,
    'PRIMARY' AS UNIQUE_CONSTRAINT_NAME,
    'NONE' AS MATCH_OPTION,
    fk.on_update AS UPDATE_RULE,
    fk.on_delete AS DELETE_RULE,
    tl.name AS TABLE_NAME,
    fk.\"table\" AS REFERENCED_TABLE_NAME
FROM pragma_table_list tl, pragma_foreign_key_list(tl.name, tl.schema) fk
WHERE {user_tables} AND tl.type = 'table'";

const SCHEMATA: &str = "SELECT
    'def' AS CATALOG_NAME,
    name AS SCHEMA_NAME,
    'utf8mb4' AS DEFAULT_CHARACTER_SET_NAME,
    'utf8mb4_general_ci' AS DEFAULT_COLLATION_NAME,
    NULL AS SQL_PATH,
    'NO' AS DEFAULT_ENCRYPTION
FROM pragma_database_list";

// View bodies live in each schema's own sqlite_schema, which a view in this
// catalog cannot reach, so VIEW_DEFINITION stays NULL.
const VIEWS: &str = "SELECT
    'def' AS TABLE_CATALOG,
    tl.schema AS TABLE_SCHEMA,
    tl.name AS TABLE_NAME,
    NULL AS VIEW_DEFINITION,
    'NONE' AS CHECK_OPTION,
    'NO' AS IS_UPDATABLE,
    'root@localhost' AS DEFINER,
    'INVOKER' AS SECURITY_TYPE,
    'utf8mb4' AS CHARACTER_SET_CLIENT,
    'utf8mb4_general_ci' AS COLLATION_CONNECTION
FROM pragma_table_list tl
WHERE tl.type = 'view'";

const PARTITIONS: &str = "SELECT
    'def' AS TABLE_CATALOG,
    tl.schema AS TABLE_SCHEMA,
    tl.name AS TABLE_NAME,
    NULL AS PARTITION_NAME,
    NULL AS SUBPARTITION_NAME,
    NULL AS PARTITION_ORDINAL_POSITION,
    NULL AS SUBPARTITION_ORDINAL_POSITION,
    NULL AS PARTITION_METHOD,
    NULL AS SUBPARTITION_METHOD,
    NULL AS PARTITION_EXPRESSION,
    NULL AS SUBPARTITION_EXPRESSION,
    NULL AS PARTITION_DESCRIPTION,
    0 AS TABLE_ROWS,
    0 AS AVG_ROW_LENGTH,
    0 AS DATA_LENGTH,
    0 AS MAX_DATA_LENGTH,
    0 AS INDEX_LENGTH,
    0 AS DATA_FREE,
    '1970-01-01 00:00:00' AS CREATE_TIME,
    NULL AS UPDATE_TIME,
    NULL AS CHECK_TIME,
    NULL AS CHECKSUM,
    '' AS PARTITION_COMMENT,
    '' AS NODEGROUP,
    NULL AS TABLESPACE_NAME
FROM pragma_table_list tl
WHERE {user_tables}";

const COLLATIONS: &str = "SELECT
    column1 AS COLLATION_NAME,
    column2 AS CHARACTER_SET_NAME,
    column3 AS ID,
    column4 AS IS_DEFAULT,
    column5 AS IS_COMPILED,
    column6 AS SORTLEN,
    column7 AS PAD_ATTRIBUTE
FROM (VALUES
    ('BINARY', 'utf8mb4', 63, 'Yes', 'Yes', 1, 'NO PAD'),
    ('NOCASE', 'utf8mb4', 45, '', 'Yes', 1, 'NO PAD'),
    ('RTRIM', 'utf8mb4', 46, '', 'Yes', 1, 'PAD SPACE'))";

const CHARACTER_SETS: &str = "SELECT
    'utf8mb4' AS CHARACTER_SET_NAME,
    'BINARY' AS DEFAULT_COLLATE_NAME,
    'UTF-8 Unicode' AS DESCRIPTION,
    4 AS MAXLEN";

const ENGINES: &str = "SELECT
    'SQLite' AS ENGINE,
    'DEFAULT' AS SUPPORT,
    'SQLite storage engine' AS COMMENT,
    'YES' AS TRANSACTIONS,
    'NO' AS XA,
    'YES' AS SAVEPOINTS";

const TRIGGERS: &str = "SELECT
    'def' AS TRIGGER_CATALOG,
    '' AS TRIGGER_SCHEMA,
    '' AS TRIGGER_NAME,
    '' AS EVENT_MANIPULATION,
    'def' AS EVENT_OBJECT_CATALOG,
    '' AS EVENT_OBJECT_SCHEMA,
    '' AS EVENT_OBJECT_TABLE,
    0 AS ACTION_ORDER,
    NULL AS ACTION_CONDITION,
    '' AS ACTION_STATEMENT,
    'ROW' AS ACTION_ORIENTATION,
    '' AS ACTION_TIMING,
    NULL AS ACTION_REFERENCE_OLD_TABLE,
    NULL AS ACTION_REFERENCE_NEW_TABLE,
    'OLD' AS ACTION_REFERENCE_OLD_ROW,
    'NEW' AS ACTION_REFERENCE_NEW_ROW,
    NULL AS CREATED,
    '' AS SQL_MODE,
    '' AS DEFINER,
    'utf8mb4' AS CHARACTER_SET_CLIENT,
    'utf8mb4_general_ci' AS COLLATION_CONNECTION,
    'utf8mb4_general_ci' AS DATABASE_COLLATION
WHERE 0";

const ROUTINES: &str = "SELECT
    '' AS SPECIFIC_NAME,
    'def' AS ROUTINE_CATALOG,
    '' AS ROUTINE_SCHEMA,
    '' AS ROUTINE_NAME,
    '' AS ROUTINE_TYPE,
    '' AS DATA_TYPE,
    NULL AS CHARACTER_MAXIMUM_LENGTH,
    NULL AS CHARACTER_OCTET_LENGTH,
    NULL AS NUMERIC_PRECISION,
    NULL AS NUMERIC_SCALE,
    NULL AS DATETIME_PRECISION,
    NULL AS CHARACTER_SET_NAME,
    NULL AS COLLATION_NAME,
    NULL AS DTD_IDENTIFIER,
    'SQL' AS ROUTINE_BODY,
    NULL AS ROUTINE_DEFINITION,
    NULL AS EXTERNAL_NAME,
    NULL AS EXTERNAL_LANGUAGE,
    'SQL' AS PARAMETER_STYLE,
    'NO' AS IS_DETERMINISTIC,
    'CONTAINS SQL' AS SQL_DATA_ACCESS,
    NULL AS SQL_PATH,
    'DEFINER' AS SECURITY_TYPE,
    NULL AS CREATED,
    NULL AS LAST_ALTERED,
    '' AS SQL_MODE,
    '' AS ROUTINE_COMMENT,
    '' AS DEFINER,
    'utf8mb4' AS CHARACTER_SET_CLIENT,
    'utf8mb4_general_ci' AS COLLATION_CONNECTION,
    'utf8mb4_general_ci' AS DATABASE_COLLATION
WHERE 0";

const EVENTS: &str = "SELECT
    'def' AS EVENT_CATALOG,
    '' AS EVENT_SCHEMA,
    '' AS EVENT_NAME,
    '' AS DEFINER,
    'SYSTEM' AS TIME_ZONE,
    'SQL' AS EVENT_BODY,
    '' AS EVENT_DEFINITION,
    '' AS EVENT_TYPE,
    NULL AS EXECUTE_AT,
    NULL AS INTERVAL_VALUE,
    NULL AS INTERVAL_FIELD,
    '' AS SQL_MODE,
    NULL AS STARTS,
    NULL AS ENDS,
    'DISABLED' AS STATUS,
    'NOT PRESERVE' AS ON_COMPLETION,
    NULL AS CREATED,
    NULL AS LAST_ALTERED,
    NULL AS LAST_EXECUTED,
    '' AS EVENT_COMMENT,
    0 AS ORIGINATOR,
    'utf8mb4' AS CHARACTER_SET_CLIENT,
    'utf8mb4_general_ci' AS COLLATION_CONNECTION,
    'utf8mb4_general_ci' AS DATABASE_COLLATION
WHERE 0";

const TABLE_PRIVILEGES: &str = "SELECT
    '' AS GRANTEE,
    'def' AS TABLE_CATALOG,
    '' AS TABLE_SCHEMA,
    '' AS TABLE_NAME,
    '' AS PRIVILEGE_TYPE,
    'NO' AS IS_GRANTABLE
WHERE 0";

const COLUMN_PRIVILEGES: &str = "SELECT
    '' AS GRANTEE,
    'def' AS TABLE_CATALOG,
    '' AS TABLE_SCHEMA,
    '' AS TABLE_NAME,
    '' AS COLUMN_NAME,
    '' AS PRIVILEGE_TYPE,
    'NO' AS IS_GRANTABLE
WHERE 0";

const USER_PRIVILEGES: &str = "SELECT
    '' AS GRANTEE,
    'def' AS TABLE_CATALOG,
    '' AS PRIVILEGE_TYPE,
    'NO' AS IS_GRANTABLE
WHERE 0";

const SCHEMA_PRIVILEGES: &str = "SELECT
    '' AS GRANTEE,
    'def' AS TABLE_CATALOG,
    '' AS TABLE_SCHEMA,
    '' AS PRIVILEGE_TYPE,
    'NO' AS IS_GRANTABLE
WHERE 0";

// Found by unqualified name lookup, which searches attached databases too.
const DUAL: &str = "SELECT 'X' AS DUMMY";

const INFORMATION_SCHEMA_VIEWS: &[(&str, &str)] = &[
    ("TABLES", TABLES),
    ("COLUMNS", COLUMNS),
    ("STATISTICS", STATISTICS),
    ("KEY_COLUMN_USAGE", KEY_COLUMN_USAGE),
    ("SCHEMATA", SCHEMATA),
    ("VIEWS", VIEWS),
    ("TABLE_CONSTRAINTS", TABLE_CONSTRAINTS),
    ("REFERENTIAL_CONSTRAINTS", REFERENTIAL_CONSTRAINTS),
    ("PARTITIONS", PARTITIONS),
    ("COLLATIONS", COLLATIONS),
    ("CHARACTER_SETS", CHARACTER_SETS),
    ("ENGINES", ENGINES),
    ("TRIGGERS", TRIGGERS),
    ("ROUTINES", ROUTINES),
    ("EVENTS", EVENTS),
    ("TABLE_PRIVILEGES", TABLE_PRIVILEGES),
    ("COLUMN_PRIVILEGES", COLUMN_PRIVILEGES),
    ("USER_PRIVILEGES", USER_PRIVILEGES),
    ("SCHEMA_PRIVILEGES", SCHEMA_PRIVILEGES),
    ("dual", DUAL),
];

const PRIVILEGE_COLUMNS: &[&str] = &[
    "Select_priv",
    "Insert_priv",
    "Update_priv",
    "Delete_priv",
    "Create_priv",
    "Drop_priv",
    "Reload_priv",
    "Shutdown_priv",
    "Process_priv",
    "File_priv",
    "Grant_priv",
    "References_priv",
    "Index_priv",
    "Alter_priv",
    "Show_db_priv",
    "Super_priv",
    "Create_tmp_table_priv",
    "Lock_tables_priv",
    "Execute_priv",
    "Repl_slave_priv",
    "Repl_client_priv",
    "Create_view_priv",
    "Show_view_priv",
    "Create_routine_priv",
    "Alter_routine_priv",
    "Create_user_priv",
    "Event_priv",
    "Trigger_priv",
    "Create_tablespace_priv",
    "Create_role_priv",
    "Drop_role_priv",
];

const USER_TRAILER: &str = "'' AS ssl_type,
    '' AS ssl_cipher,
    '' AS x509_issuer,
    '' AS x509_subject,
    0 AS max_questions,
    0 AS max_updates,
    0 AS max_connections,
    0 AS max_user_connections,
    'mysql_native_password' AS plugin,
    '' AS authentication_string,
    'N' AS password_expired,
    '1970-01-01 00:00:00' AS password_last_changed,
    NULL AS password_lifetime,
    'N' AS account_locked,
    NULL AS Password_reuse_history,
    NULL AS Password_reuse_time,
    NULL AS Password_require_current,
    NULL AS User_attributes";

const DB: &str = "SELECT
    '' AS Host,
    '' AS Db,
    '' AS User,
    'N' AS Select_priv,
    'N' AS Insert_priv,
    'N' AS Update_priv,
    'N' AS Delete_priv
WHERE 0";

const PROCS_PRIV: &str = "SELECT
    '' AS Host,
    '' AS Db,
    '' AS User,
    '' AS Routine_name,
    '' AS Routine_type,
    '' AS Grantor,
    '' AS Proc_priv,
    '' AS Timestamp
WHERE 0";

const ROLE_EDGES: &str = "SELECT
    '' AS FROM_HOST,
    '' AS FROM_USER,
    '' AS TO_HOST,
    '' AS TO_USER,
    'N' AS WITH_ADMIN_OPTION
WHERE 0";

fn user_view() -> String {
    let privileges: Vec<String> = PRIVILEGE_COLUMNS
        .iter()
        .map(|c| format!("'Y' AS {c}"))
        .collect();
    format!(
        "SELECT
    'localhost' AS Host,
    'root' AS User,
    {},
    {USER_TRAILER}",
        privileges.join(",\n    ")
    )
}

fn expand(body: &str) -> String {
    body.replace("{data_type}", DATA_TYPE)
        .replace("{is_text}", IS_TEXT)
        .replace("{is_int}", IS_INT)
        .replace("{is_real}", IS_REAL)
        .replace("{user_tables}", USER_TABLES)
}

/// Every `CREATE VIEW` statement of both catalogs.
fn view_statements() -> Vec<String> {
    let mut out: Vec<String> = INFORMATION_SCHEMA_VIEWS
        .iter()
        .map(|(name, body)| {
            format!(
                "CREATE VIEW IF NOT EXISTS {INFORMATION_SCHEMA}.{name} AS {}",
                expand(body)
            )
        })
        .collect();
    let user = user_view();
    let mysql_views: [(&str, &str); 4] = [
        ("user", user.as_str()),
        ("db", DB),
        ("procs_priv", PROCS_PRIV),
        ("role_edges", ROLE_EDGES),
    ];
    out.extend(
        mysql_views
            .iter()
            .map(|(name, body)| format!("CREATE VIEW IF NOT EXISTS {MYSQL_SCHEMA}.{name} AS {body}")),
    );
    out
}

fn is_attached(session: &mut dyn EngineSession, schema: &str) -> Result<bool> {
    let rows = session.query(
        "SELECT count(*) FROM pragma_database_list WHERE name = ?1",
        &[Cell::from(schema)],
    )?;
    Ok(rows
        .rows
        .first()
        .and_then(|row| row.first())
        .and_then(Cell::as_i64)
        .unwrap_or(0)
        > 0)
}

/// Attaches both catalogs to a session unless they already are.
pub fn attach(session: &mut dyn EngineSession, catalogs: &Catalogs) -> Result<()> {
    for (schema, uri) in catalogs.entries() {
        if !is_attached(session, schema)? {
            session.exec(
                &format!("ATTACH DATABASE ?1 AS {schema}"),
                &[Cell::from(uri)],
            )?;
        }
    }
    Ok(())
}

/// Attaches the catalogs and defines their views. Safe to repeat: existing
/// attachments and views are left alone.
pub fn bootstrap(session: &mut dyn EngineSession, catalogs: &Catalogs) -> Result<()> {
    attach(session, catalogs)?;
    let statements = view_statements();
    for sql in &statements {
        session.exec(sql, &[])?;
    }
    debug!(views = statements.len(), "metadata catalogs ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, SqliteEngine};

    fn bootstrapped() -> (tempfile::TempDir, SqliteEngine, Catalogs, Box<dyn EngineSession>) {
        let dir = tempfile::tempdir().unwrap();
        let engine = SqliteEngine::open(dir.path().join("meta.db")).unwrap();
        let catalogs = Catalogs::new();
        let mut session = engine.open_session().unwrap();
        bootstrap(session.as_mut(), &catalogs).unwrap();
        (dir, engine, catalogs, session)
    }

    fn strings(rows: &crate::model::EngineRows, col: usize) -> Vec<String> {
        rows.rows
            .iter()
            .filter_map(|r| r[col].to_text())
            .collect()
    }

    #[test]
    fn test_bootstrap_is_repeatable() {
        let (_dir, engine, catalogs, mut session) = bootstrapped();
        bootstrap(session.as_mut(), &catalogs).unwrap();

        let mut other = engine.open_session().unwrap();
        bootstrap(other.as_mut(), &catalogs).unwrap();
        other.close().unwrap();
        session.close().unwrap();
    }

    #[test]
    fn test_tables_and_columns_follow_user_schema() {
        let (_dir, _engine, _catalogs, mut session) = bootstrapped();
        session
            .exec(
                "CREATE TABLE people (id INTEGER PRIMARY KEY, name VARCHAR(20) NOT NULL, score REAL)",
                &[],
            )
            .unwrap();

        let tables = session
            .query(
                "SELECT TABLE_NAME, TABLE_TYPE FROM information_schema.TABLES WHERE TABLE_SCHEMA = 'main'",
                &[],
            )
            .unwrap();
        assert_eq!(strings(&tables, 0), vec!["people"]);
        assert_eq!(strings(&tables, 1), vec!["BASE TABLE"]);

        let columns = session
            .query(
                "SELECT COLUMN_NAME, IS_NULLABLE, DATA_TYPE, COLUMN_KEY FROM information_schema.COLUMNS \
                 WHERE TABLE_NAME = 'people' ORDER BY ORDINAL_POSITION",
                &[],
            )
            .unwrap();
        assert_eq!(strings(&columns, 0), vec!["id", "name", "score"]);
        assert_eq!(strings(&columns, 1), vec!["NO", "NO", "YES"]);
        assert_eq!(strings(&columns, 2), vec!["bigint", "varchar", "double"]);
        assert_eq!(strings(&columns, 3), vec!["PRI", "", ""]);
        session.close().unwrap();
    }

    #[test]
    fn test_keys_and_indexes() {
        let (_dir, _engine, _catalogs, mut session) = bootstrapped();
        session
            .exec("CREATE TABLE parent (id INTEGER PRIMARY KEY)", &[])
            .unwrap();
        session
            .exec(
                "CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent(id))",
                &[],
            )
            .unwrap();
        session
            .exec("CREATE INDEX child_parent ON child(parent_id)", &[])
            .unwrap();

        let keys = session
            .query(
                "SELECT CONSTRAINT_NAME, COLUMN_NAME FROM information_schema.KEY_COLUMN_USAGE \
                 WHERE TABLE_NAME = 'child' ORDER BY CONSTRAINT_NAME",
                &[],
            )
            .unwrap();
        assert_eq!(strings(&keys, 0), vec!["PRIMARY", "child_ibfk_1"]);
        assert_eq!(strings(&keys, 1), vec!["id", "parent_id"]);

        let stats = session
            .query(
                "SELECT INDEX_NAME FROM information_schema.STATISTICS \
                 WHERE TABLE_NAME = 'child' ORDER BY INDEX_NAME",
                &[],
            )
            .unwrap();
        assert_eq!(strings(&stats, 0), vec!["PRIMARY", "child_parent"]);
        session.close().unwrap();
    }

    #[test]
    fn test_stubs_are_empty() {
        let (_dir, _engine, _catalogs, mut session) = bootstrapped();
        for view in ["TRIGGERS", "ROUTINES", "EVENTS", "TABLE_PRIVILEGES", "USER_PRIVILEGES"] {
            let rows = session
                .query(&format!("SELECT * FROM information_schema.{view}"), &[])
                .unwrap();
            assert!(rows.rows.is_empty(), "{view}");
            assert!(!rows.columns.is_empty(), "{view}");
        }
        session.close().unwrap();
    }

    #[test]
    fn test_mysql_user_has_root() {
        let (_dir, _engine, _catalogs, mut session) = bootstrapped();
        let rows = session
            .query("SELECT Host, User, Select_priv FROM mysql.user", &[])
            .unwrap();
        assert_eq!(rows.rows.len(), 1);
        assert_eq!(
            rows.rows[0],
            vec![Cell::from("localhost"), Cell::from("root"), Cell::from("Y")]
        );

        let dual = session.query("SELECT 1 FROM dual", &[]).unwrap();
        assert_eq!(dual.rows, vec![vec![Cell::Int(1)]]);
        session.close().unwrap();
    }
}
