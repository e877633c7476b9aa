//! `SHOW` statements answered by SQLite queries over its own introspection
//! pragmas.
//!
//! Templates that filter by name take the `LIKE` pattern as `?1`; their other
//! arguments follow as `?2`, `?3`. A client `WHERE` clause is applied to the
//! template's output by wrapping it.

use crate::classify::{ShowKind, ShowStatement};
use crate::model::Cell;
use crate::tables::{self, DEFAULT_SCHEMA};

const MODULE_FILTER: &str = r"name NOT LIKE 'fts%' AND name NOT LIKE 'rtree%' AND name NOT LIKE '%\_reader' ESCAPE '\'";

const USER_TABLE_FILTER: &str = r"type <> 'shadow' AND name NOT LIKE 'sqlite\_%' ESCAPE '\'";

const SHOW_TABLES: &str = "SELECT name AS {header} FROM (
    SELECT name FROM pragma_table_list
    WHERE schema LIKE ?2 AND name LIKE ?1 AND {user_tables}
    UNION
    SELECT name FROM pragma_module_list
    WHERE {modules} AND name LIKE ?1
) ORDER BY name";

const SHOW_FULL_TABLES: &str = "SELECT name AS {header}, Table_type FROM (
    SELECT name, iif(type = 'view', 'VIEW', 'BASE TABLE') AS Table_type FROM pragma_table_list
    WHERE schema LIKE ?2 AND name LIKE ?1 AND {user_tables}
    UNION
    SELECT name, 'BASE TABLE' FROM pragma_module_list
    WHERE {modules} AND name LIKE ?1
) ORDER BY name";

const COLUMN_TYPE: &str = "CASE upper(type)
        WHEN 'INT' THEN 'int'
        WHEN 'INTEGER' THEN 'int'
        WHEN 'TEXT' THEN 'varchar(65535)'
        WHEN 'REAL' THEN 'float'
        WHEN 'BLOB' THEN 'blob'
        WHEN '' THEN 'blob'
        ELSE lower(type)
    END";

const SHOW_COLUMNS: &str = "SELECT
    name AS Field,
    {column_type} AS Type,
    iif(\"notnull\" = 1 OR pk > 0, 'NO', 'YES') AS \"Null\",
    iif(pk > 0, 'PRI', '') AS \"Key\",
    dflt_value AS \"Default\",
    '' AS Extra
FROM pragma_table_info(?2, ?3)
WHERE name LIKE ?1
ORDER BY cid";

const SHOW_FULL_COLUMNS: &str = "SELECT
    name AS Field,
    {column_type} AS Type,
    iif(upper(type) LIKE '%CHAR%' OR upper(type) LIKE '%TEXT%' OR upper(type) LIKE '%CLOB%', 'utf8mb4_general_ci', NULL) AS Collation,
    iif(\"notnull\" = 1 OR pk > 0, 'NO', 'YES') AS \"Null\",
    iif(pk > 0, 'PRI', '') AS \"Key\",
    dflt_value AS \"Default\",
    '' AS Extra,
    'select,insert,update,references' AS Privileges,
    '' AS Comment
FROM pragma_table_info(?2, ?3)
WHERE name LIKE ?1
ORDER BY cid";

const SHOW_DATABASES: &str = "SELECT name AS \"Database\" FROM pragma_database_list WHERE name LIKE ?1 ORDER BY seq";

const SHOW_STATUS: &str = "SELECT Variable_name, Value FROM (
    SELECT column1 AS Variable_name, column2 AS Value FROM (VALUES
        ('Aborted_clients', '0'),
        ('Aborted_connects', '0'),
        ('Ssl_cipher', ''),
        ('Threads_connected', '1'),
        ('Uptime', '0'),
        ('Uptime_since_flush_status', '0'))
) WHERE Variable_name LIKE ?1";

const SHOW_TABLE_STATUS: &str = "SELECT
    name AS Name,
    'SQLite' AS Engine,
    10 AS Version,
    iif(type = 'table', 'Dynamic', NULL) AS Row_format,
    0 AS \"Rows\",
    0 AS Avg_row_length,
    0 AS Data_length,
    0 AS Max_data_length,
    0 AS Index_length,
    0 AS Data_free,
    NULL AS Auto_increment,
    '1970-01-01 00:00:00' AS Create_time,
    '1970-01-01 00:00:00' AS Update_time,
    NULL AS Check_time,
    'utf8mb4_general_ci' AS Collation,
    NULL AS Checksum,
    '' AS Create_options,
    iif(type = 'view', 'VIEW', '') AS Comment
FROM pragma_table_list
WHERE schema = ?2 AND name LIKE ?1 AND {user_tables}
ORDER BY name";

// Rowid primary keys have no entry in pragma_index_list, so primary key
// columns come from pragma_table_info and the index list skips origin 'pk'.
const SHOW_INDEXES: &str = "SELECT * FROM (
    SELECT
        ?1 AS \"Table\",
        0 AS Non_unique,
        'PRIMARY' AS Key_name,
        pk AS Seq_in_index,
        name AS Column_name,
        'A' AS Collation,
        0 AS Cardinality,
        NULL AS Sub_part,
        NULL AS Packed,
        '' AS \"Null\",
        'BTREE' AS Index_type,
        '' AS Comment,
        '' AS Index_comment,
        'YES' AS Visible,
        NULL AS Expression
    FROM pragma_table_info(?1)
    WHERE pk > 0
    UNION ALL
    SELECT
        ?1, iif(il.\"unique\", 0, 1), il.name, ii.seqno + 1, ii.name, 'A', 0, NULL, NULL,
        '', 'BTREE', '', '', 'YES', NULL
    FROM pragma_index_list(?1) il, pragma_index_info(il.name) ii
    WHERE il.origin <> 'pk'
) ORDER BY Key_name <> 'PRIMARY', Key_name, Seq_in_index";

const SHOW_CREATE_TABLE: &str = "SELECT name AS \"Table\", sql AS \"Create Table\"
FROM sqlite_schema WHERE name = ?1 AND type = 'table'";

const SHOW_CREATE_VIEW: &str = "SELECT
    name AS \"View\",
    sql AS \"Create View\",
    'utf8mb4' AS character_set_client,
    'utf8mb4_general_ci' AS collation_connection
FROM sqlite_schema WHERE name = ?1 AND type = 'view'";

const SHOW_CREATE_DATABASE: &str = "SELECT
    ?1 AS \"Database\",
    'CREATE DATABASE `' || ?1 || '` /*!40100 DEFAULT CHARACTER SET utf8mb4 COLLATE utf8mb4_general_ci */' AS \"Create Database\"";

const SHOW_ENGINES: &str = "SELECT
    'SQLite' AS Engine,
    'DEFAULT' AS Support,
    'Embedded SQLite database' AS Comment,
    'YES' AS Transactions,
    'NO' AS XA,
    'YES' AS Savepoints";

const SHOW_COLLATION: &str = "SELECT * FROM (
    SELECT
        column1 AS Collation,
        column2 AS Charset,
        column3 AS Id,
        column4 AS \"Default\",
        column5 AS Compiled,
        column6 AS Sortlen,
        column7 AS Pad_attribute
    FROM (VALUES
        ('BINARY', 'utf8mb4', 2, 'Yes', 'Yes', 1, 'NO PAD'),
        ('NOCASE', 'utf8mb4', 1, '', 'Yes', 1, 'NO PAD'),
        ('RTRIM', 'utf8mb4', 0, '', 'Yes', 1, 'PAD SPACE'))
) WHERE Collation LIKE ?1";

const SHOW_CHARACTER_SET: &str = "SELECT * FROM (
    SELECT
        'utf8mb4' AS Charset,
        'UTF-8 Unicode' AS Description,
        'BINARY' AS \"Default collation\",
        4 AS Maxlen
) WHERE Charset LIKE ?1";

const SHOW_WARNINGS: &str = "SELECT 'Note' AS Level, 0 AS Code, '' AS Message WHERE 0";

/// Answer for every `SHOW` we have no template for.
pub const EMPTY_RESULT: &str = "SELECT '' AS \"Empty\" WHERE 0";

/// The `LIKE` pattern of a `SHOW`, `%` when absent.
pub fn find_like(show: &ShowStatement) -> String {
    show.like.clone().unwrap_or_else(|| "%".to_string())
}

/// Query text and positional arguments answering `show`.
pub fn template(show: &ShowStatement) -> (String, Vec<Cell>) {
    let like = Cell::from(find_like(show));
    let db = show.db.as_deref().unwrap_or(DEFAULT_SCHEMA);
    let table = show.table.clone().unwrap_or_default();

    let (sql, args) = match show.kind {
        ShowKind::Tables => {
            let text = if show.full {
                SHOW_FULL_TABLES
            } else {
                SHOW_TABLES
            };
            let header = quote_ident(&format!("Tables_in_{db}"));
            let sql = text
                .replace("{header}", &header)
                .replace("{user_tables}", USER_TABLE_FILTER)
                .replace("{modules}", MODULE_FILTER);
            (sql, vec![like, Cell::from(db)])
        }
        ShowKind::Columns => {
            let text = if show.full {
                SHOW_FULL_COLUMNS
            } else {
                SHOW_COLUMNS
            };
            let sql = text.replace("{column_type}", COLUMN_TYPE);
            (sql, vec![like, Cell::from(table), Cell::from(db)])
        }
        ShowKind::Databases => (SHOW_DATABASES.to_string(), vec![like]),
        ShowKind::Variables => (show_variables_query(), vec![like]),
        ShowKind::Status => (SHOW_STATUS.to_string(), vec![like]),
        ShowKind::TableStatus => (
            SHOW_TABLE_STATUS.replace("{user_tables}", USER_TABLE_FILTER),
            vec![like, Cell::from(db)],
        ),
        ShowKind::Indexes => (SHOW_INDEXES.to_string(), vec![Cell::from(table)]),
        ShowKind::CreateTable => (SHOW_CREATE_TABLE.to_string(), vec![Cell::from(table)]),
        ShowKind::CreateView => (SHOW_CREATE_VIEW.to_string(), vec![Cell::from(table)]),
        ShowKind::CreateDatabase => (SHOW_CREATE_DATABASE.to_string(), vec![Cell::from(db)]),
        ShowKind::Engines => (SHOW_ENGINES.to_string(), Vec::new()),
        ShowKind::Collation => (SHOW_COLLATION.to_string(), vec![like]),
        ShowKind::CharacterSet => (SHOW_CHARACTER_SET.to_string(), vec![like]),
        ShowKind::Warnings => (SHOW_WARNINGS.to_string(), Vec::new()),
        ShowKind::Other => return (EMPTY_RESULT.to_string(), Vec::new()),
    };

    match show.filter.as_deref() {
        Some(filter) => (format!("SELECT * FROM ({sql}) WHERE ({filter})"), args),
        None => (sql, args),
    }
}

/// `SHOW VARIABLES` over a `VALUES` table built from the variable table.
fn show_variables_query() -> String {
    let rows: Vec<String> = tables::variables()
        .map(|(name, value)| {
            format!(
                "({}, {})",
                tables::quote_sql_string(name),
                tables::quote_sql_string(&value.to_text())
            )
        })
        .collect();
    format!(
        "SELECT Variable_name, Value FROM (SELECT column1 AS Variable_name, column2 AS Value FROM (VALUES {})) WHERE Variable_name LIKE ?1",
        rows.join(", ")
    )
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_like_defaults_to_match_all() {
        let mut show = ShowStatement::new(ShowKind::Tables);
        assert_eq!(find_like(&show), "%");
        show.like = Some("us%".into());
        assert_eq!(find_like(&show), "us%");
    }

    #[test]
    fn test_tables_header_follows_schema() {
        let mut show = ShowStatement::new(ShowKind::Tables);
        show.db = Some("information_schema".into());
        let (sql, args) = template(&show);
        assert!(sql.contains("AS \"Tables_in_information_schema\""));
        assert_eq!(args, vec![Cell::from("%"), Cell::from("information_schema")]);
    }

    #[test]
    fn test_where_filter_wraps_template() {
        let mut show = ShowStatement::new(ShowKind::Indexes);
        show.table = Some("users".into());
        show.filter = Some("Key_name = 'PRIMARY'".into());
        let (sql, args) = template(&show);
        assert!(sql.starts_with("SELECT * FROM (SELECT * FROM ("));
        assert!(sql.ends_with("WHERE (Key_name = 'PRIMARY')"));
        assert_eq!(args, vec![Cell::from("users")]);
    }

    #[test]
    fn test_variables_query_lists_every_variable() {
        let sql = show_variables_query();
        for (name, _) in tables::variables() {
            assert!(sql.contains(&format!("('{name}', ")), "{name}");
        }
    }

    #[test]
    fn test_unhandled_show_is_empty_result() {
        // Deliberate leniency: unknown introspection answers with no rows.
        let (sql, args) = template(&ShowStatement::new(ShowKind::Other));
        assert_eq!(sql, EMPTY_RESULT);
        assert!(args.is_empty());
    }
}
