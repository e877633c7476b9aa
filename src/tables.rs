//! Fixed lookup tables for MySQL system variables and built-in functions.
//!
//! The entries are data: adding a variable or a function mapping never
//! touches the rewriter's control flow.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

pub const SERVER_VERSION: &str = "8.0.30";
pub const VERSION_COMMENT: &str = "mysqlite";
/// Schema name every SQLite session sees its own tables under.
pub const DEFAULT_SCHEMA: &str = "main";
pub const DEFAULT_USER: &str = "root";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal {
    Text(&'static str),
    Int(i64),
}

impl Literal {
    /// SQL literal text.
    pub fn to_sql(self) -> String {
        match self {
            Literal::Text(s) => quote_sql_string(s),
            Literal::Int(i) => i.to_string(),
        }
    }

    /// Value as `SHOW VARIABLES` prints it.
    pub fn to_text(self) -> String {
        match self {
            Literal::Text(s) => s.to_string(),
            Literal::Int(i) => i.to_string(),
        }
    }
}

pub fn quote_sql_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

const VARIABLES: &[(&str, Literal)] = &[
    ("auto_increment_increment", Literal::Int(1)),
    ("auto_increment_offset", Literal::Int(1)),
    ("autocommit", Literal::Int(1)),
    ("character_set_client", Literal::Text("utf8mb4")),
    ("character_set_connection", Literal::Text("utf8mb4")),
    ("character_set_database", Literal::Text("utf8mb4")),
    ("character_set_results", Literal::Text("utf8mb4")),
    ("character_set_server", Literal::Text("utf8mb4")),
    ("collation_connection", Literal::Text("utf8mb4_general_ci")),
    ("collation_database", Literal::Text("utf8mb4_general_ci")),
    ("collation_server", Literal::Text("utf8mb4_general_ci")),
    ("default_storage_engine", Literal::Text("SQLite")),
    ("event_scheduler", Literal::Text("OFF")),
    ("have_ssl", Literal::Text("DISABLED")),
    ("hostname", Literal::Text("127.0.0.1")),
    ("init_connect", Literal::Text("")),
    ("interactive_timeout", Literal::Int(28800)),
    ("license", Literal::Text("GPL")),
    // SQLite identifiers are case-insensitive
    ("lower_case_table_names", Literal::Int(2)),
    ("max_allowed_packet", Literal::Int(67108864)),
    ("net_buffer_length", Literal::Int(16384)),
    ("net_write_timeout", Literal::Int(60)),
    ("offline_mode", Literal::Int(0)),
    ("performance_schema", Literal::Text("OFF")),
    ("protocol_version", Literal::Int(10)),
    ("query_cache_limit", Literal::Int(1048576)),
    ("query_cache_size", Literal::Int(0)),
    ("query_cache_type", Literal::Text("OFF")),
    ("sql_auto_is_null", Literal::Int(0)),
    (
        "sql_mode",
        Literal::Text("IGNORE_SPACE,ERROR_FOR_DIVISION_BY_ZERO,ONLY_FULL_GROUP_BY"),
    ),
    ("sql_select_limit", Literal::Int(i64::MAX)),
    ("system_time_zone", Literal::Text("UTC")),
    ("time_zone", Literal::Text("SYSTEM")),
    ("transaction_alloc_block_size", Literal::Int(8192)),
    ("transaction_allow_batching", Literal::Int(0)),
    ("transaction_isolation", Literal::Text("REPEATABLE-READ")),
    ("transaction_isolation_level", Literal::Text("REPEATABLE-READ")),
    ("transaction_prealloc_size", Literal::Int(4096)),
    ("transaction_read_only", Literal::Int(0)),
    ("tx_isolation", Literal::Text("REPEATABLE-READ")),
    ("tx_read_only", Literal::Int(0)),
    ("version", Literal::Text(SERVER_VERSION)),
    ("version_comment", Literal::Text(VERSION_COMMENT)),
    ("version_compile_machine", Literal::Text("x86_64")),
    ("version_compile_os", Literal::Text("Linux")),
    ("wait_timeout", Literal::Int(28800)),
    ("warning_count", Literal::Int(0)),
];

/// Replaced by `NULL`, arguments and all.
const DELETED_FUNCTIONS: &[&str] = &[
    "master_pos_wait",
    "source_pos_wait",
    "wait_for_executed_gtid_set",
    "wait_until_sql_thread_after_gtids",
];

/// Same arguments, SQLite name.
const RENAMED_FUNCTIONS: &[(&str, &str)] = &[
    ("if", "iif"),
    ("now", "datetime"),
    ("sysdate", "datetime"),
    ("utc_timestamp", "datetime"),
    ("curdate", "date"),
    ("curtime", "time"),
    ("ucase", "upper"),
    ("lcase", "lower"),
    ("char_length", "length"),
    ("character_length", "length"),
    ("substring", "substr"),
    ("mid", "substr"),
    ("least", "min"),
    ("greatest", "max"),
];

/// Whole call replaced by a fixed value.
const LITERAL_FUNCTIONS: &[(&str, Literal)] = &[
    ("database", Literal::Text(DEFAULT_SCHEMA)),
    ("schema", Literal::Text(DEFAULT_SCHEMA)),
    ("user", Literal::Text(DEFAULT_USER)),
    ("system_user", Literal::Text(DEFAULT_USER)),
    ("session_user", Literal::Text(DEFAULT_USER)),
    ("current_user", Literal::Text(DEFAULT_USER)),
    ("version", Literal::Text(SERVER_VERSION)),
    ("connection_id", Literal::Int(0)),
    ("last_insert_id", Literal::Int(0)),
    ("found_rows", Literal::Int(0)),
    ("get_lock", Literal::Int(1)),
    ("release_lock", Literal::Int(1)),
    ("is_free_lock", Literal::Int(1)),
];

fn variable_map() -> &'static BTreeMap<&'static str, Literal> {
    static MAP: OnceLock<BTreeMap<&'static str, Literal>> = OnceLock::new();
    MAP.get_or_init(|| VARIABLES.iter().copied().collect())
}

fn renamed_map() -> &'static HashMap<&'static str, &'static str> {
    static MAP: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    MAP.get_or_init(|| RENAMED_FUNCTIONS.iter().copied().collect())
}

fn literal_map() -> &'static HashMap<&'static str, Literal> {
    static MAP: OnceLock<HashMap<&'static str, Literal>> = OnceLock::new();
    MAP.get_or_init(|| LITERAL_FUNCTIONS.iter().copied().collect())
}

/// Looks up a system variable by name, ignoring case and any
/// `global.`/`session.`/`local.` scope prefix.
pub fn variable(name: &str) -> Option<Literal> {
    let name = name.to_ascii_lowercase();
    let bare = ["global.", "session.", "local."]
        .iter()
        .find_map(|scope| name.strip_prefix(*scope))
        .unwrap_or(name.as_str());
    variable_map().get(bare).copied()
}

/// All variables, sorted by name.
pub fn variables() -> impl Iterator<Item = (&'static str, Literal)> {
    variable_map().iter().map(|(k, v)| (*k, *v))
}

pub fn is_deleted_function(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    DELETED_FUNCTIONS.contains(&name.as_str())
}

pub fn renamed_function(name: &str) -> Option<&'static str> {
    renamed_map().get(name.to_ascii_lowercase().as_str()).copied()
}

pub fn literal_function(name: &str) -> Option<Literal> {
    literal_map().get(name.to_ascii_lowercase().as_str()).copied()
}

#[cfg(test)]
pub(crate) fn deleted_functions() -> &'static [&'static str] {
    DELETED_FUNCTIONS
}

#[cfg(test)]
pub(crate) fn renamed_functions() -> &'static [(&'static str, &'static str)] {
    RENAMED_FUNCTIONS
}

#[cfg(test)]
pub(crate) fn literal_functions() -> &'static [(&'static str, Literal)] {
    LITERAL_FUNCTIONS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_lookup_ignores_scope_and_case() {
        assert_eq!(variable("version"), Some(Literal::Text(SERVER_VERSION)));
        assert_eq!(variable("SESSION.autocommit"), Some(Literal::Int(1)));
        assert_eq!(variable("global.max_allowed_packet"), Some(Literal::Int(67108864)));
        assert_eq!(variable("no_such_variable"), None);
    }

    #[test]
    fn test_function_lists_do_not_overlap() {
        for name in deleted_functions() {
            assert!(renamed_function(name).is_none(), "{name}");
            assert!(literal_function(name).is_none(), "{name}");
        }
        for (name, _) in renamed_functions() {
            assert!(literal_function(name).is_none(), "{name}");
        }
    }

    #[test]
    fn test_variables_are_sorted() {
        let names: Vec<&str> = variables().map(|(name, _)| name).collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert_eq!(names.len(), VARIABLES.len());
    }

    #[test]
    fn test_literal_sql() {
        assert_eq!(Literal::Text("it's").to_sql(), "'it''s'");
        assert_eq!(Literal::Int(42).to_sql(), "42");
    }
}
