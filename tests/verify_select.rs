mod common;

use mysql::prelude::*;

#[test]
fn verify_system_variables_and_functions() -> anyhow::Result<()> {
    let (_server, addr) = common::spawn_server(&[])?;
    let url = common::url("root", "", addr);
    let mut conn = common::connect(&url)?;

    let mut result = conn.query_iter("SELECT @@version, @@session.version_comment")?;
    let names: Vec<String> = result
        .columns()
        .as_ref()
        .iter()
        .map(|c| c.name_str().into_owned())
        .collect();
    assert_eq!(names, vec!["@@version", "@@session.version_comment"]);
    let rows = result.by_ref().collect::<Result<Vec<_>, _>>()?;
    drop(result);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<String, _>(0).as_deref(), Some("8.0.30"));
    assert_eq!(rows[0].get::<String, _>(1).as_deref(), Some("mysqlite"));

    let packet: Option<i64> = conn.query_first("SELECT @@max_allowed_packet")?;
    assert_eq!(packet, Some(67108864));

    let unknown: Option<String> = conn.query_first("SELECT @@no_such_variable")?;
    assert_eq!(unknown.as_deref(), Some(""));

    let who: Option<(String, String)> = conn.query_first("SELECT database(), user()")?;
    assert_eq!(who, Some(("main".to_string(), "root".to_string())));

    let mapped: Option<(String, String, i64)> =
        conn.query_first("SELECT IF(1 > 0, 'yes', 'no'), UCASE('abc'), LOCATE('b', 'abc')")?;
    assert_eq!(mapped, Some(("yes".to_string(), "ABC".to_string(), 2)));

    let converted: Option<i64> = conn.query_first("SELECT CONVERT('42', SIGNED)")?;
    assert_eq!(converted, Some(42));

    let dual: Option<i64> = conn.query_first("SELECT 1 FROM dual")?;
    assert_eq!(dual, Some(1));
    Ok(())
}

#[test]
fn verify_prepared_statements() -> anyhow::Result<()> {
    let (_server, addr) = common::spawn_server(&[])?;
    let url = common::url("root", "", addr);
    let pool = common::pool_for_url(&url)?;
    let mut conn = common::get_conn_with_retry(&pool, &url)?;

    conn.query_drop("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, score REAL)")?;
    conn.exec_drop(
        "INSERT INTO people (name, score) VALUES (?, ?)",
        ("alice", 7.5),
    )?;
    assert_eq!(conn.affected_rows(), 1);
    assert_eq!(conn.last_insert_id(), 1);
    conn.exec_drop(
        "INSERT INTO people (name, score) VALUES (?, ?)",
        ("O'Reilly", 3),
    )?;

    let row: Option<(i64, String, f64)> = conn.exec_first(
        "SELECT id, name, score FROM people WHERE id = ?",
        (2,),
    )?;
    assert_eq!(row, Some((2, "O'Reilly".to_string(), 3.0)));

    // Placeholders inside quotes are text, not parameters.
    let literal: Option<(String, i64)> = conn.exec_first("SELECT '?', ?", (5,))?;
    assert_eq!(literal, Some(("?".to_string(), 5)));

    let count: Option<i64> =
        conn.exec_first("SELECT count(*) FROM people WHERE score > ?", (1.0,))?;
    assert_eq!(count, Some(2));

    conn.exec_drop("UPDATE people SET score = ? WHERE name = ?", (9, "alice"))?;
    assert_eq!(conn.affected_rows(), 1);

    let err = conn
        .exec_drop("SELECT * FROM nowhere WHERE id = ?", (1,))
        .unwrap_err();
    assert!(err.to_string().contains("no such table"), "{err}");
    Ok(())
}

#[test]
fn verify_metadata_catalogs() -> anyhow::Result<()> {
    let (_server, addr) = common::spawn_server(&[])?;
    let url = common::url("root", "", addr);
    let mut conn = common::connect(&url)?;

    conn.query_drop("CREATE TABLE parent (id INTEGER PRIMARY KEY, label VARCHAR(30) NOT NULL)")?;
    conn.query_drop(
        "CREATE TABLE child (id INTEGER PRIMARY KEY, parent_id INTEGER REFERENCES parent (id))",
    )?;

    let tables: Vec<String> = conn.query(
        "SELECT TABLE_NAME FROM information_schema.TABLES WHERE TABLE_SCHEMA = 'main' ORDER BY TABLE_NAME",
    )?;
    assert_eq!(tables, vec!["child", "parent"]);

    let columns: Vec<(String, String, String)> = conn.query(
        "SELECT COLUMN_NAME, IS_NULLABLE, DATA_TYPE FROM information_schema.COLUMNS \
         WHERE TABLE_NAME = 'parent' ORDER BY ORDINAL_POSITION",
    )?;
    assert_eq!(
        columns,
        vec![
            ("id".to_string(), "NO".to_string(), "bigint".to_string()),
            ("label".to_string(), "NO".to_string(), "varchar".to_string()),
        ]
    );

    let fks: Vec<(String, String)> = conn.query(
        "SELECT COLUMN_NAME, REFERENCED_TABLE_NAME FROM information_schema.KEY_COLUMN_USAGE \
         WHERE TABLE_NAME = 'child' AND REFERENCED_TABLE_NAME IS NOT NULL",
    )?;
    assert_eq!(fks, vec![("parent_id".to_string(), "parent".to_string())]);

    for stub in ["TRIGGERS", "ROUTINES", "EVENTS", "SCHEMA_PRIVILEGES"] {
        let n: Option<i64> =
            conn.query_first(format!("SELECT count(*) FROM information_schema.{stub}"))?;
        assert_eq!(n, Some(0), "{stub}");
    }

    let user: Option<(String, String)> =
        conn.query_first("SELECT Host, plugin FROM mysql.user")?;
    assert_eq!(
        user,
        Some(("localhost".to_string(), "mysql_native_password".to_string()))
    );
    Ok(())
}
