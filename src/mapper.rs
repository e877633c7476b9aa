//! Turns engine rows into wire columns and cells.
//!
//! A column's wire type comes from its declared SQL type when SQLite reports
//! one, otherwise from the last non-null value among the leading rows. The
//! binary protocol needs every cell to match its column, so the type is then
//! widened until it fits all values and the cells are coerced to it.

use crate::model::{Cell, EngineColumn, EngineRows, ExecOutput, WireColumn, WireType};
use opensrv_mysql::{Column, ColumnFlags, ColumnType};

/// Rows inspected when a column has no declared type.
pub const TYPE_SAMPLE_ROWS: usize = 10;

/// `utf8mb4_0900_ai_ci`
pub const SYSTEM_COLLATION_ID: u16 = 255;
pub const BINARY_COLLATION_ID: u16 = 63;
pub const MAX_VARCHAR_LENGTH: u32 = 65535;
const NUMERIC_LENGTH: u32 = 11;

/// Maps a declared SQL type name to a wire type. Length and precision
/// suffixes such as `VARCHAR(20)` are ignored.
pub fn declared_wire_type(decl: &str) -> WireType {
    let upper = decl.trim().to_ascii_uppercase();
    let base = match upper.find('(') {
        Some(pos) => upper[..pos].trim_end(),
        None => upper.as_str(),
    };
    match base {
        "INTEGER" | "INT" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "BIGINT"
        | "UNSIGNED BIG INT" | "INT2" | "INT8" | "YEAR" | "BOOLEAN" | "BOOL" => WireType::Int64,
        "TEXT" | "VARCHAR" | "CHAR" | "CLOB" | "NCHAR" | "NVARCHAR" | "TINYTEXT"
        | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" | "JSON" | "DATE" | "TIME" | "DATETIME"
        | "TIMESTAMP" => WireType::VarChar,
        "REAL" | "FLOAT" | "DOUBLE" | "DOUBLE PRECISION" | "NUMERIC" | "DECIMAL" => {
            WireType::Float64
        }
        "BLOB" | "BINARY" | "VARBINARY" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            WireType::VarBinary
        }
        _ => WireType::Null,
    }
}

fn value_wire_type(cell: &Cell) -> WireType {
    match cell {
        Cell::Null => WireType::Null,
        Cell::Int(_) => WireType::Int64,
        Cell::Float(_) => WireType::Float64,
        Cell::Text(_) => WireType::VarChar,
        Cell::Blob(_) => WireType::VarBinary,
    }
}

/// Wire type of the last non-null value in the first rows, `Null` when all
/// sampled values are null.
pub fn sampled_wire_type(rows: &[Vec<Cell>], col: usize) -> WireType {
    rows.iter()
        .take(TYPE_SAMPLE_ROWS)
        .filter_map(|row| row.get(col))
        .filter(|cell| !cell.is_null())
        .last()
        .map(value_wire_type)
        .unwrap_or(WireType::Null)
}

fn fits(wire_type: WireType, cell: &Cell) -> bool {
    match (wire_type, cell) {
        (_, Cell::Null) => true,
        (WireType::Null, _) => false,
        (WireType::Int64, Cell::Int(_)) => true,
        (WireType::Int64, _) => false,
        (WireType::Float64, Cell::Int(_) | Cell::Float(_)) => true,
        (WireType::Float64, _) => false,
        (WireType::VarChar | WireType::VarBinary, _) => true,
    }
}

fn widen(wire_type: WireType, rows: &[Vec<Cell>], col: usize) -> WireType {
    let mut widened = wire_type;
    for cell in rows.iter().filter_map(|row| row.get(col)) {
        if fits(widened, cell) {
            continue;
        }
        widened = match (widened, cell) {
            (WireType::Int64, Cell::Float(_)) => WireType::Float64,
            _ => WireType::VarChar,
        };
    }
    widened
}

fn coerce(wire_type: WireType, cell: Cell) -> Cell {
    match (wire_type, cell) {
        (WireType::Float64, Cell::Int(i)) => Cell::Float(i as f64),
        (WireType::VarChar | WireType::VarBinary, cell @ (Cell::Int(_) | Cell::Float(_))) => {
            cell.to_text().map_or(Cell::Null, Cell::Text)
        }
        (_, cell) => cell,
    }
}

fn wire_column(name: String, wire_type: WireType) -> WireColumn {
    let (charset, column_length, binary) = match wire_type {
        WireType::VarChar => (SYSTEM_COLLATION_ID, MAX_VARCHAR_LENGTH, false),
        WireType::VarBinary => (BINARY_COLLATION_ID, MAX_VARCHAR_LENGTH, true),
        WireType::Int64 | WireType::Float64 => (SYSTEM_COLLATION_ID, NUMERIC_LENGTH, true),
        WireType::Null => (BINARY_COLLATION_ID, 0, false),
    };
    WireColumn {
        name,
        wire_type,
        charset,
        column_length,
        binary,
    }
}

fn column_type(column: &EngineColumn, rows: &[Vec<Cell>], col: usize) -> WireType {
    let chosen = match column.decl_type.as_deref() {
        Some(decl) if !decl.trim().is_empty() => declared_wire_type(decl),
        _ => sampled_wire_type(rows, col),
    };
    widen(chosen, rows, col)
}

/// Converts a result set. A statement without columns becomes an empty OK.
pub fn convert(result: EngineRows) -> ExecOutput {
    if result.columns.is_empty() {
        return ExecOutput::empty_ok();
    }
    let EngineRows { columns, rows } = result;
    let types: Vec<WireType> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| column_type(c, &rows, i))
        .collect();

    let rows = rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .zip(&types)
                .map(|(cell, t)| coerce(*t, cell))
                .collect()
        })
        .collect();
    let columns = columns
        .into_iter()
        .zip(&types)
        .map(|(c, t)| wire_column(c.name, *t))
        .collect();
    ExecOutput::ResultSet { columns, rows }
}

/// Column definition as the protocol library writes it.
pub fn to_column(column: &WireColumn) -> Column {
    let coltype = match column.wire_type {
        WireType::Int64 => ColumnType::MYSQL_TYPE_LONGLONG,
        WireType::Float64 => ColumnType::MYSQL_TYPE_DOUBLE,
        WireType::VarChar => ColumnType::MYSQL_TYPE_VAR_STRING,
        WireType::VarBinary => ColumnType::MYSQL_TYPE_BLOB,
        WireType::Null => ColumnType::MYSQL_TYPE_NULL,
    };
    let mut colflags = ColumnFlags::empty();
    if column.binary {
        colflags.insert(ColumnFlags::BINARY_FLAG);
    }
    Column {
        table: String::new(),
        column: column.name.clone(),
        coltype,
        colflags,
    }
}
