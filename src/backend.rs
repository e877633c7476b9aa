use crate::auth::generate_salt;
use crate::classify::split_placeholders;
use crate::error::MysqliteError;
use crate::handler::ConnectionGuard;
use crate::mapper::to_column;
use crate::model::{Cell, ExecOutput};
use crate::tables::SERVER_VERSION;
use async_trait::async_trait;
use opensrv_mysql::{
    AsyncMysqlShim, Column, ColumnFlags, ColumnType, InitWriter, OkResponse, ParamParser,
    QueryResultWriter, StatementMetaWriter, StatusFlags, ValueInner,
};
use std::collections::HashMap;
use std::iter;
use tracing::debug;

/// Protocol callbacks of one client connection.
pub struct Backend {
    conn: ConnectionGuard,
    salt: [u8; 20],
    next_stmt_id: u32,
    stmts: HashMap<u32, String>,
}

impl Backend {
    pub fn new(conn: ConnectionGuard) -> Self {
        Self {
            conn,
            salt: generate_salt(),
            next_stmt_id: 1,
            stmts: HashMap::new(),
        }
    }

    fn conn_id(&self) -> u32 {
        self.conn.conn_id()
    }

    async fn write_output<'a, W>(
        &self,
        out: Result<ExecOutput, MysqliteError>,
        results: QueryResultWriter<'a, W>,
    ) -> Result<(), MysqliteError>
    where
        W: tokio::io::AsyncWrite + Unpin + Send,
    {
        match out {
            Ok(ExecOutput::Ok {
                affected_rows,
                last_insert_id,
                info,
            }) => {
                let ok = OkResponse {
                    affected_rows,
                    last_insert_id,
                    status_flags: StatusFlags::SERVER_STATUS_AUTOCOMMIT,
                    warnings: self.conn.handler().warning_count(self.conn_id()),
                    info,
                    ..Default::default()
                };
                results.completed(ok).await?;
            }
            Ok(ExecOutput::ResultSet { columns, rows }) => {
                let cols: Vec<Column> = columns.iter().map(to_column).collect();
                let mut rw = results.start(&cols).await?;
                for row in rows {
                    // The mapper already coerced every cell to its column's type.
                    for cell in row {
                        match cell {
                            Cell::Null => rw.write_col(None::<i64>)?,
                            Cell::Int(n) => rw.write_col(n)?,
                            Cell::Float(f) => rw.write_col(f)?,
                            Cell::Text(s) => rw.write_col(s.as_str())?,
                            Cell::Blob(b) => rw.write_col(b.as_slice())?,
                        }
                    }
                    rw.end_row().await?;
                }
                rw.finish().await?;
            }
            Err(err) => {
                debug!(conn_id = self.conn_id(), error = %err, "statement failed");
                results.error(err.kind(), err.to_string().as_bytes()).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<W> AsyncMysqlShim<W> for Backend
where
    W: tokio::io::AsyncWrite + Unpin + Send,
{
    type Error = MysqliteError;

    fn version(&self) -> String {
        SERVER_VERSION.to_string()
    }

    fn connect_id(&self) -> u32 {
        self.conn_id()
    }

    fn salt(&self) -> [u8; 20] {
        self.salt
    }

    async fn authenticate(
        &self,
        auth_plugin: &str,
        username: &[u8],
        salt: &[u8],
        auth_data: &[u8],
    ) -> bool {
        let Ok(username) = std::str::from_utf8(username) else {
            return false;
        };
        self.conn
            .handler()
            .authenticate(self.conn_id(), auth_plugin, username, salt, auth_data)
    }

    async fn on_prepare<'a>(
        &'a mut self,
        query: &'a str,
        info: StatementMetaWriter<'a, W>,
    ) -> Result<(), MysqliteError> {
        let id = self.next_stmt_id;
        self.next_stmt_id = self.next_stmt_id.wrapping_add(1);

        let param_count = split_placeholders(query).len().saturating_sub(1);
        self.stmts.insert(id, query.to_string());

        let params: Vec<Column> = (0..param_count)
            .map(|_| Column {
                table: String::new(),
                column: String::new(),
                coltype: ColumnType::MYSQL_TYPE_VAR_STRING,
                colflags: ColumnFlags::empty(),
            })
            .collect();

        info.reply(id, params.iter(), iter::empty::<&Column>())
            .await?;
        Ok(())
    }

    async fn on_execute<'a>(
        &'a mut self,
        id: u32,
        params: ParamParser<'a>,
        results: QueryResultWriter<'a, W>,
    ) -> Result<(), MysqliteError> {
        let Some(query) = self.stmts.get(&id).cloned() else {
            let err = MysqliteError::NotFound(format!("prepared statement {id}"));
            return self.write_output(Err(err), results).await;
        };

        let expected = split_placeholders(&query).len().saturating_sub(1);
        let mut args = Vec::with_capacity(expected);
        for param in params {
            match param_to_cell(param) {
                Ok(cell) => args.push(cell),
                Err(err) => return self.write_output(Err(err), results).await,
            }
        }
        if args.len() != expected {
            let err = MysqliteError::Invalid(format!(
                "expected {expected} parameters, got {}",
                args.len()
            ));
            return self.write_output(Err(err), results).await;
        }

        let out = self
            .conn
            .handler()
            .com_stmt_execute(self.conn_id(), &query, args);
        self.write_output(out, results).await
    }

    async fn on_close<'a>(&'a mut self, stmt: u32)
    where
        W: 'async_trait,
    {
        self.stmts.remove(&stmt);
    }

    async fn on_init<'a>(
        &'a mut self,
        _db: &'a str,
        writer: InitWriter<'a, W>,
    ) -> Result<(), MysqliteError> {
        // Same as USE: there is only one schema.
        writer.ok().await?;
        Ok(())
    }

    async fn on_query<'a>(
        &'a mut self,
        query: &'a str,
        results: QueryResultWriter<'a, W>,
    ) -> Result<(), MysqliteError> {
        let out = self.conn.handler().com_query(self.conn_id(), query);
        self.write_output(out, results).await
    }
}

/// Decodes a bound parameter by its declared type. Types outside the integer,
/// string, float and binary families bind as NULL.
fn param_to_cell(param: opensrv_mysql::ParamValue<'_>) -> Result<Cell, MysqliteError> {
    let coltype = param.coltype;
    let value = param.value.into_inner();
    let cell = match (param_family(coltype), value) {
        (_, ValueInner::NULL) => Cell::Null,
        (ParamFamily::Int, ValueInner::Int(n)) => Cell::Int(n),
        (ParamFamily::Int, ValueInner::UInt(n)) => Cell::Int(i64::try_from(n).map_err(|_| {
            MysqliteError::Invalid("unsigned integer parameter is too large".into())
        })?),
        (ParamFamily::Float, ValueInner::Double(f)) => Cell::Float(f),
        (ParamFamily::Text, ValueInner::Bytes(bytes)) => {
            Cell::Text(String::from_utf8_lossy(bytes).into_owned())
        }
        (ParamFamily::Binary, ValueInner::Bytes(bytes)) => Cell::Blob(bytes.to_vec()),
        _ => Cell::Null,
    };
    Ok(cell)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamFamily {
    Int,
    Float,
    Text,
    Binary,
    Untyped,
}

fn param_family(coltype: ColumnType) -> ParamFamily {
    match coltype {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => ParamFamily::Int,
        ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => ParamFamily::Float,
        ColumnType::MYSQL_TYPE_VARCHAR
        | ColumnType::MYSQL_TYPE_VAR_STRING
        | ColumnType::MYSQL_TYPE_STRING
        | ColumnType::MYSQL_TYPE_DECIMAL
        | ColumnType::MYSQL_TYPE_NEWDECIMAL
        | ColumnType::MYSQL_TYPE_JSON
        | ColumnType::MYSQL_TYPE_ENUM
        | ColumnType::MYSQL_TYPE_SET => ParamFamily::Text,
        ColumnType::MYSQL_TYPE_TINY_BLOB
        | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
        | ColumnType::MYSQL_TYPE_LONG_BLOB
        | ColumnType::MYSQL_TYPE_BLOB
        | ColumnType::MYSQL_TYPE_BIT
        | ColumnType::MYSQL_TYPE_GEOMETRY => ParamFamily::Binary,
        _ => ParamFamily::Untyped,
    }
}
