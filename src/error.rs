use opensrv_mysql::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MysqliteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Credentials error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("replication is not supported")]
    ReplicationNotSupported,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid: {0}")]
    Invalid(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("server already started")]
    AlreadyStarted,

    #[error("server is not listening")]
    NotStarted,

    #[error("listen address is empty")]
    EmptyAddress,
}

pub type Result<T> = std::result::Result<T, MysqliteError>;

impl MysqliteError {
    /// Error packet code sent to the client for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MysqliteError::Parse(_) => ErrorKind::ER_PARSE_ERROR,
            MysqliteError::Sqlite(err) => sqlite_error_kind(err),
            MysqliteError::NotFound(_) => ErrorKind::ER_UNKNOWN_ERROR,
            MysqliteError::AccessDenied(_) => ErrorKind::ER_ACCESS_DENIED_ERROR,
            MysqliteError::NotSupported(_) | MysqliteError::ReplicationNotSupported => {
                ErrorKind::ER_NOT_SUPPORTED_YET
            }
            MysqliteError::Invalid(_) => ErrorKind::ER_WRONG_ARGUMENTS,
            _ => ErrorKind::ER_UNKNOWN_ERROR,
        }
    }
}

fn sqlite_error_kind(err: &rusqlite::Error) -> ErrorKind {
    // best-effort: SQLite reports most failures as generic errors with a message
    if let rusqlite::Error::SqliteFailure(failure, _) = err {
        if failure.code == rusqlite::ErrorCode::ConstraintViolation {
            return ErrorKind::ER_DUP_ENTRY;
        }
    }
    let msg = err.to_string().to_ascii_lowercase();
    if msg.contains("no such table") {
        ErrorKind::ER_NO_SUCH_TABLE
    } else if msg.contains("syntax error") {
        ErrorKind::ER_PARSE_ERROR
    } else {
        ErrorKind::ER_UNKNOWN_ERROR
    }
}
