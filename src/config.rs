use crate::auth::UserEntry;
use crate::error::{MysqliteError, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:3306";

/// MySQL wire-protocol server in front of a SQLite database.
#[derive(Debug, Parser)]
#[command(name = "mysqlite", version)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// SQLite database file. In-memory when omitted.
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// JSON credentials file.
    #[arg(long)]
    pub auth_file: Option<PathBuf>,

    /// `NAME:PASSWORD`; a 41-character password starting with `*` is a
    /// native password hash. May be repeated.
    #[arg(long = "user", value_name = "NAME:PASSWORD")]
    pub users: Vec<String>,

    /// Send every statement to SQLite unchanged.
    #[arg(long)]
    pub no_rewrite: bool,

    /// Tracing filter, overridden by `RUST_LOG`.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub auth_file: Option<PathBuf>,
    /// `None` unless at least one user was given.
    pub users: Option<BTreeMap<String, Vec<UserEntry>>>,
    pub rewrite_mysql: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_LISTEN.to_string(),
            auth_file: None,
            users: None,
            rewrite_mysql: true,
        }
    }
}

impl Cli {
    pub fn server_config(&self) -> Result<ServerConfig> {
        let users = if self.users.is_empty() {
            None
        } else {
            let mut table: BTreeMap<String, Vec<UserEntry>> = BTreeMap::new();
            for entry in &self.users {
                let (name, password) = parse_user(entry)?;
                table
                    .entry(name.to_string())
                    .or_default()
                    .push(UserEntry::from_password(password));
            }
            Some(table)
        };
        Ok(ServerConfig {
            address: self.listen.clone(),
            auth_file: self.auth_file.clone(),
            users,
            rewrite_mysql: !self.no_rewrite,
        })
    }
}

fn parse_user(entry: &str) -> Result<(&str, &str)> {
    match entry.split_once(':') {
        Some((name, password)) if !name.is_empty() => Ok((name, password)),
        _ => Err(MysqliteError::Config(format!(
            "expected NAME:PASSWORD, got {entry:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["mysqlite"]).unwrap();
        let config = cli.server_config().unwrap();
        assert_eq!(config.address, DEFAULT_LISTEN);
        assert!(config.auth_file.is_none());
        assert!(config.users.is_none());
        assert!(config.rewrite_mysql);
        assert!(cli.database.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_users_are_grouped() {
        let cli = Cli::try_parse_from([
            "mysqlite",
            "--user",
            "root:secret",
            "--user",
            "root:*2470C0C06DEE42FD1618BB99005ADCA2EC9D1E19",
            "--user",
            "app:a:b",
            "--no-rewrite",
        ])
        .unwrap();
        let config = cli.server_config().unwrap();
        assert!(!config.rewrite_mysql);
        let users = config.users.unwrap();
        assert_eq!(users["root"].len(), 2);
        assert_eq!(users["root"][0].password_clear.as_deref(), Some("secret"));
        assert_eq!(
            users["root"][1].password_hash.as_deref(),
            Some("*2470C0C06DEE42FD1618BB99005ADCA2EC9D1E19")
        );
        assert_eq!(users["app"][0].password_clear.as_deref(), Some("a:b"));
    }

    #[test]
    fn test_bad_user_entry() {
        let cli = Cli::try_parse_from(["mysqlite", "--user", "nocolon"]).unwrap();
        assert!(cli.server_config().is_err());
        let cli = Cli::try_parse_from(["mysqlite", "--user", ":pw"]).unwrap();
        assert!(cli.server_config().is_err());
    }
}
