//! MySQL wire-protocol front end for SQLite.

pub mod auth;
pub mod backend;
pub mod classify;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod mapper;
pub mod metadata;
pub mod model;
pub mod rewrite;
pub mod server;
pub mod show;
pub mod tables;

pub use config::{Cli, ServerConfig};
pub use engine::{Engine, EngineSession, SqliteEngine};
pub use error::{MysqliteError, Result};
pub use server::Server;
