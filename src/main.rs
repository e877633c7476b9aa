use clap::Parser;
use mysqlite::{Cli, Engine, Server, SqliteEngine};
use std::error::Error;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let engine: Arc<dyn Engine> = match &cli.database {
        Some(path) => Arc::new(SqliteEngine::open(path)?),
        None => Arc::new(SqliteEngine::in_memory()?),
    };
    let server = Server::new(cli.server_config()?, engine)?;

    let local_addr = server.bind().await?;
    // Tests read the bound address from this line.
    eprintln!("mysqlite listening on {local_addr}");

    tokio::select! {
        res = server.serve() => res?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            server.stop()?;
        }
    }
    Ok(())
}
