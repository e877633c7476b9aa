use crate::auth::AuthStrategy;
use crate::backend::Backend;
use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::error::{MysqliteError, Result};
use crate::handler::Handler;
use opensrv_mysql::{AsyncMysqlIntermediary, IntermediaryOptions};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info};

pub struct Server {
    config: ServerConfig,
    handler: Arc<Handler>,
    started: AtomicBool,
    listener: Mutex<Option<TcpListener>>,
    local_addr: Mutex<Option<SocketAddr>>,
    shutdown: watch::Sender<bool>,
    next_conn_id: AtomicU32,
}

impl Server {
    /// Picks the authentication strategy; a credentials file is read here,
    /// once.
    pub fn new(config: ServerConfig, engine: Arc<dyn Engine>) -> Result<Self> {
        let auth = AuthStrategy::select(config.auth_file.as_deref(), config.users.as_ref())?;
        let handler = Arc::new(Handler::new(engine, auth, config.rewrite_mysql));
        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            config,
            handler,
            started: AtomicBool::new(false),
            listener: Mutex::new(None),
            local_addr: Mutex::new(None),
            shutdown,
            next_conn_id: AtomicU32::new(1),
        })
    }

    pub fn handler(&self) -> &Arc<Handler> {
        &self.handler
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Binds the listening socket.
    pub async fn bind(&self) -> Result<SocketAddr> {
        if self.config.address.is_empty() {
            return Err(MysqliteError::EmptyAddress);
        }
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(MysqliteError::AlreadyStarted);
        }
        let listener = match TcpListener::bind(&self.config.address).await {
            Ok(listener) => listener,
            Err(err) => {
                self.started.store(false, Ordering::Release);
                return Err(err.into());
            }
        };
        let addr = listener.local_addr()?;
        *self.listener.lock() = Some(listener);
        *self.local_addr.lock() = Some(addr);
        info!(address = %addr, "listening");
        Ok(addr)
    }

    /// Accepts connections until [`Server::stop`] is called.
    pub async fn serve(&self) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .take()
            .ok_or(MysqliteError::NotStarted)?;
        let mut shutdown = self.shutdown.subscribe();

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = shutdown.wait_for(|stopped| *stopped) => break,
            };
            let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
            let (kill_tx, kill_rx) = oneshot::channel();
            let conn = match self.handler.new_connection(conn_id, Some(kill_tx)) {
                Ok(conn) => conn,
                Err(err) => {
                    error!(conn_id, %peer, error = %err, "dropping connection");
                    continue;
                }
            };

            tokio::spawn(async move {
                let (r, w) = tokio::io::split(stream);
                let backend = Backend::new(conn);
                let opts = IntermediaryOptions {
                    process_use_statement_on_query: true,
                    reject_connection_on_dbname_absence: false,
                };
                tokio::select! {
                    res = AsyncMysqlIntermediary::run_with_options(backend, r, w, &opts) => {
                        if let Err(err) = res {
                            debug!(conn_id, error = ?err, "connection ended with error");
                        }
                    }
                    _ = kill_rx => debug!(conn_id, "connection closed by shutdown"),
                }
            });
        }
        Ok(())
    }

    /// Binds, then serves until stopped.
    pub async fn start(&self) -> Result<()> {
        self.bind().await?;
        self.serve().await
    }

    /// Stops accepting and closes every connection still open.
    pub fn stop(&self) -> Result<()> {
        if self.local_addr().is_none() {
            return Err(MysqliteError::NotStarted);
        }
        self.shutdown.send_replace(true);
        self.handler.close_all();
        info!("server stopped");
        Ok(())
    }
}
