#![allow(dead_code)]

use mysql::{Opts, OptsBuilder, Pool, PooledConn};
use std::io::{BufRead, BufReader};
use std::net::SocketAddr;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

pub struct ServerGuard {
    child: Child,
    data_dir: tempfile::TempDir,
    stderr_thread: Option<thread::JoinHandle<()>>,
}

impl ServerGuard {
    pub fn data_dir(&self) -> &std::path::Path {
        self.data_dir.path()
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.stderr_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Starts the server on an ephemeral port over a fresh database file.
pub fn spawn_server(extra_args: &[&str]) -> anyhow::Result<(ServerGuard, SocketAddr)> {
    let data_dir = tempfile::tempdir()?;
    let db_path = data_dir.path().join("test.db");
    let db_path = db_path.to_str().unwrap_or("test.db").to_string();
    let mut args = vec!["--database", db_path.as_str()];
    args.extend_from_slice(extra_args);
    spawn(data_dir, &args)
}

/// Starts the server without a database file.
pub fn spawn_in_memory_server(extra_args: &[&str]) -> anyhow::Result<(ServerGuard, SocketAddr)> {
    spawn(tempfile::tempdir()?, extra_args)
}

fn spawn(data_dir: tempfile::TempDir, args: &[&str]) -> anyhow::Result<(ServerGuard, SocketAddr)> {
    let bin = env!("CARGO_BIN_EXE_mysqlite");
    let mut child = Command::new(bin)
        .args(["--listen", "127.0.0.1:0"])
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow::anyhow!("failed to capture server stderr"))?;

    let (addr_tx, addr_rx) = mpsc::channel::<SocketAddr>();
    let stderr_thread = thread::spawn(move || {
        let mut reader = BufReader::new(stderr);
        let mut line = String::new();
        while reader
            .read_line(&mut line)
            .ok()
            .filter(|n| *n > 0)
            .is_some()
        {
            if let Some(rest) = line.strip_prefix("mysqlite listening on ") {
                if let Ok(addr) = rest.trim().parse::<SocketAddr>() {
                    let _ = addr_tx.send(addr);
                }
            }
            eprint!("{}", line); // Relay output
            line.clear();
        }
    });

    let addr = match addr_rx.recv_timeout(Duration::from_secs(10)) {
        Ok(addr) => addr,
        Err(err) => {
            if let Some(status) = child.try_wait()? {
                anyhow::bail!("server exited before reporting listen address: {status} ({err})");
            }
            anyhow::bail!("timed out waiting for server listen address: {err}");
        }
    };

    Ok((
        ServerGuard {
            child,
            data_dir,
            stderr_thread: Some(stderr_thread),
        },
        addr,
    ))
}

pub fn url(user: &str, password: &str, addr: SocketAddr) -> String {
    if password.is_empty() {
        format!("mysql://{user}@{addr}/main")
    } else {
        format!("mysql://{user}:{password}@{addr}/main")
    }
}

pub fn pool_for_url(url: &str) -> anyhow::Result<Pool> {
    let opts = OptsBuilder::from_opts(Opts::from_url(url)?)
        .tcp_connect_timeout(Some(Duration::from_secs(1)));
    Ok(Pool::new(opts)?)
}

pub fn get_conn_with_retry(pool: &Pool, url: &str) -> anyhow::Result<PooledConn> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        match pool.get_conn() {
            Ok(conn) => return Ok(conn),
            Err(_) => thread::sleep(Duration::from_millis(200)),
        }
    }
    Err(anyhow::anyhow!("could not connect to server at {url}"))
}

/// One plain connection, without pooling.
pub fn connect(url: &str) -> anyhow::Result<mysql::Conn> {
    let opts = OptsBuilder::from_opts(Opts::from_url(url)?)
        .tcp_connect_timeout(Some(Duration::from_secs(1)));
    Ok(mysql::Conn::new(opts)?)
}
