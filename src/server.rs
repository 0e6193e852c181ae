use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::commands::executable::Executable;
use crate::commands::Command;
use crate::config::{Config, KEY_DBFILENAME, KEY_DIR, KEY_HOST, KEY_PORT};
use crate::connection::{self, Connection};
use crate::frame::Frame;
use crate::rdb;
use crate::replication;
use crate::store::{self, Store};
use crate::Error;

/// How long live connections get to finish their in-flight command once a
/// shutdown signal arrives.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub async fn run(config: Config, store: Store) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    load_snapshot(&config, &store)?;

    let expiry_worker = store::spawn_expiry_worker(store.clone());

    // Bootstrap toward the primary before serving clients. The returned
    // connection is parked so the primary's socket stays open.
    let _primary = replication::handshake(&config).await?;

    let host = config.get(KEY_HOST).unwrap_or_else(|| "localhost".to_string());
    let port = config.get(KEY_PORT).unwrap_or_else(|| "6379".to_string());

    let listener = TcpListener::bind(format!("{}:{}", host, port)).await?;
    info!("Server listening on {}", listener.local_addr()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let mut connections = JoinSet::new();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, client_address) = accepted?;
                info!("Accepted connection from {:?}", client_address);

                let store = store.clone();
                let config = config.clone();
                let cancel = shutdown_rx.clone();

                connections.spawn(async move {
                    if let Err(e) = handle_connection(socket, client_address, store, config, cancel).await {
                        error!("Connection error: {}", e);
                    }
                });
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received, closing listener");
                break;
            }
        }
    }

    // Stop accepting, tell live actors to wind down, then wait bounded.
    drop(listener);
    let _ = shutdown_tx.send(());
    expiry_worker.abort();

    let drain = async {
        while connections.join_next().await.is_some() {}
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("Grace period elapsed, aborting remaining connections");
        connections.shutdown().await;
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Populates the store from the configured snapshot file. A missing or
/// corrupt body degrades to an empty keyspace; a file that is not an RDB
/// snapshot at all aborts startup.
fn load_snapshot(config: &Config, store: &Store) -> Result<(), Error> {
    if !config.is_persistent() {
        info!("Database file not configured, data will not survive restarts");
        return Ok(());
    }

    let dir = config.get(KEY_DIR).unwrap_or_default();
    let dbfilename = config.get(KEY_DBFILENAME).unwrap_or_default();
    let path = Path::new(&dir).join(dbfilename);

    match rdb::load(&path) {
        Ok(records) => {
            info!(count = records.len(), path = %path.display(), "Snapshot loaded");
            let mut state = store.lock();
            for record in records {
                state.load_record(record.key, record.value, record.expires_at_ms);
            }
            Ok(())
        }
        Err(err @ (rdb::Error::BadMagic | rdb::Error::UnsupportedVersion(_))) => {
            error!(path = %path.display(), "Invalid snapshot header: {}", err);
            Err(err.into())
        }
        Err(err) => {
            warn!(path = %path.display(), "Snapshot unreadable, starting empty: {}", err);
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                let _ = signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}

#[instrument(
    name = "connection",
    skip(stream, store, config, shutdown),
    fields(client_address = %client_address)
)]
async fn handle_connection(
    stream: TcpStream,
    client_address: SocketAddr,
    store: Store,
    config: Config,
    mut shutdown: watch::Receiver<()>,
) -> Result<(), Error> {
    let mut conn = Connection::new(stream);

    loop {
        // The in-flight command finishes, but no new one starts once the
        // shutdown broadcast lands.
        let frame = tokio::select! {
            frame = conn.read_frame() => frame,
            _ = shutdown.changed() => {
                debug!("Connection actor cancelled");
                return Ok(());
            }
        };

        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("Connection closed by peer");
                return Ok(());
            }
            Err(connection::Error::Protocol(err)) => {
                let reply = Frame::Error("ERR protocol error".to_string());
                let _ = conn.write_frame(&reply).await;
                return Err(err.into());
            }
            // Transport failures close silently; there is no peer left to
            // hear a reply.
            Err(connection::Error::Transport(err)) => {
                debug!("Connection lost: {}", err);
                return Ok(());
            }
        };

        debug!("Received frame from client: {}", frame);

        let reply = match Command::try_from(frame) {
            Ok(command) => command
                .exec(store.clone(), config.clone())
                .unwrap_or_else(|err| Frame::Error(format!("ERR {}", err))),
            Err(err) if err.is_fatal() => {
                let reply = Frame::Error("ERR protocol error".to_string());
                let _ = conn.write_frame(&reply).await;
                return Err(err.to_string().into());
            }
            Err(err) => err.to_frame(),
        };

        debug!("Sending response to client: {}", reply);
        conn.write_frame(&reply).await?;
    }
}
