use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::{Config, KEY_PORT, KEY_REPLICAOF};
use crate::connection::Connection;
use crate::frame::Frame;
use crate::Error;

/// Runs the bootstrap handshake toward the configured primary, pacing each
/// message on the primary's reply. Returns the parked connection so the
/// socket stays open; nothing past the PSYNC acknowledgement is consumed.
pub async fn handshake(config: &Config) -> Result<Option<Connection>, Error> {
    let primary = match config.get(KEY_REPLICAOF) {
        Some(primary) if !primary.is_empty() => primary,
        _ => return Ok(None),
    };

    let mut parts = primary.split_whitespace();
    let address = match (parts.next(), parts.next()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        _ => return Err(format!("invalid replicaof value {:?}", primary).into()),
    };

    info!(primary = %address, "connecting to primary for replication handshake");
    let stream = TcpStream::connect(&address).await?;
    let mut conn = Connection::new(stream);

    let listening_port = config
        .get(KEY_PORT)
        .unwrap_or_else(|| "6379".to_string());

    let steps = [
        Frame::bulk_array(["PING".to_string()]),
        Frame::bulk_array([
            "REPLCONF".to_string(),
            "listening-port".to_string(),
            listening_port,
        ]),
        Frame::bulk_array([
            "REPLCONF".to_string(),
            "capa".to_string(),
            "psync2".to_string(),
        ]),
        Frame::bulk_array(["PSYNC".to_string(), "?".to_string(), "-1".to_string()]),
    ];

    for step in steps {
        conn.write_frame(&step).await?;

        match conn.read_frame().await? {
            Some(reply) => debug!(reply = %reply, "primary replied"),
            None => return Err("primary closed connection during handshake".into()),
        }
    }

    info!("replication handshake complete");
    Ok(Some(conn))
}
