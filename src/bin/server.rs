use clap::Parser;

use kelpie::config::{Config, KEY_DBFILENAME, KEY_DIR, KEY_HOST, KEY_PORT, KEY_REPLICAOF};
use kelpie::store::Store;
use kelpie::{server, Error};

const PORT: u16 = 6379;

/// RESP-compatible in-memory key-value server.
#[derive(Parser, Debug)]
#[command(ignore_errors = true)]
struct Args {
    /// The port to listen on
    #[arg(long, default_value_t = PORT)]
    port: u16,

    /// Directory holding the database file
    #[arg(long)]
    dir: Option<String>,

    /// Database file name inside `dir`
    #[arg(long)]
    dbfilename: Option<String>,

    /// Primary to replicate from, as "<host> <port>"
    #[arg(long)]
    replicaof: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    let config = Config::new();
    config.add(KEY_HOST, "localhost")?;
    config.add(KEY_PORT, &args.port.to_string())?;

    if let Some(dir) = &args.dir {
        config.add(KEY_DIR, dir)?;
    }
    if let Some(dbfilename) = &args.dbfilename {
        config.add(KEY_DBFILENAME, dbfilename)?;
    }
    if let Some(replicaof) = &args.replicaof {
        config.add(KEY_REPLICAOF, replicaof)?;
    }

    server::run(config, Store::new()).await
}
