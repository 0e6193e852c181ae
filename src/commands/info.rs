use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::config::{Config, KEY_REPLICAOF};
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Fixed replication id reported by a master. The offset stays at zero
/// until replication stream propagation exists.
pub const REPLICATION_ID: &str = "8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb";

/// Reports the server's replication role. A section argument is accepted
/// and ignored; the payload always carries the replication fields.
///
/// Ref: <https://redis.io/docs/latest/commands/info>
#[derive(Debug, PartialEq)]
pub struct Info {
    pub section: Option<String>,
}

impl Executable for Info {
    fn exec(self, _store: Store, config: Config) -> Result<Frame, Error> {
        let is_replica = config
            .get(KEY_REPLICAOF)
            .is_some_and(|primary| !primary.is_empty());

        let payload = if is_replica {
            "role:slave".to_string()
        } else {
            format!(
                "role:master\nmaster_replid:{}\nmaster_repl_offset:0",
                REPLICATION_ID
            )
        };

        Ok(Frame::Bulk(Bytes::from(payload)))
    }
}

impl TryFrom<&mut CommandParser> for Info {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let section = match parser.next_string() {
            Ok(section) => Some(section),
            Err(CommandParserError::EndOfStream) => None,
            Err(err) => return Err(err),
        };

        Ok(Self { section })
    }
}
