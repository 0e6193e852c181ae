use bytes::Bytes;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::config::Config as ServerConfig;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// `CONFIG GET` answers `[name, value]` for a known option and an empty
/// array otherwise; `CONFIG SET` overwrites unconditionally.
///
/// Ref: <https://redis.io/docs/latest/commands/config-get>
#[derive(Debug, PartialEq)]
pub enum Config {
    Get { key: String },
    Set { key: String, value: String },
}

impl Executable for Config {
    fn exec(self, _store: Store, config: ServerConfig) -> Result<Frame, Error> {
        match self {
            Config::Get { key } => {
                let reply = match config.get(&key) {
                    Some(value) => vec![
                        Frame::Bulk(Bytes::from(key)),
                        Frame::Bulk(Bytes::from(value)),
                    ],
                    None => vec![],
                };
                Ok(Frame::Array(reply))
            }
            Config::Set { key, value } => {
                config.set(&key, &value);
                Ok(Frame::Simple("OK".to_string()))
            }
        }
    }
}

impl TryFrom<&mut CommandParser> for Config {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let subcommand = parser.next_string()?;

        match subcommand.to_lowercase().as_str() {
            "get" => Ok(Config::Get {
                key: parser.next_string()?,
            }),
            "set" => Ok(Config::Set {
                key: parser.next_string()?,
                value: parser.next_string()?,
            }),
            _ => Err(CommandParserError::InvalidCommandArgument {
                command: "CONFIG".to_string(),
                argument: subcommand,
            }),
        }
    }
}
