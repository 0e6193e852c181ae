use bytes::Bytes;
use glob_match::glob_match;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::config::Config;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Returns every live key matching a glob pattern.
///
/// Ref: <https://redis.io/docs/latest/commands/keys>
#[derive(Debug, PartialEq)]
pub struct Keys {
    pub pattern: String,
}

impl Executable for Keys {
    fn exec(self, store: Store, _config: Config) -> Result<Frame, Error> {
        let keys = store.lock().keys();

        let matches = keys
            .into_iter()
            .filter(|key| glob_match(self.pattern.as_str(), key))
            .map(|key| Frame::Bulk(Bytes::from(key)))
            .collect();

        Ok(Frame::Array(matches))
    }
}

impl TryFrom<&mut CommandParser> for Keys {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let pattern = parser.next_string()?;
        Ok(Self { pattern })
    }
}
