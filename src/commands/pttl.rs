use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::config::Config;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Like TTL but the remaining time is reported in milliseconds.
///
/// Ref: <https://redis.io/docs/latest/commands/pttl>
#[derive(Debug, PartialEq)]
pub struct Pttl {
    pub key: String,
}

impl Executable for Pttl {
    fn exec(self, store: Store, _config: Config) -> Result<Frame, Error> {
        let mut state = store.lock();
        let ttl = if state.exists(&self.key) { -1 } else { -2 };
        let ttl = state
            .get_ttl(&self.key)
            .map(|ttl| ttl.as_millis() as i64)
            .unwrap_or(ttl);
        Ok(Frame::Integer(ttl))
    }
}

impl TryFrom<&mut CommandParser> for Pttl {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        Ok(Self { key })
    }
}
