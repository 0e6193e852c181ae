use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::config::Config;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Counts how many of the given keys exist. The same key counted as many
/// times as it is mentioned.
///
/// Ref: <https://redis.io/docs/latest/commands/exists>
#[derive(Debug, PartialEq)]
pub struct Exists {
    pub keys: Vec<String>,
}

impl Executable for Exists {
    fn exec(self, store: Store, _config: Config) -> Result<Frame, Error> {
        let mut state = store.lock();
        let count = self.keys.iter().filter(|key| state.exists(key)).count();
        Ok(Frame::Integer(count as i64))
    }
}

impl TryFrom<&mut CommandParser> for Exists {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let mut keys = vec![parser.next_string()?];

        loop {
            match parser.next_string() {
                Ok(key) => keys.push(key),
                Err(CommandParserError::EndOfStream) => break,
                Err(err) => return Err(err),
            }
        }

        Ok(Self { keys })
    }
}
