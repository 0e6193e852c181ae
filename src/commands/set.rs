use bytes::Bytes;
use tokio::time::Duration;

use crate::commands::executable::Executable;
use crate::commands::{CommandParser, CommandParserError};
use crate::config::Config;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

/// Stores a value, replacing whatever the key held before. `PX`/`EX` attach
/// a deadline; a set without one clears any prior deadline.
///
/// Ref: <https://redis.io/docs/latest/commands/set>
#[derive(Debug, PartialEq)]
pub struct Set {
    pub key: String,
    pub value: Bytes,
    pub ttl: Option<Ttl>,
}

#[derive(Debug, PartialEq)]
pub enum Ttl {
    /// Seconds from now.
    Ex(u64),
    /// Milliseconds from now.
    Px(u64),
}

impl Ttl {
    fn duration(&self) -> Duration {
        match self {
            Ttl::Ex(seconds) => Duration::from_secs(*seconds),
            Ttl::Px(millis) => Duration::from_millis(*millis),
        }
    }
}

impl Executable for Set {
    fn exec(self, store: Store, _config: Config) -> Result<Frame, Error> {
        let mut state = store.lock();

        match self.ttl {
            Some(ttl) => state.set_with_ttl(self.key, self.value, ttl.duration()),
            None => state.set(self.key, self.value),
        }

        Ok(Frame::Simple("OK".to_string()))
    }
}

impl TryFrom<&mut CommandParser> for Set {
    type Error = CommandParserError;

    fn try_from(parser: &mut CommandParser) -> Result<Self, Self::Error> {
        let key = parser.next_string()?;
        let value = parser.next_bytes()?;

        let mut ttl = None;

        loop {
            let option = match parser.next_string() {
                Ok(option) => option,
                Err(CommandParserError::EndOfStream) => break,
                Err(err) => return Err(err),
            };

            match option.to_uppercase().as_str() {
                "EX" if ttl.is_none() => {
                    let val = positive_integer(parser)?;
                    ttl = Some(Ttl::Ex(val));
                }
                "PX" if ttl.is_none() => {
                    let val = positive_integer(parser)?;
                    ttl = Some(Ttl::Px(val));
                }
                _ => {
                    return Err(CommandParserError::InvalidCommandArgument {
                        command: "SET".to_string(),
                        argument: option,
                    })
                }
            }
        }

        Ok(Self { key, value, ttl })
    }
}

fn positive_integer(parser: &mut CommandParser) -> Result<u64, CommandParserError> {
    let val = parser.next_integer()?;
    if val <= 0 {
        return Err(CommandParserError::InvalidInteger(val.to_string()));
    }
    Ok(val as u64)
}
