pub mod config;
pub mod del;
pub mod echo;
pub mod executable;
pub mod exists;
pub mod get;
pub mod info;
pub mod keys;
pub mod ping;
pub mod pttl;
pub mod set;
pub mod ttl;

use std::{str, vec};

use bytes::Bytes;
use thiserror::Error as ThisError;

use crate::commands::executable::Executable;
use crate::config::Config as ServerConfig;
use crate::frame::Frame;
use crate::store::Store;
use crate::Error;

use config::Config;
use del::Del;
use echo::Echo;
use exists::Exists;
use get::Get;
use info::Info;
use keys::Keys;
use ping::Ping;
use pttl::Pttl;
use set::Set;
use ttl::Ttl;

#[derive(Debug, PartialEq)]
pub enum Command {
    Ping(Ping),
    Echo(Echo),
    Get(Get),
    Set(Set),
    Del(Del),
    Exists(Exists),
    Ttl(Ttl),
    Pttl(Pttl),
    Keys(Keys),
    Config(Config),
    Info(Info),
}

impl Executable for Command {
    fn exec(self, store: Store, config: ServerConfig) -> Result<Frame, Error> {
        match self {
            Command::Ping(cmd) => cmd.exec(store, config),
            Command::Echo(cmd) => cmd.exec(store, config),
            Command::Get(cmd) => cmd.exec(store, config),
            Command::Set(cmd) => cmd.exec(store, config),
            Command::Del(cmd) => cmd.exec(store, config),
            Command::Exists(cmd) => cmd.exec(store, config),
            Command::Ttl(cmd) => cmd.exec(store, config),
            Command::Pttl(cmd) => cmd.exec(store, config),
            Command::Keys(cmd) => cmd.exec(store, config),
            Command::Config(cmd) => cmd.exec(store, config),
            Command::Info(cmd) => cmd.exec(store, config),
        }
    }
}

/// How a failed command conversion is handled: protocol violations tear the
/// connection down, everything else is reported to the client and the
/// connection keeps serving.
#[derive(Debug, ThisError, PartialEq)]
pub enum CommandError {
    #[error("ERR unknown command '{0}'")]
    Unknown(String),
    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),
    #[error("ERR {0}")]
    Invalid(String),
    #[error("protocol error; expected array of bulk strings, got {0}")]
    BadFrame(Frame),
}

impl CommandError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, CommandError::BadFrame(_))
    }

    /// The `-ERR ...` reply sent for recoverable failures.
    pub fn to_frame(&self) -> Frame {
        Frame::Error(self.to_string())
    }
}

impl TryFrom<Frame> for Command {
    type Error = CommandError;

    fn try_from(frame: Frame) -> Result<Self, CommandError> {
        // Clients send commands to the server as RESP arrays.
        let frames = match frame {
            Frame::Array(array) => array,
            frame => return Err(CommandError::BadFrame(frame)),
        };

        let parser = &mut CommandParser {
            parts: frames.into_iter(),
        };

        let command_name = parser
            .parse_command_name()
            .map_err(|err| argument_error("", err))?;

        match &command_name[..] {
            "ping" => wrap("ping", Ping::try_from(parser).map(Command::Ping)),
            "echo" => wrap("echo", Echo::try_from(parser).map(Command::Echo)),
            "get" => wrap("get", Get::try_from(parser).map(Command::Get)),
            "set" => wrap("set", Set::try_from(parser).map(Command::Set)),
            "del" => wrap("del", Del::try_from(parser).map(Command::Del)),
            "exists" => wrap("exists", Exists::try_from(parser).map(Command::Exists)),
            "ttl" => wrap("ttl", Ttl::try_from(parser).map(Command::Ttl)),
            "pttl" => wrap("pttl", Pttl::try_from(parser).map(Command::Pttl)),
            "keys" => wrap("keys", Keys::try_from(parser).map(Command::Keys)),
            "config" => wrap("config", Config::try_from(parser).map(Command::Config)),
            "info" => wrap("info", Info::try_from(parser).map(Command::Info)),
            name => Err(CommandError::Unknown(name.to_string())),
        }
    }
}

fn wrap(command: &str, result: Result<Command, CommandParserError>) -> Result<Command, CommandError> {
    result.map_err(|err| argument_error(command, err))
}

fn argument_error(command: &str, err: CommandParserError) -> CommandError {
    match err {
        CommandParserError::EndOfStream => CommandError::WrongArity(command.to_string()),
        other => CommandError::Invalid(other.to_string()),
    }
}

pub(crate) struct CommandParser {
    parts: vec::IntoIter<Frame>,
}

impl CommandParser {
    fn parse_command_name(&mut self) -> Result<String, CommandParserError> {
        let command_name = self.parts.next().ok_or(CommandParserError::EndOfStream)?;

        match command_name {
            Frame::Simple(s) => Ok(s.to_lowercase()),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map(|s| s.to_lowercase())
                .map_err(CommandParserError::InvalidUTF8String),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_string(&mut self) -> Result<String, CommandParserError> {
        let frame = self.parts.next().ok_or(CommandParserError::EndOfStream)?;

        match frame {
            Frame::Simple(s) => Ok(s),
            Frame::Bulk(bytes) => str::from_utf8(&bytes[..])
                .map(|s| s.to_string())
                .map_err(CommandParserError::InvalidUTF8String),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_bytes(&mut self) -> Result<Bytes, CommandParserError> {
        let frame = self.parts.next().ok_or(CommandParserError::EndOfStream)?;

        match frame {
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Bulk(bytes) => Ok(bytes),
            frame => Err(CommandParserError::InvalidFrame {
                expected: "simple or bulk string".to_string(),
                actual: frame,
            }),
        }
    }

    fn next_integer(&mut self) -> Result<i64, CommandParserError> {
        let frame = self.parts.next().ok_or(CommandParserError::EndOfStream)?;

        match frame {
            Frame::Integer(i) => Ok(i),
            Frame::Simple(s) => s
                .parse()
                .map_err(|_| CommandParserError::InvalidInteger(s)),
            Frame::Bulk(bytes) => {
                let s = str::from_utf8(&bytes[..]).map_err(CommandParserError::InvalidUTF8String)?;
                s.parse()
                    .map_err(|_| CommandParserError::InvalidInteger(s.to_string()))
            }
            frame => Err(CommandParserError::InvalidFrame {
                expected: "integer".to_string(),
                actual: frame,
            }),
        }
    }
}

#[derive(Debug, ThisError, PartialEq)]
pub(crate) enum CommandParserError {
    #[error("invalid frame, expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: Frame },
    #[error("invalid UTF-8 string")]
    InvalidUTF8String(#[from] str::Utf8Error),
    #[error("missing command arguments")]
    EndOfStream,
    #[error("value {0:?} is not an integer or out of range")]
    InvalidInteger(String),
    #[error("unexpected argument {argument:?} for {command}")]
    InvalidCommandArgument { command: String, argument: String },
}
