// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::io::Cursor;
use std::string::FromUtf8Error;

use bytes::{Buf, Bytes};
use thiserror::Error as ThisError;

static CRLF: &[u8; 2] = b"\r\n";

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("invalid frame data type: {0}")]
    InvalidDataType(u8),
    /// Invalid message encoding.
    #[error("{0}")]
    Other(crate::Error),
}

/// A single RESP value. Requests arrive as arrays of bulk strings; replies
/// use the full set of variants.
#[derive(Clone, Debug, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    NullBulkString,
    Array(Vec<Frame>),
}

impl Frame {
    /// Parses exactly one frame, leaving the cursor on the first byte after
    /// it. Returns `Error::Incomplete` when the buffer ends mid-frame; the
    /// caller retries once more bytes arrive.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Self, Error> {
        let first_byte = get_byte(src)?;
        let data_type = DataType::try_from(first_byte)?;

        match data_type {
            DataType::SimpleString => {
                let line = get_line(src)?.to_vec();
                let string = String::from_utf8(line)?;
                Ok(Frame::Simple(string))
            }
            DataType::SimpleError => {
                let line = get_line(src)?.to_vec();
                let string = String::from_utf8(line)?;
                Ok(Frame::Error(string))
            }
            DataType::Integer => {
                let integer = parse_decimal(get_line(src)?)?;
                Ok(Frame::Integer(integer))
            }
            // $<length>\r\n<data>\r\n
            DataType::BulkString => {
                let length = parse_decimal(get_line(src)?)?;

                if length == -1 {
                    return Ok(Frame::NullBulkString);
                }
                if length < 0 {
                    return Err(format!("invalid bulk string length {}", length).into());
                }

                let data = get_exact(src, length as usize)?;
                skip_line_ending(src)?;

                Ok(Frame::Bulk(data))
            }
            // *<number-of-elements>\r\n<element-1>...<element-n>
            DataType::Array => {
                let line = get_line(src)?;

                // A header of "*" with no digits is sent by some clients for
                // an unframed `KEYS *`; it decodes as an empty array.
                if line.is_empty() {
                    return Ok(Frame::Array(vec![]));
                }

                let length = parse_decimal(line)?;

                if length == -1 {
                    return Ok(Frame::NullBulkString);
                }
                if length < 0 {
                    return Err(format!("invalid array length {}", length).into());
                }

                let mut frames = Vec::with_capacity(length as usize);
                for _ in 0..length {
                    frames.push(Self::parse(src)?);
                }

                Ok(Frame::Array(frames))
            }
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Frame::Simple(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(u8::from(DataType::SimpleString));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Error(s) => {
                let mut bytes = Vec::with_capacity(1 + s.len() + CRLF.len());
                bytes.push(u8::from(DataType::SimpleError));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Integer(i) => {
                let digits = i.to_string();
                let mut bytes = Vec::with_capacity(1 + digits.len() + CRLF.len());
                bytes.push(u8::from(DataType::Integer));
                bytes.extend_from_slice(digits.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::Bulk(data) => {
                let length = data.len().to_string();
                let mut bytes =
                    Vec::with_capacity(1 + length.len() + CRLF.len() + data.len() + CRLF.len());
                bytes.push(u8::from(DataType::BulkString));
                bytes.extend_from_slice(length.as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes.extend_from_slice(data);
                bytes.extend_from_slice(CRLF);
                bytes
            }
            Frame::NullBulkString => b"$-1\r\n".to_vec(),
            Frame::Array(items) => {
                let length = items.len().to_string();
                let mut bytes = Vec::with_capacity(1 + length.len() + CRLF.len());
                bytes.push(u8::from(DataType::Array));
                bytes.extend_from_slice(length.as_bytes());
                bytes.extend_from_slice(CRLF);
                for frame in items {
                    bytes.extend(frame.serialize());
                }
                bytes
            }
        }
    }

    /// Builds the request shape: an array of bulk strings.
    pub fn bulk_array<I, B>(parts: I) -> Frame
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Frame::Array(parts.into_iter().map(|p| Frame::Bulk(p.into())).collect())
    }
}

impl From<Frame> for Vec<u8> {
    fn from(frame: Frame) -> Self {
        frame.serialize()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "+{}", s),
            Frame::Error(s) => write!(f, "-{}", s),
            Frame::Integer(i) => write!(f, ":{}", i),
            Frame::Bulk(bytes) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Frame::NullBulkString => write!(f, "$-1"),
            Frame::Array(items) => {
                write!(f, "*{}", items.len())?;
                for frame in items {
                    write!(f, " {}", frame)?;
                }
                Ok(())
            }
        }
    }
}

/// Reads one line. Lines terminate at `\n`; a trailing `\r` is stripped so
/// LF-only clients are tolerated.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf = *src.get_ref();

    let newline = buf[start..]
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(Error::Incomplete)?;

    let mut end = start + newline;
    src.set_position((end + 1) as u64);

    if end > start && buf[end - 1] == b'\r' {
        end -= 1;
    }

    Ok(&buf[start..end])
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

fn get_exact(src: &mut Cursor<&[u8]>, len: usize) -> Result<Bytes, Error> {
    let start = src.position() as usize;
    let buf = *src.get_ref();

    if buf.len() < start + len {
        return Err(Error::Incomplete);
    }

    src.set_position((start + len) as u64);
    Ok(Bytes::copy_from_slice(&buf[start..start + len]))
}

/// Discards the terminator after a bulk string payload.
fn skip_line_ending(src: &mut Cursor<&[u8]>) -> Result<(), Error> {
    match get_byte(src)? {
        b'\n' => Ok(()),
        b'\r' => match get_byte(src)? {
            b'\n' => Ok(()),
            other => Err(format!("expected line ending, got byte {:#04x}", other).into()),
        },
        other => Err(format!("expected line ending, got byte {:#04x}", other).into()),
    }
}

fn parse_decimal(line: &[u8]) -> Result<i64, Error> {
    let digits = std::str::from_utf8(line)
        .map_err(|_| Error::from("protocol error; invalid frame format"))?;
    digits
        .parse::<i64>()
        .map_err(|_| format!("protocol error; invalid decimal {:?}", digits).into())
}

#[derive(Debug)]
enum DataType {
    SimpleString, // '+'
    SimpleError,  // '-'
    Integer,      // ':'
    BulkString,   // '$'
    Array,        // '*'
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self, Error> {
        match byte {
            b'+' => Ok(Self::SimpleString),
            b'-' => Ok(Self::SimpleError),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::BulkString),
            b'*' => Ok(Self::Array),
            _ => Err(Error::InvalidDataType(byte)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::SimpleString => b'+',
            DataType::SimpleError => b'-',
            DataType::Integer => b':',
            DataType::BulkString => b'$',
            DataType::Array => b'*',
        }
    }
}

impl From<FromUtf8Error> for Error {
    fn from(_src: FromUtf8Error) -> Error {
        "protocol error; invalid frame format".into()
    }
}

impl From<&str> for Error {
    fn from(src: &str) -> Error {
        src.to_string().into()
    }
}

impl From<String> for Error {
    fn from(src: String) -> Error {
        Error::Other(src.into())
    }
}
