//! Reader for the RDB snapshot format: a 9-byte header, a stream of
//! opcode-tagged records, and an EOF marker followed by a CRC64 trailer.
//!
//! Ref: <https://rdb.fnordig.de/file_format.html>

use std::path::Path;

use bytes::Bytes;
use thiserror::Error as ThisError;
use tracing::debug;

use crate::store::now_ms;

const MAGIC: &[u8] = b"REDIS";
const MIN_VERSION: u32 = 3;

const OPCODE_STRING: u8 = 0x00; // length-prefixed key and value follow
const OPCODE_AUX: u8 = 0xFA; // length-prefixed name and value follow
const OPCODE_RESIZEDB: u8 = 0xFB; // two length-encoded table sizes follow
const OPCODE_EXPIRETIME_MS: u8 = 0xFC; // 8 little-endian bytes follow
const OPCODE_EXPIRETIME_S: u8 = 0xFD; // 4 little-endian bytes follow
const OPCODE_SELECTDB: u8 = 0xFE; // length-encoded db index follows
const OPCODE_EOF: u8 = 0xFF; // 8-byte CRC64 follows

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("file is not an RDB snapshot")]
    BadMagic,
    #[error("unsupported RDB version {0}")]
    UnsupportedVersion(u32),
    #[error("snapshot truncated at offset {0}")]
    Truncated(usize),
    #[error("unsupported string encoding {0:#04x} at offset {1}")]
    UnsupportedEncoding(u8, usize),
    #[error("unknown opcode {0:#04x} at offset {1}")]
    UnknownOpcode(u8, usize),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One key parsed out of a snapshot. Records whose expiration already passed
/// never materialize.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    pub value: Bytes,
    pub expires_at_ms: Option<u64>,
}

/// Reads the snapshot at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<Vec<Record>, Error> {
    let data = std::fs::read(path)?;
    read(&data)
}

/// Walks a snapshot held in memory.
pub fn read(data: &[u8]) -> Result<Vec<Record>, Error> {
    let mut reader = Reader { data, pos: 0 };
    reader.check_header()?;

    let mut records = Vec::new();
    let mut pending_expiry: Option<u64> = None;

    loop {
        let offset = reader.pos;
        let opcode = reader.u8()?;

        match opcode {
            OPCODE_AUX => {
                let name = reader.string()?;
                let value = reader.string()?;
                debug!(
                    name = %String::from_utf8_lossy(&name),
                    value = %String::from_utf8_lossy(&value),
                    "snapshot aux field"
                );
            }
            OPCODE_SELECTDB => {
                // Only DB 0 is supported; the index is read and ignored.
                let index = reader.length()?;
                debug!(index, "snapshot select-db");
            }
            OPCODE_RESIZEDB => {
                let _hash_size = reader.length()?;
                let _expire_size = reader.length()?;
            }
            OPCODE_EXPIRETIME_S => {
                let secs = u32::from_le_bytes(reader.array()?);
                pending_expiry = Some(u64::from(secs) * 1000);
            }
            OPCODE_EXPIRETIME_MS => {
                pending_expiry = Some(u64::from_le_bytes(reader.array()?));
            }
            OPCODE_STRING => {
                let key = reader.string()?;
                let value = reader.string()?;
                let key = String::from_utf8_lossy(&key).into_owned();

                match pending_expiry.take() {
                    Some(at_ms) if at_ms <= now_ms() => {
                        debug!(key = %key, "snapshot key already expired, discarded");
                    }
                    expires_at_ms => records.push(Record {
                        key,
                        value: Bytes::from(value),
                        expires_at_ms,
                    }),
                }
            }
            OPCODE_EOF => {
                // Trailing CRC64 is consumed but not verified.
                let _checksum: [u8; 8] = reader.array()?;
                return Ok(records);
            }
            other => return Err(Error::UnknownOpcode(other, offset)),
        }
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn check_header(&mut self) -> Result<(), Error> {
        let header = self.take(9)?;
        if &header[..5] != MAGIC {
            return Err(Error::BadMagic);
        }

        let version: u32 = std::str::from_utf8(&header[5..])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or(Error::BadMagic)?;
        if version < MIN_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        debug!(version, "snapshot header accepted");
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, Error> {
        let byte = *self.data.get(self.pos).ok_or(Error::Truncated(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.data.len() < self.pos + len {
            return Err(Error::Truncated(self.pos));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let offset = self.pos;
        self.take(N)?
            .try_into()
            .map_err(|_| Error::Truncated(offset))
    }

    /// Decodes a plain length. The two high bits of the first byte select
    /// the width; special (`11`) encodings are not lengths and are rejected
    /// here.
    fn length(&mut self) -> Result<usize, Error> {
        match self.length_or_encoding()? {
            Length::Plain(len) => Ok(len),
            Length::Encoded(format) => {
                Err(Error::UnsupportedEncoding(format, self.pos.saturating_sub(1)))
            }
        }
    }

    fn length_or_encoding(&mut self) -> Result<Length, Error> {
        let first = self.u8()?;
        match first >> 6 {
            0b00 => Ok(Length::Plain(usize::from(first & 0x3F))),
            0b01 => {
                let second = self.u8()?;
                Ok(Length::Plain(
                    usize::from(first & 0x3F) << 8 | usize::from(second),
                ))
            }
            0b10 => {
                let len = u32::from_be_bytes(self.array()?);
                Ok(Length::Plain(len as usize))
            }
            _ => Ok(Length::Encoded(first & 0x3F)),
        }
    }

    /// Reads a length-prefixed string, decoding the integer special formats
    /// to their decimal representation. LZF payloads are rejected.
    fn string(&mut self) -> Result<Vec<u8>, Error> {
        let offset = self.pos;
        match self.length_or_encoding()? {
            Length::Plain(len) => Ok(self.take(len)?.to_vec()),
            Length::Encoded(0) => {
                let value = i8::from_le_bytes(self.array()?);
                Ok(value.to_string().into_bytes())
            }
            Length::Encoded(1) => {
                let value = i16::from_le_bytes(self.array()?);
                Ok(value.to_string().into_bytes())
            }
            Length::Encoded(2) => {
                let value = i32::from_le_bytes(self.array()?);
                Ok(value.to_string().into_bytes())
            }
            Length::Encoded(format) => Err(Error::UnsupportedEncoding(format, offset)),
        }
    }
}

enum Length {
    Plain(usize),
    Encoded(u8),
}
