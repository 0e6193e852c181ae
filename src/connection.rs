use std::io::{self, Cursor};

use bytes::{Buf, BytesMut};
use thiserror::Error as ThisError;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

use crate::frame::{self, Frame};

/// Why a connection stopped yielding frames. A protocol violation earns the
/// peer a best-effort error reply before the close; a transport failure
/// closes the connection silently.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The peer sent bytes that do not frame a valid command.
    #[error("protocol error; {0}")]
    Protocol(frame::Error),
    /// The stream failed, or ended in the middle of a frame.
    #[error(transparent)]
    Transport(#[from] io::Error),
}

/// Owns one peer socket. Bytes are read into the buffer and parsed out one
/// frame at a time, so several pipelined commands in a single segment are
/// drained before the next read.
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Connection {
        Connection {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Reads the next frame, waiting for more bytes when the buffer holds a
    /// partial one. Returns `None` on a clean EOF between frames; an EOF
    /// mid-frame is a transport error.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, Error> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            if 0 == self.stream.read_buf(&mut self.buffer).await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(Error::Transport(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended mid-frame",
                )));
            }
        }
    }

    fn parse_frame(&mut self) -> Result<Option<Frame>, Error> {
        let mut cursor = Cursor::new(&self.buffer[..]);

        match Frame::parse(&mut cursor) {
            Ok(frame) => {
                let position = cursor.position() as usize;
                self.buffer.advance(position);
                Ok(Some(frame))
            }
            Err(frame::Error::Incomplete) => Ok(None),
            Err(err) => Err(Error::Protocol(err)),
        }
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), io::Error> {
        self.stream.write_all(&frame.serialize()).await?;
        self.stream.flush().await
    }
}
