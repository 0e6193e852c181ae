use std::convert::TryInto;
use std::io::Cursor;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{self, Frame};
use crate::Error;

/// Framing layer over a byte stream. Decoding consumes exactly one complete
/// frame per call and never peeks past its final terminator; a partial
/// buffer yields `None` until more bytes arrive.
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut cursor = Cursor::new(&src[..]);
        let frame = match Frame::parse(&mut cursor) {
            Ok(frame) => frame,
            Err(frame::Error::Incomplete) => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let position: usize = cursor
            .position()
            .try_into()
            .map_err(|_| "frame exceeds addressable buffer size")?;

        // Remove the parsed frame from the buffer.
        src.advance(position);

        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&frame.serialize());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn decode_one_frame_per_call() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::from(&b"+PONG\r\n:7\r\n"[..]);

        let first = codec.decode(&mut buf).unwrap();
        assert_eq!(first, Some(Frame::Simple("PONG".to_string())));
        assert_eq!(&buf[..], b":7\r\n");

        let second = codec.decode(&mut buf).unwrap();
        assert_eq!(second, Some(Frame::Integer(7)));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_partial_buffer_yields_none() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nGET\r\n$3\r\nf"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        // Nothing consumed until the frame is whole.
        assert_eq!(buf.len(), 18);

        buf.extend_from_slice(b"oo\r\n");
        let frame = codec.decode(&mut buf).unwrap();
        assert_eq!(frame, Some(Frame::bulk_array(["GET", "foo"])));
    }

    #[test]
    fn decode_malformed_header_is_an_error() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::from(&b"#nope\r\n"[..]);

        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn encode_writes_serialized_frame() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();

        codec
            .encode(Frame::Bulk(Bytes::from("hello")), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"$5\r\nhello\r\n");
    }
}
