//! Line codec for the fsavd socket.
//!
//! fsavd echoes file and archive member names byte for byte, so reply lines are
//! not guaranteed to be UTF-8. Invalid sequences are replaced with U+FFFD rather
//! than failing the stream.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Newline-delimited text. Decodes lossily, strips a trailing `\r`.
pub struct FsavdCodec {
    max_len: usize,
    /// Bytes already searched for a newline in the current buffer.
    scanned: usize,
}

impl FsavdCodec {
    pub const fn new(max_len: usize) -> Self {
        Self {
            max_len,
            scanned: 0,
        }
    }

    fn take_line(&mut self, src: &mut BytesMut, len: usize, skip: usize) -> String {
        self.scanned = 0;
        let raw = src.split_to(len);
        src.advance(skip);
        let raw = raw.strip_suffix(b"\r").unwrap_or(&raw[..]);
        String::from_utf8_lossy(raw).into_owned()
    }
}

impl Decoder for FsavdCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<String>> {
        if let Some(pos) = src[self.scanned..].iter().position(|&b| b == b'\n') {
            let len = self.scanned + pos;
            return Ok(Some(self.take_line(src, len, 1)));
        }
        if src.len() > self.max_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "line exceeds length limit",
            ));
        }
        self.scanned = src.len();
        Ok(None)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<String>> {
        match self.decode(src)? {
            Some(line) => Ok(Some(line)),
            None if src.is_empty() => Ok(None),
            None => {
                let len = src.len();
                Ok(Some(self.take_line(src, len, 0)))
            }
        }
    }
}

impl Encoder<&str> for FsavdCodec {
    type Error = io::Error;

    fn encode(&mut self, line: &str, dst: &mut BytesMut) -> io::Result<()> {
        if line.contains('\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "request contains a newline",
            ));
        }
        dst.reserve(line.len() + 1);
        dst.put_slice(line.as_bytes());
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> FsavdCodec {
        FsavdCodec::new(64)
    }

    #[test]
    fn splits_lines_and_strips_cr() {
        let mut buf = BytesMut::from(&b"DBVERSION 1\r\nOK\npart"[..]);
        let mut c = codec();
        assert_eq!(c.decode(&mut buf).unwrap().as_deref(), Some("DBVERSION 1"));
        assert_eq!(c.decode(&mut buf).unwrap().as_deref(), Some("OK"));
        assert_eq!(c.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"part");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut buf = BytesMut::from(&b"INFECTED\t\xe9t\xe9.exe\nOK\n"[..]);
        let mut c = codec();
        assert_eq!(
            c.decode(&mut buf).unwrap().as_deref(),
            Some("INFECTED\t\u{FFFD}t\u{FFFD}.exe")
        );
        assert_eq!(c.decode(&mut buf).unwrap().as_deref(), Some("OK"));
    }

    #[test]
    fn line_arriving_in_pieces() {
        let mut c = codec();
        let mut buf = BytesMut::from(&b"SCAN"[..]);
        assert_eq!(c.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(b"NED\n");
        assert_eq!(c.decode(&mut buf).unwrap().as_deref(), Some("SCANNED"));
    }

    #[test]
    fn overlong_line_rejected() {
        let mut buf = BytesMut::from(&[b'a'; 65][..]);
        let err = codec().decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn trailing_text_at_eof() {
        let mut buf = BytesMut::from(&b"OK"[..]);
        let mut c = codec();
        assert_eq!(c.decode_eof(&mut buf).unwrap().as_deref(), Some("OK"));
        assert_eq!(c.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn encode_appends_newline() {
        let mut buf = BytesMut::new();
        codec().encode("PROTOCOL\t9", &mut buf).unwrap();
        assert_eq!(&buf[..], b"PROTOCOL\t9\n");
        assert!(codec().encode("SCAN\ta\nb", &mut buf).is_err());
    }
}
