//! Newline framing for the inbound byte stream.

use crate::encoding::Encoding;
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// The only frame delimiter understood by a connection.
pub const DELIMITER: u8 = b'\n';

/// Splits inbound bytes on `\n` and decodes each line.
///
/// The delimiter is removed, nothing else is stripped (a trailing `\r`
/// stays part of the line). Lines that decode to an empty string are
/// swallowed. Without a delimiter bytes stay buffered indefinitely.
#[derive(Debug, Clone)]
pub struct LineCodec {
    encoding: Encoding,
    /// Bytes already scanned for a delimiter.
    scanned: usize,
}

impl LineCodec {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            scanned: 0,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Forget the scan position, e.g. after the buffer was drained elsewhere.
    pub fn reset(&mut self) {
        self.scanned = 0;
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let start = self.scanned.min(src.len());
            let Some(offset) = memchr::memchr(DELIMITER, &src[start..]) else {
                self.scanned = src.len();
                return Ok(None);
            };

            let frame = src.split_to(start + offset + 1);
            self.scanned = 0;

            let line = self.encoding.decode(&frame[..frame.len() - 1]);
            if !line.is_empty() {
                return Ok(Some(line));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }

        // A final line without delimiter is still delivered.
        self.scanned = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split();
        let line = self.encoding.decode(&rest);
        Ok((!line.is_empty()).then_some(line))
    }
}
