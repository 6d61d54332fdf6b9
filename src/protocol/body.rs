use std::fmt;
use std::io::{self, Cursor, Read};

use base64::engine::general_purpose::{GeneralPurpose, STANDARD};
use base64::read::DecoderReader;

type Base64Reader = DecoderReader<'static, GeneralPurpose, Cursor<Vec<u8>>>;

/// Lazily decoded `put` payload.
///
/// The base64 text is held as received and decoded on read, yielding at most
/// the declared number of bytes. Reaching the end of the encoded text before
/// the declared size is an [`io::ErrorKind::UnexpectedEof`] error. The body
/// is `Send`, so it can be consumed on a different task than the one that
/// decoded the message.
pub struct Body {
    source: Option<io::Take<Base64Reader>>,
    declared: u64,
    consumed: u64,
}

impl Body {
    /// An empty body; reads return end of stream immediately.
    pub fn empty() -> Self {
        Self {
            source: None,
            declared: 0,
            consumed: 0,
        }
    }

    /// A body backed by standard-alphabet base64 text declared to decode to
    /// `declared` bytes.
    pub fn from_base64(encoded: impl Into<String>, declared: u64) -> Self {
        if declared == 0 {
            return Self::empty();
        }
        let cursor = Cursor::new(encoded.into().into_bytes());
        Self {
            source: Some(DecoderReader::new(cursor, &STANDARD).take(declared)),
            declared,
            consumed: 0,
        }
    }

    /// Number of bytes the sender announced.
    pub fn declared_len(&self) -> u64 {
        self.declared
    }

    /// Number of bytes read so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(source) = self.source.as_mut() else {
            return Ok(0);
        };
        let n = source
            .read(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if n == 0 && !buf.is_empty() && self.consumed < self.declared {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "body decoded to {} bytes, expected {}",
                    self.consumed, self.declared
                ),
            ));
        }
        self.consumed += n as u64;
        Ok(n)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("declared", &self.declared)
            .field("consumed", &self.consumed)
            .finish()
    }
}
