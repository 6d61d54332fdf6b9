use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::error::CodecError;

use super::body::Body;
use super::request::Request;
use super::response::Response;

/// Reads a stream of JSON values from the inbound side.
///
/// Values are framed by the JSON grammar, not by lines: one value may span
/// several lines and several values may share a line. Whitespace between
/// values is skipped.
pub struct MessageReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
            eof: false,
        }
    }

    /// Decode the next request.
    ///
    /// Returns `Ok(None)` at end of input. A value that is not a request
    /// object is [`CodecError::Malformed`], which the caller treats as fatal
    /// to the session. The body of a `put` is not read here; see
    /// [`MessageReader::read_body`].
    pub async fn read_request(&mut self) -> Result<Option<Request>, CodecError> {
        let Some(value) = self.next_value().await? else {
            return Ok(None);
        };
        let req: Request = serde_json::from_value(value).map_err(CodecError::Malformed)?;
        Ok(Some(req.normalize()))
    }

    /// Read the body value that follows a `put` and attach it to `req`.
    ///
    /// A zero `body_size` means no value was sent and the body is empty.
    /// Otherwise exactly one JSON string is consumed; its base64 content is
    /// decoded lazily when the body is read.
    pub async fn read_body(&mut self, req: &mut Request) -> Result<(), CodecError> {
        let declared = u64::try_from(req.body_size)
            .map_err(|_| CodecError::Body(format!("negative body size {}", req.body_size)))?;
        if declared == 0 {
            req.body = Body::empty();
            return Ok(());
        }
        let value = match self.next_value().await {
            Ok(Some(value)) => value,
            Ok(None) => return Err(CodecError::Body("input closed before body".to_string())),
            Err(CodecError::Malformed(e)) => {
                return Err(CodecError::Body(format!("failed to decode body: {e}")))
            }
            Err(e) => return Err(e),
        };
        let Value::String(encoded) = value else {
            return Err(CodecError::Body(format!(
                "failed to decode body: expected a base64 string, got {value}"
            )));
        };
        req.body = Body::from_base64(encoded, declared);
        Ok(())
    }

    /// Next complete JSON value; `None` once the input is exhausted.
    async fn next_value(&mut self) -> Result<Option<Value>, CodecError> {
        loop {
            let skip = self
                .pending
                .iter()
                .position(|b| !b.is_ascii_whitespace())
                .unwrap_or(self.pending.len());
            self.pending.drain(..skip);

            if !self.pending.is_empty() {
                let parsed = {
                    let mut values = serde_json::Deserializer::from_slice(&self.pending).into_iter::<Value>();
                    values.next().map(|r| r.map(|value| (value, values.byte_offset())))
                };
                match parsed {
                    // A number at the very end of the buffer may still be
                    // growing; wait for a delimiter unless the input is done.
                    Some(Ok((value, end))) if !(value.is_number() && end == self.pending.len() && !self.eof) => {
                        self.pending.drain(..end);
                        return Ok(Some(value));
                    }
                    Some(Ok(_)) | None => {}
                    Some(Err(e)) if e.is_eof() && !self.eof => {}
                    Some(Err(e)) => return Err(CodecError::Malformed(e)),
                }
            }

            if self.eof {
                return Ok(None);
            }
            self.fill().await?;
        }
    }

    async fn fill(&mut self) -> Result<(), CodecError> {
        let chunk = self.reader.fill_buf().await?;
        if chunk.is_empty() {
            self.eof = true;
            return Ok(());
        }
        let n = chunk.len();
        self.pending.extend_from_slice(chunk);
        self.reader.consume(n);
        Ok(())
    }
}

/// Encode a response as one JSON line.
pub fn encode_response(res: &Response) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = serde_json::to_vec(res)?;
    out.push(b'\n');
    Ok(out)
}
