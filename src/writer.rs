//! Serialized response output.
//!
//! Responses are encoded by the caller and queued as whole lines to a single
//! output task, so concurrent writers can never interleave on the stream and
//! lines appear in the order their writes completed.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::handlers::ResponseWriter;
use crate::protocol::{encode_response, Response};

/// Shared handle used by the dispatcher and every in-flight request.
pub struct StreamWriter {
    lines: mpsc::UnboundedSender<Vec<u8>>,
}

/// The task draining queued lines into the output stream.
pub struct OutputTask {
    handle: JoinHandle<io::Result<()>>,
}

impl StreamWriter {
    /// Start the output task for `output`.
    ///
    /// The task ends once every [`StreamWriter`] handle has been dropped and
    /// all queued lines are flushed.
    pub fn spawn<W>(output: W) -> (Self, OutputTask)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (lines, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(drain(output, rx));
        (Self { lines }, OutputTask { handle })
    }

    fn send(&self, line: Vec<u8>) -> bool {
        self.lines.send(line).is_ok()
    }
}

impl ResponseWriter for StreamWriter {
    fn write_response(&self, res: Response) {
        let line = match encode_response(&res) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(id = res.id, error = %e, "failed to encode response");
                let fallback =
                    Response::error(res.id, format!("error: failed to encode response: {e}"));
                match encode_response(&fallback) {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::error!(id = res.id, error = %e, "failed to encode response");
                        return;
                    }
                }
            }
        };
        if !self.send(line) {
            tracing::error!(id = res.id, "output stream closed, response dropped");
        }
    }
}

impl OutputTask {
    /// Wait for every queued line to be written.
    pub async fn finish(self) -> io::Result<()> {
        match self.handle.await {
            Ok(result) => result,
            Err(join_err) => Err(io::Error::other(join_err.to_string())),
        }
    }
}

async fn drain<W>(mut output: W, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        if let Err(e) = write_line(&mut output, &line).await {
            tracing::error!(error = %e, "failed to write response");
            return Err(e);
        }
    }
    output.shutdown().await
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, line: &[u8]) -> io::Result<()> {
    output.write_all(line).await?;
    output.flush().await
}
