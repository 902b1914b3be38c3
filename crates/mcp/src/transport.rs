// Newline-delimited JSON framing over a byte stream

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

/// Upper bound on a single message; larger lines are a protocol violation
pub const MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

pub type LineReader = FramedRead<Box<dyn AsyncRead + Send + Unpin>, LinesCodec>;
pub type LineWriter = FramedWrite<Box<dyn AsyncWrite + Send + Unpin>, LinesCodec>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("framing error: {0}")]
    Framing(#[from] LinesCodecError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn line_reader<R>(reader: R) -> LineReader
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let boxed: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
    FramedRead::new(boxed, LinesCodec::new_with_max_length(MAX_LINE_LENGTH))
}

pub fn line_writer<W>(writer: W) -> LineWriter
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
    FramedWrite::new(boxed, LinesCodec::new_with_max_length(MAX_LINE_LENGTH))
}

/// Serialize `message` onto one line and flush it
pub async fn write_message<T: Serialize>(
    writer: &mut LineWriter,
    message: &T,
) -> Result<(), TransportError> {
    let line = serde_json::to_string(message)?;
    writer.send(line).await?;
    Ok(())
}

/// Next non-blank line decoded as JSON; `None` at end of stream
pub async fn read_message(reader: &mut LineReader) -> Option<Result<Value, TransportError>> {
    loop {
        let line = match reader.next().await? {
            Ok(line) => line,
            Err(e) => return Some(Err(e.into())),
        };
        if line.trim().is_empty() {
            continue;
        }
        return Some(serde_json::from_str(&line).map_err(TransportError::from));
    }
}
