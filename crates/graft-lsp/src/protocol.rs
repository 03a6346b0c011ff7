//! JSON-RPC base protocol: framing and error taxonomy

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Errors surfaced by LSP transport and requests. Timeout, connection
/// reset and protocol errors all funnel into the pool's retry path.
#[derive(Debug, Error)]
pub enum LspError {
    #[error("request timed out")]
    Timeout,
    #[error("connection to language server reset")]
    ConnectionReset,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("failed to spawn language server `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
}

impl LspError {
    /// Whether a retry with a restarted server may help.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LspError::Timeout | LspError::ConnectionReset | LspError::Protocol(_)
        )
    }
}

impl From<std::io::Error> for LspError {
    fn from(_: std::io::Error) -> Self {
        LspError::ConnectionReset
    }
}

/// Write one framed message: `Content-Length: N\r\n\r\n<payload>`.
pub async fn write_message<W>(writer: &mut W, message: &Value) -> Result<(), LspError>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_string(message)
        .map_err(|err| LspError::Protocol(format!("unserializable message: {err}")))?;
    let framed = format!("Content-Length: {}\r\n\r\n{}", payload.len(), payload);
    writer.write_all(framed.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message. Returns `None` on a clean end of stream.
pub async fn read_message<R>(reader: &mut BufReader<R>) -> Result<Option<Value>, LspError>
where
    R: AsyncRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some(value) = line.strip_prefix("Content-Length:") {
            content_length = Some(
                value
                    .trim()
                    .parse()
                    .map_err(|_| LspError::Protocol(format!("bad Content-Length: {line}")))?,
            );
        }
        // Content-Type headers are accepted and ignored.
    }

    let length =
        content_length.ok_or_else(|| LspError::Protocol("missing Content-Length".into()))?;
    let mut body = vec![0u8; length];
    tokio::io::AsyncReadExt::read_exact(reader, &mut body).await?;
    let value = serde_json::from_slice(&body)
        .map_err(|err| LspError::Protocol(format!("malformed JSON body: {err}")))?;
    Ok(Some(value))
}
