//! TCP control server
//!
//! Accepts connections and runs each session as its own task. A session
//! reads one command per line and ends on `EXIT` or when the peer closes.

use super::command::{respond, HELP};
use crate::dataplane::NfEngine;
use crate::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Longest accepted command line, newline included
pub const MAX_LINE_LEN: usize = 256;

const PROMPT: &str = "> ";

/// Accept control sessions until the task is dropped
pub async fn serve(listener: TcpListener, engine: Arc<NfEngine>) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "Control server listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Failed to accept control connection");
                continue;
            }
        };

        info!(%peer, "Control session opened");
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_session(stream, &engine).await {
                warn!(%peer, error = %e, "Control session failed");
            }
            info!(%peer, "Control session closed");
        });
    }
}

/// Run one session over any byte stream
pub async fn handle_session<S>(stream: S, engine: &NfEngine) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    writer.write_all(HELP.as_bytes()).await?;
    writer.write_all(PROMPT.as_bytes()).await?;

    let mut buf = Vec::with_capacity(MAX_LINE_LEN);
    loop {
        buf.clear();
        let n = (&mut reader)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            debug!("Control peer closed the connection");
            return Ok(());
        }

        if buf.last() != Some(&b'\n') && n == MAX_LINE_LEN {
            skip_line(&mut reader).await?;
            writer.write_all(b"ERR line too long\n").await?;
            writer.write_all(PROMPT.as_bytes()).await?;
            continue;
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            writer.write_all(PROMPT.as_bytes()).await?;
            continue;
        }

        debug!(command = line, "Control command");
        let reply = respond(line, engine);
        writer.write_all(reply.text.as_bytes()).await?;
        if reply.close {
            writer.flush().await?;
            return Ok(());
        }
        writer.write_all(PROMPT.as_bytes()).await?;
    }
}

/// Discard the rest of an overlong line
async fn skip_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<()> {
    let mut junk = Vec::with_capacity(MAX_LINE_LEN);
    loop {
        junk.clear();
        let n = (&mut *reader)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut junk)
            .await?;
        if n == 0 || junk.last() == Some(&b'\n') {
            return Ok(());
        }
    }
}
