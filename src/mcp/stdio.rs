//! Newline-delimited JSON-RPC over stdin/stdout.
//!
//! Every request runs on its own task so a long `run_query` does not block
//! `get_status` calls behind it. Responses go through a single writer task.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handler::{InFlight, McpHandler};
use super::protocol::{JsonRpcMessage, JsonRpcResponse};
use crate::error::{AthenaError, Result};

/// Serves MCP on the process's stdin and stdout until EOF or `shutdown`.
pub async fn serve_stdio(handler: Arc<McpHandler>, shutdown: CancellationToken) -> Result<()> {
    info!("Serving MCP over stdio");
    serve(handler, tokio::io::stdin(), tokio::io::stdout(), shutdown).await
}

/// Serves MCP over an arbitrary byte stream pair.
///
/// Closing `reader` cancels every request still in flight.
pub async fn serve<R, W>(
    handler: Arc<McpHandler>,
    reader: R,
    writer: W,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    let writer_task = tokio::spawn(write_responses(writer, rx));

    let connection = shutdown.child_token();
    let in_flight = Arc::new(InFlight::default());
    let mut tasks = JoinSet::new();
    let mut lines = BufReader::new(reader).lines();

    let read_result = loop {
        let line = tokio::select! {
            _ = connection.cancelled() => break Ok(()),
            Some(_) = tasks.join_next(), if !tasks.is_empty() => continue,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("stdin closed");
                break Ok(());
            }
            Err(e) => break Err(AthenaError::transport(format!("Failed to read stdin: {e}"))),
        };
        if line.trim().is_empty() {
            continue;
        }

        let message = match JsonRpcMessage::parse(&line) {
            Ok(message) => message,
            Err(response) => {
                warn!("Received malformed JSON-RPC message");
                let _ = tx.send(response);
                continue;
            }
        };

        if let Some(key) = message.cancelled_request_key() {
            let found = in_flight.cancel(&key);
            debug!(request_id = %key, found, "Cancellation requested");
            continue;
        }

        let token = connection.child_token();
        let guard = in_flight.track(&message, token.clone());
        let handler = Arc::clone(&handler);
        let tx = tx.clone();
        tasks.spawn(async move {
            let response = handler.handle(message, &token).await;
            drop(guard);
            if let Some(response) = response {
                let _ = tx.send(response);
            }
        });
    };

    connection.cancel();
    while tasks.join_next().await.is_some() {}
    drop(tx);

    match writer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(AthenaError::transport(format!("Failed to write stdout: {e}"))),
        Err(e) => return Err(AthenaError::internal(format!("stdout writer task failed: {e}"))),
    }
    read_result
}

async fn write_responses<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<JsonRpcResponse>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_string(&response)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}
