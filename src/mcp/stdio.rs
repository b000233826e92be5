// src/mcp/stdio.rs

//! Line-delimited JSON-RPC over a byte stream (stdin/stdout in production).
//!
//! Each request runs on its own task so a slow backend call never holds up
//! the others; a single writer task serialises the responses. Responses can
//! therefore come back out of request order, correlated by their ids.

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::mcp::{
    handler::handle_mcp_request,
    protocol::{error_codes, Request, Response},
};
use crate::AppState;

pub async fn serve<R, W>(reader: R, writer: W, state: AppState) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let session = format!("stdio-{}", Uuid::new_v4());
    info!("MCP session {} started", session);

    let (tx, rx) = mpsc::channel::<Response>(64);
    let writer_task = tokio::spawn(write_responses(writer, rx));

    let mut lines = reader.lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("EOF received, closing MCP session {}", session);
                break;
            }
            Err(e) => {
                error!("Failed to read from input: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        debug!("Received: {}", line);

        match serde_json::from_str::<Request>(line) {
            Ok(request) => {
                let tx = tx.clone();
                let state = state.clone();
                let session = session.clone();
                tokio::spawn(async move {
                    if let Some(response) = handle_mcp_request(request, state, &session).await {
                        let _ = tx.send(response).await;
                    }
                });
            }
            Err(parse_error) => {
                error!("JSON parse error: {}", parse_error);
                let response = Response::error(
                    serde_json::Value::Null,
                    error_codes::PARSE_ERROR,
                    format!("Parse error: {}", parse_error),
                );
                if tx.send(response).await.is_err() {
                    break;
                }
            }
        }
    }

    // In-flight requests still hold senders; the writer drains until they finish.
    drop(tx);
    if let Err(e) = writer_task.await {
        error!("Response writer task failed: {}", e);
    }

    state.dispatcher.session_closed(&session).await;
    info!("MCP session {} closed", session);
    Ok(())
}

async fn write_responses<W>(mut writer: W, mut rx: mpsc::Receiver<Response>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let response_json = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize response: {}", e);
                continue;
            }
        };
        debug!("Sending: {}", response_json);
        let written = async {
            writer.write_all(response_json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            error!("Failed to write response: {}", e);
            break;
        }
    }
}
