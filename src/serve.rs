// src/serve.rs

//! Line-oriented client front end.
//!
//! Each input line is one JSON request:
//!
//! ```json
//! {"method": "file-declare", "params": {"type": "file"}}
//! {"method": "file-commit", "params": {"file-id": "..."}, "content": "bytes"}
//! ```
//!
//! Each request gets exactly one JSON line back, `{"ok": <reply>}` or
//! `{"error": "<message>"}`, written after the request's effects are
//! durable. End of input shuts the manager down.

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::engine::{ManagerEvent, ManagerHandle};
use crate::errors::{Result, SwarmError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClientRequest {
    method: String,
    #[serde(default = "empty_params")]
    params: Value,
    /// Payload of a `file-commit`.
    #[serde(default)]
    content: Option<String>,
}

fn empty_params() -> Value {
    Value::Object(Map::new())
}

/// Answer requests from `input` on `output` until input ends.
///
/// Returns the number of requests handled. A failed request is answered
/// with an error line; only IO failures end the loop early.
pub async fn serve_lines<R, W>(handle: &ManagerHandle, input: R, mut output: W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut handled = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match handle_line(handle, &line).await {
            Ok(reply) => json!({ "ok": reply }),
            Err(e) => {
                debug!(error = %e, "client request failed");
                json!({ "error": e.to_string() })
            }
        };
        let mut bytes = serde_json::to_vec(&response)?;
        bytes.push(b'\n');
        output.write_all(&bytes).await?;
        output.flush().await?;
        handled += 1;
    }

    info!(handled, "client input closed");
    Ok(handled)
}

async fn handle_line(handle: &ManagerHandle, line: &str) -> Result<Value> {
    let request: ClientRequest = serde_json::from_str(line)
        .map_err(|e| SwarmError::Validation(format!("malformed request: {e}")))?;
    let content = request.content.map(String::into_bytes);
    let event = ManagerEvent::from_client(&request.method, &request.params, content)?;
    let reply = handle.request(event).await?;
    Ok(serde_json::to_value(reply)?)
}
