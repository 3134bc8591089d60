//! Client side of the sidecar protocol: one JSON request per line on the child's
//! stdin, one JSON response per line on its stdout.

use serde_json::{json, Value};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("sidecar i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed sidecar response: {0}")]
    Protocol(String),
    #[error("sidecar rejected request ({code}): {message}")]
    Remote {
        code: String,
        message: String,
        details: Option<Value>,
    },
    #[error("sidecar closed its output")]
    Closed,
}

impl RpcError {
    /// Error code reported by the sidecar, if the failure came from it.
    pub fn code(&self) -> Option<&str> {
        match self {
            RpcError::Remote { code, .. } => Some(code),
            _ => None,
        }
    }
}

struct SidecarIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl SidecarIo {
    /// Writes one request line and reads until the response carrying `id`.
    async fn exchange(&mut self, id: &str, line: &str) -> Result<Value, RpcError> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        loop {
            let mut resp = String::new();
            if self.stdout.read_line(&mut resp).await? == 0 {
                return Err(RpcError::Closed);
            }
            if let Some(result) = match_response(id, resp.trim()) {
                return result;
            }
        }
    }
}

/// Handle to a running `rosterd` child process.
///
/// Calls are serialized: the next request is written only after the previous
/// response line has been read. Each exchange runs on its own task, so a caller
/// that stops waiting does not leave a half-finished exchange on the pipe.
pub struct SidecarClient {
    io: Arc<Mutex<SidecarIo>>,
    // Held so the child is killed with the client.
    _child: Child,
}

impl SidecarClient {
    /// Must be called inside a tokio runtime.
    pub fn spawn(exe: impl AsRef<Path>) -> Result<Self, RpcError> {
        let exe = exe.as_ref();
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RpcError::Protocol("child stdin not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RpcError::Protocol("child stdout not piped".to_string()))?;
        tracing::debug!(exe = %exe.display(), "sidecar spawned");

        Ok(Self {
            io: Arc::new(Mutex::new(SidecarIo {
                stdin,
                stdout: BufReader::new(stdout),
            })),
            _child: child,
        })
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = Uuid::new_v4().to_string();
        let mut line = serde_json::to_string(&json!({
            "id": id,
            "method": method,
            "params": params,
        }))
        .map_err(|e| RpcError::Protocol(e.to_string()))?;
        line.push('\n');

        let io = Arc::clone(&self.io);
        let exchange = tokio::spawn(async move {
            let mut io = io.lock_owned().await;
            io.exchange(&id, &line).await
        });

        let result = match exchange.await {
            Ok(result) => result,
            Err(e) => Err(RpcError::Protocol(format!("sidecar exchange aborted: {e}"))),
        };
        if let Err(e) = &result {
            tracing::debug!(method, error = %e, "sidecar call failed");
        }
        result
    }

    pub async fn select_workspace(&self, path: &Path) -> Result<(), RpcError> {
        self.call(
            "workspace.select",
            json!({ "path": path.to_string_lossy() }),
        )
        .await
        .map(|_| ())
    }
}

/// `None` when the line answers some other request, such as one whose caller
/// gave up before reading it.
fn match_response(expected_id: &str, line: &str) -> Option<Result<Value, RpcError>> {
    let id = serde_json::from_str::<Value>(line)
        .ok()
        .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string));
    match id {
        Some(id) if id != expected_id => {
            tracing::debug!(expected = expected_id, got = %id, "discarding response to an earlier request");
            None
        }
        _ => Some(decode_response(expected_id, line)),
    }
}

fn decode_response(expected_id: &str, line: &str) -> Result<Value, RpcError> {
    let mut value: Value =
        serde_json::from_str(line).map_err(|e| RpcError::Protocol(e.to_string()))?;

    let id = value.get("id").and_then(Value::as_str);
    if id != Some(expected_id) {
        return Err(RpcError::Protocol(format!(
            "response id {id:?} does not match request {expected_id}"
        )));
    }

    match value.get("ok").and_then(Value::as_bool) {
        Some(true) => Ok(value.get_mut("result").map(Value::take).unwrap_or(Value::Null)),
        Some(false) => {
            let error = value.get("error");
            let field = |k: &str| {
                error
                    .and_then(|e| e.get(k))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            Err(RpcError::Remote {
                code: field("code"),
                message: field("message"),
                details: error.and_then(|e| e.get("details")).cloned(),
            })
        }
        None => Err(RpcError::Protocol("response has no ok flag".to_string())),
    }
}
