//! Collaboration contract with the external graph-renderer process: a
//! subgraph envelope is written to its stdin as JSON, SVG bytes are read
//! back from its stdout. The renderer itself lives outside this crate;
//! this module only owns the subprocess plumbing, grounded on the same
//! `tokio::process::Command` piping pattern dashflow's shell tool uses for
//! arbitrary subprocess execution.

use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::errors::{EngineError, Result};
use crate::subgraph::SubgraphEnvelope;

pub async fn render_svg(renderer_command: &str, envelope: &SubgraphEnvelope) -> Result<Vec<u8>> {
    let mut parts = renderer_command.split_whitespace();
    let program = parts.next().ok_or_else(|| EngineError::unsupported("renderer_command is not configured"))?;
    let args: Vec<&str> = parts.collect();

    let payload = serde_json::to_vec(envelope)?;

    let mut child = Command::new(program)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| EngineError::internal(format!("failed to spawn renderer '{program}': {e}")))?;

    let mut stdin = child.stdin.take().ok_or_else(|| EngineError::internal("renderer stdin unavailable"))?;
    stdin
        .write_all(&payload)
        .await
        .map_err(|e| EngineError::internal(format!("failed writing subgraph to renderer: {e}")))?;
    drop(stdin);

    let mut stdout_buf = Vec::new();
    let mut stderr_buf = Vec::new();
    if let Some(mut stdout) = child.stdout.take() {
        let _ = stdout.read_to_end(&mut stdout_buf).await;
    }
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_end(&mut stderr_buf).await;
    }

    let status = child
        .wait()
        .await
        .map_err(|e| EngineError::internal(format!("renderer process failed: {e}")))?;

    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr_buf);
        return Err(EngineError::internal(format!("renderer exited with {status}: {stderr}")));
    }

    Ok(stdout_buf)
}
