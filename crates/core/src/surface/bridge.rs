//! Bridge-process surface implementation
//!
//! Drives a helper process that renders the interactive session and exposes it
//! over newline-delimited JSON on stdin/stdout. One request line yields exactly
//! one response line; calls are strictly sequential, which the `&mut self`
//! surface contract already guarantees.

use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use futures_util::StreamExt;
use serde_json::{Value, json};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, ChildStdout, Command as TokioCommand};
use tokio_util::codec::{FramedRead, LinesCodec};

use super::{RenderedMessage, Surface, SurfaceError};

/// Live session surface backed by a bridge process
pub struct BridgeSurface {
    /// Bridge executable and arguments
    command: Vec<String>,

    /// Identity token injected at open
    token: String,

    /// Channel the session navigates to at open
    channel_id: String,

    process: Option<BridgeProcess>,
}

struct BridgeProcess {
    child: AsyncGroupChild,
    stdin: ChildStdin,
    stdout: FramedRead<ChildStdout, LinesCodec>,
}

impl BridgeSurface {
    /// Create a surface for the given bridge command and identity
    pub fn new(
        command: Vec<String>,
        token: impl Into<String>,
        channel_id: impl Into<String>,
    ) -> Self {
        Self {
            command,
            token: token.into(),
            channel_id: channel_id.into(),
            process: None,
        }
    }

    fn spawn(&mut self) -> Result<(), SurfaceError> {
        let exe = self
            .command
            .first()
            .ok_or_else(|| SurfaceError::Spawn("empty bridge command".to_string()))?;

        let mut cmd = TokioCommand::new(exe);
        cmd.args(&self.command[1..]);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::null());

        let mut child = cmd
            .group_spawn()
            .map_err(|e| SurfaceError::Spawn(format!("Failed to spawn {exe}: {e}")))?;

        let stdin = child
            .inner()
            .stdin
            .take()
            .ok_or_else(|| SurfaceError::Spawn("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .inner()
            .stdout
            .take()
            .ok_or_else(|| SurfaceError::Spawn("bridge stdout unavailable".to_string()))?;

        self.process = Some(BridgeProcess {
            child,
            stdin,
            stdout: FramedRead::new(stdout, LinesCodec::new()),
        });

        Ok(())
    }

    /// Send one request frame and read its response frame.
    async fn request(&mut self, payload: Value) -> Result<Value, SurfaceError> {
        let process = self.process.as_mut().ok_or(SurfaceError::Closed)?;

        let mut line = payload.to_string();
        line.push('\n');
        process.stdin.write_all(line.as_bytes()).await?;
        process.stdin.flush().await?;

        let frame = process
            .stdout
            .next()
            .await
            .ok_or(SurfaceError::Closed)?
            .map_err(|e| SurfaceError::Protocol(e.to_string()))?;

        let response: Value = serde_json::from_str(&frame)
            .map_err(|e| SurfaceError::Protocol(format!("invalid frame: {e}")))?;

        if response.get("ok").and_then(Value::as_bool) != Some(true) {
            let message = response
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unspecified bridge failure");
            return Err(SurfaceError::Remote(message.to_string()));
        }

        Ok(response)
    }
}

#[async_trait]
impl Surface for BridgeSurface {
    async fn open(&mut self) -> Result<(), SurfaceError> {
        if self.process.is_none() {
            self.spawn()?;
        }

        tracing::debug!(channel = %self.channel_id, "opening bridge session");
        self.request(json!({
            "op": "open",
            "token": self.token,
            "channel": self.channel_id,
        }))
        .await?;
        Ok(())
    }

    async fn is_ready(&mut self) -> Result<bool, SurfaceError> {
        let response = self.request(json!({"op": "ready"})).await?;
        Ok(response.get("ready").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn message_count(&mut self) -> Result<usize, SurfaceError> {
        let response = self.request(json!({"op": "count"})).await?;
        response
            .get("count")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .ok_or_else(|| SurfaceError::Protocol("count missing from response".to_string()))
    }

    async fn read_messages_from(
        &mut self,
        baseline: usize,
    ) -> Result<Vec<RenderedMessage>, SurfaceError> {
        let response = self.request(json!({"op": "list", "from": baseline})).await?;
        let messages = response
            .get("messages")
            .cloned()
            .ok_or_else(|| SurfaceError::Protocol("messages missing from response".to_string()))?;
        serde_json::from_value(messages)
            .map_err(|e| SurfaceError::Protocol(format!("invalid message list: {e}")))
    }

    async fn read_message_at(
        &mut self,
        index: usize,
    ) -> Result<Option<RenderedMessage>, SurfaceError> {
        let response = self.request(json!({"op": "read", "index": index})).await?;
        match response.get("message") {
            None | Some(Value::Null) => Ok(None),
            Some(message) => serde_json::from_value(message.clone())
                .map(Some)
                .map_err(|e| SurfaceError::Protocol(format!("invalid message: {e}"))),
        }
    }

    async fn entry_text(&mut self) -> Result<String, SurfaceError> {
        let response = self.request(json!({"op": "entry"})).await?;
        Ok(response
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn set_entry_text(&mut self, text: &str) -> Result<(), SurfaceError> {
        self.request(json!({"op": "set_entry", "text": text})).await?;
        Ok(())
    }

    async fn submit_entry(&mut self) -> Result<(), SurfaceError> {
        self.request(json!({"op": "submit"})).await?;
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), SurfaceError> {
        self.request(json!({"op": "ping"})).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SurfaceError> {
        if let Some(mut process) = self.process.take() {
            // Best-effort goodbye frame; the process group is killed regardless.
            let mut line = json!({"op": "close"}).to_string();
            line.push('\n');
            let _ = process.stdin.write_all(line.as_bytes()).await;
            let _ = process.stdin.flush().await;
            process.child.kill().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_rejected() {
        let mut surface = BridgeSurface::new(vec![], "token", "channel");
        let err = surface.spawn().unwrap_err();
        assert!(matches!(err, SurfaceError::Spawn(_)));
    }

    #[tokio::test]
    async fn test_request_before_open_is_closed() {
        let mut surface =
            BridgeSurface::new(vec!["bridge".to_string()], "token", "channel");
        let err = surface.request(json!({"op": "ping"})).await.unwrap_err();
        assert!(matches!(err, SurfaceError::Closed));
    }

    #[tokio::test]
    async fn test_close_without_open_is_noop() {
        let mut surface =
            BridgeSurface::new(vec!["bridge".to_string()], "token", "channel");
        assert!(surface.close().await.is_ok());
    }
}
