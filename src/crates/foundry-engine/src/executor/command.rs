//! Shell command executor
//!
//! Runs the configured command line through `sh -c`, with optional working
//! directory, extra environment, timeout and `throwOnError`. The decrypted
//! workflow environment is always injected. On timeout the child is killed
//! and the step fails with `CommandTimeout`.

use crate::error::{EngineError, Result};
use crate::executor::{ActivitySink, ExecOutcome, ExecRequest, NodeExecutor};
use async_trait::async_trait;
use foundry_graph::NodeKind;
use serde_json::{json, Value};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const DEFAULT_TIMEOUT_SECS: u64 = 300;

pub struct CommandExecutor;

impl CommandExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Shared by the dynamic-command executor after it resolves its
    /// expressions into a concrete command line.
    pub(crate) async fn run_command(
        request: &ExecRequest,
        command_line: &str,
        activity: &ActivitySink,
    ) -> Result<ExecOutcome> {
        let timeout_secs = request.config_u64("timeoutSecs").unwrap_or(DEFAULT_TIMEOUT_SECS);
        let throw_on_error = request.config_bool("throwOnError");

        let mut command = Command::new("sh");
        command
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = request.config_str("cwd") {
            command.current_dir(cwd);
        }
        for (key, value) in &request.env {
            command.env(key, value);
        }
        if let Some(extra) = request.node.config.get("env").and_then(Value::as_object) {
            for (key, value) in extra {
                if let Some(v) = value.as_str() {
                    command.env(key, v);
                }
            }
        }

        activity.emit("command-start", json!({"command": command_line}));

        let mut child = command
            .spawn()
            .map_err(|e| EngineError::Internal(format!("failed to spawn command: {e}")))?;

        if let Some(input) = request.input_str("input") {
            if let Some(mut stdin) = child.stdin.take() {
                let _ = stdin.write_all(input.as_bytes()).await;
            }
        }
        drop(child.stdin.take());

        let waited = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        )
        .await;

        let output = match waited {
            Ok(result) => {
                result.map_err(|e| EngineError::Internal(format!("command wait failed: {e}")))?
            }
            Err(_) => {
                activity.emit("command-timeout", json!({"timeoutSecs": timeout_secs}));
                return Err(EngineError::CommandTimeout {
                    seconds: timeout_secs,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        activity.emit("command-complete", json!({"exitCode": exit_code}));

        if throw_on_error && exit_code != 0 {
            return Err(EngineError::Internal(format!(
                "command exited with status {exit_code}: {}",
                stderr.trim()
            )));
        }

        Ok(ExecOutcome::new()
            .with_output("stdout", json!(stdout))
            .with_output("stderr", json!(stderr))
            .with_output("exitCode", json!(exit_code)))
    }
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeExecutor for CommandExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::Command
    }

    async fn execute(&self, request: &ExecRequest, activity: &ActivitySink) -> Result<ExecOutcome> {
        let command_line = request
            .config_str("command")
            .ok_or_else(|| EngineError::Internal("command node has no command".to_string()))?
            .to_string();
        Self::run_command(request, &command_line, activity).await
    }
}
