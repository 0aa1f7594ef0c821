//! Slash-command executor
//!
//! String-routed variant of the command executor: the node names a command
//! registered in the internal [`SlashCommands`] registry; the registry
//! template is rendered with the node's `args` and executed as a shell
//! command.

use crate::error::{EngineError, Result};
use crate::executor::command::CommandExecutor;
use crate::executor::{ActivitySink, ExecOutcome, ExecRequest, NodeExecutor};
use crate::traits::SlashCommands;
use async_trait::async_trait;
use foundry_graph::{render_template, NodeKind};
use serde_json::json;
use std::sync::Arc;

pub struct SlashCommandExecutor {
    commands: Arc<SlashCommands>,
}

impl SlashCommandExecutor {
    pub fn new(commands: Arc<SlashCommands>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl NodeExecutor for SlashCommandExecutor {
    fn kind(&self) -> NodeKind {
        NodeKind::SlashCommand
    }

    async fn execute(&self, request: &ExecRequest, activity: &ActivitySink) -> Result<ExecOutcome> {
        let name = request
            .config_str("command")
            .ok_or_else(|| EngineError::Internal("slash-command node has no command".to_string()))?;

        let template = self
            .commands
            .resolve(name)
            .ok_or_else(|| EngineError::Internal(format!("unknown slash command '{name}'")))?;

        let args = request.config_str("args").unwrap_or_default();
        let scope = json!({"args": args});
        let command_line = render_template(&template, &scope)?;

        activity.emit("slash-command", json!({"name": name}));
        CommandExecutor::run_command(request, &command_line, activity).await
    }
}
