//! Agent logic backed by an external command.
//!
//! Spawns the command once per request, pipes the request content to stdin
//! and turns trimmed stdout into the response. Empty output means no reply.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::collaborators::AgentLogic;
use crate::domain::Message;

/// Environment variable exposing the conversation id to the command
pub const CONVERSATION_ENV: &str = "AGENT_CONVERSATION_ID";

/// Subprocess agent logic
#[derive(Debug, Clone)]
pub struct CommandLogic {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandLogic {
    /// Run `program` with `args` for every request
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run the command with `input` on stdin and return its stdout
    async fn execute_subprocess(&self, input: &str, conversation: Option<&str>) -> Result<String> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(conversation) = conversation {
            command.env(CONVERSATION_ENV, conversation);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Failed to spawn '{}'", self.program))?;

        // Write input to stdin
        // Commands that never read stdin may exit first; that is not an error
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(input.as_bytes()).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to write to '{}' stdin", self.program))
                }
            }
            // Drop stdin to signal EOF
        }

        // Wait for completion with timeout
        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .with_context(|| format!("'{}' timed out after {:?}", self.program, self.timeout))?
            .with_context(|| format!("Failed to wait for '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "'{}' failed with exit code {}: {}",
                self.program,
                exit_code,
                stderr.trim()
            );
        }

        String::from_utf8(output.stdout)
            .with_context(|| format!("'{}' output is not valid UTF-8", self.program))
    }
}

#[async_trait]
impl AgentLogic for CommandLogic {
    async fn process(&mut self, request: Message) -> Result<Option<Message>> {
        let stdout = self
            .execute_subprocess(request.content(), request.conversation_id())
            .await?;

        let reply = stdout.trim();
        if reply.is_empty() {
            return Ok(None);
        }
        Ok(Some(request.reply(reply)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandLogic {
        CommandLogic::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_stdout_becomes_response() {
        let mut logic = sh("tr a-z A-Z");
        let request = Message::new("hello").with_conversation_id("c1");

        let response = logic.process(request).await.unwrap().unwrap();
        assert_eq!(response.content(), "HELLO");
        assert_eq!(response.conversation_id(), Some("c1"));
    }

    #[tokio::test]
    async fn test_empty_output_is_no_reply() {
        let mut logic = sh("cat > /dev/null");
        assert!(logic.process(Message::new("x")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conversation_env() {
        let mut logic = sh("printf '%s' \"$AGENT_CONVERSATION_ID\"");
        let response = logic
            .process(Message::new("").with_conversation_id("abc"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.content(), "abc");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_error() {
        let mut logic = sh("echo broken >&2; exit 3");
        let err = logic.process(Message::new("x")).await.unwrap_err();
        assert!(err.to_string().contains("exit code 3"));
        assert!(err.to_string().contains("broken"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut logic = CommandLogic::new(
            "sleep",
            vec!["5".to_string()],
            Duration::from_millis(100),
        );
        let err = logic.process(Message::new("")).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
