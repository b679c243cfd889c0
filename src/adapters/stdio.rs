//! Line-oriented terminal ports.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::QueueSink;
use crate::domain::{Message, Proof};
use crate::ports::{InputPort, OutputPort};

/// Conversation id given to every stdin message
pub const STDIN_CONVERSATION: &str = "stdin";

/// Reads one message per non-empty line of stdin
#[derive(Debug, Default)]
pub struct StdinInput;

impl StdinInput {
    pub fn new() -> Self {
        Self
    }
}

/// Push every non-empty line of `reader` until EOF or shutdown
pub async fn pump_lines<R>(reader: R, sink: &QueueSink, shutdown: &CancellationToken) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut pushed = 0;

    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line.context("Failed to read input line")?,
        };

        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let message = Message::new(line).with_conversation_id(STDIN_CONVERSATION);
        if sink.push(message).await.is_err() {
            break;
        }
        pushed += 1;
    }

    Ok(pushed)
}

#[async_trait]
impl InputPort for StdinInput {
    fn name(&self) -> &str {
        "stdin"
    }

    async fn start(&self, sink: QueueSink, shutdown: CancellationToken) -> Result<()> {
        let reader = BufReader::new(tokio::io::stdin());
        let pushed = pump_lines(reader, &sink, &shutdown).await?;
        tracing::debug!(pushed, "Stdin closed");
        Ok(())
    }
}

/// Writes each response to stdout, optionally with its proof
pub struct StdoutOutput {
    show_proof: bool,
    out: Mutex<tokio::io::Stdout>,
}

impl StdoutOutput {
    pub fn new(show_proof: bool) -> Self {
        Self {
            show_proof,
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

/// Text written for one delivered result
pub fn render(response: &Message, proof: &Proof, show_proof: bool) -> String {
    if show_proof {
        format!("{}\n[proof {}]\n", response.content(), proof)
    } else {
        format!("{}\n", response.content())
    }
}

#[async_trait]
impl OutputPort for StdoutOutput {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn send(&self, _request: &Message, response: &Message, proof: &Proof) -> Result<()> {
        let text = render(response, proof, self.show_proof);
        let mut out = self.out.lock().await;
        out.write_all(text.as_bytes())
            .await
            .context("Failed to write to stdout")?;
        out.flush().await.context("Failed to flush stdout")?;
        Ok(())
    }
}
