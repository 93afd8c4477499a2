//! CLI channel: stdin/stdout REPL for local testing.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// A simple CLI channel that reads from stdin and writes to stdout.
///
/// A line containing only `"""` starts or ends a multi-line message, so
/// bulleted lists can be pasted in one go.
#[derive(Default)]
pub struct CliChannel {
    cancel: CancellationToken,
}

impl CliChannel {
    pub fn new() -> Self {
        Self::default()
    }
}

const BLOCK_DELIMITER: &str = "\"\"\"";

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();
            let mut block: Option<Vec<String>> = None;

            eprint!("> ");

            loop {
                let line = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    line = lines.next_line() => line,
                };

                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!(error = %e, "Error reading stdin");
                        break;
                    }
                };

                let text = match (block.as_mut(), line.trim() == BLOCK_DELIMITER) {
                    (None, true) => {
                        block = Some(Vec::new());
                        continue;
                    }
                    (Some(_), true) => block.take().map(|b| b.join("\n")).unwrap_or_default(),
                    (Some(buf), false) => {
                        buf.push(line);
                        continue;
                    }
                    (None, false) => line.trim().to_string(),
                };

                if text.trim().is_empty() {
                    eprint!("> ");
                    continue;
                }

                let msg = IncomingMessage::new("cli", "local-user", text)
                    .with_metadata(serde_json::json!({}));
                if tx.send(msg).is_err() {
                    break;
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", response.content);
        eprint!("> ");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        self.cancel.cancel();
        Ok(())
    }
}
