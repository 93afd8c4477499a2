//! Chat front-end: message loop, submissions, progress reporting.

pub mod handler;
pub mod messages;
pub mod monitor;

pub use handler::{BatchHandler, Command};
pub use monitor::{MonitorConfig, MonitorOutcome, monitor_batch};

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use crate::channels::Channel;
use crate::error::Result;

/// Read messages from `channel` until it closes or `cancel` fires.
///
/// Each message is handled on its own task so a slow reply never blocks the
/// inbound stream.
pub async fn run(
    handler: Arc<BatchHandler>,
    channel: Arc<dyn Channel>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut stream = channel.start().await?;
    info!(channel = channel.name(), "Listening for messages");

    loop {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            msg = stream.next() => msg,
        };

        let Some(msg) = msg else {
            info!(channel = channel.name(), "Message stream ended");
            break;
        };

        let handler = Arc::clone(&handler);
        let span = info_span!("message", id = %msg.id, channel = %msg.channel);
        tokio::spawn(
            async move {
                if let Err(e) = handler.handle_message(&msg).await {
                    warn!(error = %e, "Failed to handle message");
                }
            }
            .instrument(span),
        );
    }

    channel.shutdown().await?;
    Ok(())
}
