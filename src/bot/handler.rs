//! Batch-capable message handler: commands and task submissions.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use crate::bot::messages;
use crate::bot::monitor::{MonitorConfig, monitor_batch};
use crate::channels::{Channel, IncomingMessage, OutgoingResponse};
use crate::error::ChannelError;
use crate::queue::detector::{looks_like_batch, plan_batch};
use crate::queue::progress::BatchTracker;
use crate::queue::store::QueueStore;
use crate::sheets::Persister;

/// Chat commands the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Status,
}

impl Command {
    /// Parse `/name` or `/name@botname`. `Err` carries an unknown command name.
    pub fn parse(text: &str) -> Option<Result<Self, String>> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);

        Some(match name.to_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "help" => Ok(Self::Help),
            "status" => Ok(Self::Status),
            _ => Err(word.to_string()),
        })
    }
}

/// Turns chat messages into queued batches and answers commands.
pub struct BatchHandler {
    store: Arc<dyn QueueStore>,
    persister: Arc<dyn Persister>,
    channel: Arc<dyn Channel>,
    monitor: MonitorConfig,
    cancel: CancellationToken,
}

impl BatchHandler {
    pub fn new(
        store: Arc<dyn QueueStore>,
        persister: Arc<dyn Persister>,
        channel: Arc<dyn Channel>,
        monitor: MonitorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            persister,
            channel,
            monitor,
            cancel,
        }
    }

    /// Handle one inbound message. Submissions return the new batch id.
    pub async fn handle_message(&self, msg: &IncomingMessage) -> Result<Option<Uuid>, ChannelError> {
        let text = msg.content.trim();
        if text.is_empty() {
            return Ok(None);
        }

        match Command::parse(text) {
            Some(Ok(command)) => {
                self.handle_command(msg, command).await?;
                Ok(None)
            }
            Some(Err(unknown)) => {
                self.reply(msg, messages::unknown_command(&unknown)).await?;
                Ok(None)
            }
            None => self.submit(msg).await,
        }
    }

    async fn handle_command(&self, msg: &IncomingMessage, command: Command) -> Result<(), ChannelError> {
        let text = match command {
            Command::Start => messages::START.to_string(),
            Command::Help => messages::HELP.to_string(),
            Command::Status => self.status_text().await,
        };
        self.reply(msg, text).await
    }

    /// Queue status with backend connectivity, as shown by `/status`.
    pub async fn status_text(&self) -> String {
        let connected = match self.persister.health_check().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Persistence health check failed");
                false
            }
        };
        let counts = match self.store.aggregate_status_counts().await {
            Ok(counts) => Some(counts),
            Err(e) => {
                error!(error = %e, "Failed to read queue counts");
                None
            }
        };
        messages::status(connected, counts.as_ref())
    }

    /// Acknowledge, split, enqueue, announce, then monitor in the background.
    async fn submit(&self, msg: &IncomingMessage) -> Result<Option<Uuid>, ChannelError> {
        self.reply(msg, messages::ACK.to_string()).await?;

        let plan = plan_batch(&msg.content);
        if plan.is_empty() {
            self.reply(msg, messages::NO_TASKS.to_string()).await?;
            return Ok(None);
        }
        if plan.len() == 1 && looks_like_batch(&msg.content) {
            debug!(
                sender = msg.sender(),
                "Message reads like several tasks but has no split points"
            );
        }

        let stored = match self.store.enqueue_batch(&plan).await {
            Ok(stored) => stored,
            Err(e) => {
                error!(error = %e, sender = msg.sender(), "Failed to enqueue batch");
                self.reply(msg, messages::ENQUEUE_FAILED.to_string()).await?;
                return Ok(None);
            }
        };

        let Some(batch_id) = stored.first().map(|item| item.batch_id) else {
            self.reply(msg, messages::NO_TASKS.to_string()).await?;
            return Ok(None);
        };

        info!(
            batch_id = %batch_id,
            count = stored.len(),
            format = %stored[0].format_tag,
            sender = msg.sender(),
            "Batch submitted"
        );
        self.reply(msg, messages::batch_started(stored.len(), batch_id))
            .await?;

        tokio::spawn(
            monitor_batch(
                BatchTracker::new(Arc::clone(&self.store)),
                Arc::clone(&self.channel),
                msg.clone(),
                batch_id,
                self.monitor.clone(),
                self.cancel.child_token(),
            )
            .instrument(info_span!("monitor", batch_id = %batch_id)),
        );

        Ok(Some(batch_id))
    }

    async fn reply(&self, msg: &IncomingMessage, text: String) -> Result<(), ChannelError> {
        self.channel.respond(msg, OutgoingResponse::text(text)).await
    }
}
