use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use todo_bot::bot::{self, BatchHandler};
use todo_bot::channels::{Channel, CliChannel, TelegramChannel};
use todo_bot::classify::OpenRouterClassifier;
use todo_bot::config::BotConfig;
use todo_bot::health::{self, HealthState};
use todo_bot::pipeline::TaskProcessor;
use todo_bot::queue::{INTERRUPTED_REASON, QueueStore, WorkerPool, spawn_retention_task};
use todo_bot::sheets::SheetsClient;
use todo_bot::store::LibSqlQueueStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = BotConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📝 Todo Bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   Workers: {}", config.workers);
    eprintln!("   Health: http://0.0.0.0:{}/healthz", config.port);

    // ── Queue ────────────────────────────────────────────────────────────
    let store: Arc<dyn QueueStore> = Arc::new(
        LibSqlQueueStore::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    let recovered = store.fail_interrupted(INTERRUPTED_REASON).await?;
    if recovered > 0 {
        eprintln!("   Failed {} items interrupted by the last shutdown", recovered);
    }

    // ── Processing ───────────────────────────────────────────────────────
    let classifier = Arc::new(OpenRouterClassifier::new(
        config.openrouter_api_key.clone(),
        config.model.clone(),
    )?);
    let sheets = Arc::new(SheetsClient::new(config.script_url.clone())?);
    let processor = Arc::new(TaskProcessor::new(classifier, sheets.clone()));

    let cancel = CancellationToken::new();

    let mut pool = WorkerPool::new(
        Arc::clone(&store),
        processor,
        config.worker_config(),
        &cancel,
    );
    pool.start();

    let retention = spawn_retention_task(
        Arc::clone(&store),
        config.retention,
        config.sweep_interval,
        cancel.child_token(),
    );

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind health port {}", config.port))?;
    let health_server = tokio::spawn(health::serve(
        listener,
        HealthState::new(Arc::clone(&store)),
        cancel.child_token(),
    ));

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = match &config.telegram_token {
        Some(token) => {
            eprintln!("   Telegram: enabled (allowed: {})", config.allowed_users_label());
            Arc::new(TelegramChannel::new(
                token.clone(),
                config.telegram_allowed_users.clone(),
            ))
        }
        None => {
            eprintln!("   Telegram: disabled, reading from stdin");
            eprintln!("   Wrap multi-line messages in \"\"\" lines.\n");
            Arc::new(CliChannel::new())
        }
    };

    if let Err(e) = channel.health_check().await {
        tracing::warn!(channel = channel.name(), error = %e, "Channel health check failed");
    }

    let handler = Arc::new(BatchHandler::new(
        Arc::clone(&store),
        sheets,
        Arc::clone(&channel),
        config.monitor_config(),
        cancel.child_token(),
    ));

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested");
                cancel.cancel();
            }
        });
    }

    let result = bot::run(handler, channel, cancel.clone()).await;

    // ── Shutdown ─────────────────────────────────────────────────────────
    cancel.cancel();
    if let Err(e) = pool.shutdown(config.shutdown_timeout).await {
        tracing::warn!(error = %e, "Worker pool did not stop cleanly");
    }
    if let Err(e) = retention.await {
        tracing::warn!(error = %e, "Retention task died");
    }
    match health_server.await {
        Ok(Err(e)) => tracing::warn!(error = %e, "Health server failed"),
        Err(e) => tracing::warn!(error = %e, "Health server task panicked"),
        Ok(Ok(())) => {}
    }
    tracing::info!("Todo Bot stopped");

    result.context("Channel failed")
}

/// Console logging, plus a daily-rolling file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "todo-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}
