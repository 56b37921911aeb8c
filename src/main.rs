//! Telegram support desk with AI answers
//!
//! (c) Softlandia 2025

use support_desk::api;
use support_desk::config::Settings;
use support_desk::core::services::SupportService;
use support_desk::infrastructure::providers::build_provider;
use support_desk::infrastructure::telegram::{self, TelegramNotifier};

use anyhow::anyhow;
use di::{Ref, ServiceProvider};
use di_axum::RouterServiceProviderExtensions;
use log::{info, warn};
use teloxide::Bot;
use tokio::runtime::{Builder, Runtime};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;
    info!(
        "using AI provider {:?} with model {}",
        settings.ai.provider, settings.ai.model
    );

    let port = settings.port;
    let ai = build_provider(&settings.ai)?;
    let bot = Bot::new(&settings.bot_token);
    let notifier = Ref::new(TelegramNotifier::new(bot.clone()));

    let provider = support_desk::services(settings, ai, notifier)
        .build_provider()
        .map_err(|e| anyhow!("invalid service registrations: {e:?}"))?;
    let service = provider.get_required::<SupportService>();

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(service.knowledge().reload());

    let health_task_handle = runtime.spawn(health_server_task(provider, port));
    let bot_task_handle = runtime.spawn(telegram::run(bot, service));

    runtime.block_on(async {
        bot_task_handle.await?;
        health_task_handle.abort();
        Ok::<(), anyhow::Error>(())
    })?;

    info!("Shutting down...");
    Ok(())
}

async fn health_server_task(provider: ServiceProvider, port: u16) {
    let app = api::health::router().with_provider(provider);

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!("health server could not bind port {port}: {e}");
            return;
        }
    };
    info!("health server listening on port {port}");

    if let Err(e) = axum::serve(listener, app).await {
        warn!("health server stopped: {e}");
    }
}
