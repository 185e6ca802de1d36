mod bot;
mod config;
mod database;
mod scheduler;
mod utils;

use anyhow::Result;
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "core_sync_bot=info,poise=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        "Tracking {:?}, quota {} per week, dedup {}, retention {}",
        config.tracked_source,
        config.weekly_quota,
        config.dedup_daily,
        config.retention.as_str()
    );

    // Create and start the bot
    let mut client = bot::create_bot(config).await?;

    tracing::info!("Starting Discord bot...");

    if let Err(why) = client.start().await {
        tracing::error!("Client error: {:?}", why);
    }

    Ok(())
}
