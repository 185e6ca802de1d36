use crate::bot::{Context, Error};
use crate::utils::format::{format_error_message, format_success_message};
use chrono::Utc;

/// Clears every sync count and starts the week from zero
#[poise::command(
    slash_command,
    prefix_command,
    rename = "sync-reset",
    guild_only,
    required_permissions = "MANAGE_GUILD"
)]
pub async fn sync_reset(ctx: Context<'_>) -> Result<(), Error> {
    match ctx.data().tracker.hard_reset(Utc::now()).await {
        Ok(()) => {
            tracing::info!("Sync counts reset by {}", ctx.author().name);
            ctx.say(format_success_message("Sync count reset done.")).await?;
        }
        Err(e) => {
            ctx.say(format_error_message(&format!("Failed to reset sync counts: {}", e)))
                .await?;
        }
    }

    Ok(())
}
