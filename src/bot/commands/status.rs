use crate::bot::{Context, Error};
use crate::utils::format::format_error_message;
use chrono::Utc;

/// Shows your own sync count for this week
#[poise::command(slash_command, prefix_command, rename = "sync-status", guild_only)]
pub async fn sync_status(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let now = Utc::now();
    let required = data.tracker.settings().required_count;

    match data.tracker.member_count(ctx.author().id.get(), now).await {
        Ok(count) => {
            let mark = if count >= required { " ✓" } else { "" };
            ctx.say(format!(
                "📊 Week of {}: **{}/{}**{}",
                data.tracker.current_period(now),
                count,
                required,
                mark
            ))
            .await?;
        }
        Err(e) => {
            ctx.say(format_error_message(&format!("Failed to read your sync count: {}", e)))
                .await?;
        }
    }

    Ok(())
}
