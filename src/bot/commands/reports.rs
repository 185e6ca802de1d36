use crate::bot::{Context, Error};
use crate::utils::format::{DISCORD_MESSAGE_LIMIT, chunk_message, format_error_message, format_info_message};
use crate::utils::tracker::RosterProvider;
use chrono::Utc;

/// Shows this week's quota report for every required member
#[poise::command(slash_command, prefix_command, rename = "sync-report", guild_only)]
pub async fn sync_report(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    let roster = data.roster(ctx.serenity_context().http.clone());

    let members = match roster.fetch_roster().await {
        Ok(members) => members,
        Err(e) => {
            tracing::warn!("Roster fetch failed for manual report: {:?}", e);
            ctx.say(format_error_message(&format!("Failed to fetch the member list: {}", e)))
                .await?;
            return Ok(());
        }
    };

    match data.tracker.report(&members, Utc::now()).await {
        Ok(Some(report)) => {
            for chunk in chunk_message(&report, DISCORD_MESSAGE_LIMIT) {
                ctx.say(chunk).await?;
            }
        }
        Ok(None) => {
            ctx.say(format_info_message("No members are subject to the quota yet"))
                .await?;
        }
        Err(e) => {
            ctx.say(format_error_message(&format!("Failed to build the report: {}", e)))
                .await?;
        }
    }

    Ok(())
}

/// Shows everyone's sync count for this week, highest first
#[poise::command(slash_command, prefix_command, rename = "sync-count", guild_only)]
pub async fn sync_count(ctx: Context<'_>) -> Result<(), Error> {
    match ctx.data().tracker.count_summary(Utc::now()).await {
        Ok(summary) => {
            for chunk in chunk_message(&summary, DISCORD_MESSAGE_LIMIT) {
                ctx.say(chunk).await?;
            }
        }
        Err(e) => {
            ctx.say(format_error_message(&format!("Failed to read sync counts: {}", e)))
                .await?;
        }
    }

    Ok(())
}
