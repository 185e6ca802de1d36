use crate::bot::{Data, Error};
use crate::utils::classifier::{ActivityEvent, TrackedSource};
use crate::utils::tracker::EventOutcome;
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;

pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            tracing::info!("Bot logged in as {}", data_about_bot.user.name);
            announce_online(ctx, data).await;
        }
        serenity::FullEvent::Message { new_message } => {
            if let Err(e) = handle_message(ctx, new_message, data).await {
                tracing::error!("Error handling message {}: {:?}", new_message.id, e);
            }
        }
        _ => {}
    }
    Ok(())
}

async fn announce_online(ctx: &serenity::Context, data: &Data) {
    let Some(channel_id) = data.config.report_channel_id.filter(|_| data.config.announce_online) else {
        return;
    };

    if let Err(e) = serenity::ChannelId::new(channel_id)
        .say(&ctx.http, "🤖 Sync Bot is online.")
        .await
    {
        tracing::warn!("Failed to send online message: {:?}", e);
    }
}

async fn handle_message(ctx: &serenity::Context, message: &serenity::Message, data: &Data) -> Result<(), Error> {
    if message.author.bot || message.guild_id.is_none() {
        return Ok(());
    }

    let event = activity_event(ctx, message, data.config.tracked_source).await?;
    let outcome = data.tracker.on_activity_event(&event, Utc::now()).await?;

    match outcome {
        EventOutcome::Credited { user_id, count } => {
            tracing::info!("Credited user {} (count {})", user_id, count);
        }
        EventOutcome::AlreadyCredited { user_id } => {
            tracing::debug!("User {} already credited today", user_id);
        }
        EventOutcome::Rejected(rejection) => {
            tracing::debug!("Message {} not counted: {}", message.id, rejection);
        }
        EventOutcome::Stale(period) => {
            tracing::warn!("Message {} belongs to closed period {}, not counted", message.id, period);
        }
        EventOutcome::FutureDated(period) => {
            tracing::warn!("Message {} is dated in future period {}, not counted", message.id, period);
        }
    }

    Ok(())
}

async fn activity_event(
    ctx: &serenity::Context,
    message: &serenity::Message,
    source: TrackedSource,
) -> Result<ActivityEvent, Error> {
    let mut event = ActivityEvent {
        author_id: message.author.id.get(),
        author_name: display_name(message),
        is_bot: message.author.bot,
        channel_id: message.channel_id.get(),
        parent_id: None,
        is_thread_opener: false,
        thread_owner_id: None,
        thread_owner_name: None,
        thread_title: None,
        timestamp: timestamp(message),
    };

    // Thread details cost a lookup, only forum sources need them.
    if !source.is_forum() || event.channel_id == source.channel_id() {
        return Ok(event);
    }

    if let serenity::Channel::Guild(thread) = message.channel_id.to_channel(ctx).await? {
        if thread.thread_metadata.is_some() {
            event.parent_id = thread.parent_id.map(|id| id.get());
            // A forum post's starter message shares the thread's id.
            event.is_thread_opener = message.id.get() == thread.id.get();
            event.thread_owner_id = thread.owner_id.map(|id| id.get());
            event.thread_title = Some(thread.name.clone());
        }
    }

    let credits_owner = matches!(source, TrackedSource::ForumOpeners(_)) && event.is_thread_opener;
    if let Some(owner_id) = event.thread_owner_id.filter(|owner| credits_owner && *owner != event.author_id) {
        match serenity::UserId::new(owner_id).to_user(ctx).await {
            Ok(owner) => event.thread_owner_name = Some(owner.global_name.clone().unwrap_or(owner.name.clone())),
            Err(e) => tracing::warn!("Failed to resolve thread owner {}: {:?}", owner_id, e),
        }
    }

    Ok(event)
}

fn display_name(message: &serenity::Message) -> String {
    message
        .member
        .as_ref()
        .and_then(|member| member.nick.clone())
        .or_else(|| message.author.global_name.clone())
        .unwrap_or_else(|| message.author.name.clone())
}

fn timestamp(message: &serenity::Message) -> DateTime<Utc> {
    DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0).unwrap_or_else(Utc::now)
}
