pub mod commands;
pub mod discord;
pub mod handlers;

use crate::config::Config;
use crate::database;
use crate::scheduler;
use crate::utils::tracker::{ReportSink, RosterProvider, Tracker};
use anyhow::Result;
use discord::{ChannelSink, GuildRoster};
use poise::serenity_prelude as serenity;
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

#[derive(Clone)]
pub struct Data {
    pub tracker: Arc<Tracker>,
    pub config: Config,
}

impl Data {
    pub fn roster(&self, http: Arc<serenity::Http>) -> GuildRoster {
        GuildRoster::new(http, self.config.guild_id, self.config.required_role_id)
    }
}

pub async fn create_bot(config: Config) -> Result<serenity::Client> {
    let store = database::open_store(&config.data_file)?;
    let tracker = Tracker::open(store, config.tracker_settings(), chrono::Utc::now()).await?;

    let data = Data {
        tracker: Arc::new(tracker),
        config: config.clone(),
    };

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                commands::reports::sync_report(),
                commands::reports::sync_count(),
                commands::status::sync_status(),
                commands::reset::sync_reset(),
            ],
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some("!".into()),
                ..Default::default()
            },
            event_handler: |ctx, event, framework, data| {
                Box::pin(handlers::event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                start_scheduler(&data, ctx.http.clone());
                Ok(data)
            })
        })
        .build();

    let client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await?;

    Ok(client)
}

fn start_scheduler(data: &Data, http: Arc<serenity::Http>) {
    let config = &data.config;

    if let Some(schedule) = config.reset_schedule {
        scheduler::spawn_reset_job(schedule, config.utc_offset, data.tracker.clone());
    }

    match (config.report_schedule, config.report_channel_id) {
        (Some(schedule), Some(channel_id)) => {
            let roster: Arc<dyn RosterProvider> = Arc::new(data.roster(http.clone()));
            let sink: Arc<dyn ReportSink> = Arc::new(ChannelSink::new(http, channel_id));
            scheduler::spawn_report_job(schedule, config.utc_offset, data.tracker.clone(), roster, sink);
        }
        (Some(_), None) => {
            tracing::warn!("REPORT_SCHEDULE is set but REPORT_CHANNEL_ID is not; scheduled reports are off");
        }
        (None, _) => {}
    }
}
