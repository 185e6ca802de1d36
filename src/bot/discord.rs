use crate::database::models::RosterMember;
use crate::utils::format::{DISCORD_MESSAGE_LIMIT, chunk_message};
use crate::utils::tracker::{ReportSink, RosterProvider};
use anyhow::Result;
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

const MEMBER_PAGE_SIZE: u64 = 1000;

/// Guild members holding the required role, or every human member when no
/// role is configured.
pub struct GuildRoster {
    http: Arc<serenity::Http>,
    guild_id: serenity::GuildId,
    role_id: Option<serenity::RoleId>,
}

impl GuildRoster {
    pub fn new(http: Arc<serenity::Http>, guild_id: u64, role_id: Option<u64>) -> Self {
        Self {
            http,
            guild_id: serenity::GuildId::new(guild_id),
            role_id: role_id.map(serenity::RoleId::new),
        }
    }

    fn is_required(&self, member: &serenity::Member) -> bool {
        !member.user.bot
            && self
                .role_id
                .is_none_or(|role_id| member.roles.contains(&role_id))
    }
}

#[async_trait]
impl RosterProvider for GuildRoster {
    async fn fetch_roster(&self) -> Result<Vec<RosterMember>> {
        let mut roster = Vec::new();
        let mut after: Option<serenity::UserId> = None;

        loop {
            let page = self
                .guild_id
                .members(&self.http, Some(MEMBER_PAGE_SIZE), after)
                .await?;
            let page_len = page.len();
            after = page.last().map(|member| member.user.id);

            roster.extend(
                page.iter()
                    .filter(|member| self.is_required(member))
                    .map(|member| RosterMember::new(member.user.id.get(), member.display_name())),
            );

            if page_len < MEMBER_PAGE_SIZE as usize {
                break;
            }
        }

        tracing::debug!("Fetched roster of {} member(s)", roster.len());
        Ok(roster)
    }
}

pub struct ChannelSink {
    http: Arc<serenity::Http>,
    channel_id: serenity::ChannelId,
}

impl ChannelSink {
    pub fn new(http: Arc<serenity::Http>, channel_id: u64) -> Self {
        Self {
            http,
            channel_id: serenity::ChannelId::new(channel_id),
        }
    }
}

#[async_trait]
impl ReportSink for ChannelSink {
    async fn deliver_report(&self, text: &str) -> Result<()> {
        for chunk in chunk_message(text, DISCORD_MESSAGE_LIMIT) {
            self.channel_id.say(&self.http, chunk).await?;
        }
        Ok(())
    }
}
