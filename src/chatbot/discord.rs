//! Discord client and gateway handler using serenity.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::{CreateAllowedMentions, CreateMessage};
use serenity::client::{Context, EventHandler};
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::{ChannelId, MessageId, RoleId, UserId};
use tracing::{debug, info};

use crate::chatbot::api::{ChatPlatform, PlatformError};
use crate::chatbot::engine::ChatbotEngine;
use crate::chatbot::message::{truncate_chars, Attachment, InboundMessage, MentionedUser};

/// Discord rejects message content longer than this.
const MAX_MESSAGE_CHARS: usize = 2000;

/// Discord REST client.
pub struct DiscordClient {
    http: Arc<Http>,
}

impl DiscordClient {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn reply(&self, msg: &InboundMessage, text: &str) -> Result<(), PlatformError> {
        let channel = ChannelId::new(msg.channel_id);
        // Only the replied-to user may be pinged, never @everyone/@here or roles.
        let builder = CreateMessage::new()
            .content(truncate_chars(text, MAX_MESSAGE_CHARS))
            .reference_message((channel, MessageId::new(msg.message_id)))
            .allowed_mentions(CreateAllowedMentions::new().replied_user(true));

        channel
            .send_message(&*self.http, builder)
            .await
            .map(|_| ())
            .map_err(|e| PlatformError(format!("Failed to send: {e}")))
    }

    async fn send_typing(&self, channel_id: u64) -> Result<(), PlatformError> {
        self.http
            .broadcast_typing(ChannelId::new(channel_id))
            .await
            .map_err(|e| PlatformError(format!("Failed to broadcast typing: {e}")))
    }
}

/// Gateway event handler feeding the engine.
pub struct Handler {
    engine: Arc<ChatbotEngine>,
}

impl Handler {
    pub fn new(engine: Arc<ChatbotEngine>) -> Self {
        Self { engine }
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            "✅ Connected to Discord as {} ({}) in {} guild(s)",
            ready.user.name,
            ready.user.id,
            ready.guilds.len()
        );
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let inbound = to_inbound(&ctx, &msg);
        let outcome = self.engine.handle_message(inbound).await;
        debug!("Message {} → {:?}", msg.id, outcome);
    }
}

fn to_inbound(ctx: &Context, msg: &Message) -> InboundMessage {
    let (bot_id, bot_name) = {
        let me = ctx.cache.current_user();
        (me.id, me.name.clone())
    };

    let attachments = msg
        .attachments
        .iter()
        .map(|a| Attachment {
            url: a.url.clone(),
            content_type: a.content_type.clone(),
        })
        .collect();

    InboundMessage {
        message_id: msg.id.get(),
        channel_id: msg.channel_id.get(),
        guild_id: msg.guild_id.map(|g| g.get()),
        author_id: msg.author.id.get(),
        author_is_bot: msg.author.bot,
        content: msg.content.clone(),
        attachments,
        mentions_bot: addresses_bot(
            msg.mentions_user_id(bot_id),
            msg.mention_everyone,
            &msg.mention_roles,
            &bot_roles(ctx, msg, bot_id),
        ),
        mentioned_users: mentioned_users(ctx, msg, bot_id),
        bot_id: bot_id.get(),
        bot_name,
    }
}

/// Whether a message counts as mentioning the bot.
///
/// Besides a direct user mention, Discord clients often insert the bot's
/// managed role instead of the user, and `@everyone` addresses every member.
fn addresses_bot(
    mentions_user: bool,
    mention_everyone: bool,
    mention_roles: &[RoleId],
    bot_roles: &[RoleId],
) -> bool {
    mentions_user
        || mention_everyone
        || mention_roles.iter().any(|role| bot_roles.contains(role))
}

/// Roles the bot holds in the message's guild, from the cache.
fn bot_roles(ctx: &Context, msg: &Message, bot_id: UserId) -> Vec<RoleId> {
    msg.guild(&ctx.cache)
        .and_then(|g| g.members.get(&bot_id).map(|m| m.roles.clone()))
        .unwrap_or_default()
}

/// Other mentioned users with nickname and role names from the guild cache.
///
/// Users missing from the cache are still listed, without nickname or roles.
fn mentioned_users(ctx: &Context, msg: &Message, bot_id: UserId) -> Vec<MentionedUser> {
    let guild = msg.guild(&ctx.cache);

    msg.mentions
        .iter()
        .filter(|user| user.id != bot_id)
        .map(|user| {
            let member = guild.as_ref().and_then(|g| g.members.get(&user.id));
            let roles = match (guild.as_ref(), member) {
                (Some(g), Some(m)) => m
                    .roles
                    .iter()
                    .filter_map(|role_id| g.roles.get(role_id))
                    .map(|role| role.name.clone())
                    .collect(),
                _ => Vec::new(),
            };

            MentionedUser {
                id: user.id.get(),
                username: user.name.clone(),
                nickname: member.and_then(|m| m.nick.clone()),
                roles,
            }
        })
        .collect()
}
