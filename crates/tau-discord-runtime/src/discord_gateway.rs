//! Serenity gateway handler translating forum activity into `ChatEvent`s.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use serenity::all::{
    ChannelId, ChannelType, Client, Context, EventHandler, GatewayIntents, GuildChannel, GuildId,
    Message, MessageId, PartialGuildChannel, Ready,
};
use serenity::async_trait;
use tau_forum_sync::{
    ChatAttachment, ChatAuthor, ChatChannel, ChatEvent, ChatMessage, ChatThread, ForumTag,
    SyncEngine,
};

pub fn discord_gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT
}

/// Prefers the user's global display name over the account name.
pub fn author_display_name(global_name: Option<&str>, name: &str) -> String {
    global_name
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(name)
        .to_string()
}

pub fn chat_thread_from_channel(channel: &GuildChannel) -> ChatThread {
    let (archived, locked) = channel
        .thread_metadata
        .as_ref()
        .map(|metadata| (metadata.archived, metadata.locked))
        .unwrap_or((false, false));
    ChatThread {
        id: channel.id.to_string(),
        parent_id: channel.parent_id.map(|parent| parent.to_string()),
        name: channel.name.clone(),
        applied_tags: channel
            .applied_tags
            .iter()
            .map(|tag| tag.to_string())
            .collect(),
        archived,
        locked,
    }
}

pub fn chat_channel_from_channel(channel: &GuildChannel) -> ChatChannel {
    ChatChannel {
        id: channel.id.to_string(),
        is_forum: channel.kind == ChannelType::Forum,
        available_tags: channel
            .available_tags
            .iter()
            .map(|tag| ForumTag {
                id: tag.id.to_string(),
                name: tag.name.clone(),
            })
            .collect(),
    }
}

/// `None` for direct messages, which never belong to a forum.
pub fn chat_message_from_message(message: &Message) -> Option<ChatMessage> {
    let guild_id = message.guild_id?;
    Some(ChatMessage {
        id: message.id.to_string(),
        guild_id: guild_id.to_string(),
        channel_id: message.channel_id.to_string(),
        author: ChatAuthor {
            id: message.author.id.to_string(),
            display_name: author_display_name(
                message.author.global_name.as_deref(),
                &message.author.name,
            ),
            avatar: message.author.avatar.as_ref().map(ToString::to_string),
            bot: message.author.bot,
        },
        content: message.content.clone(),
        attachments: message
            .attachments
            .iter()
            .map(|attachment| ChatAttachment {
                name: attachment.filename.clone(),
                url: attachment.url.clone(),
                content_type: attachment.content_type.clone(),
            })
            .collect(),
    })
}

/// One delete event per message, so bulk purges prune the same links as single deletes.
pub fn message_deleted_events(channel_id: ChannelId, message_ids: &[MessageId]) -> Vec<ChatEvent> {
    message_ids
        .iter()
        .map(|message_id| ChatEvent::MessageDeleted {
            channel_id: channel_id.to_string(),
            message_id: message_id.to_string(),
        })
        .collect()
}

/// Forwards gateway events to the engine without waiting for their outcome.
pub struct ForumGatewayHandler {
    engine: Arc<SyncEngine>,
}

impl ForumGatewayHandler {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self { engine }
    }

    fn dispatch(&self, event: ChatEvent) {
        tracing::debug!(event = event.kind(), "discord gateway event");
        // Outcomes are logged by the engine.
        let _ = self.engine.dispatch_chat_event(event);
    }
}

#[async_trait]
impl EventHandler for ForumGatewayHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        tracing::info!(user = %ready.user.name, guilds = ready.guilds.len(), "discord gateway ready");
        self.dispatch(ChatEvent::Ready);
    }

    async fn thread_create(&self, _ctx: Context, thread: GuildChannel) {
        self.dispatch(ChatEvent::ThreadCreated(chat_thread_from_channel(&thread)));
    }

    async fn thread_update(&self, _ctx: Context, _old: Option<GuildChannel>, new: GuildChannel) {
        self.dispatch(ChatEvent::ThreadUpdated(chat_thread_from_channel(&new)));
    }

    async fn thread_delete(
        &self,
        _ctx: Context,
        thread: PartialGuildChannel,
        _full_thread_data: Option<GuildChannel>,
    ) {
        self.dispatch(ChatEvent::ThreadDeleted {
            thread_id: thread.id.to_string(),
            parent_id: Some(thread.parent_id.to_string()),
        });
    }

    async fn message(&self, _ctx: Context, new_message: Message) {
        if let Some(message) = chat_message_from_message(&new_message) {
            self.dispatch(ChatEvent::MessageCreated(message));
        }
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        for event in message_deleted_events(channel_id, &[deleted_message_id]) {
            self.dispatch(event);
        }
    }

    async fn message_delete_bulk(
        &self,
        _ctx: Context,
        channel_id: ChannelId,
        multiple_deleted_messages_ids: Vec<MessageId>,
        _guild_id: Option<GuildId>,
    ) {
        for event in message_deleted_events(channel_id, &multiple_deleted_messages_ids) {
            self.dispatch(event);
        }
    }

    async fn channel_update(&self, _ctx: Context, _old: Option<GuildChannel>, new: GuildChannel) {
        self.dispatch(ChatEvent::ChannelUpdated(chat_channel_from_channel(&new)));
    }
}

/// Connects to the gateway and runs until the shard manager stops.
pub async fn run_discord_gateway(bot_token: &str, engine: Arc<SyncEngine>) -> Result<()> {
    let mut client = Client::builder(bot_token.trim(), discord_gateway_intents())
        .event_handler(ForumGatewayHandler::new(engine))
        .await
        .context("failed to build discord gateway client")?;
    client
        .start()
        .await
        .context("discord gateway client exited unexpectedly")
}

#[cfg(test)]
mod tests {
    use serenity::all::{ChannelId, GatewayIntents, MessageId};
    use tau_forum_sync::ChatEvent;

    use super::{author_display_name, discord_gateway_intents, message_deleted_events};

    #[test]
    fn unit_author_display_name_prefers_global_name() {
        assert_eq!(author_display_name(Some("Alice"), "alice#1"), "Alice");
        assert_eq!(author_display_name(Some("  "), "alice#1"), "alice#1");
        assert_eq!(author_display_name(None, "alice#1"), "alice#1");
    }

    #[test]
    fn unit_gateway_intents_include_message_content() {
        let intents = discord_gateway_intents();
        assert!(intents.contains(GatewayIntents::GUILDS));
        assert!(intents.contains(GatewayIntents::GUILD_MESSAGES));
        assert!(intents.contains(GatewayIntents::MESSAGE_CONTENT));
    }

    #[test]
    fn regression_bulk_delete_forwards_every_message_id() {
        let events = message_deleted_events(
            ChannelId::new(7001),
            &[MessageId::new(8001), MessageId::new(8002)],
        );
        assert_eq!(
            events,
            vec![
                ChatEvent::MessageDeleted {
                    channel_id: "7001".to_string(),
                    message_id: "8001".to_string(),
                },
                ChatEvent::MessageDeleted {
                    channel_id: "7001".to_string(),
                    message_id: "8002".to_string(),
                },
            ]
        );
    }
}
