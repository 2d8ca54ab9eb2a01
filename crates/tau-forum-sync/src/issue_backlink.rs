//! Back-link rendering and extraction for tracker bodies mirrored from chat messages.
//!
//! Every issue and comment the bridge creates starts with a badge linking back to the
//! originating Discord message. The link doubles as the loop-prevention marker: a tracker
//! body that carries one was written by the bridge and must not be mirrored again.

use std::sync::OnceLock;

use regex::Regex;

use crate::sync_transport::{ChatAttachment, ChatMessage};

pub const DISCORD_WEB_BASE: &str = "https://discord.com";
pub const DISCORD_CDN_BASE: &str = "https://cdn.discordapp.com";
const DEFAULT_AVATAR_URL: &str = "https://cdn.discordapp.com/embed/avatars/0.png";
const BACKLINK_PATTERN: &str = r"https://discord\.com/channels/(\d+)/(\d+)/(\d+)\)";
const BOT_MARKER: &str = "`BOT`";
const MIRRORED_IMAGE_CONTENT_TYPES: &[&str] = &["image/png", "image/jpeg"];

#[derive(Debug, Clone, PartialEq, Eq)]
/// Channel/message pair recovered from a tracker body.
pub struct ChannelMessageRef {
    pub channel_id: String,
    pub message_id: String,
}

pub fn discord_message_url(guild_id: &str, channel_id: &str, message_id: &str) -> String {
    format!("{DISCORD_WEB_BASE}/channels/{guild_id}/{channel_id}/{message_id}")
}

fn avatar_url(author_id: &str, avatar: Option<&str>) -> String {
    match avatar.map(str::trim).filter(|value| !value.is_empty()) {
        Some(hash) => format!("{DISCORD_CDN_BASE}/avatars/{author_id}/{hash}.webp?size=40"),
        None => DEFAULT_AVATAR_URL.to_string(),
    }
}

/// Renders PNG/JPEG attachments as markdown images; other content types are dropped.
pub fn render_attachments_markdown(attachments: &[ChatAttachment]) -> String {
    attachments
        .iter()
        .filter(|attachment| {
            attachment
                .content_type
                .as_deref()
                .map(|content_type| MIRRORED_IMAGE_CONTENT_TYPES.contains(&content_type))
                .unwrap_or(false)
        })
        .map(|attachment| {
            format!(
                "![{name}]({url} \"{name}\")",
                name = attachment.name,
                url = attachment.url
            )
        })
        .collect()
}

/// Renders the tracker body for a chat message, prefixed with its back-link badge.
pub fn render_issue_body(message: &ChatMessage) -> String {
    let url = discord_message_url(&message.guild_id, &message.channel_id, &message.id);
    let name = &message.author.display_name;
    let avatar = avatar_url(&message.author.id, message.author.avatar.as_deref());
    format!(
        "<kbd>[![{name}]({avatar})]({url})</kbd> [{name}]({url})  {BOT_MARKER}\n\n{content}\n{attachments}\n",
        content = message.content,
        attachments = render_attachments_markdown(&message.attachments),
    )
}

fn backlink_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(BACKLINK_PATTERN).ok())
        .as_ref()
}

/// Extracts the first back-link from a tracker body. Returns `None` when absent or malformed.
pub fn extract_message_ref(body: &str) -> Option<ChannelMessageRef> {
    let captures = backlink_pattern()?.captures(body)?;
    let channel_id = captures.get(2)?.as_str();
    let message_id = captures.get(3)?.as_str();
    Some(ChannelMessageRef {
        channel_id: channel_id.to_string(),
        message_id: message_id.to_string(),
    })
}

pub fn has_backlink(body: Option<&str>) -> bool {
    body.and_then(extract_message_ref).is_some()
}
