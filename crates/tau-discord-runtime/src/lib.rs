//! Discord side of the forum bridge.
//!
//! `DiscordApiClient` implements `ChatTransport` over the REST API; the gateway handler feeds
//! forum events to the sync engine.

mod discord_api_client;
mod discord_gateway;

pub use discord_api_client::{DiscordApiClient, DiscordApiClientConfig, DEFAULT_DISCORD_API_BASE};
pub use discord_gateway::{
    author_display_name, chat_channel_from_channel, chat_message_from_message,
    chat_thread_from_channel, discord_gateway_intents, message_deleted_events, run_discord_gateway,
    ForumGatewayHandler,
};
