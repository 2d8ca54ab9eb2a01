//! GitHub side of the forum bridge.
//!
//! `GithubApiClient` implements `TrackerTransport` over the REST and GraphQL APIs, and the
//! webhook server turns issue deliveries into engine dispatches.

mod github_api_client;
mod github_webhook_server;

pub use github_api_client::{GithubApiClient, GithubApiClientConfig, RepoRef};
pub use github_webhook_server::{
    build_github_webhook_router, run_github_webhook_server, GithubWebhookServerState,
    DEFAULT_GITHUB_WEBHOOK_PATH,
};
