use clap::{ArgAction, Parser};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_webhook_path(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if !trimmed.starts_with('/') || trimmed.len() < 2 {
        return Err("webhook path must start with '/' and name a route".to_string());
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "tau-forum-bridge",
    about = "Mirror a Discord forum channel and a GitHub repository's issues in both directions",
    version
)]
/// Command-line and environment configuration for the bridge.
pub struct Cli {
    #[arg(
        long = "discord-bot-token",
        env = "DISCORD_TOKEN",
        hide_env_values = true,
        help = "Discord bot token used for the gateway and REST API"
    )]
    pub discord_bot_token: String,

    #[arg(
        long = "discord-channel-id",
        env = "DISCORD_CHANNEL_ID",
        help = "Id of the forum channel mirrored into the issue tracker"
    )]
    pub discord_channel_id: String,

    #[arg(
        long = "discord-api-base",
        env = "TAU_DISCORD_API_BASE",
        default_value = "https://discord.com/api/v10",
        help = "Discord REST API base URL"
    )]
    pub discord_api_base: String,

    #[arg(
        long = "github-token",
        env = "GITHUB_ACCESS_TOKEN",
        hide_env_values = true,
        help = "GitHub token with issues read/write access (and admin rights for issue deletion)"
    )]
    pub github_token: String,

    #[arg(
        long = "github-repo",
        env = "TAU_GITHUB_REPO",
        help = "GitHub repository in owner/repo format"
    )]
    pub github_repo: Option<String>,

    #[arg(
        long = "github-username",
        env = "GITHUB_USERNAME",
        conflicts_with = "github_repo",
        requires = "github_repository",
        help = "Repository owner, used with --github-repository instead of --github-repo"
    )]
    pub github_username: Option<String>,

    #[arg(
        long = "github-repository",
        env = "GITHUB_REPOSITORY",
        conflicts_with = "github_repo",
        requires = "github_username",
        help = "Repository name, used with --github-username instead of --github-repo"
    )]
    pub github_repository: Option<String>,

    #[arg(
        long = "github-api-base",
        env = "TAU_GITHUB_API_BASE",
        default_value = "https://api.github.com",
        help = "GitHub API base URL; GraphQL is served from <base>/graphql"
    )]
    pub github_api_base: String,

    #[arg(
        long = "webhook-bind",
        env = "TAU_FORUM_WEBHOOK_BIND",
        default_value = "0.0.0.0:5000",
        help = "Socket address for the GitHub webhook server"
    )]
    pub webhook_bind: String,

    #[arg(
        long = "webhook-path",
        env = "TAU_FORUM_WEBHOOK_PATH",
        default_value = "/webhooks/github",
        value_parser = parse_webhook_path,
        help = "Route receiving GitHub webhook deliveries"
    )]
    pub webhook_path: String,

    #[arg(
        long = "webhook-secret",
        env = "GITHUB_WEBHOOK_SECRET",
        hide_env_values = true,
        help = "Shared secret for X-Hub-Signature-256 verification; unsigned deliveries are accepted when unset"
    )]
    pub webhook_secret: Option<String>,

    #[arg(
        long = "propagate-archive-lock",
        env = "TAU_FORUM_PROPAGATE_ARCHIVE_LOCK",
        action = ArgAction::SetTrue,
        help = "Mirror forum archive/lock changes to issue close/lock (off by default)"
    )]
    pub propagate_archive_lock: bool,

    #[arg(
        long = "request-timeout-ms",
        env = "TAU_FORUM_REQUEST_TIMEOUT_MS",
        default_value_t = 10_000,
        value_parser = parse_positive_u64,
        help = "HTTP request timeout for Discord and GitHub calls"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        env = "TAU_FORUM_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Attempts per HTTP call, including the first, for 429/5xx and transport failures"
    )]
    pub retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        env = "TAU_FORUM_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base delay for exponential retry backoff"
    )]
    pub retry_base_delay_ms: u64,
}
