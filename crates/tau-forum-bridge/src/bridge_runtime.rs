//! Wires the transports, sync engine, webhook server and gateway together.

use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tau_discord_runtime::{run_discord_gateway, DiscordApiClient, DiscordApiClientConfig};
use tau_forum_sync::{
    ArchiveLockPropagation, ChatTransport, SyncContext, SyncEngine, TrackerTransport,
};
use tau_github_issues_runtime::{
    run_github_webhook_server, GithubApiClient, GithubApiClientConfig, GithubWebhookServerState,
    RepoRef,
};

use crate::cli_args::Cli;

#[derive(Debug, Clone)]
pub(crate) struct BridgeRuntimeConfig {
    pub(crate) discord_bot_token: String,
    pub(crate) discord_channel_id: String,
    pub(crate) discord_api_base: String,
    pub(crate) github_token: String,
    pub(crate) repo: RepoRef,
    pub(crate) github_api_base: String,
    pub(crate) webhook_bind: String,
    pub(crate) webhook_path: String,
    pub(crate) webhook_secret: Option<String>,
    pub(crate) archive_lock_propagation: ArchiveLockPropagation,
    pub(crate) request_timeout_ms: u64,
    pub(crate) retry_max_attempts: usize,
    pub(crate) retry_base_delay_ms: u64,
}

fn non_empty(value: &str, flag: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        bail!("{flag} cannot be empty");
    }
    Ok(trimmed.to_string())
}

/// `--github-repo` wins; otherwise owner and repository are joined.
pub(crate) fn resolve_repo_slug(
    github_repo: Option<&str>,
    github_username: Option<&str>,
    github_repository: Option<&str>,
) -> Result<RepoRef> {
    if let Some(slug) = github_repo.map(str::trim).filter(|value| !value.is_empty()) {
        return RepoRef::parse(slug);
    }
    match (github_username, github_repository) {
        (Some(owner), Some(name)) => RepoRef::parse(&format!("{}/{}", owner.trim(), name.trim())),
        _ => Err(anyhow!(
            "missing GitHub repository: pass --github-repo owner/repo or set GITHUB_USERNAME and GITHUB_REPOSITORY"
        )),
    }
}

impl BridgeRuntimeConfig {
    pub(crate) fn from_cli(cli: &Cli) -> Result<Self> {
        let discord_channel_id = non_empty(&cli.discord_channel_id, "--discord-channel-id")?;
        if !discord_channel_id.chars().all(|ch| ch.is_ascii_digit()) {
            bail!("--discord-channel-id must be a numeric snowflake, got '{discord_channel_id}'");
        }
        let repo = resolve_repo_slug(
            cli.github_repo.as_deref(),
            cli.github_username.as_deref(),
            cli.github_repository.as_deref(),
        )?;
        Ok(Self {
            discord_bot_token: non_empty(&cli.discord_bot_token, "--discord-bot-token")?,
            discord_channel_id,
            discord_api_base: non_empty(&cli.discord_api_base, "--discord-api-base")?,
            github_token: non_empty(&cli.github_token, "--github-token")?,
            repo,
            github_api_base: non_empty(&cli.github_api_base, "--github-api-base")?,
            webhook_bind: non_empty(&cli.webhook_bind, "--webhook-bind")?,
            webhook_path: cli.webhook_path.clone(),
            webhook_secret: cli
                .webhook_secret
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned),
            archive_lock_propagation: if cli.propagate_archive_lock {
                ArchiveLockPropagation::Enabled
            } else {
                ArchiveLockPropagation::Disabled
            },
            request_timeout_ms: cli.request_timeout_ms,
            retry_max_attempts: cli.retry_max_attempts,
            retry_base_delay_ms: cli.retry_base_delay_ms,
        })
    }
}

pub(crate) fn build_sync_engine(config: &BridgeRuntimeConfig) -> Result<SyncEngine> {
    let discord = DiscordApiClient::new(DiscordApiClientConfig {
        api_base: config.discord_api_base.clone(),
        bot_token: config.discord_bot_token.clone(),
        request_timeout_ms: config.request_timeout_ms,
        retry_max_attempts: config.retry_max_attempts,
        retry_base_delay_ms: config.retry_base_delay_ms,
    })?;
    let github = GithubApiClient::new(GithubApiClientConfig {
        api_base: config.github_api_base.clone(),
        token: config.github_token.clone(),
        repo: config.repo.clone(),
        request_timeout_ms: config.request_timeout_ms,
        retry_max_attempts: config.retry_max_attempts,
        retry_base_delay_ms: config.retry_base_delay_ms,
    })?;
    let context = SyncContext::new(
        config.discord_channel_id.clone(),
        Arc::new(discord) as Arc<dyn ChatTransport>,
        Arc::new(github) as Arc<dyn TrackerTransport>,
    )
    .with_archive_lock_propagation(config.archive_lock_propagation);
    Ok(SyncEngine::new(context))
}

/// Runs until either the webhook server or the gateway stops.
pub(crate) async fn run_bridge(config: BridgeRuntimeConfig) -> Result<()> {
    let engine = Arc::new(build_sync_engine(&config)?);
    tracing::info!(
        channel_id = %config.discord_channel_id,
        repo = %config.repo.as_slug(),
        archive_lock_propagation = ?config.archive_lock_propagation,
        "starting forum bridge"
    );

    let webhook_state = Arc::new(GithubWebhookServerState {
        engine: Arc::clone(&engine),
        webhook_secret: config.webhook_secret.clone(),
    });
    if webhook_state.webhook_secret.is_none() {
        tracing::warn!("no webhook secret configured; github deliveries are not authenticated");
    }
    let webhook = run_github_webhook_server(&config.webhook_bind, &config.webhook_path, webhook_state);
    let gateway = run_discord_gateway(&config.discord_bot_token, engine);

    tokio::select! {
        result = webhook => result.context("github webhook server stopped"),
        result = gateway => result.context("discord gateway stopped"),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use tau_forum_sync::ArchiveLockPropagation;

    use super::{build_sync_engine, resolve_repo_slug, BridgeRuntimeConfig};
    use crate::cli_args::Cli;

    fn parse(extra: &[&str]) -> Cli {
        let mut args = vec![
            "tau-forum-bridge",
            "--discord-bot-token",
            "discord-token",
            "--discord-channel-id",
            "500",
            "--github-token",
            "gh-token",
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).expect("parse cli")
    }

    #[test]
    fn unit_resolve_repo_slug_prefers_explicit_repo() {
        let repo = resolve_repo_slug(Some("owner/repo"), Some("x"), Some("y")).expect("repo");
        assert_eq!(repo.as_slug(), "owner/repo");
        let repo = resolve_repo_slug(None, Some(" owner "), Some("repo")).expect("split");
        assert_eq!(repo.as_slug(), "owner/repo");
        let error = resolve_repo_slug(None, Some("owner"), None).expect_err("missing");
        assert!(error.to_string().contains("GITHUB_REPOSITORY"));
    }

    #[test]
    fn functional_config_from_cli_normalizes_values() {
        let cli = parse(&[
            "--github-repo",
            "owner/repo",
            "--webhook-secret",
            "  ",
            "--propagate-archive-lock",
        ]);
        let config = BridgeRuntimeConfig::from_cli(&cli).expect("config");
        assert_eq!(config.repo.as_slug(), "owner/repo");
        assert_eq!(config.webhook_secret, None);
        assert_eq!(
            config.archive_lock_propagation,
            ArchiveLockPropagation::Enabled
        );
    }

    #[test]
    fn regression_config_rejects_non_numeric_channel_id() {
        let mut cli = parse(&["--github-repo", "owner/repo"]);
        cli.discord_channel_id = "general".to_string();
        let error = BridgeRuntimeConfig::from_cli(&cli).expect_err("channel id");
        assert!(error.to_string().contains("numeric snowflake"));
    }

    #[tokio::test]
    async fn integration_build_sync_engine_binds_configured_channel() {
        let cli = parse(&["--github-repo", "owner/repo"]);
        let config = BridgeRuntimeConfig::from_cli(&cli).expect("config");
        let engine = build_sync_engine(&config).expect("engine");
        assert_eq!(engine.context().bound_channel_id, "500");
        assert!(engine.context().registry.is_empty());
    }
}
