//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.line-echo/config.json`) and environment.
//! Channel credentials are resolved once at startup into [`LineCredentials`] and handed to the
//! webhook and reply client; nothing reads the environment per request.

use crate::channels::line::{ReplyPolicy, ReplyPolicyError};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Env variable holding the channel access token (overrides config).
pub const CHANNEL_TOKEN_ENV: &str = "CHANNEL_TOKEN";
/// Env variable holding the channel secret (overrides config).
pub const CHANNEL_SECRET_ENV: &str = "CHANNEL_SECRET";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (LINE).
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 15151).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1"). The platform must be able to reach it, usually via a
    /// reverse proxy terminating HTTPS.
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15151
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub line: LineChannelConfig,
}

/// LINE channel config.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineChannelConfig {
    /// Channel access token. Overridden by CHANNEL_TOKEN env when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_token: Option<String>,
    /// Channel secret used to verify x-line-signature. Overridden by CHANNEL_SECRET env when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_secret: Option<String>,
    /// Messaging API base URL (default https://api.line.me).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    /// Identical text messages per reply call (1..=5, default 2).
    #[serde(default = "default_echo_count")]
    pub echo_count: usize,
    /// Reply calls per text event, all with the same reply token (default 1).
    #[serde(default = "default_reply_calls_per_event")]
    pub reply_calls_per_event: usize,
}

fn default_echo_count() -> usize {
    2
}

fn default_reply_calls_per_event() -> usize {
    1
}

impl Default for LineChannelConfig {
    fn default() -> Self {
        Self {
            channel_token: None,
            channel_secret: None,
            api_base_url: None,
            echo_count: default_echo_count(),
            reply_calls_per_event: default_reply_calls_per_event(),
        }
    }
}

impl std::fmt::Debug for LineChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineChannelConfig")
            .field("channel_token", &self.channel_token.as_ref().map(|_| "<redacted>"))
            .field("channel_secret", &self.channel_secret.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("echo_count", &self.echo_count)
            .field("reply_calls_per_event", &self.reply_calls_per_event)
            .finish()
    }
}

impl LineChannelConfig {
    /// Validated reply policy from `echoCount` and `replyCallsPerEvent`.
    pub fn reply_policy(&self) -> Result<ReplyPolicy, ReplyPolicyError> {
        ReplyPolicy::new(self.echo_count, self.reply_calls_per_event)
    }
}

/// Channel credentials. `Debug` never prints the values.
#[derive(Clone, PartialEq, Eq)]
pub struct LineCredentials {
    pub channel_token: String,
    pub channel_secret: String,
}

impl std::fmt::Debug for LineCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LineCredentials { .. }")
    }
}

/// Trimmed value, or None when blank.
fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Overwrite the channel credentials with `token` / `secret` when they are non-blank.
pub fn apply_credential_overrides(config: &mut Config, token: Option<&str>, secret: Option<&str>) {
    let line = &mut config.channels.line;
    if let Some(t) = non_blank(token) {
        line.channel_token = Some(t);
    }
    if let Some(s) = non_blank(secret) {
        line.channel_secret = Some(s);
    }
}

/// Apply CHANNEL_TOKEN / CHANNEL_SECRET from the environment onto `config`. Called once by
/// [`load_config`]; nothing downstream reads the environment.
pub fn apply_env_overrides(config: &mut Config) {
    let token = std::env::var(CHANNEL_TOKEN_ENV).ok();
    let secret = std::env::var(CHANNEL_SECRET_ENV).ok();
    apply_credential_overrides(config, token.as_deref(), secret.as_deref());
}

/// Channel access token from `config`, trimmed; None when blank.
pub fn resolve_channel_token(config: &Config) -> Option<String> {
    non_blank(config.channels.line.channel_token.as_deref())
}

/// Channel secret from `config`; None when blank.
///
/// Surrounding whitespace is trimmed before the secret is used as the HMAC key, so a secret
/// pasted with a trailing newline still verifies. Interior bytes are used as-is.
pub fn resolve_channel_secret(config: &Config) -> Option<String> {
    non_blank(config.channels.line.channel_secret.as_deref())
}

/// Both credentials, or None if either is missing.
pub fn resolve_line_credentials(config: &Config) -> Option<LineCredentials> {
    Some(LineCredentials {
        channel_token: resolve_channel_token(config)?,
        channel_secret: resolve_channel_secret(config)?,
    })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("LINE_ECHO_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".line-echo").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, LINE_ECHO_CONFIG_PATH, or the default. Missing file => default config.
/// Env credential overrides are applied here. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        parse_config(&s).with_context(|| format!("parsing config from {}", path.display()))?
    };
    apply_env_overrides(&mut config);
    Ok((config, path))
}

/// Parse config JSON and validate the reply policy.
pub fn parse_config(s: &str) -> Result<Config> {
    let config: Config = serde_json::from_str(s)?;
    config.channels.line.reply_policy()?;
    Ok(config)
}
