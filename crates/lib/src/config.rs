//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.estagiario/config.json`) and environment.
//! Environment variables (also read from a `.env` file by the binary) override the file;
//! CLI flags override both.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "llama2";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_PREFIX: &str = "!estagiario ";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Discord bot settings.
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Generation service (Ollama) settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Command prefix and streaming display settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Command-line values; never read from the file.
    #[serde(skip)]
    pub overrides: Overrides,
}

/// Values given as CLI flags. They take precedence over environment and file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub prefix: Option<String>,
}

/// Discord bot config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordConfig {
    /// Bot token from the Discord developer portal. Overridden by DISCORD_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
}

/// Ollama endpoint, model, and stream limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Model name as shown by `ollama list`. Overridden by OLLAMA_MODEL_NAME env.
    pub model: Option<String>,
    /// Base URL of the Ollama HTTP API. Overridden by OLLAMA_BASE_URL env.
    pub base_url: Option<String>,
    /// When set, a stream that stays silent for this many seconds is treated as failed.
    /// Unset means wait for as long as the connection stays open.
    pub idle_timeout_secs: Option<u64>,
}

/// Prefix filter and throttled-edit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Command prefix, used verbatim (a trailing space is significant). Overridden by BOT_PREFIX env.
    pub prefix: Option<String>,

    /// Minimum time between interim edits of the answer message (default 1000).
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,

    /// Maximum characters shown in one chat message (default 2000, Discord's limit).
    #[serde(default = "default_max_display_length")]
    pub max_display_length: usize,
}

fn default_update_interval_ms() -> u64 {
    1000
}

fn default_max_display_length() -> usize {
    2000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            update_interval_ms: default_update_interval_ms(),
            max_display_length: default_max_display_length(),
        }
    }
}

/// Trimmed, non-empty value of an environment variable.
fn env_trimmed(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| non_empty_trimmed(&s))
}

fn non_empty_trimmed(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// Resolve the Discord bot token: env DISCORD_BOT_TOKEN overrides config.
pub fn resolve_bot_token(config: &Config) -> Option<String> {
    env_trimmed("DISCORD_BOT_TOKEN").or_else(|| {
        config
            .discord
            .bot_token
            .as_deref()
            .and_then(non_empty_trimmed)
    })
}

/// Resolve the Ollama model: CLI, then env OLLAMA_MODEL_NAME, then config; falls back to `llama2`.
pub fn resolve_model(config: &Config) -> String {
    config
        .overrides
        .model
        .as_deref()
        .and_then(non_empty_trimmed)
        .or_else(|| env_trimmed("OLLAMA_MODEL_NAME"))
        .or_else(|| config.generation.model.as_deref().and_then(non_empty_trimmed))
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

/// Resolve the Ollama base URL (trailing slashes removed): CLI, then env OLLAMA_BASE_URL, then config.
pub fn resolve_base_url(config: &Config) -> String {
    let url = config
        .overrides
        .base_url
        .as_deref()
        .and_then(non_empty_trimmed)
        .or_else(|| env_trimmed("OLLAMA_BASE_URL"))
        .or_else(|| {
            config
                .generation
                .base_url
                .as_deref()
                .and_then(non_empty_trimmed)
        })
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    url.trim_end_matches('/').to_string()
}

/// Resolve the command prefix: CLI, then env BOT_PREFIX, then config. Not trimmed; empty falls back to the default.
pub fn resolve_prefix(config: &Config) -> String {
    let env = std::env::var("BOT_PREFIX").ok();
    pick_prefix(&[
        config.overrides.prefix.as_deref(),
        env.as_deref(),
        config.relay.prefix.as_deref(),
    ])
}

/// First non-empty candidate, verbatim.
fn pick_prefix(candidates: &[Option<&str>]) -> String {
    candidates
        .iter()
        .flatten()
        .find(|s| !s.is_empty())
        .copied()
        .unwrap_or(DEFAULT_PREFIX)
        .to_string()
}

/// Idle timeout for generation streams, if configured (zero disables it).
pub fn resolve_idle_timeout(config: &Config) -> Option<Duration> {
    config
        .generation
        .idle_timeout_secs
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("ESTAGIARIO_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".estagiario").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_relay_settings() {
        let r = RelayConfig::default();
        assert_eq!(r.update_interval_ms, 1000);
        assert_eq!(r.max_display_length, 2000);
        assert!(r.prefix.is_none());
    }

    #[test]
    fn parses_camel_case_file() {
        let json = r#"{
            "discord": { "botToken": "abc" },
            "generation": { "model": "mistral", "baseUrl": "http://ollama:11434/", "idleTimeoutSecs": 30 },
            "relay": { "prefix": "!bot ", "updateIntervalMs": 500 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.discord.bot_token.as_deref(), Some("abc"));
        assert_eq!(config.generation.model.as_deref(), Some("mistral"));
        assert_eq!(config.relay.prefix.as_deref(), Some("!bot "));
        assert_eq!(config.relay.update_interval_ms, 500);
        assert_eq!(config.relay.max_display_length, 2000);
        assert_eq!(resolve_idle_timeout(&config), Some(Duration::from_secs(30)));
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.discord.bot_token.is_none());
        assert_eq!(config.relay.max_display_length, 2000);
        assert_eq!(resolve_idle_timeout(&config), None);
    }

    #[test]
    fn zero_idle_timeout_disables_it() {
        let mut config = Config::default();
        config.generation.idle_timeout_secs = Some(0);
        assert_eq!(resolve_idle_timeout(&config), None);
    }

    #[test]
    fn prefix_keeps_trailing_space() {
        assert_eq!(pick_prefix(&[None, None, Some("!ask ")]), "!ask ");
        assert_eq!(pick_prefix(&[None, Some("?q "), Some("!ask ")]), "?q ");
        assert_eq!(pick_prefix(&[Some("!cli "), Some("?q "), None]), "!cli ");
    }

    #[test]
    fn empty_prefix_falls_back() {
        assert_eq!(pick_prefix(&[None, Some(""), None]), DEFAULT_PREFIX);
        assert_eq!(pick_prefix(&[Some(""), None, Some("")]), DEFAULT_PREFIX);
    }

    #[test]
    fn cli_overrides_win() {
        let mut config = Config::default();
        config.generation.model = Some("mistral".to_string());
        config.overrides.model = Some("phi3".to_string());
        config.overrides.base_url = Some("http://gpu-box:11434//".to_string());
        assert_eq!(resolve_model(&config), "phi3");
        assert_eq!(resolve_base_url(&config), "http://gpu-box:11434");
    }

    #[test]
    fn missing_file_loads_defaults() {
        let path = std::env::temp_dir().join("estagiario-config-test-missing/config.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert!(config.generation.model.is_none());
    }
}
