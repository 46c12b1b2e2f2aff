//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.wayfarer/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::inference::ProviderKind;
use crate::inference::providers::anthropic::{DEFAULT_ANTHROPIC_BASE_URL, DEFAULT_MAX_TOKENS};
use crate::inference::providers::openai::DEFAULT_OPENAI_BASE_URL;

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct WayfarerConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub anthropic: AnthropicConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct GeneralConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub data_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    pub listen_addr: Option<String>,
    pub max_duration_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AnthropicConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_MAX_DURATION_SECS: u64 = 30;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI travel assistant. \
    You specialize in helping users plan their trips, find accommodations, discover attractions, \
    and arrange transportation. Be friendly, informative, and provide practical travel advice. \
    Keep your responses concise but helpful.";

// ============================================================================
// Resolved Config (concrete values, no Options)
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub provider: ProviderKind,
    pub model_name: String,
    pub system_prompt: String,
    pub listen_addr: String,
    pub max_duration: Duration,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub anthropic_max_tokens: u32,
    pub data_dir: PathBuf,
}

/// Values supplied on the command line. `None` = not specified.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub provider: Option<String>,
    pub listen_addr: Option<String>,
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Loading
// ============================================================================

/// Returns `~/.wayfarer`, the home of the config file and local data.
pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".wayfarer"))
}

/// Returns the path to `~/.wayfarer/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    home_dir().map(|h| h.join("config.toml"))
}

/// Load config from `~/.wayfarer/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and
/// returns `WayfarerConfig::default()`. If it exists but is malformed,
/// returns `ConfigError::Parse`.
pub fn load_config() -> Result<WayfarerConfig, ConfigError> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            warn!("Could not determine home directory, using default config");
            return Ok(WayfarerConfig::default());
        }
    };
    load_config_from(&path)
}

pub fn load_config_from(path: &Path) -> Result<WayfarerConfig, ConfigError> {
    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(path);
        return Ok(WayfarerConfig::default());
    }

    let contents = fs::read_to_string(path)?;
    let config: WayfarerConfig = toml::from_str(&contents)?;
    info!("Loaded config from {}", path.display());
    debug!("Config: {:?}", config);
    Ok(config)
}

/// Generates a commented-out default config file at the given path.
fn generate_default_config(path: &Path) {
    let default_content = r#"# Wayfarer Configuration
# All settings are optional; defaults are used for anything not specified.
# Override hierarchy: defaults → this file → env vars → CLI flags.

# [general]
# provider = "openai"                # "openai" or "anthropic" (env: AI_PROVIDER)
# model = "gpt-4-turbo-preview"      # env: WAYFARER_MODEL
# system_prompt = "You are a helpful AI travel assistant."
# data_dir = "/home/me/.wayfarer"

# [server]
# listen_addr = "127.0.0.1:3000"     # env: WAYFARER_ADDR
# max_duration_secs = 30             # env: WAYFARER_MAX_DURATION_SECS

# [openai]
# api_key = "sk-..."                 # Or set OPENAI_API_KEY env var
# base_url = "https://api.openai.com/v1"

# [anthropic]
# api_key = "sk-ant-..."             # Or set ANTHROPIC_API_KEY env var
# base_url = "https://api.anthropic.com/v1"
# max_tokens = 1024
"#;

    if let Some(parent) = path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!("Failed to create config directory: {}", e);
        return;
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the final config by collapsing: defaults → config file → env vars → CLI.
pub fn resolve(config: &WayfarerConfig, cli: &CliOverrides) -> ResolvedConfig {
    resolve_with_env(config, cli, |key| std::env::var(key).ok())
}

/// Same as [`resolve`] with an injectable environment lookup.
pub fn resolve_with_env(
    config: &WayfarerConfig,
    cli: &CliOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> ResolvedConfig {
    // Provider: CLI → env → config → default
    let provider = cli
        .provider
        .clone()
        .or_else(|| env("AI_PROVIDER"))
        .or_else(|| config.general.provider.clone())
        .map(|s| ProviderKind::from_selector(&s))
        .unwrap_or_default();

    // Model: env → config → provider default
    let model_name = env("WAYFARER_MODEL")
        .or_else(|| config.general.model.clone())
        .unwrap_or_else(|| provider.default_model().to_string());

    let system_prompt = config
        .general
        .system_prompt
        .clone()
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

    let listen_addr = cli
        .listen_addr
        .clone()
        .or_else(|| env("WAYFARER_ADDR"))
        .or_else(|| config.server.listen_addr.clone())
        .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

    let max_duration_secs = env("WAYFARER_MAX_DURATION_SECS")
        .and_then(|s| match s.parse::<u64>() {
            Ok(secs) => Some(secs),
            Err(e) => {
                warn!("Ignoring WAYFARER_MAX_DURATION_SECS={}: {}", s, e);
                None
            }
        })
        .or(config.server.max_duration_secs)
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_MAX_DURATION_SECS);

    let data_dir = config
        .general
        .data_dir
        .as_ref()
        .map(PathBuf::from)
        .or_else(home_dir)
        .unwrap_or_else(|| PathBuf::from(".wayfarer"));

    ResolvedConfig {
        provider,
        model_name,
        system_prompt,
        listen_addr,
        max_duration: Duration::from_secs(max_duration_secs),
        openai_api_key: env("OPENAI_API_KEY").or_else(|| config.openai.api_key.clone()),
        openai_base_url: env("OPENAI_BASE_URL")
            .or_else(|| config.openai.base_url.clone())
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        anthropic_api_key: env("ANTHROPIC_API_KEY").or_else(|| config.anthropic.api_key.clone()),
        anthropic_base_url: env("ANTHROPIC_BASE_URL")
            .or_else(|| config.anthropic.base_url.clone())
            .unwrap_or_else(|| DEFAULT_ANTHROPIC_BASE_URL.to_string()),
        anthropic_max_tokens: config.anthropic.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        data_dir,
    }
}
