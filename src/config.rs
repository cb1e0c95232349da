//! Configuration loading and management
//!
//! Settings come from an optional TOML file and are then overridden by
//! environment variables. The CLI itself takes no flags, so the file path
//! is also taken from the environment (`TURNSTILE_CONFIG`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Error, Result};

/// Identity used to attribute tool authorizations
pub const USER_ID_ENV: &str = "ARCADE_USER_ID";
/// Model the reasoning process should use
pub const MODEL_ENV: &str = "OPENAI_MODEL";
/// API key for the authorization backend
pub const AUTH_API_KEY_ENV: &str = "ARCADE_API_KEY";
/// Base URL override for the authorization backend
pub const AUTH_BASE_URL_ENV: &str = "ARCADE_BASE_URL";
/// Base URL override for the agent server
pub const AGENT_URL_ENV: &str = "TURNSTILE_AGENT_URL";
/// Explicit config file path
pub const CONFIG_PATH_ENV: &str = "TURNSTILE_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// User identity for authorization attribution
    #[serde(default)]
    pub user_id: Option<String>,

    /// Model identifier handed to the reasoning process
    #[serde(default)]
    pub model: Option<String>,

    /// Fixed session key; a fresh one is generated per process when unset
    #[serde(default)]
    pub session_id: Option<String>,

    /// Input that ends the session (matched case-insensitively)
    #[serde(default = "default_exit_keyword")]
    pub exit_keyword: String,

    /// System prompt for the reasoning process
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Tool catalog selection
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Agent server settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Authorization backend settings
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_exit_keyword() -> String {
    "exit".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_id: None,
            model: None,
            session_id: None,
            exit_keyword: default_exit_keyword(),
            system_prompt: None,
            tools: ToolsConfig::default(),
            agent: AgentConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file or default locations
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(PathBuf::from).or_else(|| {
            // Try .turnstile/config.toml in current directory
            let local = PathBuf::from(".turnstile/config.toml");
            if local.exists() {
                return Some(local);
            }

            // Try ~/.turnstile/config.toml
            dirs::home_dir().map(|h| h.join(".turnstile/config.toml"))
        });

        match config_path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(&p)?;
                Self::parse(&content)
            }
            _ => Ok(Config::default()),
        }
    }

    /// Load from the location named by `TURNSTILE_CONFIG` (if any), then
    /// apply process environment overrides
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let config = Self::load(path.as_deref())?;
        Ok(config.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from a key lookup (the process environment in
    /// production). Blank values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(USER_ID_ENV) {
            self.user_id = Some(v);
        }
        if let Some(v) = get(MODEL_ENV) {
            self.model = Some(v);
        }
        if let Some(v) = get(AUTH_API_KEY_ENV) {
            self.auth.api_key = Some(v);
        }
        if let Some(v) = get(AUTH_BASE_URL_ENV) {
            self.auth.base_url = v;
        }
        if let Some(v) = get(AGENT_URL_ENV) {
            self.agent.url = v;
        }
        self
    }

    /// Check that every required setting is present
    pub fn validate(&self) -> Result<()> {
        self.user_id()?;
        self.model()?;

        if self.tools.limit == 0 {
            return Err(Error::Config("tools.limit must be at least 1".to_string()));
        }
        if self.tools.toolkits.is_empty() && self.tools.tools.is_empty() {
            return Err(Error::Config(
                "No tools selected: set tools.toolkits or tools.tools".to_string(),
            ));
        }
        if self.exit_keyword.trim().is_empty() {
            return Err(Error::Config("exit_keyword must not be empty".to_string()));
        }
        Ok(())
    }

    /// User identity, failing if unset
    pub fn user_id(&self) -> Result<&str> {
        required(self.user_id.as_deref(), USER_ID_ENV)
    }

    /// Model identifier, failing if unset
    pub fn model(&self) -> Result<&str> {
        required(self.model.as_deref(), MODEL_ENV)
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Config(format!(
            "Missing {}. Set it in the environment or the config file.",
            name
        ))),
    }
}

/// Which tools the reasoning process is given
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Toolkits whose tools are all included
    #[serde(default = "default_toolkits")]
    pub toolkits: Vec<String>,

    /// Individual tools included on their own
    #[serde(default)]
    pub tools: Vec<String>,

    /// Maximum number of tool definitions to fetch
    #[serde(default = "default_tool_limit")]
    pub limit: usize,
}

fn default_toolkits() -> Vec<String> {
    vec!["Youtube".to_string()]
}

fn default_tool_limit() -> usize {
    100
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            toolkits: default_toolkits(),
            tools: Vec::new(),
            limit: default_tool_limit(),
        }
    }
}

/// Agent server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the agent server
    #[serde(default = "default_agent_url")]
    pub url: String,

    /// Assistant (graph) to run on the server
    #[serde(default = "default_assistant_id")]
    pub assistant_id: String,

    /// API key sent as `x-api-key` (optional for local servers)
    #[serde(default)]
    pub api_key: Option<String>,

    /// TCP connect timeout
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Option<Duration>,
}

fn default_agent_url() -> String {
    "http://127.0.0.1:2024".to_string()
}

fn default_assistant_id() -> String {
    "agent".to_string()
}

fn default_connect_timeout() -> Option<Duration> {
    Some(Duration::from_secs(10))
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: default_agent_url(),
            assistant_id: default_assistant_id(),
            api_key: None,
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Authorization backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// API base URL
    #[serde(default = "default_auth_base_url")]
    pub base_url: String,

    /// API key (can also be in environment)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Long-poll window requested from the backend on each status call
    #[serde(default = "default_auth_wait", with = "duration_serde")]
    pub wait: Option<Duration>,

    /// TCP connect timeout
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Option<Duration>,
}

fn default_auth_base_url() -> String {
    "https://api.arcade.dev".to_string()
}

fn default_auth_wait() -> Option<Duration> {
    Some(Duration::from_secs(59))
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: default_auth_base_url(),
            api_key: None,
            wait: default_auth_wait(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

// Durations are written as humantime strings ("10s", "1m 30s")
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
