use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::paths::Paths;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used for the rounds that follow a tool round. Falls back to `model`.
    #[serde(default)]
    pub followup_model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_llm_max_retries")]
    pub llm_max_retries: u32,
    #[serde(default = "default_llm_retry_delay_ms")]
    pub llm_retry_delay_ms: u64,
    #[serde(default = "default_context_messages")]
    pub context_messages: usize,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub owner_id: Option<i64>,
}

fn default_model() -> String {
    "google/gemini-2.5-flash".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.9
}

fn default_max_rounds() -> u32 {
    8
}

fn default_llm_max_retries() -> u32 {
    2
}

fn default_llm_retry_delay_ms() -> u64 {
    1500
}

fn default_context_messages() -> usize {
    15
}

fn default_system_prompt() -> String {
    "You are Hono, a friendly member of this chat. Answer briefly and naturally. \
     Use the available tools when an action is needed, and reply in plain text when done."
        .to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            followup_model: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            max_rounds: default_max_rounds(),
            llm_max_retries: default_llm_max_retries(),
            llm_retry_delay_ms: default_llm_retry_delay_ms(),
            context_messages: default_context_messages(),
            system_prompt: default_system_prompt(),
            owner_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverConfig {
    /// Minimum directory match score (0..1, exclusive) for a fuzzy hit.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
}

fn default_match_threshold() -> f64 {
    0.3
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsConfig {
    /// Upper bound on how long a rate-limited round waits before the next dispatch.
    #[serde(default = "default_max_rate_limit_wait_secs")]
    pub max_rate_limit_wait_secs: u64,
    #[serde(default = "default_bot_reply_timeout_secs")]
    pub bot_reply_timeout_secs: u64,
    #[serde(default = "default_bot_reply_poll_secs")]
    pub bot_reply_poll_secs: u64,
    #[serde(default = "default_pinned_cache_secs")]
    pub pinned_cache_secs: u64,
    #[serde(default = "default_rules_max_chars")]
    pub rules_max_chars: usize,
    #[serde(default = "default_staff_max_chars")]
    pub staff_max_chars: usize,
}

fn default_max_rate_limit_wait_secs() -> u64 {
    60
}

fn default_bot_reply_timeout_secs() -> u64 {
    30
}

fn default_bot_reply_poll_secs() -> u64 {
    2
}

fn default_pinned_cache_secs() -> u64 {
    300
}

fn default_rules_max_chars() -> usize {
    2000
}

fn default_staff_max_chars() -> usize {
    1000
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_rate_limit_wait_secs: default_max_rate_limit_wait_secs(),
            bot_reply_timeout_secs: default_bot_reply_timeout_secs(),
            bot_reply_poll_secs: default_bot_reply_poll_secs(),
            pinned_cache_secs: default_pinned_cache_secs(),
            rules_max_chars: default_rules_max_chars(),
            staff_max_chars: default_staff_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert("openrouter".to_string(), ProviderConfig {
            api_key: String::new(),
            api_base: Some("https://openrouter.ai/api/v1".to_string()),
        });
        providers.insert("openai".to_string(), ProviderConfig::default());
        providers.insert("deepseek".to_string(), ProviderConfig {
            api_key: String::new(),
            api_base: Some("https://api.deepseek.com/v1".to_string()),
        });

        Self {
            providers,
            agent: AgentConfig::default(),
            resolver: ResolverConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent.max_rounds == 0 {
            return Err(Error::Config("agent.maxRounds must be at least 1".to_string()));
        }
        if !(0.0..1.0).contains(&self.resolver.match_threshold) {
            return Err(Error::Config(format!(
                "resolver.matchThreshold must be in [0, 1), got {}",
                self.resolver.match_threshold
            )));
        }
        if self.tools.bot_reply_poll_secs == 0 {
            return Err(Error::Config("tools.botReplyPollSecs must be at least 1".to_string()));
        }
        Ok(())
    }

    /// First provider with a configured key, in priority order.
    pub fn get_api_key(&self) -> Option<(&str, &ProviderConfig)> {
        let priority = ["openrouter", "openai", "deepseek"];

        for name in priority {
            if let Some(provider) = self.providers.get(name) {
                if !provider.api_key.is_empty() {
                    return Some((name, provider));
                }
            }
        }
        None
    }

    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let raw = r#"{ "agent": { "model": "x/y", "maxRounds": 3 } }"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.agent.model, "x/y");
        assert_eq!(cfg.agent.max_rounds, 3);
        assert_eq!(cfg.agent.context_messages, 15);
        assert_eq!(cfg.tools.rules_max_chars, 2000);
        assert!((cfg.resolver.match_threshold - 0.3).abs() < f64::EPSILON);
        assert!(cfg.providers.is_empty());
    }

    #[test]
    fn test_get_api_key_priority() {
        let mut cfg = Config::default();
        assert!(cfg.get_api_key().is_none());
        cfg.providers.get_mut("deepseek").unwrap().api_key = "d".to_string();
        cfg.providers.get_mut("openrouter").unwrap().api_key = "o".to_string();
        let (name, provider) = cfg.get_api_key().unwrap();
        assert_eq!(name, "openrouter");
        assert_eq!(provider.api_key, "o");
    }

    #[test]
    fn test_validate_rejects_zero_rounds() {
        let mut cfg = Config::default();
        cfg.agent.max_rounds = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("hono-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        let mut cfg = Config::default();
        cfg.agent.owner_id = Some(42);
        cfg.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.agent.owner_id, Some(42));
        std::fs::remove_dir_all(&dir).ok();
    }
}
