use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_LLM_PROFILE: &str = "deepseek";
pub const DEFAULT_API_KEY_ENV: &str = "DEEPSEEK_API_KEY";

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout() -> u64 {
    180
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_interval() -> u64 {
    5
}

fn default_history_capacity() -> usize {
    10
}

fn default_recap_chars() -> usize {
    500
}

fn default_target_chapters() -> u32 {
    10
}

fn default_chapter_length() -> u32 {
    2000
}

fn default_style() -> String {
    "轻松幽默".to_string()
}

fn default_engine_name() -> String {
    "LongNovelGenerator".to_string()
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("doc_db")
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Connection settings for one chat-completion backend.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    /// Inline key. Leave empty to read `api_key_env` at call time.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub interface_format: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Seconds between retry attempts.
    #[serde(default = "default_retry_interval")]
    pub retry_interval: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_key_env: default_api_key_env(),
            base_url: String::new(),
            interface_format: String::new(),
            model_name: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            retry_interval: default_retry_interval(),
        }
    }
}

impl LlmConfig {
    pub fn deepseek() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            interface_format: "DeepSeek".to_string(),
            model_name: "deepseek-chat".to_string(),
            ..Self::default()
        }
    }
}

/// Tuning knobs of the narrative engine.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LongformConfig {
    /// Maximum number of history messages kept; each unit adds two.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Characters of the document tail quoted back as a recap.
    #[serde(default = "default_recap_chars")]
    pub recap_chars: usize,
    #[serde(default = "default_target_chapters")]
    pub default_target_chapters: u32,
    #[serde(default = "default_chapter_length")]
    pub default_chapter_length: u32,
    #[serde(default = "default_style")]
    pub default_style: String,
    #[serde(default = "default_engine_name")]
    pub engine_name: String,
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,
}

impl Default for LongformConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            recap_chars: default_recap_chars(),
            default_target_chapters: default_target_chapters(),
            default_chapter_length: default_chapter_length(),
            default_style: default_style(),
            engine_name: default_engine_name(),
            store_dir: default_store_dir(),
        }
    }
}

impl LongformConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_capacity % 2 != 0 {
            return Err(ConfigError::Invalid {
                field: "history_capacity",
                reason: format!(
                    "must be even so exchanges are never split, got {}",
                    self.history_capacity
                ),
            });
        }
        if self.engine_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "engine_name",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PromptConfig {
    /// Directories holding `.toml` / `.yaml` files that override built-in templates.
    #[serde(default)]
    pub custom_directories: Vec<PathBuf>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RecentUsage {
    #[serde(default)]
    pub last_llm_interface: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub llm_profiles: BTreeMap<String, LlmConfig>,
    #[serde(default)]
    pub longform: LongformConfig,
    #[serde(default)]
    pub prompts: PromptConfig,
    #[serde(default)]
    pub recent: RecentUsage,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_llm_profile(&self, name: &str) -> Option<&LlmConfig> {
        self.llm_profiles.get(name)
    }

    pub fn upsert_llm_profile<S: Into<String>>(&mut self, name: S, profile: LlmConfig) {
        self.llm_profiles.insert(name.into(), profile);
    }

    pub fn remove_llm_profile(&mut self, name: &str) -> Option<LlmConfig> {
        self.llm_profiles.remove(name)
    }

    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_json::from_str(input)?;
        config.longform.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    config: Config,
}

impl ConfigStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let config = if path.exists() {
            Config::from_path(&path)?
        } else {
            Config::default()
        };

        Ok(Self { path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.config.to_path(&self.path)
    }

    pub fn touch_llm_interface<S: Into<String>>(&mut self, name: S) {
        self.config.recent.last_llm_interface = Some(name.into());
    }

    pub fn last_llm_interface(&self) -> Option<&str> {
        self.config
            .recent
            .last_llm_interface
            .as_deref()
            .and_then(|name| self.config.llm_profiles.get(name).map(|_| name))
    }

    /// Seeds the DeepSeek profile when none is configured and repoints the
    /// recent selection at an existing profile.
    pub fn ensure_recent_defaults(&mut self) {
        if self.config.llm_profiles.is_empty() {
            self.config
                .upsert_llm_profile(DEFAULT_LLM_PROFILE, LlmConfig::deepseek());
        }

        if self
            .config
            .recent
            .last_llm_interface
            .as_ref()
            .map(|name| self.config.llm_profiles.contains_key(name))
            != Some(true)
        {
            let next = self.config.llm_profiles.keys().next().cloned();
            self.config.recent.last_llm_interface = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_full_config() {
        let json = r#"{
            "llm_profiles": {
                "deepseek": {
                    "api_key_env": "MY_KEY",
                    "base_url": "https://api.deepseek.com",
                    "interface_format": "DeepSeek",
                    "model_name": "deepseek-chat",
                    "temperature": 0.5,
                    "max_tokens": 2048
                }
            },
            "longform": {
                "history_capacity": 6,
                "recap_chars": 800,
                "engine_name": "LongNovelGenerator"
            },
            "prompts": { "custom_directories": ["prompts"] },
            "recent": { "last_llm_interface": "deepseek" }
        }"#;

        let config = Config::from_json_str(json).unwrap();
        let profile = config.get_llm_profile("deepseek").unwrap();
        assert_eq!(profile.api_key_env, "MY_KEY");
        assert_eq!(profile.timeout, 180);
        assert_eq!(profile.max_retries, 3);
        assert_eq!(config.longform.history_capacity, 6);
        assert_eq!(config.longform.recap_chars, 800);
        assert_eq!(config.longform.default_chapter_length, 2000);
        assert_eq!(config.longform.default_style, "轻松幽默");
        assert_eq!(config.prompts.custom_directories, vec![PathBuf::from("prompts")]);
    }

    #[test]
    fn empty_input_yields_defaults() {
        let config = Config::from_json_str("  ").unwrap();
        assert!(config.llm_profiles.is_empty());
        assert_eq!(config.longform, LongformConfig::default());
        assert_eq!(LlmConfig::default().api_key_env, DEFAULT_API_KEY_ENV);
    }

    #[test]
    fn rejects_odd_history_capacity() {
        let err = Config::from_json_str(r#"{"longform": {"history_capacity": 7}}"#)
            .expect_err("odd capacity");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "history_capacity",
                ..
            }
        ));
    }

    #[test]
    fn store_persists_config() {
        let temp = tempdir().unwrap();
        let config_path = temp.path().join("nested").join("config.json");

        let mut store = ConfigStore::open(config_path.clone()).unwrap();
        store
            .config_mut()
            .upsert_llm_profile("local", LlmConfig::deepseek());
        store.touch_llm_interface("local");
        store.save().unwrap();

        let store = ConfigStore::open(config_path).unwrap();
        assert_eq!(store.last_llm_interface(), Some("local"));
        assert!(store.config().llm_profiles.contains_key("local"));
    }

    #[test]
    fn ensure_recent_defaults_seeds_deepseek_profile() {
        let temp = tempdir().unwrap();
        let mut store = ConfigStore::open(temp.path().join("missing.json")).unwrap();
        assert_eq!(store.last_llm_interface(), None);

        store.ensure_recent_defaults();
        assert_eq!(store.last_llm_interface(), Some(DEFAULT_LLM_PROFILE));
        let profile = store.config().get_llm_profile(DEFAULT_LLM_PROFILE).unwrap();
        assert_eq!(profile.model_name, "deepseek-chat");
    }

    #[test]
    fn ensure_recent_defaults_repoints_stale_selection() {
        let mut config = Config::new();
        config.upsert_llm_profile("b", LlmConfig::default());
        config.upsert_llm_profile("a", LlmConfig::default());
        config.recent.last_llm_interface = Some("gone".into());
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.json");
        config.to_path(&path).unwrap();

        let mut store = ConfigStore::open(path).unwrap();
        store.ensure_recent_defaults();
        assert_eq!(store.last_llm_interface(), Some("a"));
        assert_eq!(store.config().llm_profiles.len(), 2);
        assert!(store.config_mut().remove_llm_profile("b").is_some());
    }
}
