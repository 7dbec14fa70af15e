//! Configuration for mcq-forge
//!
//! Read once from `~/.config/mcq-forge/config.toml` (or `--config` /
//! `MCQ_FORGE_CONFIG`) and never mutated afterwards. Every section has
//! defaults, so a missing default file is not an error.

use crate::llm::prompts;
use crate::skills::SkillSet;
use keyring::Entry;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

const CONFIG_ENV: &str = "MCQ_FORGE_CONFIG";
const KEYRING_SERVICE: &str = "mcq-forge";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub skills: SkillsConfig,
    pub output: OutputConfig,
    pub prompts: PromptConfig,
    pub retry: RetryConfig,
    pub strategies: StrategiesConfig,
    pub vector_store: VectorStoreConfig,
    pub concept_db: ConceptDbConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider model id, e.g. `meta-llama/Llama-3.3-70B-Instruct-Turbo`
    pub id: String,
    /// OpenAI-compatible chat completions endpoint
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: TemperatureConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: "meta-llama/Llama-3.3-70B-Instruct-Turbo".to_string(),
            base_url: "https://api.together.xyz/v1/chat/completions".to_string(),
            api_key_env: "TOGETHER_API_KEY".to_string(),
            max_tokens: 2048,
            temperature: TemperatureConfig::default(),
        }
    }
}

impl ModelConfig {
    /// Short model name used in output file names (last path segment of the id)
    pub fn short_name(&self) -> &str {
        self.id.rsplit('/').next().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TemperatureConfig {
    pub generation: f32,
    /// Used for judging and topic identification
    pub evaluation: f32,
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            generation: 0.7,
            evaluation: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SkillsConfig {
    pub list: Vec<String>,
    pub requirements: HashMap<String, String>,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        let pairs = [
            (
                "Remember",
                "Recall a definition, law, unit or formula exactly as it is usually stated.",
            ),
            (
                "Understand",
                "Explain or interpret a concept, relationship or graph in the student's own terms.",
            ),
            (
                "Apply",
                "Use a law or formula to compute a result in a concrete, unfamiliar situation.",
            ),
            (
                "Analyze",
                "Break a situation into parts, compare cases or identify which factors matter.",
            ),
            (
                "Evaluate",
                "Judge a claim, design or method against physical principles and justify the choice.",
            ),
        ];
        Self {
            list: pairs.iter().map(|(name, _)| name.to_string()).collect(),
            requirements: pairs
                .iter()
                .map(|(name, req)| (name.to_string(), req.to_string()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub formats: OutputFormats,
    /// Where session results are written
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            formats: OutputFormats::default(),
            directory: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputFormats {
    pub generation: String,
    pub evaluation: String,
}

impl Default for OutputFormats {
    fn default() -> Self {
        Self {
            generation: prompts::GENERATION_OUTPUT_FORMAT.to_string(),
            evaluation: prompts::EVALUATION_OUTPUT_FORMAT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub system: String,
    pub llm_prompt: String,
    pub rag_prompt: String,
    pub conceptmap_prompt: String,
    pub evaluation_prompt: String,
    pub fix_uniqueness_prompt: String,
    pub fix_answer_prompt: String,
    pub topic_identifier_prompt: String,
    pub topic_match_prompt: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system: prompts::SYSTEM.to_string(),
            llm_prompt: prompts::DIRECT_GENERATION.to_string(),
            rag_prompt: prompts::RAG_GENERATION.to_string(),
            conceptmap_prompt: prompts::CONCEPT_MAP_GENERATION.to_string(),
            evaluation_prompt: prompts::EVALUATION.to_string(),
            fix_uniqueness_prompt: prompts::FIX_UNIQUENESS.to_string(),
            fix_answer_prompt: prompts::FIX_ANSWER.to_string(),
            topic_identifier_prompt: prompts::TOPIC_IDENTIFIER.to_string(),
            topic_match_prompt: prompts::TOPIC_MATCH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempt budget per skill
    pub attempts: u32,
    /// Extra HTTP requests on a 429 before a model call fails; off unless set
    pub rate_limit_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 2,
            rate_limit_retries: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    pub llm: StrategyConfig,
    pub rag: StrategyConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Run the LLM judge and fixer instead of the structural check alone
    pub review: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub data_dir: PathBuf,
    pub store_name: String,
    pub top_k: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            store_name: "physics_corpus".to_string(),
            top_k: 3,
        }
    }
}

impl VectorStoreConfig {
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(&self.store_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConceptDbConfig {
    pub path: PathBuf,
    pub subtopic_limit: usize,
}

impl Default for ConceptDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/concepts.db"),
            subtopic_limit: 3,
        }
    }
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mcq-forge"))
    }

    /// Default config file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    /// Load configuration. An explicitly requested file (argument or env var)
    /// must exist; the default location falls back to built-in defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let requested = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let config = match requested {
            Some(path) => Self::load_from(&path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path)?,
                _ => {
                    tracing::info!("No config file found, using built-in defaults");
                    Self::default()
                }
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file {}: {}", path.display(), e)
        })?;
        let config = Self::parse(&content)
            .map_err(|e| anyhow::anyhow!("Error parsing {}: {}", path.display(), e))?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        Url::parse(&self.model.base_url)
            .map_err(|e| anyhow::anyhow!("model.base_url is not a valid URL: {}", e))?;
        if self.model.id.trim().is_empty() {
            anyhow::bail!("model.id is empty");
        }
        if self.retry.attempts == 0 {
            anyhow::bail!("retry.attempts must be at least 1");
        }
        if self.vector_store.top_k == 0 {
            anyhow::bail!("vector_store.top_k must be at least 1");
        }
        self.skill_set()?;
        Ok(())
    }

    pub fn skill_set(&self) -> anyhow::Result<SkillSet> {
        SkillSet::new(&self.skills.list, &self.skills.requirements)
    }

    /// API key from the configured environment variable, falling back to the
    /// system keychain.
    pub fn api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var(&self.model.api_key_env) {
            if !key.trim().is_empty() {
                return Some(key);
            }
        }

        match read_keyring_key(&self.model.api_key_env) {
            Ok(key) => key,
            Err(err) => {
                tracing::warn!(
                    "Failed to read API key from system keychain: {}. Set {} instead.",
                    err,
                    self.model.api_key_env
                );
                None
            }
        }
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::default_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/mcq-forge/config.toml".to_string())
    }
}

fn read_keyring_key(account: &str) -> Result<Option<String>, keyring::Error> {
    let entry = Entry::new(KEYRING_SERVICE, &account.to_ascii_lowercase())?;
    match entry.get_password() {
        Ok(key) => Ok(Some(key)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(err),
    }
}
