use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GenoflowError, Result};

/// Genome builds the validators know chromosome lengths for.
pub const KNOWN_GENOME_BUILDS: &[&str] = &["hg38", "hg19", "grch38", "grch37"];

/// Providers that run without an API key.
const KEYLESS_PROVIDERS: &[&str] = &["ollama", "local"];

/// Top-level Genoflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

/// How the dispatcher treats a `${name}` parameter with no matching result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferencePolicy {
    /// Leave the placeholder string in place and log a warning.
    #[default]
    Lenient,
    /// Fail the step before any collaborator is called.
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Ask the oracle for a THOUGHT/ACTION note before each step.
    #[serde(default = "default_enable_reasoning")]
    pub enable_reasoning: bool,
    #[serde(default)]
    pub reference_policy: ReferencePolicy,
    /// Number of recent messages included in the planning context.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_message_clip_chars")]
    pub message_clip_chars: usize,
    #[serde(default = "default_result_clip_chars")]
    pub result_clip_chars: usize,
    #[serde(default)]
    pub debug: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            enable_reasoning: default_enable_reasoning(),
            reference_policy: ReferencePolicy::default(),
            history_window: default_history_window(),
            message_clip_chars: default_message_clip_chars(),
            result_clip_chars: default_result_clip_chars(),
            debug: false,
        }
    }
}

fn default_max_iterations() -> usize { 50 }
fn default_enable_reasoning() -> bool { true }
fn default_history_window() -> usize { 5 }
fn default_message_clip_chars() -> usize { 100 }
fn default_result_clip_chars() -> usize { 200 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_model_timeout(),
            retry: None,
        }
    }
}

impl ModelConfig {
    pub fn requires_api_key(&self) -> bool {
        !KEYLESS_PROVIDERS.contains(&self.provider.as_str())
    }
}

fn default_provider() -> String { "anthropic".to_string() }
fn default_model_id() -> String { "claude-sonnet-4-20250514".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.1 }
fn default_model_timeout() -> u64 { 300 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// External bioinformatics tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_samtools_binary")]
    pub samtools_binary: String,
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            samtools_binary: default_samtools_binary(),
            timeout_secs: default_tool_timeout(),
            working_dir: None,
        }
    }
}

fn default_samtools_binary() -> String { "samtools".to_string() }
fn default_tool_timeout() -> u64 { 300 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default = "default_genome_build")]
    pub genome_build: String,
    /// Accept IUPAC ambiguity codes in REF/ALT alleles.
    #[serde(default)]
    pub allow_iupac: bool,
    /// In strict mode any finding fails validation; otherwise only critical ones.
    #[serde(default = "default_strict_mode")]
    pub strict_mode: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            genome_build: default_genome_build(),
            allow_iupac: false,
            strict_mode: default_strict_mode(),
        }
    }
}

fn default_genome_build() -> String { "hg38".to_string() }
fn default_strict_mode() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_ensembl_url")]
    pub ensembl_url: String,
    #[serde(default = "default_species")]
    pub species: String,
    #[serde(default = "default_knowledge_timeout")]
    pub timeout_secs: u64,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            ensembl_url: default_ensembl_url(),
            species: default_species(),
            timeout_secs: default_knowledge_timeout(),
        }
    }
}

fn default_ensembl_url() -> String { "https://rest.ensembl.org".to_string() }
fn default_species() -> String { "homo_sapiens".to_string() }
fn default_knowledge_timeout() -> u64 { 30 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| GenoflowError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| GenoflowError::Config(e.to_string()))
    }

    /// Default config driven by environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(key) = get("ANTHROPIC_API_KEY").filter(|k| !k.is_empty()) {
            config.model.provider = "anthropic".to_string();
            config.model.api_key = Some(key);
        } else if let Some(key) = get("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            config.model.provider = "openai".to_string();
            config.model.model_id = "gpt-4o".to_string();
            config.model.api_key = Some(key);
        }
        if let Some(model) = get("GENOFLOW_MODEL").filter(|m| !m.is_empty()) {
            config.model.model_id = model;
        }
        config.agent.debug = get("GENOFLOW_DEBUG")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        config
    }

    /// Load `path` when it exists, otherwise fall back to the environment.
    pub fn load_or_env(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) if p.exists() => {
                let mut config = Self::load(p)?;
                config.fill_api_key(|key| std::env::var(key).ok());
                Ok(config)
            }
            _ => Ok(Self::from_env()),
        }
    }

    fn fill_api_key(&mut self, get: impl Fn(&str) -> Option<String>) {
        if self.model.api_key.is_some() {
            return;
        }
        let var = match self.model.provider.as_str() {
            "anthropic" => "ANTHROPIC_API_KEY",
            "openai" => "OPENAI_API_KEY",
            _ => return,
        };
        self.model.api_key = get(var).filter(|k| !k.is_empty());
    }

    /// Reject configs the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        for model in std::iter::once(&self.model).chain(&self.fallback_models) {
            let has_key = model.api_key.as_deref().is_some_and(|k| !k.is_empty());
            if model.requires_api_key() && !has_key {
                return Err(GenoflowError::Config(format!(
                    "no API key configured for provider '{}' (model {})",
                    model.provider, model.model_id
                )));
            }
        }
        if self.agent.max_iterations == 0 {
            return Err(GenoflowError::Config(
                "agent.max_iterations must be at least 1".to_string(),
            ));
        }
        let build = self.verification.genome_build.to_ascii_lowercase();
        if !KNOWN_GENOME_BUILDS.contains(&build.as_str()) {
            return Err(GenoflowError::Config(format!(
                "unknown genome build '{}' (expected one of: {})",
                self.verification.genome_build,
                KNOWN_GENOME_BUILDS.join(", ")
            )));
        }
        Ok(())
    }

    /// Copy with API keys masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for model in std::iter::once(&mut copy.model).chain(copy.fallback_models.iter_mut()) {
            if let Some(key) = model.api_key.as_mut() {
                *key = mask_secret(key);
            }
        }
        copy
    }
}

fn mask_secret(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
