//! Global configuration parsing and validation.
//!
//! Everything has a default, so the binary runs with no config file at all:
//! `codex proto` against the OpenAI provider, read-only sandbox, approval
//! for anything not known-safe. A TOML file overrides the parts it names.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::channel::SpawnConfig;
use crate::proto::{
    AskForApproval, ModelProviderInfo, ReasoningEffort, ReasoningSummary, SandboxPolicy, WireApi,
};
use crate::session::ConfigureParams;
use crate::{AppError, Result};

/// How to launch the agent process.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Agent binary.
    #[serde(default = "default_agent_program")]
    pub program: String,
    /// Arguments selecting the protocol front end.
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: default_agent_program(),
            args: default_agent_args(),
        }
    }
}

fn default_agent_program() -> String {
    "codex".into()
}

fn default_agent_args() -> Vec<String> {
    vec!["proto".into()]
}

/// Model and provider selection sent in `configure_session`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ModelConfig {
    /// Model slug.
    #[serde(default = "default_model")]
    pub model: String,
    /// Provider display name.
    #[serde(default = "default_provider_name")]
    pub provider_name: String,
    /// Base URL of the provider API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_env_key")]
    pub env_key: Option<String>,
    /// Instructions shown when the key is missing.
    #[serde(default)]
    pub env_key_instructions: Option<String>,
    /// Provider API dialect.
    #[serde(default)]
    pub wire_api: WireApi,
    /// Reasoning effort for reasoning-capable models.
    #[serde(default)]
    pub reasoning_effort: ReasoningEffort,
    /// Reasoning summary verbosity.
    #[serde(default)]
    pub reasoning_summary: ReasoningSummary,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            provider_name: default_provider_name(),
            base_url: default_base_url(),
            env_key: default_env_key(),
            env_key_instructions: None,
            wire_api: WireApi::default(),
            reasoning_effort: ReasoningEffort::default(),
            reasoning_summary: ReasoningSummary::default(),
        }
    }
}

impl ModelConfig {
    /// Provider description in wire form.
    #[must_use]
    pub fn provider_info(&self) -> ModelProviderInfo {
        ModelProviderInfo {
            name: self.provider_name.clone(),
            base_url: self.base_url.clone(),
            env_key: self.env_key.clone(),
            env_key_instructions: self.env_key_instructions.clone(),
            wire_api: self.wire_api,
            query_params: None,
            http_headers: None,
            env_http_headers: None,
        }
    }
}

fn default_model() -> String {
    "codex-mini-latest".into()
}

fn default_provider_name() -> String {
    "openai".into()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_env_key() -> Option<String> {
    Some("OPENAI_API_KEY".into())
}

fn default_max_sessions() -> usize {
    4
}

fn default_approval_policy() -> AskForApproval {
    AskForApproval::UnlessTrusted
}

fn default_sandbox_policy() -> SandboxPolicy {
    SandboxPolicy::ReadOnly
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Working directory for sessions; the host's when absent.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Maximum concurrent sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// When the agent must pause for approval.
    #[serde(default = "default_approval_policy")]
    pub approval_policy: AskForApproval,
    /// Restrictions for agent-run commands.
    #[serde(default = "default_sandbox_policy")]
    pub sandbox_policy: SandboxPolicy,
    /// System instructions override.
    #[serde(default)]
    pub instructions: Option<String>,
    /// Disable server-side response storage.
    #[serde(default)]
    pub disable_response_storage: bool,
    /// Notification program and arguments.
    #[serde(default)]
    pub notify: Option<Vec<String>>,
    /// Agent launch settings.
    #[serde(default)]
    pub agent: AgentConfig,
    /// Model and provider selection.
    #[serde(default)]
    pub model: ModelConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            cwd: None,
            max_sessions: default_max_sessions(),
            approval_policy: default_approval_policy(),
            sandbox_policy: default_sandbox_policy(),
            instructions: None,
            disable_response_storage: false,
            notify: None,
            agent: AgentConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Launch settings for the agent process.
    #[must_use]
    pub fn spawn_config(&self) -> SpawnConfig {
        SpawnConfig {
            program: self.agent.program.clone(),
            args: self.agent.args.clone(),
            cwd: self.cwd.clone(),
        }
    }

    /// The full `configure_session` payload this config describes.
    ///
    /// The wire format requires a concrete working directory, so an absent
    /// `cwd` resolves to the host's current directory here.
    #[must_use]
    pub fn configure_params(&self) -> ConfigureParams {
        let cwd = self
            .cwd
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        ConfigureParams {
            provider: self.model.provider_info(),
            model: self.model.model.clone(),
            reasoning_effort: self.model.reasoning_effort,
            reasoning_summary: self.model.reasoning_summary,
            instructions: self.instructions.clone(),
            approval_policy: self.approval_policy,
            sandbox_policy: self.sandbox_policy.clone(),
            disable_response_storage: self.disable_response_storage,
            cwd,
            notify: self.notify.clone(),
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.max_sessions == 0 {
            return Err(AppError::Config(
                "max_sessions must be greater than zero".into(),
            ));
        }

        if self.agent.program.is_empty() {
            return Err(AppError::Config("agent.program must not be empty".into()));
        }

        if let Some(cwd) = &self.cwd {
            let canonical = cwd
                .canonicalize()
                .map_err(|err| AppError::Config(format!("cwd invalid: {err}")))?;
            self.cwd = Some(canonical);
        }

        Ok(())
    }
}
