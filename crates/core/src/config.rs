use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub queue: QueueConfig,
    pub github: GitHubConfig,
    pub ai: AiConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// SQLite URL of the durable job store.
    pub url: String,
    /// How long a worker may hold a job before it is failed and redelivered.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    #[serde(default = "default_ai_review_concurrency")]
    pub ai_review_concurrency: usize,
    #[serde(default = "default_lint_security_concurrency")]
    pub lint_security_concurrency: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
}

impl QueueConfig {
    pub fn lease(&self) -> Duration { Duration::from_secs(self.lease_secs) }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitHubConfig {
    #[serde(default)]
    pub token: String,
    pub webhook_secret: Option<String>,
    /// Override for GitHub Enterprise installations.
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    OpenAi,
    Anthropic,
}

impl AiProvider {
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AiConfig {
    pub provider: AiProvider,
    #[serde(default)]
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

/// An external program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self { program: program.to_string(), args: args.iter().map(|s| s.to_string()).collect() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Parent directory for job workspaces. Defaults to the system temp dir.
    pub workspace_root: Option<PathBuf>,
    /// Repositories are cloned from `{clone_base_url}/{owner}/{repo}.git`.
    pub clone_base_url: String,
    pub git: String,
    pub install: ToolCommand,
    pub lint: ToolCommand,
    pub audit: ToolCommand,
    pub command_timeout_secs: u64,
}

impl AnalysisConfig {
    pub fn command_timeout(&self) -> Duration { Duration::from_secs(self.command_timeout_secs) }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            workspace_root: None,
            clone_base_url: "https://github.com".to_string(),
            git: "git".to_string(),
            install: ToolCommand::new("npm", &["install", "--ignore-scripts"]),
            lint: ToolCommand::new("npx", &["eslint", ".", "-f", "json"]),
            audit: ToolCommand::new("npm", &["audit", "--json"]),
            command_timeout_secs: 90,
        }
    }
}

fn default_lease_secs() -> u64 { 120 }

fn default_ai_review_concurrency() -> usize { 4 }

fn default_lint_security_concurrency() -> usize { 2 }

fn default_retry_attempts() -> usize { 3 }

impl Config {
    /// Read the YAML config file, merge credentials from the environment and
    /// validate the result. Any error here is fatal at startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file {}", path.display()))?;
        let mut config: Config =
            serde_yaml::from_reader(BufReader::new(file)).context("Failed to parse config file")?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Environment variables take precedence over values from the file.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(token) = var("GITHUB_TOKEN").filter(|v| !v.is_empty()) {
            self.github.token = token;
        }
        if let Some(key) = var(self.ai.provider.api_key_env()).filter(|v| !v.is_empty()) {
            self.ai.api_key = key;
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.github.token.is_empty(), "GitHub token is not configured");
        ensure!(
            !self.ai.api_key.is_empty(),
            "AI provider key is not configured (set ai.api_key or {})",
            self.ai.provider.api_key_env()
        );
        ensure!(self.queue.lease_secs > 0, "queue.lease_secs must be positive");
        ensure!(
            self.queue.ai_review_concurrency > 0 && self.queue.lint_security_concurrency > 0,
            "queue concurrency must be positive"
        );
        ensure!(self.analysis.command_timeout_secs > 0, "command_timeout_secs must be positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
server:
  port: 3000
queue:
  url: sqlite://jobs.sqlite
github:
  token: ghp_file
ai:
  provider: openai
  api_key: sk-file
"#;

    #[test]
    fn test_defaults() {
        let config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(config.queue.lease(), Duration::from_secs(120));
        assert_eq!(config.queue.retry_attempts, 3);
        assert_eq!(config.ai.provider, AiProvider::OpenAi);
        assert_eq!(config.analysis.install.args, ["install", "--ignore-scripts"]);
        assert_eq!(config.analysis.clone_base_url, "https://github.com");
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides_and_missing_credentials() {
        let mut config: Config = serde_yaml::from_str(MINIMAL).unwrap();
        config.apply_env(|key| match key {
            "GITHUB_TOKEN" => Some("ghp_env".to_string()),
            "OPENAI_API_KEY" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.github.token, "ghp_env");
        assert_eq!(config.ai.api_key, "sk-file");

        config.ai.provider = AiProvider::Anthropic;
        config.ai.api_key.clear();
        config.apply_env(|_| None);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"), "{err}");

        config.ai.api_key = "key".to_string();
        config.github.token.clear();
        assert!(config.validate().is_err());
    }
}
