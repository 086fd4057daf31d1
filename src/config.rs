// src/config.rs
//! Service configuration.
//!
//! Lookup order:
//! 1) `$NEWS_CONFIG_PATH`
//! 2) `config/news.toml`
//! 3) `config/news.json`
//! 4) built-in defaults
//!
//! Every section and field is optional. Zero intervals fall back to defaults.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::PipelineError;
use crate::sources::{Source, SourceRegistry};

pub const ENV_PATH: &str = "NEWS_CONFIG_PATH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub refresh: RefreshConfig,
    pub classifier: ClassifierConfig,
    /// Replaces the built-in registry when non-empty.
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub deadline_secs: u64,
    pub limit_per_source: usize,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            fetch_timeout_secs: 10,
            deadline_secs: 30,
            limit_per_source: 15,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// "disabled" | "openai" | "gemini" | "mock" (case-insensitive)
    pub provider: String,
    /// "ENV" means: read OPENAI_API_KEY / GEMINI_API_KEY (by provider)
    pub api_key: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub spacing_ms: u64,
    pub timeout_secs: u64,
    pub sweep_interval_secs: u64,
    /// Max oracle calls per UTC day; `None` = unlimited.
    pub daily_limit: Option<u32>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            api_key: "ENV".to_string(),
            model: None,
            base_url: None,
            spacing_ms: 300,
            timeout_secs: 20,
            sweep_interval_secs: 60,
            daily_limit: None,
        }
    }
}

impl ClassifierConfig {
    pub fn spacing(&self) -> Duration {
        Duration::from_millis(self.spacing_ms)
    }
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Resolve the key; `None` when it is empty or the env var is unset.
    pub fn resolve_api_key(&self) -> Option<String> {
        let raw = self.api_key.trim();
        let key = if raw.eq_ignore_ascii_case("env") {
            let var = match self.provider.as_str() {
                "openai" => "OPENAI_API_KEY",
                "gemini" => "GEMINI_API_KEY",
                _ => return None,
            };
            std::env::var(var).ok()?
        } else {
            raw.to_string()
        };
        let key = key.trim().to_string();
        (!key.is_empty()).then_some(key)
    }
}

impl AppConfig {
    /// Load from an explicit path. TOML or JSON, chosen by extension.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg: AppConfig = match ext.as_str() {
            "toml" => toml::from_str(&content)
                .with_context(|| format!("parsing TOML config {}", path.display()))?,
            "json" => serde_json::from_str(&content)
                .with_context(|| format!("parsing JSON config {}", path.display()))?,
            other => bail!("unsupported config format `{other}`"),
        };
        Ok(cfg.sanitized())
    }

    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
        let toml_p = PathBuf::from("config/news.toml");
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        let json_p = PathBuf::from("config/news.json");
        if json_p.exists() {
            return Self::load_from(&json_p);
        }
        Ok(Self::default())
    }

    fn sanitized(mut self) -> Self {
        let d = RefreshConfig::default();
        let r = &mut self.refresh;
        if r.interval_secs == 0 {
            r.interval_secs = d.interval_secs;
        }
        if r.fetch_timeout_secs == 0 {
            r.fetch_timeout_secs = d.fetch_timeout_secs;
        }
        if r.deadline_secs == 0 {
            r.deadline_secs = d.deadline_secs;
        }
        if r.limit_per_source == 0 {
            r.limit_per_source = d.limit_per_source;
        }

        let d = ClassifierConfig::default();
        let c = &mut self.classifier;
        c.provider = c.provider.trim().to_ascii_lowercase();
        if c.provider.is_empty() {
            c.provider = d.provider;
        }
        if c.timeout_secs == 0 {
            c.timeout_secs = d.timeout_secs;
        }
        if c.sweep_interval_secs == 0 {
            c.sweep_interval_secs = d.sweep_interval_secs;
        }
        self
    }

    /// Registry from `[[sources]]`, or the built-in seed when none are configured.
    pub fn registry(&self) -> Result<SourceRegistry, PipelineError> {
        if self.sources.is_empty() {
            Ok(SourceRegistry::default_seed())
        } else {
            SourceRegistry::new(self.sources.clone())
        }
    }
}
