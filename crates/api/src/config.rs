use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use oficina_agents::DEFAULT_PAYMENT_LINK_BASE;
use oficina_core::{IntentExtractor, Vocabulary};

/// Runtime settings, read from `OFICINA_*` environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: String,
    /// SQLite URL; the in-memory store is used when absent.
    pub database_url: Option<String>,
    pub api_key: String,
    pub vocabulary_path: Option<PathBuf>,
    pub payment_link_base: String,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            database_url: None,
            api_key: "dev-oficina-key".to_string(),
            vocabulary_path: None,
            payment_link_base: DEFAULT_PAYMENT_LINK_BASE.to_string(),
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 30,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind: non_empty_var("OFICINA_BIND").unwrap_or(defaults.bind),
            database_url: non_empty_var("OFICINA_DATABASE_URL"),
            api_key: non_empty_var("OFICINA_API_KEY").unwrap_or(defaults.api_key),
            vocabulary_path: non_empty_var("OFICINA_VOCABULARY_PATH").map(PathBuf::from),
            payment_link_base: non_empty_var("OFICINA_PAYMENT_LINK_BASE")
                .unwrap_or(defaults.payment_link_base),
            rate_limit_window: non_empty_var("OFICINA_RATE_LIMIT_WINDOW_SECONDS")
                .and_then(|value| value.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            rate_limit_max: non_empty_var("OFICINA_RATE_LIMIT_MAX")
                .and_then(|value| value.parse::<usize>().ok())
                .unwrap_or(defaults.rate_limit_max),
        }
    }

    pub fn build_extractor(&self) -> Result<IntentExtractor> {
        let Some(path) = self.vocabulary_path.as_ref() else {
            return Ok(IntentExtractor::reference());
        };

        let extractor = Vocabulary::from_json_file(path)
            .and_then(Vocabulary::into_extractor)
            .with_context(|| format!("failed loading vocabulary from {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            operations = extractor.catalog().phrases().len(),
            brands = extractor.brands().len(),
            "custom vocabulary loaded"
        );
        Ok(extractor)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
