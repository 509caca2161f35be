use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// How documents are scheduled against the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One document at a time, in enumeration order.
    Serial,
    /// A fixed number of documents in flight at once.
    WorkerPool { workers: usize },
    /// Corpus-wide dedup of source texts, translated in fixed-size batches.
    BatchDedup { batch_size: usize },
}

/// Which translation service is used, chosen once per run.
#[derive(Debug, Clone)]
pub enum BackendSettings {
    /// Plain HTTP API translating one string per request.
    Api {
        endpoint: String,
        headers: BTreeMap<String, String>,
    },
    /// OpenAI-compatible chat completions API.
    OpenAi {
        api_key: String,
        base_url: String,
        model: String,
    },
}

impl BackendSettings {
    pub fn mode(&self) -> &'static str {
        match self {
            BackendSettings::Api { .. } => "api",
            BackendSettings::OpenAi { .. } => "openai",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Corpus
    pub elements_dir: PathBuf,

    // Languages
    pub target_lang: String,
    pub backend_target_lang: String,
    pub source_lang_priority: Vec<String>,

    // Backend
    pub backend: BackendSettings,
    pub timeout: Duration,
    pub delay: Duration,
    pub max_attempts: u32,

    // Scheduling
    pub strategy: Strategy,

    // Cache
    pub cache_file: PathBuf,
    pub cache_save_every: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup (the environment in production,
    /// a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str| var(key).and_then(|v| v.trim().parse::<usize>().ok());

        let mode = var("TRANSLATE_MODE")
            .unwrap_or_else(|| "api".to_string())
            .to_lowercase();

        let backend = match mode.as_str() {
            "api" => {
                let headers = match var("TRANSLATE_API_HEADERS") {
                    Some(raw) => serde_json::from_str(&raw)
                        .context("TRANSLATE_API_HEADERS must be a JSON object of strings")?,
                    None => BTreeMap::new(),
                };
                BackendSettings::Api {
                    endpoint: var("TRANSLATE_API_ENDPOINT")
                        .context("TRANSLATE_API_ENDPOINT not set")?,
                    headers,
                }
            }
            "openai" => BackendSettings::OpenAi {
                api_key: var("OPENAI_API_KEY").context("OPENAI_API_KEY not set")?,
                base_url: var("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                model: var("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            },
            other => bail!("Unknown TRANSLATE_MODE: '{}' (expected 'api' or 'openai')", other),
        };

        let workers = parsed("MAX_WORKERS").unwrap_or(0);
        let batch_size = parsed("OPENAI_BATCH_SIZE").unwrap_or(1).max(1);

        let strategy = match var("STRATEGY").map(|s| s.to_lowercase()).as_deref() {
            None if mode == "openai" && batch_size > 1 => Strategy::BatchDedup { batch_size },
            None if workers > 0 => Strategy::WorkerPool { workers },
            None | Some("serial") => Strategy::Serial,
            Some("workers") => {
                if workers == 0 {
                    bail!("STRATEGY=workers requires MAX_WORKERS > 0");
                }
                Strategy::WorkerPool { workers }
            }
            Some("batch") => Strategy::BatchDedup { batch_size },
            Some(other) => bail!(
                "Unknown STRATEGY: '{}' (expected 'serial', 'workers' or 'batch')",
                other
            ),
        };

        if matches!(strategy, Strategy::BatchDedup { .. }) && mode != "openai" {
            bail!("Batch strategy requires TRANSLATE_MODE=openai");
        }

        let source_lang_priority: Vec<String> = var("SOURCE_LANG_PRIORITY")
            .unwrap_or_else(|| "en,fr".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if source_lang_priority.is_empty() {
            bail!("SOURCE_LANG_PRIORITY must name at least one language");
        }

        let delay_secs = var("SLEEP_SECONDS")
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|s| s.is_finite() && *s >= 0.0)
            .unwrap_or(0.0);

        Ok(Self {
            elements_dir: PathBuf::from(var("ELEMENTS_DIR").unwrap_or_else(|| "result".to_string())),
            target_lang: var("TARGET_LANG").unwrap_or_else(|| "zh".to_string()),
            backend_target_lang: var("BACKEND_TARGET_LANG")
                .unwrap_or_else(|| "zh-CHS".to_string()),
            source_lang_priority,
            backend,
            timeout: Duration::from_secs(parsed("TIMEOUT_SECONDS").unwrap_or(20) as u64),
            delay: Duration::from_secs_f64(delay_secs),
            max_attempts: parsed("MAX_ATTEMPTS").unwrap_or(1).max(1) as u32,
            strategy,
            cache_file: PathBuf::from(
                var("CACHE_FILE").unwrap_or_else(|| "translate_cache.json".to_string()),
            ),
            cache_save_every: parsed("CACHE_SAVE_EVERY").unwrap_or(10),
        })
    }
}
