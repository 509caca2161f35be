//! Scan binary - reports what a localization run would do, without any network calls
//!
//! Usage:
//!   cargo run --bin scan
//!
//! Optional environment variables:
//! - ELEMENTS_DIR (defaults to result)
//! - TARGET_LANG (defaults to zh)
//! - SOURCE_LANG_PRIORITY (defaults to en,fr)
//! - CACHE_FILE (defaults to translate_cache.json)

use anyhow::Result;
use elmt_localizer::{corpus, names, TranslationCache};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;

/// Minimal config for scanning (no backend required)
struct ScanConfig {
    elements_dir: PathBuf,
    target_lang: String,
    source_lang_priority: Vec<String>,
    cache_file: PathBuf,
}

impl ScanConfig {
    fn from_env() -> Self {
        Self {
            elements_dir: PathBuf::from(
                std::env::var("ELEMENTS_DIR").unwrap_or_else(|_| "result".to_string()),
            ),
            target_lang: std::env::var("TARGET_LANG").unwrap_or_else(|_| "zh".to_string()),
            source_lang_priority: std::env::var("SOURCE_LANG_PRIORITY")
                .unwrap_or_else(|_| "en,fr".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            cache_file: PathBuf::from(
                std::env::var("CACHE_FILE").unwrap_or_else(|_| "translate_cache.json".to_string()),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("scan=info".parse()?),
        )
        .init();

    let config = ScanConfig::from_env();
    let documents = corpus::collect_documents(&config.elements_dir)?;
    let cache = TranslationCache::load(&config.cache_file, 0);

    let mut pending = 0usize;
    let mut localized = 0usize;
    let mut texts: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for path in &documents {
        let content = corpus::read_document(path).await?;
        if names::entry_text(&content, &config.target_lang).is_some() {
            localized += 1;
            continue;
        }
        if let Some(source) =
            names::extract_source_text(&content, &config.target_lang, &config.source_lang_priority)
        {
            pending += 1;
            if seen.insert(source.clone()) {
                texts.push(source);
            }
        }
    }

    let cached = texts.iter().filter(|t| cache.contains(t)).count();

    info!("Documents found:           {}", documents.len());
    info!("Already localized ({}):    {}", config.target_lang, localized);
    info!("Needing localization:      {}", pending);
    info!("Distinct source texts:     {}", texts.len());
    info!("  already cached:          {}", cached);
    info!("  to translate:            {}", texts.len() - cached);

    Ok(())
}
