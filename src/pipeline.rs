//! Drives extraction, translation and rewriting across the whole corpus.
//!
//! Three strategies share the same building blocks:
//!
//! - `Serial`: one document at a time; the first error stops the run.
//! - `WorkerPool`: up to N documents in flight; a failing document is logged
//!   and counted, the others carry on. Two documents with the same uncached
//!   text may both reach the backend before either result is stored.
//! - `BatchDedup`: collect every distinct uncached text first, translate them
//!   in batches (checkpointing the cache after each), then rewrite documents.
//!   A failed batch stops the run.
//!
//! Whatever the outcome, the cache is saved once more before `run` returns.

use crate::backend::Backend;
use crate::cache::TranslationCache;
use crate::config::{Config, Strategy};
use crate::corpus;
use crate::error::BackendError;
use crate::names;
use crate::stats::RunStats;
use anyhow::{bail, Context, Result};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub processed: usize,
    pub updated: usize,
    pub failed: usize,
    pub backend_calls: usize,
    pub backend_failures: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub elapsed: Duration,
    pub cache_path: PathBuf,
    pub cache_entries: usize,
}

pub struct Pipeline {
    target_lang: String,
    source_lang_priority: Vec<String>,
    strategy: Strategy,
    backend: Backend,
    cache: Arc<TranslationCache>,
}

impl Pipeline {
    pub fn new(
        target_lang: impl Into<String>,
        source_lang_priority: Vec<String>,
        strategy: Strategy,
        backend: Backend,
        cache: Arc<TranslationCache>,
    ) -> Result<Self> {
        match strategy {
            Strategy::BatchDedup { batch_size } => {
                if backend.as_batched().is_none() {
                    bail!("Batch strategy requires the openai backend, got '{}'", backend.name());
                }
                if batch_size == 0 {
                    bail!("Batch size must be at least 1");
                }
            }
            Strategy::WorkerPool { workers } if workers == 0 => {
                bail!("Worker pool needs at least one worker");
            }
            _ => {}
        }

        Ok(Self {
            target_lang: target_lang.into(),
            source_lang_priority,
            strategy,
            backend,
            cache,
        })
    }

    pub fn from_config(config: &Config, backend: Backend, cache: Arc<TranslationCache>) -> Result<Self> {
        Self::new(
            config.target_lang.clone(),
            config.source_lang_priority.clone(),
            config.strategy,
            backend,
            cache,
        )
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    /// Localize every document, then save the cache.
    pub async fn run(&self, documents: &[PathBuf]) -> Result<RunSummary> {
        let stats = RunStats::new(documents.len());

        info!(
            "Processing {} documents with {:?} strategy ({} backend)",
            documents.len(),
            self.strategy,
            self.backend.name()
        );

        let outcome = match self.strategy {
            Strategy::Serial => self.run_serial(documents, &stats).await,
            Strategy::WorkerPool { workers } => self.run_pool(documents, workers, &stats).await,
            Strategy::BatchDedup { batch_size } => {
                self.run_batched(documents, batch_size, &stats).await
            }
        };

        let saved = self.cache.snapshot();
        match (outcome, saved) {
            (Err(e), saved) => {
                if let Err(save_error) = saved {
                    error!("Failed to save translation cache: {:#}", save_error);
                }
                return Err(e);
            }
            (Ok(()), Err(save_error)) => return Err(save_error),
            (Ok(()), Ok(())) => {}
        }

        Ok(RunSummary {
            processed: stats.processed(),
            updated: stats.updated(),
            failed: stats.failed(),
            backend_calls: stats.backend_calls(),
            backend_failures: stats.backend_failures(),
            cache_hits: stats.cache_hits(),
            cache_misses: stats.cache_misses(),
            elapsed: stats.elapsed(),
            cache_path: self.cache.path().to_path_buf(),
            cache_entries: self.cache.len(),
        })
    }

    async fn run_serial(&self, documents: &[PathBuf], stats: &RunStats) -> Result<()> {
        for path in documents {
            match self.localize_document(path, stats).await {
                Ok(updated) => stats.record_document(updated),
                Err(e) => {
                    stats.record_failure();
                    return Err(e);
                }
            }
            report_progress(stats);
        }
        Ok(())
    }

    async fn run_pool(&self, documents: &[PathBuf], workers: usize, stats: &RunStats) -> Result<()> {
        let mut completions = stream::iter(documents)
            .map(|path| async move { (path, self.localize_document(path, stats).await) })
            .buffer_unordered(workers);

        while let Some((path, result)) = completions.next().await {
            match result {
                Ok(updated) => stats.record_document(updated),
                Err(e) => {
                    stats.record_failure();
                    error!("Error processing {}: {:#}", path.display(), e);
                }
            }
            report_progress(stats);
        }

        if stats.failed() > 0 {
            warn!("{} documents failed", stats.failed());
        }
        Ok(())
    }

    async fn run_batched(&self, documents: &[PathBuf], batch_size: usize, stats: &RunStats) -> Result<()> {
        let chat = self
            .backend
            .as_batched()
            .context("Batch strategy requires the openai backend")?;

        // Pass 1: source text per document, distinct uncached texts in first-seen order
        let mut tasks: Vec<(&Path, String)> = Vec::new();
        let mut missing: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for path in documents {
            let content = corpus::read_document(path).await?;
            let Some(source) = self.extract(&content) else {
                stats.record_document(false);
                report_progress(stats);
                continue;
            };

            if self.cache.contains(&source) {
                stats.record_cache_hit();
            } else if seen.insert(source.clone()) {
                stats.record_cache_miss();
                missing.push(source.clone());
            }
            tasks.push((path.as_path(), source));
        }

        info!(
            "Collected {} documents to localize, {} new texts to translate",
            tasks.len(),
            missing.len()
        );

        // Pass 2: translate in batches, checkpoint after each
        let total_batches = missing.len().div_ceil(batch_size);
        for (index, batch) in missing.chunks(batch_size).enumerate() {
            info!(
                "Translating batch {}/{} ({} texts)",
                index + 1,
                total_batches,
                batch.len()
            );

            stats.record_backend_call();
            let translations = match chat.translate_many(batch).await {
                Ok(translations) => translations,
                Err(e) => {
                    stats.record_backend_failure();
                    return Err(e).with_context(|| {
                        format!("Batch {}/{} failed", index + 1, total_batches)
                    });
                }
            };

            let (kept, empty): (Vec<_>, Vec<_>) = batch
                .iter()
                .cloned()
                .zip(translations)
                .partition(|(_, translated)| !translated.is_empty());
            if !empty.is_empty() {
                warn!("Backend returned {} empty translations in batch {}", empty.len(), index + 1);
            }

            self.cache.put_many(kept);
            self.cache.snapshot()?;
            info!(
                "Batch {}/{} done, {} translations cached",
                index + 1,
                total_batches,
                self.cache.len()
            );
        }

        // Pass 3: apply cached translations
        for (path, source) in tasks {
            let Some(translated) = self.cache.get(&source) else {
                debug!("No translation for {:?}, skipping {}", source, path.display());
                stats.record_document(false);
                report_progress(stats);
                continue;
            };

            let original = corpus::read_document(path).await?;
            let (updated, changed) = names::insert_entry(&original, &self.target_lang, &translated);
            if changed {
                corpus::write_document(path, &updated).await?;
            }
            stats.record_document(changed);
            report_progress(stats);
        }

        Ok(())
    }

    fn extract(&self, content: &str) -> Option<String> {
        names::extract_source_text(content, &self.target_lang, &self.source_lang_priority)
    }

    /// Read, translate and rewrite one document. Returns whether it changed.
    async fn localize_document(&self, path: &Path, stats: &RunStats) -> Result<bool> {
        let original = corpus::read_document(path).await?;

        let Some(source) = self.extract(&original) else {
            return Ok(false);
        };

        let translated = self
            .resolve(&source, stats)
            .await
            .with_context(|| format!("Failed to translate {}", path.display()))?;

        let (updated, changed) = names::insert_entry(&original, &self.target_lang, &translated);
        if !changed {
            return Ok(false);
        }

        corpus::write_document(path, &updated).await?;
        Ok(true)
    }

    /// Cached translation of `source`, calling the backend on a miss.
    async fn resolve(&self, source: &str, stats: &RunStats) -> Result<String, BackendError> {
        if let Some(hit) = self.cache.get(source) {
            stats.record_cache_hit();
            return Ok(hit);
        }
        stats.record_cache_miss();

        stats.record_backend_call();
        let translated = match self.backend.translate(source).await {
            Ok(translated) => translated,
            Err(e) => {
                stats.record_backend_failure();
                return Err(e);
            }
        };

        self.cache.put(source, translated.as_str());
        if let Err(e) = self.cache.maybe_snapshot() {
            warn!("Cache checkpoint failed: {:#}", e);
        }
        Ok(translated)
    }
}

/// Documents between progress lines at info level.
const PROGRESS_LOG_EVERY: usize = 50;

fn report_progress(stats: &RunStats) {
    let report = stats.progress();
    if is_progress_milestone(report.processed, report.total) {
        info!("Progress: {}", report);
    } else {
        debug!("Progress: {}", report);
    }
}

fn is_progress_milestone(processed: usize, total: usize) -> bool {
    processed == total || processed % PROGRESS_LOG_EVERY == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ApiBackend, ChatBackend};
    use tempfile::TempDir;

    fn api_backend() -> Backend {
        Backend::SingleItem(
            ApiBackend::new("http://localhost:1/translate", "zh-CHS", Duration::from_secs(1)).unwrap(),
        )
    }

    fn chat_backend() -> Backend {
        Backend::Batched(
            ChatBackend::new("http://localhost:1/v1", "key", "model", "zh-CHS", Duration::from_secs(1))
                .unwrap(),
        )
    }

    fn cache(dir: &TempDir) -> Arc<TranslationCache> {
        Arc::new(TranslationCache::new(dir.path().join("cache.json"), 0))
    }

    fn priority() -> Vec<String> {
        vec!["en".to_string(), "fr".to_string()]
    }

    #[test]
    fn test_batch_strategy_requires_batched_backend() {
        let dir = TempDir::new().unwrap();
        let result = Pipeline::new(
            "zh",
            priority(),
            Strategy::BatchDedup { batch_size: 10 },
            api_backend(),
            cache(&dir),
        );
        assert!(result.is_err());

        let result = Pipeline::new(
            "zh",
            priority(),
            Strategy::BatchDedup { batch_size: 10 },
            chat_backend(),
            cache(&dir),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let dir = TempDir::new().unwrap();
        let result = Pipeline::new(
            "zh",
            priority(),
            Strategy::WorkerPool { workers: 0 },
            api_backend(),
            cache(&dir),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_progress_milestones() {
        assert!(is_progress_milestone(PROGRESS_LOG_EVERY, 1000));
        assert!(is_progress_milestone(PROGRESS_LOG_EVERY * 3, 1000));
        assert!(is_progress_milestone(7, 7));
        assert!(!is_progress_milestone(1, 1000));
        assert!(!is_progress_milestone(PROGRESS_LOG_EVERY + 1, 1000));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_backend() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        cache.put("Lamp", "灯");

        // The backend points at a closed port, so any call would fail
        let pipeline = Pipeline::new("zh", priority(), Strategy::Serial, api_backend(), cache).unwrap();
        let stats = RunStats::new(1);

        assert_eq!(pipeline.resolve("Lamp", &stats).await.unwrap(), "灯");
        assert_eq!(stats.cache_hits(), 1);
        assert_eq!(stats.backend_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_corpus_still_saves_cache() {
        let dir = TempDir::new().unwrap();
        let cache = cache(&dir);
        let pipeline =
            Pipeline::new("zh", priority(), Strategy::Serial, api_backend(), Arc::clone(&cache)).unwrap();

        let summary = pipeline.run(&[]).await.unwrap();

        assert_eq!(summary.processed, 0);
        assert!(cache.path().exists());
    }
}
