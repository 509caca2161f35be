use anyhow::Result;
use chrono::Local;
use elmt_localizer::{corpus, Backend, Config, Pipeline, TranslationCache};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (optional)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("elmt_localizer=info".parse()?),
        )
        .init();

    info!("Element name localizer");
    info!("Start time: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));

    let config = Config::from_env()?;

    info!("Scanning {}", config.elements_dir.display());
    let documents = corpus::collect_documents(&config.elements_dir)?;
    info!("Found {} files to process", documents.len());

    let cache = Arc::new(TranslationCache::load(
        &config.cache_file,
        config.cache_save_every,
    ));
    let backend = Backend::from_config(&config)?;
    let pipeline = Pipeline::from_config(&config, backend, cache)?;

    let summary = pipeline.run(&documents).await?;

    info!("✓ Completed!");
    info!("  Total files processed: {}", summary.processed);
    info!("  Files updated: {}", summary.updated);
    if summary.failed > 0 {
        info!("  Files failed: {}", summary.failed);
    }
    info!(
        "  Backend calls: {} ({} failed)",
        summary.backend_calls, summary.backend_failures
    );
    info!(
        "  Cache hits/misses: {}/{}",
        summary.cache_hits, summary.cache_misses
    );
    info!("  Time elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    info!("  End time: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    info!(
        "  Cache file: {} ({} entries)",
        summary.cache_path.display(),
        summary.cache_entries
    );

    Ok(())
}
