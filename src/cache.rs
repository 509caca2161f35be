//! Persistent translation memo shared by every worker of a run.
//!
//! The cache is a flat JSON object mapping source text to translated text.
//! It is loaded once, only ever grows, and is persisted as a whole-file
//! rewrite (temp file + rename) so the file on disk is always parseable.

use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

pub struct TranslationCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
    /// Checkpoint cadence in successful puts; 0 disables automatic snapshots
    save_every: usize,
    puts: AtomicUsize,
    /// Held for the whole rewrite so only one writer touches the file
    writer: Mutex<()>,
}

impl TranslationCache {
    /// Start with an empty cache that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>, save_every: usize) -> Self {
        Self::with_entries(path.into(), HashMap::new(), save_every)
    }

    /// Load the cache file at `path`.
    ///
    /// A missing or corrupt file is not an error: the cache starts empty and
    /// the next snapshot replaces the bad file.
    pub fn load(path: impl Into<PathBuf>, save_every: usize) -> Self {
        let path = path.into();

        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(entries) => {
                    info!("Loaded {} cached translations from {}", entries.len(), path.display());
                    entries
                }
                Err(e) => {
                    warn!("Ignoring unreadable cache file {}: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No cache file at {}, starting empty", path.display());
                HashMap::new()
            }
            Err(e) => {
                warn!("Failed to read cache file {}: {}", path.display(), e);
                HashMap::new()
            }
        };

        Self::with_entries(path, entries, save_every)
    }

    fn with_entries(path: PathBuf, entries: HashMap<String, String>, save_every: usize) -> Self {
        Self {
            path,
            entries: Mutex::new(entries),
            save_every,
            puts: AtomicUsize::new(0),
            writer: Mutex::new(()),
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }

    pub fn get(&self, source: &str) -> Option<String> {
        self.map().get(source).cloned()
    }

    pub fn contains(&self, source: &str) -> bool {
        self.map().contains_key(source)
    }

    pub fn put(&self, source: impl Into<String>, translated: impl Into<String>) {
        self.map().insert(source.into(), translated.into());
    }

    /// Merge a batch of translations under a single lock acquisition.
    pub fn put_many<I>(&self, pairs: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut map = self.map();
        for (source, translated) in pairs {
            map.insert(source, translated);
        }
    }

    /// Rewrite the durable file with the full current contents.
    pub fn snapshot(&self) -> Result<()> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let (json, count) = {
            let map = self.map();
            let sorted: BTreeMap<&String, &String> = map.iter().collect();
            let json = serde_json::to_string_pretty(&sorted)
                .context("Failed to serialize translation cache")?;
            (json, map.len())
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".translate-cache-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        writeln!(tmp, "{}", json).context("Failed to write translation cache")?;
        tmp.as_file()
            .sync_all()
            .context("Failed to flush translation cache")?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace cache file {}", self.path.display()))?;

        debug!("Saved {} cached translations to {}", count, self.path.display());
        Ok(())
    }

    /// Count one successful put and snapshot whenever the count reaches a
    /// multiple of the configured cadence. Returns whether a snapshot ran.
    ///
    /// Call once after each successful put.
    pub fn maybe_snapshot(&self) -> Result<bool> {
        if self.save_every == 0 {
            return Ok(false);
        }

        let count = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
        if count % self.save_every != 0 {
            return Ok(false);
        }

        self.snapshot()?;
        Ok(true)
    }
}

impl std::fmt::Debug for TranslationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationCache")
            .field("path", &self.path)
            .field("entries", &self.len())
            .field("save_every", &self.save_every)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn read_file(path: &Path) -> HashMap<String, String> {
        let raw = std::fs::read_to_string(path).expect("cache file should exist");
        serde_json::from_str(&raw).expect("cache file should be valid JSON")
    }

    #[test]
    fn test_load_missing_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let cache = TranslationCache::load(temp_dir.path().join("missing.json"), 10);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();

        let cache = TranslationCache::load(&path, 10);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_and_put() {
        let temp_dir = TempDir::new().unwrap();
        let cache = TranslationCache::new(temp_dir.path().join("cache.json"), 0);

        assert_eq!(cache.get("Resistor"), None);
        cache.put("Resistor", "电阻");
        assert_eq!(cache.get("Resistor").as_deref(), Some("电阻"));
        assert!(cache.contains("Resistor"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_snapshot_round_trip_preserves_unicode() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");

        let cache = TranslationCache::new(&path, 0);
        cache.put_many(vec![
            ("Switch".to_string(), "开关".to_string()),
            ("Lamp".to_string(), "灯".to_string()),
        ]);
        cache.snapshot().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("开关"), "multi-byte text should not be escaped: {}", raw);
        assert!(raw.find("Lamp").unwrap() < raw.find("Switch").unwrap(), "keys are sorted");

        let reloaded = TranslationCache::load(&path, 0);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("Switch").as_deref(), Some("开关"));
    }

    #[test]
    fn test_snapshot_creates_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("cache.json");

        let cache = TranslationCache::new(&path, 0);
        cache.put("a", "b");
        cache.snapshot().unwrap();

        assert_eq!(read_file(&path).get("a").map(String::as_str), Some("b"));
    }

    #[test]
    fn test_snapshot_replaces_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        std::fs::write(&path, "garbage").unwrap();

        let cache = TranslationCache::load(&path, 0);
        cache.put("a", "b");
        cache.snapshot().unwrap();

        assert_eq!(read_file(&path).len(), 1);
    }

    #[test]
    fn test_maybe_snapshot_every_n_puts() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        let cache = TranslationCache::new(&path, 3);

        for i in 0..2 {
            cache.put(format!("k{}", i), "v");
            assert!(!cache.maybe_snapshot().unwrap());
        }
        assert!(!path.exists());

        cache.put("k2", "v");
        assert!(cache.maybe_snapshot().unwrap());
        assert_eq!(read_file(&path).len(), 3);

        cache.put("k3", "v");
        assert!(!cache.maybe_snapshot().unwrap());
        assert_eq!(read_file(&path).len(), 3, "no rewrite until the next multiple");
    }

    #[test]
    fn test_maybe_snapshot_disabled_with_zero() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        let cache = TranslationCache::new(&path, 0);

        for i in 0..20 {
            cache.put(format!("k{}", i), "v");
            assert!(!cache.maybe_snapshot().unwrap());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_concurrent_puts_and_snapshots() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        let cache = Arc::new(TranslationCache::new(&path, 5));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        cache.put(format!("{}-{}", t, i), format!("v{}", i));
                        cache.maybe_snapshot().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 200);
        cache.snapshot().unwrap();
        assert_eq!(read_file(&path).len(), 200);
    }
}
