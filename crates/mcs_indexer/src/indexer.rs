//! Walks a project directory, hashes and schedules parsing, and coordinates
//! updates to the Symbol Cache and Fingerprint Store (spec.md §4.4).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use ignore::WalkBuilder;
use mcs_protocol::hashing::fingerprint;
use mcs_protocol::BslCacheCounts;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::fingerprint::DocumentSymbols;
use crate::symbol_cache::{ModuleInfo, SymbolCache};
use crate::FingerprintStore;

/// Conventional directories never walked into (spec.md §4.4 step 1).
const IGNORED_DIR_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".vscode",
    ".idea",
    "node_modules",
    "target",
    "dist",
    "build",
    mcs_protocol::defaults::PROJECT_MANAGED_SUBDIR,
];

/// File extensions recognised as source files for this language family
/// (spec.md §9 Open Question: fixed for now, not user-configurable).
const SOURCE_EXTENSIONS: &[&str] = &["bsl", "os"];

pub struct IndexerConfig {
    pub concurrency: usize,
    pub parse_timeout: Duration,
    pub watchdog_stall: Duration,
    pub save_every_n_files: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            concurrency: mcs_protocol::defaults::DEFAULT_PARSE_CONCURRENCY,
            parse_timeout: Duration::from_secs(mcs_protocol::defaults::PARSE_TIMEOUT_SECS),
            watchdog_stall: Duration::from_secs(mcs_protocol::defaults::WATCHDOG_STALL_SECS),
            save_every_n_files: mcs_protocol::defaults::SAVE_EVERY_N_FILES,
        }
    }
}

/// Outcome of one indexing run.
#[derive(Debug, Default, Clone)]
pub struct IndexRunStats {
    pub scanned: usize,
    pub parsed: usize,
    pub skipped_unchanged: usize,
    pub failed: usize,
    pub removed: usize,
}

pub struct ProjectIndexer {
    project_path: PathBuf,
    language: String,
    cache: Arc<SymbolCache>,
    fingerprints: Arc<FingerprintStore>,
    config: IndexerConfig,
    /// Files converted to the document-symbols artifact so far this process
    /// lifetime (spec.md §4.4: "the indexer's converted-set tracker").
    converted: Mutex<HashSet<String>>,
}

impl ProjectIndexer {
    pub fn new(project_path: PathBuf, language: impl Into<String>, config: IndexerConfig) -> Self {
        let fingerprints = Arc::new(FingerprintStore::load(&project_path));
        let converted = Mutex::new(fingerprints.cached_filenames().into_iter().collect());
        Self {
            project_path,
            language: language.into(),
            cache: Arc::new(SymbolCache::new()),
            fingerprints,
            config,
            converted,
        }
    }

    pub fn cache(&self) -> Arc<SymbolCache> {
        Arc::clone(&self.cache)
    }

    pub fn fingerprints(&self) -> Arc<FingerprintStore> {
        Arc::clone(&self.fingerprints)
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    fn walk_source_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let walker = WalkBuilder::new(&self.project_path)
            .hidden(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .filter_entry(|entry| {
                if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
                    let name = entry.file_name().to_string_lossy();
                    return !IGNORED_DIR_NAMES.contains(&name.as_ref());
                }
                true
            })
            .build();

        for result in walker {
            let Ok(entry) = result else { continue };
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            let has_source_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| SOURCE_EXTENSIONS.iter().any(|s| s.eq_ignore_ascii_case(ext)))
                .unwrap_or(false);
            if has_source_ext {
                files.push(path.to_path_buf());
            }
        }
        files
    }

    fn module_name_for(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned())
    }

    fn rel_key(&self, path: &Path) -> String {
        path.strip_prefix(&self.project_path)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Run a full indexing pass: walk, hash-compare, parse changed files in
    /// a bounded worker pool, reconcile deletions, then persist (spec.md
    /// §4.4).
    pub async fn run(&self) -> IndexRunStats {
        let files = self.walk_source_files();
        let total = files.len();
        let mut stats = IndexRunStats {
            scanned: total,
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let progress = Arc::new(AtomicUsize::new(0));
        let last_progress_instant = Arc::new(Mutex::new(Instant::now()));
        let stall_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let watchdog_stall = self.config.watchdog_stall;
        let watchdog_progress = Arc::clone(&last_progress_instant);
        let watchdog_flag = Arc::clone(&stall_flag);
        let watchdog = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(5)).await;
                if watchdog_flag.load(Ordering::Relaxed) {
                    return;
                }
                let elapsed = watchdog_progress.lock().elapsed();
                if elapsed >= watchdog_stall {
                    warn!("indexer watchdog: no progress for {:?}", elapsed);
                }
            }
        });

        let mut handles = Vec::with_capacity(total);
        let seen_this_run: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

        for path in files {
            let permit = Arc::clone(&semaphore);
            let fingerprints = Arc::clone(&self.fingerprints);
            let cache = Arc::clone(&self.cache);
            let key = self.rel_key(&path);
            let module_name = Self::module_name_for(&path);
            let cached_hash = self.fingerprints.cached_hash(&key);
            let parse_timeout = self.config.parse_timeout;
            let progress = Arc::clone(&progress);
            let last_progress_instant = Arc::clone(&last_progress_instant);
            let seen_this_run = Arc::clone(&seen_this_run);

            seen_this_run.lock().insert(key.clone());

            let handle = tokio::spawn(async move {
                let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                let outcome = tokio::time::timeout(
                    parse_timeout,
                    tokio::task::spawn_blocking(move || parse_one_file(&path, &key, &module_name, cached_hash)),
                )
                .await;

                progress.fetch_add(1, Ordering::Relaxed);
                *last_progress_instant.lock() = Instant::now();

                match outcome {
                    Ok(Ok(Ok(FileParseOutcome::Parsed { key, module_name, hash, parsed }))) => {
                        let module_info = ModuleInfo {
                            filename: key.clone(),
                            module_name: module_name.clone(),
                            module_type: "module".to_string(),
                            parent_type: None,
                        };
                        cache.remove_file_data(&key);
                        cache.add_file_batch(&key, &module_name, module_info, &parsed);
                        fingerprints.record(&key, &hash, parsed, &module_name);
                        FileOutcome::Parsed
                    }
                    Ok(Ok(Ok(FileParseOutcome::Unchanged))) => FileOutcome::Skipped,
                    Ok(Ok(Err(err))) => {
                        debug!("parse failed: {err}");
                        FileOutcome::Failed
                    }
                    Ok(Err(join_err)) => {
                        debug!("parse task panicked: {join_err}");
                        FileOutcome::Failed
                    }
                    Err(_timeout) => FileOutcome::Failed,
                }
            });
            handles.push(handle);
        }

        let report_every = (total / 20).max(1).min(50).max(1);
        let mut completed = 0usize;
        for handle in handles {
            let outcome = handle.await.unwrap_or(FileOutcome::Failed);
            match outcome {
                FileOutcome::Parsed => stats.parsed += 1,
                FileOutcome::Skipped => stats.skipped_unchanged += 1,
                FileOutcome::Failed => stats.failed += 1,
            }
            completed += 1;
            if completed % report_every == 0 || completed == total {
                info!("indexing progress: {completed}/{total}");
            }
        }

        stall_flag.store(true, Ordering::Relaxed);
        watchdog.abort();

        // Step 4: files present in the fingerprint cache but absent from
        // this run's walk are gone from disk; drop them everywhere.
        let seen = seen_this_run.lock();
        let stale: Vec<String> = self
            .fingerprints
            .cached_filenames()
            .into_iter()
            .filter(|f| !seen.contains(f))
            .collect();
        drop(seen);
        for filename in &stale {
            self.cache.remove_file_data(filename);
            self.fingerprints.remove(filename);
            self.converted.lock().remove(filename);
        }
        stats.removed = stale.len();

        for key in seen_this_run.lock().iter() {
            self.converted.lock().insert(key.clone());
        }

        self.save(false);
        stats
    }

    /// Direct file-edit operation: write already happened on disk, now
    /// invalidate every cache for this file and re-parse synchronously
    /// (spec.md §4.4: "Incremental editing").
    pub fn reindex_file_sync(&self, path: &Path) -> Result<(), std::io::Error> {
        let key = self.rel_key(path);
        self.cache.remove_file_data(&key);
        self.fingerprints.remove(&key);
        self.converted.lock().remove(&key);

        let content = std::fs::read_to_string(path)?;
        let hash = fingerprint(&content);
        let parsed = mcs_parser::parse(&content);
        let module_name = Self::module_name_for(path);

        let module_info = ModuleInfo {
            filename: key.clone(),
            module_name: module_name.clone(),
            module_type: "module".to_string(),
            parent_type: None,
        };
        self.cache.add_file_batch(&key, &module_name, module_info, &parsed);
        self.fingerprints.record(&key, &hash, parsed, &module_name);
        self.converted.lock().insert(key);
        self.save(false);
        Ok(())
    }

    pub fn save(&self, force: bool) {
        if let Err(err) = self.fingerprints.save(&self.project_path, force) {
            warn!("failed to persist fingerprint cache: {err}");
        }
        if let Err(err) = self.write_cache_stats() {
            warn!("failed to persist cache stats: {err}");
        }
    }

    fn write_cache_stats(&self) -> std::io::Result<()> {
        let bsl = self.cache.get_stats();
        // spec.md §4.3: when the in-memory cache is empty (a fresh restart
        // with no file changes) but a previous stats file with non-zero
        // counts exists, preserve it — the stats reflect the persisted
        // cache, not a transiently empty in-memory one.
        let stats_path = mcs_protocol::paths::cache_stats_path(&self.project_path);
        let bsl = if bsl.methods == 0 {
            self.previous_stats_if_nonzero(&stats_path).unwrap_or(bsl)
        } else {
            bsl
        };

        let stats = mcs_protocol::CacheStats {
            indexed_files: self.fingerprints.len() as u64,
            language: self.language.clone(),
            last_updated: Utc::now(),
            bsl,
        };
        let managed_dir = mcs_protocol::paths::project_managed_dir(&self.project_path);
        std::fs::create_dir_all(&managed_dir)?;
        let json = serde_json::to_string_pretty(&stats)?;
        std::fs::write(stats_path, json)
    }

    fn previous_stats_if_nonzero(&self, path: &Path) -> Option<BslCacheCounts> {
        let text = std::fs::read_to_string(path).ok()?;
        let previous: mcs_protocol::CacheStats = serde_json::from_str(&text).ok()?;
        if previous.bsl.methods > 0 {
            Some(previous.bsl)
        } else {
            None
        }
    }

    pub fn document_symbols(&self, filename: &str) -> Option<DocumentSymbols> {
        self.fingerprints.document_symbols(filename)
    }

    pub fn all_document_symbols(&self) -> std::collections::HashMap<String, DocumentSymbols> {
        self.fingerprints.all_document_symbols()
    }
}

enum FileOutcome {
    Parsed,
    Skipped,
    Failed,
}

enum FileParseOutcome {
    Parsed {
        key: String,
        module_name: String,
        hash: String,
        parsed: mcs_parser::ParseResult,
    },
    Unchanged,
}

/// Hash-then-maybe-parse one file. Consults `cached_hash` before parsing so
/// an unchanged file costs one read plus one hash, never a parse (spec.md
/// §4.4 step 2, §8 "Incremental reindex" law).
fn parse_one_file(
    path: &Path,
    key: &str,
    module_name: &str,
    cached_hash: Option<String>,
) -> std::io::Result<FileParseOutcome> {
    let content = std::fs::read_to_string(path)?;
    let hash = fingerprint(&content);
    if cached_hash.as_deref() == Some(hash.as_str()) {
        return Ok(FileParseOutcome::Unchanged);
    }
    let parsed = mcs_parser::parse(&content);
    Ok(FileParseOutcome::Parsed {
        key: key.to_string(),
        module_name: module_name.to_string(),
        hash,
        parsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn initial_run_parses_every_source_file() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "a.bsl",
            "Процедура Фу() Экспорт\nКонецПроцедуры\n",
        );
        write(dir.path(), "ignored.txt", "not source");
        write(dir.path(), "target/generated.bsl", "Процедура ДолженБытьПропущен()\nКонецПроцедуры\n");

        let indexer = ProjectIndexer::new(dir.path().to_path_buf(), "bsl", IndexerConfig::default());
        let stats = indexer.run().await;
        assert_eq!(stats.scanned, 1);
        assert_eq!(stats.parsed, 1);
        assert_eq!(indexer.cache.method_count(), 1);
    }

    #[tokio::test]
    async fn second_run_with_no_changes_skips_everything() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.bsl", "Процедура Фу()\nКонецПроцедуры\n");

        let indexer = ProjectIndexer::new(dir.path().to_path_buf(), "bsl", IndexerConfig::default());
        indexer.run().await;

        let indexer2 = ProjectIndexer::new(dir.path().to_path_buf(), "bsl", IndexerConfig::default());
        let stats = indexer2.run().await;
        assert_eq!(stats.parsed, 0);
        assert_eq!(stats.skipped_unchanged, 1);
    }

    #[tokio::test]
    async fn deleting_a_file_then_reindexing_removes_its_records() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.bsl", "Процедура Фу()\nКонецПроцедуры\n");
        write(dir.path(), "b.bsl", "Процедура Бар()\nКонецПроцедуры\n");

        let indexer = ProjectIndexer::new(dir.path().to_path_buf(), "bsl", IndexerConfig::default());
        indexer.run().await;
        assert_eq!(indexer.cache.method_count(), 2);

        std::fs::remove_file(dir.path().join("a.bsl")).unwrap();

        let indexer2 = ProjectIndexer::new(dir.path().to_path_buf(), "bsl", IndexerConfig::default());
        let stats = indexer2.run().await;
        assert_eq!(stats.removed, 1);
        assert_eq!(indexer2.cache.method_count(), 1);
    }
}
