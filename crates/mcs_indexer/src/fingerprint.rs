//! Persistent file_path -> (content_hash, parsed_artifact) cache (spec.md §4.3).
//!
//! Two maps exist side by side: the "raw" cache (the parser's direct output,
//! keyed by content hash, consulted to decide whether a file needs
//! re-parsing) and the document-symbols cache (a richer, query-service-facing
//! artifact derived from the same parse). Both carry a dirty flag so `save`
//! is a no-op when nothing changed, except at shutdown.

use std::collections::HashMap;
use std::path::Path;

use mcs_parser::{Method, ModuleVar, ParseResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One symbol-tree node as served by the Query Service (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolNode {
    pub name: String,
    pub kind: &'static str,
    pub start_line: usize,
    pub end_line: usize,
    pub is_exported: bool,
}

/// The rich, per-file artifact the Query Service reads directly (spec.md
/// §4.4 step 3: "immediately converted into the rich document-symbols
/// artifact keyed by file path and content hash").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSymbols {
    pub filename: String,
    pub module_name: String,
    pub symbols: Vec<SymbolNode>,
}

impl DocumentSymbols {
    pub fn from_parse(filename: &str, module_name: &str, parsed: &ParseResult) -> Self {
        let symbols = parsed
            .methods
            .iter()
            .map(|m: &Method| SymbolNode {
                name: m.name.clone(),
                kind: match m.kind {
                    mcs_parser::MethodKind::Procedure => "procedure",
                    mcs_parser::MethodKind::Function => "function",
                },
                start_line: m.start_line,
                end_line: m.end_line,
                is_exported: m.is_exported,
            })
            .collect();
        DocumentSymbols {
            filename: filename.to_string(),
            module_name: module_name.to_string(),
            symbols,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawEntry {
    hash: String,
    parsed: ParseResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocEntry {
    hash: String,
    doc: DocumentSymbols,
}

#[derive(Default, Serialize, Deserialize)]
struct RawCacheFile {
    entries: HashMap<String, RawEntry>,
}

#[derive(Default, Serialize, Deserialize)]
struct DocCacheFile {
    entries: HashMap<String, DocEntry>,
}

struct Inner {
    raw: HashMap<String, RawEntry>,
    doc: HashMap<String, DocEntry>,
    raw_dirty: bool,
    doc_dirty: bool,
}

/// Persisted fingerprint/document-symbols cache for one project.
pub struct FingerprintStore {
    inner: Mutex<Inner>,
}

impl FingerprintStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                raw: HashMap::new(),
                doc: HashMap::new(),
                raw_dirty: false,
                doc_dirty: false,
            }),
        }
    }

    /// Load from disk at the project's managed-subdirectory cache paths.
    /// Missing or corrupt files are treated as an empty cache — a fresh
    /// worker with no prior run behaves the same as one whose cache was lost.
    pub fn load(project_path: &Path) -> Self {
        let raw = std::fs::read_to_string(mcs_protocol::paths::raw_cache_path(project_path))
            .ok()
            .and_then(|s| serde_json::from_str::<RawCacheFile>(&s).ok())
            .map(|f| f.entries)
            .unwrap_or_default();
        let doc = std::fs::read_to_string(mcs_protocol::paths::fingerprint_cache_path(project_path))
            .ok()
            .and_then(|s| serde_json::from_str::<DocCacheFile>(&s).ok())
            .map(|f| f.entries)
            .unwrap_or_default();
        Self {
            inner: Mutex::new(Inner {
                raw,
                doc,
                raw_dirty: false,
                doc_dirty: false,
            }),
        }
    }

    /// `None` if the file has never been indexed; `Some(hash)` otherwise.
    pub fn cached_hash(&self, filename: &str) -> Option<String> {
        self.inner.lock().raw.get(filename).map(|e| e.hash.clone())
    }

    pub fn is_unchanged(&self, filename: &str, hash: &str) -> bool {
        self.cached_hash(filename).as_deref() == Some(hash)
    }

    pub fn record(&self, filename: &str, hash: &str, parsed: ParseResult, module_name: &str) {
        let doc = DocumentSymbols::from_parse(filename, module_name, &parsed);
        let mut inner = self.inner.lock();
        inner.raw.insert(
            filename.to_string(),
            RawEntry {
                hash: hash.to_string(),
                parsed,
            },
        );
        inner.doc.insert(
            filename.to_string(),
            DocEntry {
                hash: hash.to_string(),
                doc,
            },
        );
        inner.raw_dirty = true;
        inner.doc_dirty = true;
    }

    pub fn remove(&self, filename: &str) {
        let mut inner = self.inner.lock();
        if inner.raw.remove(filename).is_some() {
            inner.raw_dirty = true;
        }
        if inner.doc.remove(filename).is_some() {
            inner.doc_dirty = true;
        }
    }

    pub fn document_symbols(&self, filename: &str) -> Option<DocumentSymbols> {
        self.inner.lock().doc.get(filename).map(|e| e.doc.clone())
    }

    pub fn all_document_symbols(&self) -> HashMap<String, DocumentSymbols> {
        self.inner
            .lock()
            .doc
            .iter()
            .map(|(k, v)| (k.clone(), v.doc.clone()))
            .collect()
    }

    pub fn module_vars(&self, filename: &str) -> Vec<ModuleVar> {
        self.inner
            .lock()
            .raw
            .get(filename)
            .map(|e| e.parsed.module_vars.clone())
            .unwrap_or_default()
    }

    /// Every cached filename, used to detect files removed from disk
    /// (spec.md §4.4 step 4).
    pub fn cached_filenames(&self) -> Vec<String> {
        self.inner.lock().raw.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        let inner = self.inner.lock();
        inner.raw_dirty || inner.doc_dirty
    }

    /// Persist both caches to disk if either is dirty. A no-op when neither
    /// is dirty, `force` bypasses that check (spec.md §4.3: "must not be
    /// attempted if the dirty flag is clear (except at shutdown)").
    pub fn save(&self, project_path: &Path, force: bool) -> std::io::Result<()> {
        let mut inner = self.inner.lock();
        if !force && !inner.raw_dirty && !inner.doc_dirty {
            return Ok(());
        }

        let managed_dir = mcs_protocol::paths::project_managed_dir(project_path);
        std::fs::create_dir_all(&managed_dir)?;

        if force || inner.raw_dirty {
            let file = RawCacheFile {
                entries: inner.raw.clone(),
            };
            let json = serde_json::to_string(&file)?;
            std::fs::write(mcs_protocol::paths::raw_cache_path(project_path), json)?;
            inner.raw_dirty = false;
        }

        if force || inner.doc_dirty {
            let file = DocCacheFile {
                entries: inner.doc.clone(),
            };
            let json = serde_json::to_string(&file)?;
            std::fs::write(mcs_protocol::paths::fingerprint_cache_path(project_path), json)?;
            inner.doc_dirty = false;
        }

        Ok(())
    }
}

impl Default for FingerprintStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_parse() -> ParseResult {
        let mut parsed = ParseResult::default();
        parsed.methods.push(Method {
            name: "Foo".to_string(),
            start_line: 0,
            end_line: 2,
            kind: mcs_parser::MethodKind::Procedure,
            is_exported: true,
            params: Vec::new(),
            context: None,
            docstring: String::new(),
            calls: Vec::new(),
        });
        parsed
    }

    #[test]
    fn round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let store = FingerprintStore::new();
        store.record("a.bsl", "hash1", sample_parse(), "ModuleA");
        store.save(dir.path(), false).unwrap();

        let reloaded = FingerprintStore::load(dir.path());
        assert_eq!(reloaded.cached_hash("a.bsl").as_deref(), Some("hash1"));
        assert!(reloaded.document_symbols("a.bsl").is_some());
        assert!(!reloaded.is_dirty());
    }

    #[test]
    fn save_is_noop_when_not_dirty() {
        let dir = tempdir().unwrap();
        let store = FingerprintStore::new();
        store.record("a.bsl", "hash1", sample_parse(), "ModuleA");
        store.save(dir.path(), false).unwrap();
        assert!(!store.is_dirty());

        // Touch the on-disk file's mtime detection indirectly: remove it and
        // confirm a non-forced save does not recreate it (nothing is dirty).
        std::fs::remove_file(mcs_protocol::paths::raw_cache_path(dir.path())).unwrap();
        store.save(dir.path(), false).unwrap();
        assert!(!mcs_protocol::paths::raw_cache_path(dir.path()).exists());

        store.save(dir.path(), true).unwrap();
        assert!(mcs_protocol::paths::raw_cache_path(dir.path()).exists());
    }

    #[test]
    fn is_unchanged_detects_matching_hash() {
        let store = FingerprintStore::new();
        store.record("a.bsl", "hash1", sample_parse(), "ModuleA");
        assert!(store.is_unchanged("a.bsl", "hash1"));
        assert!(!store.is_unchanged("a.bsl", "hash2"));
        assert!(!store.is_unchanged("missing.bsl", "hash1"));
    }

    #[test]
    fn remove_clears_both_caches() {
        let store = FingerprintStore::new();
        store.record("a.bsl", "hash1", sample_parse(), "ModuleA");
        store.remove("a.bsl");
        assert!(store.cached_hash("a.bsl").is_none());
        assert!(store.document_symbols("a.bsl").is_none());
    }
}
