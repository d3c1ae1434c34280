//! In-memory symbol and call-graph database for one project (spec.md §4.2).
//!
//! All public operations acquire a single writer lock around the full set of
//! four collections, so readers never see a partial update across views
//! (spec.md §3: "Invariants... removal of a filename removes every record
//! with that filename from all four collections and rebuilds the positional
//! indices so they remain dense and valid").

use std::collections::HashMap;

use mcs_parser::{CallSite, ContextTag, Method, ModuleVar};
use parking_lot::RwLock;
use regex::Regex;

/// One method plus the file/module it was parsed from (spec.md §3: "methods").
#[derive(Debug, Clone)]
pub struct MethodEntry {
    pub method: Method,
    pub filename: String,
    pub module_name: String,
}

/// One recorded call site, with enough context to resolve references
/// (spec.md §3: "calls").
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub filename: String,
    pub line: usize,
    pub column: usize,
    pub enclosing_method_name: Option<String>,
    pub module_name: String,
}

/// Metadata about a source file treated as one module (spec.md §3: "modules").
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub filename: String,
    pub module_name: String,
    pub module_type: String,
    pub parent_type: Option<String>,
}

/// Structured query over the method collection (spec.md §9: "a structured
/// query type... not a loose map"). Every field is an independent predicate;
/// all present predicates must match (conjunction).
#[derive(Debug, Clone, Default)]
pub struct MethodQuery {
    /// Exact (case-insensitive) name match, unless `name_is_regex`.
    pub name: Option<String>,
    /// When set, `name` is matched as a case-insensitive regex instead of an
    /// exact lookup (spec.md §4.2: "an explicit 'regex' escape shape").
    pub name_is_regex: bool,
    pub module: Option<String>,
    pub is_exported: Option<bool>,
    pub context: Option<ContextTag>,
    pub is_procedure: Option<bool>,
}

#[derive(Default)]
struct CacheInner {
    methods: Vec<MethodEntry>,
    /// lowercased method name -> positions in `methods`.
    name_index: HashMap<String, Vec<usize>>,
    /// lowercased module name -> positions in `methods`.
    module_index: HashMap<String, Vec<usize>>,
    /// positions in `methods` whose method is exported.
    exported: std::collections::HashSet<usize>,
    module_vars: HashMap<String, Vec<ModuleVar>>,
    calls: HashMap<String, Vec<CallRecord>>,
    modules: Vec<ModuleInfo>,
}

impl CacheInner {
    fn push_method(&mut self, entry: MethodEntry) {
        let pos = self.methods.len();
        let lname = entry.method.name.to_lowercase();
        let lmodule = entry.module_name.to_lowercase();
        if entry.method.is_exported {
            self.exported.insert(pos);
        }
        self.name_index.entry(lname).or_default().push(pos);
        self.module_index.entry(lmodule).or_default().push(pos);
        self.methods.push(entry);
    }

    fn push_call(&mut self, name: &str, record: CallRecord) {
        self.calls.entry(name.to_string()).or_default().push(record);
    }

    /// Rebuild `name_index`, `module_index`, and `exported` from scratch
    /// against the current contents of `methods`. Called after any removal
    /// so every index entry stays a valid position (spec.md §4.2 Invariant).
    fn rebuild_indices(&mut self) {
        self.name_index.clear();
        self.module_index.clear();
        self.exported.clear();
        for (pos, entry) in self.methods.iter().enumerate() {
            self.name_index
                .entry(entry.method.name.to_lowercase())
                .or_default()
                .push(pos);
            self.module_index
                .entry(entry.module_name.to_lowercase())
                .or_default()
                .push(pos);
            if entry.method.is_exported {
                self.exported.insert(pos);
            }
        }
    }

    fn remove_file(&mut self, filename: &str) {
        // Remove in reverse order so earlier positions stay valid for the
        // duration of this loop (spec.md §4.2: "remove... in reverse order
        // so positions stay consistent").
        for pos in (0..self.methods.len()).rev() {
            if self.methods[pos].filename == filename {
                self.methods.remove(pos);
            }
        }
        self.rebuild_indices();

        for records in self.calls.values_mut() {
            records.retain(|r| r.filename != filename);
        }
        self.calls.retain(|_, records| !records.is_empty());

        self.module_vars.remove(filename);
        self.modules.retain(|m| m.filename != filename);
    }
}

/// Thread-safe symbol and call-graph store for one project.
///
/// A single `RwLock` guards every collection together: writers take the full
/// write lock so a reader never observes methods without their indices, or
/// an index pointing past the end of `methods` (spec.md §4.2).
pub struct SymbolCache {
    inner: RwLock<CacheInner>,
}

impl Default for SymbolCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
        }
    }

    pub fn add_method(&self, method: Method, filename: &str, module_name: &str) {
        let mut inner = self.inner.write();
        Self::add_method_locked(&mut inner, method, filename, module_name);
    }

    fn add_method_locked(inner: &mut CacheInner, method: Method, filename: &str, module_name: &str) {
        let calls = method.calls.clone();
        let method_name = method.name.clone();
        let entry = MethodEntry {
            method,
            filename: filename.to_string(),
            module_name: module_name.to_string(),
        };
        inner.push_method(entry);
        for call in calls {
            Self::add_call_locked(inner, &call, filename, Some(method_name.clone()), module_name);
        }
    }

    pub fn add_module_var(&self, filename: &str, var: ModuleVar) {
        let mut inner = self.inner.write();
        inner.module_vars.entry(filename.to_string()).or_default().push(var);
    }

    pub fn add_call(&self, call: &CallSite, filename: &str, enclosing_method_name: Option<String>, module_name: &str) {
        let mut inner = self.inner.write();
        Self::add_call_locked(&mut inner, call, filename, enclosing_method_name, module_name);
    }

    fn add_call_locked(
        inner: &mut CacheInner,
        call: &CallSite,
        filename: &str,
        enclosing_method_name: Option<String>,
        module_name: &str,
    ) {
        let record = CallRecord {
            filename: filename.to_string(),
            line: call.line,
            column: call.column,
            enclosing_method_name,
            module_name: module_name.to_string(),
        };
        inner.push_call(&call.name, record);
    }

    pub fn add_module(&self, info: ModuleInfo) {
        let mut inner = self.inner.write();
        inner.modules.push(info);
    }

    /// One file's worth of parsed declarations, module variables, and
    /// module-scope calls, inserted under a single lock acquisition
    /// (spec.md §4.2: "add_*_batch: same, amortised under a single lock
    /// acquisition").
    pub fn add_file_batch(
        &self,
        filename: &str,
        module_name: &str,
        module_info: ModuleInfo,
        parsed: &mcs_parser::ParseResult,
    ) {
        let mut inner = self.inner.write();
        for method in &parsed.methods {
            Self::add_method_locked(&mut inner, method.clone(), filename, module_name);
        }
        for var in &parsed.module_vars {
            inner
                .module_vars
                .entry(filename.to_string())
                .or_default()
                .push(var.clone());
        }
        for call in &parsed.module_calls {
            Self::add_call_locked(&mut inner, call, filename, None, module_name);
        }
        inner.modules.push(module_info);
    }

    /// Intersect index sets for predicates that have one (name, module),
    /// then linear-filter the residual for predicates without an index
    /// (context, kind, is_exported) (spec.md §4.2).
    pub fn find_methods(&self, query: &MethodQuery) -> Vec<MethodEntry> {
        let inner = self.inner.read();

        let mut candidates: Option<Vec<usize>> = None;

        if let Some(name) = &query.name {
            let positions = if query.name_is_regex {
                match Regex::new(&format!("(?i){name}")) {
                    Ok(re) => inner
                        .methods
                        .iter()
                        .enumerate()
                        .filter(|(_, e)| re.is_match(&e.method.name))
                        .map(|(pos, _)| pos)
                        .collect(),
                    Err(_) => Vec::new(),
                }
            } else {
                inner
                    .name_index
                    .get(&name.to_lowercase())
                    .cloned()
                    .unwrap_or_default()
            };
            candidates = Some(intersect_or_set(candidates, positions));
        }

        if let Some(module) = &query.module {
            let positions = inner
                .module_index
                .get(&module.to_lowercase())
                .cloned()
                .unwrap_or_default();
            candidates = Some(intersect_or_set(candidates, positions));
        }

        let base: Vec<usize> = candidates.unwrap_or_else(|| (0..inner.methods.len()).collect());

        base.into_iter()
            .filter(|pos| {
                let entry = &inner.methods[*pos];
                if let Some(exported) = query.is_exported {
                    if entry.method.is_exported != exported {
                        return false;
                    }
                }
                if let Some(context) = query.context {
                    if entry.method.context != Some(context) {
                        return false;
                    }
                }
                if let Some(is_procedure) = query.is_procedure {
                    let actual = entry.method.kind == mcs_parser::MethodKind::Procedure;
                    if actual != is_procedure {
                        return false;
                    }
                }
                true
            })
            .map(|pos| inner.methods[pos].clone())
            .collect()
    }

    pub fn find_exported_methods(&self) -> Vec<MethodEntry> {
        let inner = self.inner.read();
        inner
            .exported
            .iter()
            .map(|&pos| inner.methods[pos].clone())
            .collect()
    }

    /// Exact lookup in the call map; returns a copy (spec.md §4.2).
    pub fn find_calls(&self, call_name: &str) -> Vec<CallRecord> {
        let inner = self.inner.read();
        inner.calls.get(call_name).cloned().unwrap_or_default()
    }

    pub fn module_vars(&self, filename: &str) -> Vec<ModuleVar> {
        let inner = self.inner.read();
        inner.module_vars.get(filename).cloned().unwrap_or_default()
    }

    pub fn modules(&self) -> Vec<ModuleInfo> {
        self.inner.read().modules.clone()
    }

    /// Remove every record referencing `filename` from all four collections
    /// and rebuild the positional indices (spec.md §4.2). Idempotent: a
    /// second call on an already-removed filename is a no-op.
    pub fn remove_file_data(&self, filename: &str) {
        let mut inner = self.inner.write();
        inner.remove_file(filename);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        *inner = CacheInner::default();
    }

    pub fn get_stats(&self) -> mcs_protocol::BslCacheCounts {
        let inner = self.inner.read();
        mcs_protocol::BslCacheCounts {
            methods: inner.methods.len(),
            exported_methods: inner.exported.len(),
            module_vars: inner.module_vars.values().map(|v| v.len()).sum(),
            calls: inner.calls.values().map(|v| v.len()).sum(),
            unique_calls: inner.calls.len(),
            modules: inner.modules.len(),
        }
    }

    pub fn method_count(&self) -> usize {
        self.inner.read().methods.len()
    }
}

fn intersect_or_set(existing: Option<Vec<usize>>, next: Vec<usize>) -> Vec<usize> {
    match existing {
        None => next,
        Some(existing) => {
            let set: std::collections::HashSet<usize> = next.into_iter().collect();
            existing.into_iter().filter(|p| set.contains(p)).collect()
        }
    }
}
