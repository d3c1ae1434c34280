use serde::{Deserialize, Serialize};

use crate::registration::{Transport, WorkerStatusRecord};

/// `POST /admin/servers` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct AddServerRequest {
    pub path: String,
    pub transport: Option<Transport>,
    pub host: Option<String>,
    pub context: Option<String>,
    #[serde(default)]
    pub modes: Vec<String>,
    pub log_level: Option<String>,
}

/// `GET /admin/servers` response: a snapshot of every managed worker.
#[derive(Debug, Clone, Serialize)]
pub struct ServersResponse {
    pub servers: Vec<WorkerStatusRecord>,
}

/// `GET /admin/system` response.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatsResponse {
    pub memory: SystemMemoryInfo,
    pub cpu_count: Option<usize>,
    pub load_average: Option<[f64; 3]>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemMemoryInfo {
    pub total_mb: Option<f64>,
    pub available_mb: Option<f64>,
    pub used_mb: Option<f64>,
}

/// `GET /admin/servers/{name}/stats` response (spec.md §3, §6).
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatsResponse {
    pub memory_tree_rss_mb: Option<f64>,
    #[serde(flatten)]
    pub cache: CacheStatsSource,
}

/// Either the persisted cache statistics file, or a filesystem walk fallback,
/// tagged by `source` (spec.md §4.3: "the stats reflect the persisted cache").
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum CacheStatsSource {
    Cache(CacheStats),
    Filesystem { indexed_files: u64 },
}

/// `<project>/.mcs/cache_stats.json` (spec.md §3, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub indexed_files: u64,
    pub language: String,
    pub last_updated: chrono::DateTime<chrono::Utc>,
    pub bsl: BslCacheCounts,
}

/// The `bsl` block of the cache statistics file — field names match the
/// original indexer's `get_stats()` (see SPEC_FULL.md §C).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BslCacheCounts {
    pub methods: usize,
    pub exported_methods: usize,
    pub module_vars: usize,
    pub calls: usize,
    pub unique_calls: usize,
    pub modules: usize,
}

/// `GET /admin/available-projects` response.
#[derive(Debug, Clone, Serialize)]
pub struct AvailableProjectsResponse {
    pub paths: Vec<String>,
}

/// `GET /admin/servers/{name}/logs` response.
#[derive(Debug, Clone, Serialize)]
pub struct LogTailResponse {
    pub lines: Vec<String>,
}

/// Structured error body returned by every admin handler on failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
