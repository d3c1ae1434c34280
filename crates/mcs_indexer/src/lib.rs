//! Per-project symbol cache, fingerprint store, incremental project
//! indexer, and query service (spec.md §4.2–§4.5).

pub mod fingerprint;
pub mod indexer;
pub mod query;
pub mod symbol_cache;

pub use fingerprint::{DocumentSymbols, FingerprintStore, SymbolNode};
pub use indexer::{IndexRunStats, IndexerConfig, ProjectIndexer};
pub use query::{Location, QueryService, TextEdit, TreeNode, WorkspaceEdit};
pub use symbol_cache::{CallRecord, MethodEntry, MethodQuery, ModuleInfo, SymbolCache};
