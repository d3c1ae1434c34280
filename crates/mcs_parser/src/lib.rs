//! Shallow, regex-based declaration parser.
//!
//! No semantic analysis, no AST, no dependency resolution — just enough
//! structure (declarations, parameters, context directives, call sites) to
//! drive the symbol cache's queries (spec.md §4.1, §4.2).

mod keywords;
mod parser;
mod types;

pub use parser::parse;
pub use types::{CallSite, ContextTag, Method, MethodKind, ModuleVar, Param, ParseResult};
