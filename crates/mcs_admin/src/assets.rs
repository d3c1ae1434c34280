//! Bundled static UI (spec.md §1: "the web UI assets (static HTML)" are an
//! external collaborator; SPEC_FULL.md §C: embedded via `include_str!`).

pub const INDEX_HTML: &str = include_str!("../assets/index.html");
