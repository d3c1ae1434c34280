//! Serves symbol-tree / references / rename queries from the cache
//! (spec.md §4.5).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::fingerprint::{DocumentSymbols, SymbolNode};
use crate::indexer::ProjectIndexer;
use crate::symbol_cache::MethodQuery;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeNode {
    Package {
        name: String,
        path: String,
        parent_path: Option<String>,
        children: Vec<TreeNode>,
    },
    File {
        name: String,
        path: String,
        parent_path: Option<String>,
        symbols: Vec<SymbolNode>,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Location {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextEdit {
    pub file: String,
    pub line: usize,
    pub column: usize,
    pub length: usize,
    pub new_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceEdit {
    pub edits: Vec<TextEdit>,
}

const IDENT_CHARS_EXTRA: char = '_';

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == IDENT_CHARS_EXTRA
}

/// Answers symbol-tree, references, and rename queries for one project,
/// reading from the indexer's caches (falling back to live parsing when the
/// cache is empty, per spec.md §4.5).
pub struct QueryService {
    indexer: Arc<ProjectIndexer>,
}

impl QueryService {
    pub fn new(indexer: Arc<ProjectIndexer>) -> Self {
        Self { indexer }
    }

    /// Cached document symbols for exactly one file, or a live parse if the
    /// cache has nothing for it yet.
    pub fn file_symbols(&self, filename: &str) -> Option<DocumentSymbols> {
        if let Some(doc) = self.indexer.document_symbols(filename) {
            return Some(doc);
        }
        self.live_parse_file(filename)
    }

    fn live_parse_file(&self, filename: &str) -> Option<DocumentSymbols> {
        let full = self.indexer.project_path().join(filename);
        let content = std::fs::read_to_string(full).ok()?;
        let parsed = mcs_parser::parse(&content);
        let module_name = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());
        Some(DocumentSymbols::from_parse(filename, &module_name, &parsed))
    }

    /// Synthetic File/Package hierarchy under `root` (spec.md §4.5: "Symbol
    /// tree"). `root` is relative to the project directory (`""` for the
    /// whole project).
    pub fn directory_tree(&self, root: &str) -> TreeNode {
        let all = self.indexer.all_document_symbols();
        let prefix = normalize_dir_prefix(root);

        let mut under_root: Vec<DocumentSymbols> = all
            .into_values()
            .filter(|doc| doc.filename.starts_with(&prefix))
            .collect();
        under_root.sort_by(|a, b| a.filename.cmp(&b.filename));

        if under_root.is_empty() {
            return self.live_directory_tree(root);
        }

        build_tree(root, under_root)
    }

    fn live_directory_tree(&self, root: &str) -> TreeNode {
        let full_root = self.indexer.project_path().join(root);
        let mut docs = Vec::new();
        if full_root.is_dir() {
            let walker = ignore::WalkBuilder::new(&full_root).hidden(false).build();
            for entry in walker.flatten() {
                if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                    continue;
                }
                let rel = entry
                    .path()
                    .strip_prefix(self.indexer.project_path())
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                if let Some(doc) = self.live_parse_file(&rel) {
                    docs.push(doc);
                }
            }
        }
        docs.sort_by(|a, b| a.filename.cmp(&b.filename));
        build_tree(root, docs)
    }

    /// Resolve the symbol name at `(file, line, column)`: first by walking
    /// cached document symbols for a containing range, then by a
    /// character-class identifier scan (spec.md §4.5: "References").
    pub fn symbol_at(&self, filename: &str, line: usize, column: usize) -> Option<String> {
        if let Some(doc) = self.file_symbols(filename) {
            for symbol in &doc.symbols {
                if line >= symbol.start_line && line <= symbol.end_line {
                    return Some(symbol.name.clone());
                }
            }
        }
        let full = self.indexer.project_path().join(filename);
        let content = std::fs::read_to_string(full).ok()?;
        let text_line = content.lines().nth(line)?;
        identifier_at(text_line, column).map(|(name, _, _)| name)
    }

    /// All non-defining call sites of the symbol at `(file, line, column)`,
    /// mapped to source [`Location`]s by re-reading the source on demand
    /// (spec.md §4.5: "References").
    pub fn find_references(&self, filename: &str, line: usize, column: usize) -> Vec<Location> {
        let Some(name) = self.symbol_at(filename, line, column) else {
            return Vec::new();
        };
        let records = self.indexer.cache().find_calls(&name);

        records
            .into_iter()
            .filter(|r| !(r.filename == filename && r.line == line))
            .filter_map(|r| self.locate_symbol(&r.filename, r.line, r.column, &name))
            .collect()
    }

    /// A workspace edit renaming every site of the symbol at `(file, line,
    /// column)` to `new_name`: the declaration plus every call site. `None`
    /// if no sites are found at all (spec.md §4.5: "Rename").
    pub fn rename_symbol_edit(
        &self,
        filename: &str,
        line: usize,
        column: usize,
        new_name: &str,
    ) -> Option<WorkspaceEdit> {
        let name = self.symbol_at(filename, line, column)?;

        let declaration = self
            .indexer
            .cache()
            .find_methods(&MethodQuery {
                name: Some(name.clone()),
                ..Default::default()
            })
            .into_iter()
            .find(|entry| entry.filename == filename && entry.method.start_line == line);

        let mut edits = Vec::new();
        if let Some(entry) = &declaration {
            if let Some(decl_loc) = self.locate_symbol(filename, entry.method.start_line, 0, &name) {
                edits.push(TextEdit {
                    file: decl_loc.file,
                    line: decl_loc.line,
                    column: decl_loc.column,
                    length: decl_loc.length,
                    new_text: new_name.to_string(),
                });
            }
        }

        let references = self.find_references(filename, line, column);
        for reference in &references {
            edits.push(TextEdit {
                file: reference.file.clone(),
                line: reference.line,
                column: reference.column,
                length: reference.length,
                new_text: new_name.to_string(),
            });
        }

        if edits.is_empty() {
            None
        } else {
            Some(WorkspaceEdit { edits })
        }
    }

    fn locate_symbol(&self, filename: &str, line: usize, hint_column: usize, name: &str) -> Option<Location> {
        let full = self.indexer.project_path().join(filename);
        let content = std::fs::read_to_string(full).ok()?;
        let text_line = content.lines().nth(line)?;

        // Case-sensitive match against the cached call name (spec.md §4.5).
        let column = text_line[hint_column.min(text_line.len())..]
            .find(name)
            .map(|offset| hint_column + offset)
            .or_else(|| text_line.find(name))?;

        Some(Location {
            file: filename.to_string(),
            line,
            column,
            length: name.chars().count(),
        })
    }
}

fn identifier_at(line: &str, column: usize) -> Option<(String, usize, usize)> {
    let chars: Vec<char> = line.chars().collect();
    if column >= chars.len() || !is_ident_char(chars[column]) {
        return None;
    }
    let mut start = column;
    while start > 0 && is_ident_char(chars[start - 1]) {
        start -= 1;
    }
    let mut end = column;
    while end + 1 < chars.len() && is_ident_char(chars[end + 1]) {
        end += 1;
    }
    let name: String = chars[start..=end].iter().collect();
    Some((name, start, end - start + 1))
}

fn normalize_dir_prefix(root: &str) -> String {
    if root.is_empty() {
        String::new()
    } else {
        format!("{}/", root.trim_end_matches('/'))
    }
}

fn build_tree(root: &str, docs: Vec<DocumentSymbols>) -> TreeNode {
    let root_path = root.trim_end_matches('/').to_string();

    let file_nodes: Vec<(String, TreeNode)> = docs
        .into_iter()
        .map(|doc| {
            let dir = parent_dir(&doc.filename);
            let name = PathBuf::from(&doc.filename)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| doc.filename.clone());
            let node = TreeNode::File {
                name,
                path: doc.filename.clone(),
                parent_path: Some(dir.clone()),
                symbols: doc.symbols,
            };
            (dir, node)
        })
        .collect();

    let mut packages: std::collections::BTreeMap<String, Vec<TreeNode>> = std::collections::BTreeMap::new();
    for (dir, node) in file_nodes {
        packages.entry(dir).or_default().push(node);
    }

    // Fold deepest directories up into their parent packages until we reach `root_path`.
    let mut dirs: Vec<String> = packages.keys().cloned().collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count()));

    let mut assembled: std::collections::HashMap<String, Vec<TreeNode>> = packages.clone();
    for dir in &dirs {
        if dir == &root_path {
            continue;
        }
        let children = assembled.remove(dir).unwrap_or_default();
        let parent = parent_dir(dir);
        let package_node = TreeNode::Package {
            name: PathBuf::from(dir)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| dir.clone()),
            path: dir.clone(),
            parent_path: Some(parent.clone()),
            children,
        };
        assembled.entry(parent).or_default().push(package_node);
    }

    let root_children = assembled.remove(&root_path).unwrap_or_default();
    TreeNode::Package {
        name: PathBuf::from(&root_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| root_path.clone()),
        path: root_path,
        parent_path: None,
        children: root_children,
    }
}

fn parent_dir(filename: &str) -> String {
    match filename.rfind('/') {
        Some(idx) => filename[..idx].to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::IndexerConfig;
    use tempfile::tempdir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[tokio::test]
    async fn find_references_locates_calls_and_excludes_declaration() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "a.bsl",
            "Процедура Общая() Экспорт\nКонецПроцедуры\n\nПроцедура Вызывающая()\n\tОбщая();\nКонецПроцедуры\n",
        );
        write(
            dir.path(),
            "b.bsl",
            "Процедура ТожеВызывает()\n\tОбщая();\nКонецПроцедуры\n",
        );

        let indexer = Arc::new(ProjectIndexer::new(dir.path().to_path_buf(), "bsl", IndexerConfig::default()));
        indexer.run().await;

        let service = QueryService::new(Arc::clone(&indexer));
        let refs = service.find_references("a.bsl", 0, 11);
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().any(|r| r.file == "a.bsl" && r.line == 4));
        assert!(refs.iter().any(|r| r.file == "b.bsl" && r.line == 1));
    }

    #[tokio::test]
    async fn rename_produces_one_edit_per_declaration_and_call_site() {
        let dir = tempdir().unwrap();
        write(
            dir.path(),
            "a.bsl",
            "Процедура Старое() Экспорт\nКонецПроцедуры\n\nПроцедура Т()\n\tСтарое();\nКонецПроцедуры\n",
        );

        let indexer = Arc::new(ProjectIndexer::new(dir.path().to_path_buf(), "bsl", IndexerConfig::default()));
        indexer.run().await;
        let service = QueryService::new(Arc::clone(&indexer));

        let edit = service.rename_symbol_edit("a.bsl", 0, 11, "Новое").unwrap();
        assert_eq!(edit.edits.len(), 2);
        for e in &edit.edits {
            assert_eq!(e.new_text, "Новое");
        }
    }

    #[tokio::test]
    async fn rename_with_no_sites_returns_none() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.bsl", "Перем Х;\n");
        let indexer = Arc::new(ProjectIndexer::new(dir.path().to_path_buf(), "bsl", IndexerConfig::default()));
        indexer.run().await;
        let service = QueryService::new(indexer);
        assert!(service.rename_symbol_edit("a.bsl", 0, 6, "Y").is_none());
    }

    #[test]
    fn identifier_at_extends_across_full_token() {
        let (name, start, len) = identifier_at("  Общая()", 2).unwrap();
        assert_eq!(name, "Общая");
        assert_eq!(start, 2);
        assert_eq!(len, 5);
    }
}
