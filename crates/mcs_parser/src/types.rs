use serde::{Deserialize, Serialize};

/// Procedure vs function (spec.md §3: `kind ∈ {procedure, function}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodKind {
    Procedure,
    Function,
}

/// A declaration's context directive (`@server`, `@client`, `@server-no-context`
/// in spec.md's language-neutral phrasing; `&НаСервере` etc. in BSL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextTag {
    Server,
    Client,
    ServerNoContext,
}

/// One formal parameter of a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    /// `true` if preceded by the by-value marker (`Знач`).
    pub by_value: bool,
    /// Textual default-value expression, if any, verbatim up to the next comma/paren.
    pub default: Option<String>,
}

/// A textual occurrence of `identifier(`, excluding the fixed keyword set
/// (spec.md GLOSSARY: "Call site").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub name: String,
    /// 0-based line number.
    pub line: usize,
    /// 0-based column (character offset within the line).
    pub column: usize,
}

/// One parsed procedure or function (spec.md §3: "Methods").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    /// 0-based start line (the declaration line).
    pub start_line: usize,
    /// 0-based end line (the matching end-of-procedure/end-of-function line).
    pub end_line: usize,
    pub kind: MethodKind,
    pub is_exported: bool,
    pub params: Vec<Param>,
    pub context: Option<ContextTag>,
    /// Contiguous `//`/`/* */` comment lines immediately preceding the
    /// declaration, in forward (source) order.
    pub docstring: String,
    /// Call sites found within `[start_line, end_line]`, excluding
    /// self-recursive calls to this method's own name.
    pub calls: Vec<CallSite>,
}

/// A module-scope variable declaration (`Перем <name> [Экспорт];`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleVar {
    pub name: String,
    pub is_exported: bool,
    pub docstring: String,
}

/// The full parse of one source file (spec.md §3: "Shallow Parse Result").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseResult {
    /// Ordered by start line (ascending), as the original parser sorts them.
    pub methods: Vec<Method>,
    pub module_vars: Vec<ModuleVar>,
    /// Call sites outside of any method body.
    pub module_calls: Vec<CallSite>,
}
