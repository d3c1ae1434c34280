use std::sync::OnceLock;

use regex::Regex;

use crate::keywords::is_keyword;
use crate::types::{CallSite, ContextTag, Method, MethodKind, ModuleVar, Param, ParseResult};

const IDENT: &str = r"[а-яёА-ЯЁ\w]+";

fn proc_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?im)^\s*(?:&Насервере|&Наклиенте|&Насерверебезконтекста)?\s*(?:Экспорт\s+)?Процедура\s+({IDENT})\s*\("
        ))
        .expect("static regex")
    })
}

fn func_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?im)^\s*(?:&Насервере|&Наклиенте|&Насерверебезконтекста)?\s*(?:Экспорт\s+)?Функция\s+({IDENT})\s*\("
        ))
        .expect("static regex")
    })
}

fn proc_end_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*КонецПроцедуры").expect("static regex"))
}

fn func_end_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*КонецФункции").expect("static regex"))
}

fn context_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)&(НаСервере|НаКлиенте|НаСервереБезКонтекста)").expect("static regex")
    })
}

fn export_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bЭкспорт\b").expect("static regex"))
}

fn param_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)(?:Знач\s+)?({IDENT})(?:\s*=\s*([^,)]+))?")).expect("static regex")
    })
}

fn module_var_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?im)^\s*Перем\s+({IDENT})(?:\s+Экспорт)?\s*;"
        ))
        .expect("static regex")
    })
}

fn call_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"(?i)\b({IDENT})\s*\(")).expect("static regex"))
}

/// Parse one source file's declarations, module variables, and call sites
/// (spec.md §4.1: "Shallow Parser").
///
/// Pure and total: malformed input (unterminated declarations, stray `КонецФункции`,
/// no trailing newline, an all-comment file, an empty file) never panics — it just
/// yields a smaller or empty [`ParseResult`].
pub fn parse(source: &str) -> ParseResult {
    let lines: Vec<&str> = source.split('\n').collect();

    let module_vars = parse_module_vars(source, &lines);
    let mut methods = parse_methods(source, &lines);
    let module_calls = parse_module_calls(&lines, &methods);

    for method in &mut methods {
        method.calls = parse_method_calls(&lines, method);
    }

    ParseResult {
        methods,
        module_vars,
        module_calls,
    }
}

fn line_of_byte_offset(source: &str, offset: usize) -> usize {
    source[..offset].bytes().filter(|&b| b == b'\n').count()
}

fn parse_module_vars(source: &str, lines: &[&str]) -> Vec<ModuleVar> {
    let mut vars: Vec<ModuleVar> = Vec::new();

    for caps in module_var_pattern().captures_iter(source) {
        let whole = caps.get(0).expect("group 0 always present");
        let name = caps.get(1).expect("group 1 required by pattern").as_str().to_string();
        let var_line = line_of_byte_offset(source, whole.start());
        let text = whole.as_str();
        let is_exported = text.to_lowercase().contains("экспорт");
        let docstring = extract_description_before(lines, var_line);

        let var = ModuleVar {
            name: name.clone(),
            is_exported,
            docstring,
        };
        if let Some(existing) = vars.iter_mut().find(|v| v.name == name) {
            *existing = var;
        } else {
            vars.push(var);
        }
    }

    vars
}

fn parse_methods(source: &str, lines: &[&str]) -> Vec<Method> {
    let mut methods: Vec<Method> = Vec::new();

    for m in proc_pattern().captures_iter(source) {
        if let Some(method) = parse_method_from_match(source, lines, &m, MethodKind::Procedure) {
            methods.push(method);
        }
    }
    for m in func_pattern().captures_iter(source) {
        if let Some(method) = parse_method_from_match(source, lines, &m, MethodKind::Function) {
            methods.push(method);
        }
    }

    methods.sort_by_key(|m| m.start_line);
    methods
}

fn parse_method_from_match(
    source: &str,
    lines: &[&str],
    caps: &regex::Captures<'_>,
    kind: MethodKind,
) -> Option<Method> {
    let whole = caps.get(0)?;
    let name = caps.get(1)?.as_str().to_string();
    let start_pos = whole.start();
    let mut start_line = line_of_byte_offset(source, start_pos);

    for offset in 0..3 {
        let check_line = start_line + offset;
        if check_line >= lines.len() {
            break;
        }
        let line_text = lines[check_line];
        if line_text.contains(&name) && (line_text.contains("Процедура") || line_text.contains("Функция")) {
            start_line = check_line;
            break;
        }
    }

    let declaration_line = lines.get(start_line).copied().unwrap_or("");
    let context = extract_context(declaration_line);
    let is_exported = export_pattern().is_match(declaration_line);
    let params = extract_params(source, start_pos, lines, start_line);
    let end_line = find_method_end(lines, start_line, kind)?;
    let docstring = extract_description_before(lines, start_line);

    Some(Method {
        name,
        start_line,
        end_line,
        kind,
        is_exported,
        params,
        context,
        docstring,
        calls: Vec::new(),
    })
}

fn extract_context(line: &str) -> Option<ContextTag> {
    let caps = context_pattern().captures(line)?;
    match caps.get(1)?.as_str().to_lowercase().as_str() {
        "насервере" => Some(ContextTag::Server),
        "наклиенте" => Some(ContextTag::Client),
        "насерверебезконтекста" => Some(ContextTag::ServerNoContext),
        _ => None,
    }
}

fn extract_params(source: &str, start_pos: usize, lines: &[&str], start_line: usize) -> Vec<Param> {
    let declaration_line = lines.get(start_line).copied().unwrap_or("");

    let Some(paren_start) = declaration_line.find('(') else {
        return Vec::new();
    };

    let params_text: String = match declaration_line[paren_start + 1..].find(')') {
        Some(rel_end) => declaration_line[paren_start + 1..paren_start + 1 + rel_end].to_string(),
        None => {
            let search_start = start_pos + paren_start + 1;
            match source[search_start..].find(')') {
                Some(rel_end) => source[search_start..search_start + rel_end].to_string(),
                None => return Vec::new(),
            }
        }
    };

    if params_text.trim().is_empty() {
        return Vec::new();
    }

    let mut params = Vec::new();
    for caps in param_pattern().captures_iter(&params_text) {
        let Some(name_match) = caps.get(1) else {
            continue;
        };
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or("");
        let by_value = whole.to_lowercase().contains("знач");
        let default = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty());

        params.push(Param {
            name: name_match.as_str().to_string(),
            by_value,
            default,
        });
    }
    params
}

fn find_method_end(lines: &[&str], start_line: usize, kind: MethodKind) -> Option<usize> {
    let end_re = match kind {
        MethodKind::Procedure => proc_end_pattern(),
        MethodKind::Function => func_end_pattern(),
    };

    let mut depth = 1i32;
    for (i, line) in lines.iter().enumerate().skip(start_line + 1) {
        let nested = proc_pattern()
            .find(line)
            .or_else(|| func_pattern().find(line));
        if let Some(m) = nested {
            if m.start() == line.len() - line.trim_start().len() {
                depth += 1;
                continue;
            }
        }
        if end_re.is_match(line) {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

fn extract_description_before(lines: &[&str], line_num: usize) -> String {
    let mut collected: Vec<String> = Vec::new();
    let start = line_num.saturating_sub(20);

    for line in &lines[start..line_num] {
        let trimmed = line.trim();
        if collected.is_empty() && trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("//") {
            collected.push(rest.trim().to_string());
        } else if trimmed.contains("/*") {
            if let (Some(open), Some(close)) = (trimmed.find("/*"), trimmed.find("*/")) {
                let comment = trimmed[open + 2..close].trim();
                if !comment.is_empty() {
                    collected.push(comment.to_string());
                }
            }
        } else if !trimmed.is_empty() {
            break;
        }
    }

    collected.reverse();
    collected.join("\n").trim().to_string()
}

fn parse_module_calls(lines: &[&str], methods: &[Method]) -> Vec<CallSite> {
    let mut method_lines: std::collections::HashSet<usize> = std::collections::HashSet::new();
    for method in methods {
        for ln in method.start_line..=method.end_line {
            method_lines.insert(ln);
        }
    }

    let mut calls = Vec::new();
    for (line_num, line) in lines.iter().enumerate() {
        if method_lines.contains(&line_num) {
            continue;
        }
        for caps in call_pattern().captures_iter(line) {
            let Some(whole) = caps.get(0) else { continue };
            let name = caps.get(1).expect("group 1 required by pattern").as_str();
            if is_keyword(name) {
                continue;
            }
            calls.push(CallSite {
                name: name.to_string(),
                line: line_num,
                column: whole.start(),
            });
        }
    }
    calls
}

fn parse_method_calls(lines: &[&str], method: &Method) -> Vec<CallSite> {
    let mut calls = Vec::new();
    for line_num in method.start_line..=method.end_line {
        let Some(line) = lines.get(line_num) else {
            break;
        };
        for caps in call_pattern().captures_iter(line) {
            let Some(whole) = caps.get(0) else { continue };
            let name = caps.get(1).expect("group 1 required by pattern").as_str();
            if is_keyword(name) {
                continue;
            }
            if name == method.name {
                continue;
            }
            calls.push(CallSite {
                name: name.to_string(),
                line: line_num,
                column: whole.start(),
            });
        }
    }
    calls
}
