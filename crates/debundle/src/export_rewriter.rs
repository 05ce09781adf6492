//! Rewrites the bundle's export registrations into `export` syntax
//!
//! Registrations name an external symbol and a getter returning a local
//! expression. The local is classified by scanning the body for a top-level
//! declaration of the same name, with class taking precedence over function
//! and function over variable. Class and function declarations are exported
//! in place; everything else gets an `export { ... };` clause appended after
//! the body, in the order the registrations were found.

use std::ops::Range;

use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::{Regex, escape};

use crate::{
    runtime_patterns::RuntimePatterns,
    syntax::{
        apply_edits, is_identifier, is_identifier_char, matching_close, split_top_level,
        statement_end, strip_block_comments, strip_wrapping_parens,
    },
    types::{DeclarationKind, Diagnostic, ExportBinding, Stage},
};

const DEFAULT_EXPORT_BINDING: &str = "__WEBPACK_DEFAULT_EXPORT__";

/// `const __WEBPACK_DEFAULT_EXPORT__ = ` (webpack 5)
static DEFAULT_EXPORT_CONST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^([ \t]*)(?:/\*[ \t]*harmony default export[ \t]*\*/[ \t]*)?const[ \t]+__WEBPACK_DEFAULT_EXPORT__[ \t]*=[ \t]*",
    )
    .expect("valid default-export regex")
});

/// `function __WEBPACK_DEFAULT_EXPORT__(` / `class __WEBPACK_DEFAULT_EXPORT__ {`
static DEFAULT_EXPORT_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^([ \t]*)(?:/\*[ \t]*harmony default export[ \t]*\*/[ \t]*)?((?:async[ \t]+)?function[ \t]*\*?|class)[ \t]+__WEBPACK_DEFAULT_EXPORT__\b",
    )
    .expect("valid default-declaration regex")
});

/// Result of rewriting the exports of one module body
#[derive(Debug, Clone, Default)]
pub struct ExportRewrite {
    pub body: String,
    /// Registrations in detection order, with their classified kind
    pub bindings: Vec<ExportBinding>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Rewrite every recognised export registration in `body`
pub fn rewrite_exports(
    body: String,
    module_path: &str,
    patterns: &RuntimePatterns,
) -> Result<ExportRewrite, regex::Error> {
    let mut result = ExportRewrite::default();
    let mut trailing: Vec<String> = Vec::new();

    let (body, default_in_place) = rewrite_default_statements(body, patterns);
    let (mut body, registrations) = extract_registrations(body, module_path, &mut result, patterns);

    for mut binding in registrations {
        let kind = if binding.exported == "default" {
            export_default(&mut body, &binding, default_in_place, &mut trailing)?
        } else {
            export_named(&mut body, &binding, module_path, &mut result, &mut trailing)?
        };
        trace!(
            "{module_path}: export `{}` of `{}` as {kind}",
            binding.exported, binding.local
        );
        binding.kind = Some(kind);
        result.bindings.push(binding);
    }

    let body = rewrite_commonjs(body, module_path, patterns, &mut result, &mut trailing);

    debug!(
        "{module_path}: rewrote {} export registrations, appended {} clauses",
        result.bindings.len(),
        trailing.len()
    );

    result.body = if trailing.is_empty() {
        body
    } else {
        format!("{}\n\n{}\n", body.trim_end(), trailing.join("\n"))
    };
    Ok(result)
}

/// Replace `<prefix>(expr);` statements matched by `regex` with
/// `export default expr;`
fn rewrite_default_assignments(body: &str, regex: &Regex) -> (String, bool) {
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    for captures in regex.captures_iter(body) {
        let (Some(whole), Some(indent)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let end = statement_end(body, whole.end());
        let expr = body[whole.end()..end].trim().trim_end_matches(';');
        let expr = strip_wrapping_parens(expr);
        edits.push((
            whole.start()..end,
            format!("{}export default {expr};", indent.as_str()),
        ));
    }
    let rewritten = !edits.is_empty();
    (apply_edits(body, edits), rewritten)
}

/// Rewrite webpack's own default-export statements in place
fn rewrite_default_statements(body: String, patterns: &RuntimePatterns) -> (String, bool) {
    let (body, from_const) = rewrite_default_assignments(&body, &DEFAULT_EXPORT_CONST);
    let (body, from_assign) = rewrite_default_assignments(&body, &patterns.default_export_assign);
    let from_declaration = DEFAULT_EXPORT_DECLARATION.is_match(&body);
    let body = DEFAULT_EXPORT_DECLARATION
        .replace_all(&body, "${1}export default ${2}")
        .into_owned();
    (body, from_const || from_assign || from_declaration)
}

/// Remove registration calls from `body`, returning the bindings they held
fn extract_registrations(
    body: String,
    module_path: &str,
    result: &mut ExportRewrite,
    patterns: &RuntimePatterns,
) -> (String, Vec<ExportBinding>) {
    let mut found: Vec<(usize, Vec<ExportBinding>)> = Vec::new();
    let mut removals: Vec<(Range<usize>, String)> = Vec::new();

    let calls = patterns
        .export_object
        .captures_iter(&body)
        .map(|c| (c, true))
        .chain(patterns.export_single.captures_iter(&body).map(|c| (c, false)));

    for (captures, is_object) in calls {
        let (Some(whole), Some(open)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let Some(close) = matching_close(&body, open.start()) else {
            result.diagnostics.push(Diagnostic::new(
                module_path,
                Stage::Exports,
                "unterminated export registration; left untouched",
            ));
            continue;
        };
        let bindings = if is_object {
            let brace = whole.end() - 1;
            matching_close(&body, brace)
                .map(|brace_close| parse_object_entries(&body[brace + 1..brace_close]))
                .unwrap_or_default()
        } else {
            let name = RuntimePatterns::quoted_path(&captures, 2, 3).unwrap_or_default();
            parse_getter(&body[whole.end()..close])
                .map(|local| {
                    vec![ExportBinding {
                        exported: name.to_owned(),
                        local,
                        kind: None,
                    }]
                })
                .unwrap_or_default()
        };
        if bindings.is_empty() {
            result.diagnostics.push(Diagnostic::new(
                module_path,
                Stage::Exports,
                "export registration with no readable getter; left untouched",
            ));
            continue;
        }
        removals.push((whole.start()..registration_end(&body, close + 1), String::new()));
        found.push((whole.start(), bindings));
    }

    found.sort_by_key(|(offset, _)| *offset);
    let bindings = found.into_iter().flat_map(|(_, b)| b).collect();
    (apply_edits(&body, removals), bindings)
}

/// End of a registration statement: its `;` and the rest of the line
fn registration_end(body: &str, after_call: usize) -> usize {
    let rest = &body[after_call..];
    let trimmed = rest.trim_start_matches([' ', '\t']);
    let trimmed = trimmed.strip_prefix(';').unwrap_or(trimmed);
    let trimmed = trimmed.trim_start_matches([' ', '\t']);
    let trimmed = trimmed
        .strip_prefix("\r\n")
        .or_else(|| trimmed.strip_prefix('\n'))
        .unwrap_or(trimmed);
    body.len() - trimmed.len()
}

/// Entries of a webpack 5 `{ name: () => (local), ... }` registration object
fn parse_object_entries(content: &str) -> Vec<ExportBinding> {
    let content = strip_block_comments(content);
    split_top_level(&content, b',')
        .into_iter()
        .filter_map(|entry| {
            let entry = entry.trim();
            let (key, getter) = split_entry(entry)?;
            Some(ExportBinding {
                exported: key.to_owned(),
                local: parse_getter(getter)?,
                kind: None,
            })
        })
        .collect()
}

/// Split `key: getter`, unquoting the key
fn split_entry(entry: &str) -> Option<(&str, &str)> {
    let first = entry.chars().next()?;
    if first == '"' || first == '\'' {
        let rest = &entry[1..];
        let close = rest.find(first)?;
        let getter = rest[close + 1..].trim_start().strip_prefix(':')?;
        Some((&rest[..close], getter))
    } else {
        let (key, getter) = entry.split_once(':')?;
        Some((key.trim(), getter))
    }
}

/// The expression a registration getter returns
fn parse_getter(getter: &str) -> Option<String> {
    let getter = strip_block_comments(getter);
    let getter = getter.trim().trim_end_matches(',').trim();
    let expr = if let Some(rest) = getter.strip_prefix("function") {
        let open = rest.find('{')?;
        let close = rest.rfind('}')?;
        let inner = rest.get(open + 1..close)?.trim();
        let returned = inner.strip_prefix("return")?;
        if returned.starts_with(is_identifier_char) {
            return None;
        }
        returned.trim().trim_end_matches(';').trim()
    } else {
        let arrow = getter.find("=>")?;
        if getter[..arrow].trim() != "()" {
            return None;
        }
        getter[arrow + 2..].trim()
    };
    let expr = strip_wrapping_parens(expr);
    (!expr.is_empty()).then(|| expr.to_owned())
}

/// Top-level declaration kind of `name`, class before function before variable
fn find_declaration(body: &str, name: &str) -> Result<Option<(DeclarationKind, usize)>, regex::Error> {
    let name = escape(name);
    let candidates = [
        (
            DeclarationKind::Class,
            format!(r"(?m)^class[ \t]+{name}(?:[^\w$]|$)"),
        ),
        (
            DeclarationKind::Function,
            format!(r"(?m)^(?:async[ \t]+)?function[ \t]*\*?[ \t]*{name}[ \t]*\("),
        ),
        (
            DeclarationKind::Variable,
            format!(r"(?m)^(?:var|let|const)[ \t]+{name}(?:[^\w$]|$)"),
        ),
    ];
    for (kind, pattern) in candidates {
        if let Some(m) = Regex::new(&pattern)?.find(body) {
            return Ok(Some((kind, m.start())));
        }
    }
    Ok(None)
}

fn export_default(
    body: &mut String,
    binding: &ExportBinding,
    default_in_place: bool,
    trailing: &mut Vec<String>,
) -> Result<DeclarationKind, regex::Error> {
    if binding.local == DEFAULT_EXPORT_BINDING && default_in_place {
        return Ok(DeclarationKind::Default);
    }
    if is_identifier(&binding.local) {
        if let Some((DeclarationKind::Class | DeclarationKind::Function, at)) =
            find_declaration(body, &binding.local)?
        {
            body.insert_str(at, "export default ");
            return Ok(DeclarationKind::Default);
        }
    }
    trailing.push(format!("export default {};", binding.local));
    Ok(DeclarationKind::Default)
}

fn export_named(
    body: &mut String,
    binding: &ExportBinding,
    module_path: &str,
    result: &mut ExportRewrite,
    trailing: &mut Vec<String>,
) -> Result<DeclarationKind, regex::Error> {
    if !is_identifier(&binding.local) {
        result.diagnostics.push(Diagnostic::new(
            module_path,
            Stage::Exports,
            format!(
                "export `{}` returns `{}`, which is not a local binding",
                binding.exported, binding.local
            ),
        ));
        trailing.push(format!("export {{ {} }};", binding.exported));
        return Ok(DeclarationKind::Variable);
    }

    let declaration = find_declaration(body, &binding.local)?;
    let kind = declaration.map_or(DeclarationKind::Variable, |(kind, _)| kind);
    match declaration {
        Some((DeclarationKind::Class | DeclarationKind::Function, at))
            if binding.local == binding.exported =>
        {
            body.insert_str(at, "export ");
        }
        _ if binding.local == binding.exported => {
            trailing.push(format!("export {{ {} }};", binding.exported));
        }
        _ => trailing.push(format!(
            "export {{ {} as {} }};",
            binding.local, binding.exported
        )),
    }
    Ok(kind)
}

/// `module.exports = ...` and `exports.name = ...` at the module's top level
fn rewrite_commonjs(
    body: String,
    module_path: &str,
    patterns: &RuntimePatterns,
    result: &mut ExportRewrite,
    trailing: &mut Vec<String>,
) -> String {
    let is_assignment = |end: usize| !body[end..].starts_with('=');

    let module_assignments: Vec<_> = patterns
        .module_exports
        .find_iter(&body)
        .filter(|m| is_assignment(m.end()))
        .collect();

    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    match module_assignments.as_slice() {
        [] => {}
        [assignment] => {
            let end = statement_end(&body, assignment.end());
            let expr = body[assignment.end()..end].trim().trim_end_matches(';').trim();
            trailing.push(format!("export default {expr};"));
            edits.push((assignment.start()..registration_end(&body, end), String::new()));
        }
        _ => result.diagnostics.push(Diagnostic::new(
            module_path,
            Stage::Exports,
            "multiple module.exports assignments; left untouched",
        )),
    }

    let mut seen: Vec<String> = Vec::new();
    for captures in patterns.exports_member.captures_iter(&body) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let name = name.as_str();
        if name == "__esModule" || !is_assignment(whole.end()) {
            continue;
        }
        if seen.iter().any(|s| s == name) {
            result.diagnostics.push(Diagnostic::new(
                module_path,
                Stage::Exports,
                format!("`{name}` is assigned to exports more than once; left untouched"),
            ));
            continue;
        }
        seen.push(name.to_owned());
        let end = statement_end(&body, whole.end());
        let expr = body[whole.end()..end].trim().trim_end_matches(';').trim();
        if expr == name {
            trailing.push(format!("export {{ {name} }};"));
            edits.push((whole.start()..registration_end(&body, end), String::new()));
        } else {
            edits.push((whole.range(), format!("export const {name} = ")));
        }
    }

    apply_edits(&body, edits)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::WrapperParams;

    fn patterns() -> RuntimePatterns {
        RuntimePatterns::new(&WrapperParams {
            module: "module".to_owned(),
            exports: "__webpack_exports__".to_owned(),
            require: "__webpack_require__".to_owned(),
        })
        .expect("patterns compile")
    }

    fn rewrite(body: &str) -> ExportRewrite {
        rewrite_exports(body.to_owned(), "./src/main.js", &patterns()).expect("rewrite succeeds")
    }

    #[test]
    fn test_class_export_rewritten_in_place() {
        let body = concat!(
            "/* harmony export */ __webpack_require__.d(__webpack_exports__, {\n",
            "/* harmony export */   \"Main\": () => (/* binding */ Main)\n",
            "/* harmony export */ });\n",
            "class Main {\n  run() {}\n}\n",
        );
        let result = rewrite(body);
        assert_eq!(result.body, "export class Main {\n  run() {}\n}\n");
        assert_eq!(result.bindings[0].kind, Some(DeclarationKind::Class));
    }

    #[test]
    fn test_missing_declaration_appends_clause() {
        let body = concat!(
            "__webpack_require__.d(__webpack_exports__, { Name: () => (Name) });\n",
            "let x = 1;\n",
        );
        let result = rewrite(body);
        assert_eq!(result.body, "let x = 1;\n\nexport { Name };\n");
        assert_eq!(result.bindings[0].kind, Some(DeclarationKind::Variable));
    }

    #[test]
    fn test_class_takes_precedence_over_variable() {
        let body = concat!(
            "__webpack_require__.d(__webpack_exports__, { Widget: () => (Widget) });\n",
            "var Widget;\n",
            "class Widget {}\n",
        );
        let result = rewrite(body);
        assert_eq!(result.bindings[0].kind, Some(DeclarationKind::Class));
        assert_eq!(result.body, "var Widget;\nexport class Widget {}\n");
    }

    #[test]
    fn test_function_and_variable_exports() {
        let body = concat!(
            "/* harmony export */ __webpack_require__.d(__webpack_exports__, {\n",
            "/* harmony export */   \"helper\": () => (/* binding */ helper),\n",
            "/* harmony export */   \"LIMIT\": () => (/* binding */ LIMIT)\n",
            "/* harmony export */ });\n",
            "const LIMIT = 10;\n",
            "async function helper() {}\n",
        );
        let result = rewrite(body);
        assert_eq!(
            result.body,
            "const LIMIT = 10;\nexport async function helper() {}\n\nexport { LIMIT };\n"
        );
    }

    #[test]
    fn test_webpack4_single_registrations_keep_detection_order() {
        let body = concat!(
            "/* harmony export (binding) */ __webpack_require__.d(__webpack_exports__, \"b\", function() { return b; });\n",
            "/* harmony export (binding) */ __webpack_require__.d(__webpack_exports__, \"a\", function() { return a; });\n",
            "var a = 1, b = 2;\n",
        );
        let result = rewrite(body);
        assert_eq!(
            result.body,
            "var a = 1, b = 2;\n\nexport { b };\nexport { a };\n"
        );
    }

    #[test]
    fn test_renamed_export() {
        let body = concat!(
            "__webpack_require__.d(__webpack_exports__, { \"render\": () => (renderImpl) });\n",
            "function renderImpl() {}\n",
        );
        let result = rewrite(body);
        assert_eq!(
            result.body,
            "function renderImpl() {}\n\nexport { renderImpl as render };\n"
        );
    }

    #[test]
    fn test_member_expression_export_reports_diagnostic() {
        let body = "__webpack_require__.d(__webpack_exports__, { \"x\": () => (config.x) });\n";
        let result = rewrite(body);
        assert_eq!(result.body, "\n\nexport { x };\n");
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn test_webpack5_default_const() {
        let body = concat!(
            "__webpack_require__.d(__webpack_exports__, {\n",
            "  \"default\": () => (__WEBPACK_DEFAULT_EXPORT__)\n",
            "});\n",
            "/* harmony default export */ const __WEBPACK_DEFAULT_EXPORT__ = ({\n  a: 1\n});\n",
        );
        let result = rewrite(body);
        assert_eq!(result.body, "export default {\n  a: 1\n};\n");
        assert_eq!(result.bindings[0].kind, Some(DeclarationKind::Default));
    }

    #[test]
    fn test_webpack5_anonymous_default_function() {
        let body = concat!(
            "__webpack_require__.d(__webpack_exports__, { \"default\": () => (__WEBPACK_DEFAULT_EXPORT__) });\n",
            "/* harmony default export */ function __WEBPACK_DEFAULT_EXPORT__(a) { return a; }\n",
        );
        let result = rewrite(body);
        assert_eq!(result.body, "export default function(a) { return a; }\n");
    }

    #[test]
    fn test_default_registration_of_class() {
        let body = concat!(
            "__webpack_require__.d(__webpack_exports__, { \"default\": () => (App) });\n",
            "class App {}\n",
        );
        let result = rewrite(body);
        assert_eq!(result.body, "export default class App {}\n");
    }

    #[test]
    fn test_webpack4_default_assignment() {
        let body = "/* harmony default export */ __webpack_exports__[\"default\"] = (Foo);\n";
        let result = rewrite(body);
        assert_eq!(result.body, "export default Foo;\n");
    }

    #[test]
    fn test_module_exports_becomes_default_export() {
        let body = "function f() {}\nmodule.exports = {\n  f\n};\n";
        let result = rewrite(body);
        assert_eq!(result.body, "function f() {}\n\nexport default {\n  f\n};\n");
    }

    #[test]
    fn test_multiple_module_exports_left_untouched() {
        let body = "module.exports = a;\nmodule.exports = b;\n";
        let result = rewrite(body);
        assert_eq!(result.body, body);
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn test_exports_members() {
        let body = "function go() {}\n__webpack_exports__.go = go;\n__webpack_exports__.VERSION = \"1.0\";\n";
        let result = rewrite(body);
        assert_eq!(
            result.body,
            "function go() {}\nexport const VERSION = \"1.0\";\n\nexport { go };\n"
        );
    }

    #[test]
    fn test_parse_getter_forms() {
        assert_eq!(parse_getter(" () => (/* binding */ Foo)").as_deref(), Some("Foo"));
        assert_eq!(
            parse_getter(" function() { return Foo; }").as_deref(),
            Some("Foo")
        );
        assert_eq!(parse_getter("() => bar").as_deref(), Some("bar"));
        assert_eq!(parse_getter("(x) => x"), None);
    }
}
