//! Rewrites the bundle's dependency loads into `import` statements
//!
//! Detection runs in a fixed order over one module body:
//! 1. annotated loads (`var x = require(/*! request */ "path")`) are removed
//!    and remembered as [`ImportBinding`]s,
//! 2. interop-default wrappers derived from those loads are removed,
//! 3. every remaining use of a load's local is rewritten to the recovered
//!    symbol name.
//!
//! Import shapes are classified from surface syntax only. Member accesses on
//! the local decide the named bindings; a `default` access or an interop
//! wrapper makes a default import; without either, the local's generated
//! name decides (a single PascalCase word is a default import).

use std::ops::Range;

use log::{debug, trace};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    config::Config,
    path_resolver::{has_path_prefix, resolve, strip_current_dir, strip_script_extension},
    runtime_patterns::RuntimePatterns,
    syntax::{
        apply_edits, identifier_occurrences, is_identifier, is_identifier_char, matching_close,
    },
    types::{Diagnostic, FxIndexSet, ImportBinding, ImportKind, Stage},
};

/// `<stem>__WEBPACK_IMPORTED_MODULE_<n>__`
static GENERATED_BINDING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.*?)__WEBPACK_IMPORTED_MODULE_\d+__$").expect("valid generated-binding regex")
});

/// Trailing stem segments that came from the request's file extension
const EXTENSION_SEGMENTS: &[&str] = &["js", "jsx", "mjs", "cjs", "ts", "tsx", "vue", "json"];

/// Result of rewriting the imports of one module body
#[derive(Debug, Clone, Default)]
pub struct ImportRewrite {
    pub body: String,
    /// Import statements to prepend, in the order their loads appeared
    pub imports: Vec<String>,
    pub bindings: Vec<ImportBinding>,
    /// Resolved paths of every dependency that was rewritten
    pub dependencies: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// What the import rewriter needs to know about the module it works on
#[derive(Debug, Clone, Copy)]
pub struct ImportContext<'a> {
    pub module_path: &'a str,
    pub patterns: &'a RuntimePatterns,
    pub config: &'a Config,
}

impl ImportContext<'_> {
    /// Specifier to import `resolved` with from this module
    fn specifier(&self, resolved: &str, request: Option<&str>) -> String {
        let prefix = &self.config.excluded_path_prefix;
        if has_path_prefix(resolved, prefix) {
            if let Some(request) = request.filter(|r| !r.starts_with('.')) {
                return request.to_owned();
            }
            let stripped = strip_current_dir(resolved);
            return stripped
                .strip_prefix(strip_current_dir(prefix))
                .unwrap_or(stripped)
                .trim_start_matches('/')
                .to_owned();
        }
        let specifier = resolve(self.module_path, resolved);
        if self.config.strip_import_extensions {
            strip_script_extension(&specifier).to_owned()
        } else {
            specifier
        }
    }
}

/// An annotated load found in the body
#[derive(Debug)]
struct DetectedLoad {
    offset: usize,
    local: String,
    request: Option<String>,
    resolved: String,
    wrappers: Vec<String>,
}

/// How one occurrence of a load's local is used
#[derive(Debug)]
enum Usage {
    Member { range: Range<usize>, name: String },
    Bare { range: Range<usize> },
}

/// A bare `require(/*! request */ "path");` statement
#[derive(Debug)]
struct SideEffectLoad {
    offset: usize,
    request: String,
    resolved: String,
}

/// Remove load statements and interop wrappers from `body`, returning what
/// they declared
fn detect_loads(
    body: &str,
    ctx: &ImportContext<'_>,
    diagnostics: &mut Vec<Diagnostic>,
) -> (String, Vec<DetectedLoad>, Vec<SideEffectLoad>) {
    let mut removals: Vec<(Range<usize>, String)> = Vec::new();
    let mut loads: Vec<DetectedLoad> = Vec::new();
    let mut side_effects: Vec<SideEffectLoad> = Vec::new();
    // Loads already reported on their own
    let mut reported: Vec<Range<usize>> = Vec::new();

    for captures in ctx.patterns.annotated_load.captures_iter(body) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let local = captures[1].to_owned();
        let resolved = RuntimePatterns::quoted_path(&captures, 3, 4).unwrap_or_default();
        if resolved.is_empty() {
            diagnostics.push(Diagnostic::new(
                ctx.module_path,
                Stage::Imports,
                format!("load of `{local}` has no resolved path; left untouched"),
            ));
            reported.push(whole.range());
            continue;
        }
        removals.push((whole.range(), String::new()));
        loads.push(DetectedLoad {
            offset: whole.start(),
            local,
            request: Some(captures[2].to_owned()).filter(|r| !r.is_empty()),
            resolved: resolved.to_owned(),
            wrappers: Vec::new(),
        });
    }

    for captures in ctx.patterns.interop_wrapper.captures_iter(body) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let Some(load) = loads.iter_mut().find(|load| load.local == captures[2]) else {
            diagnostics.push(Diagnostic::new(
                ctx.module_path,
                Stage::Imports,
                format!(
                    "interop wrapper `{}` wraps unknown binding `{}`; left untouched",
                    &captures[1], &captures[2]
                ),
            ));
            continue;
        };
        load.wrappers.push(captures[1].to_owned());
        removals.push((whole.range(), String::new()));
    }

    for captures in ctx.patterns.side_effect_load.captures_iter(body) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let resolved = RuntimePatterns::quoted_path(&captures, 2, 3).unwrap_or_default();
        if resolved.is_empty() {
            continue;
        }
        removals.push((whole.range(), String::new()));
        side_effects.push(SideEffectLoad {
            offset: whole.start(),
            request: captures[1].to_owned(),
            resolved: resolved.to_owned(),
        });
    }

    reported.extend(removals.iter().map(|(range, _)| range.clone()));
    diagnostics.extend(unrewritten_loads(body, ctx, &reported));

    (apply_edits(body, removals), loads, side_effects)
}

/// Loader calls that no detection pass consumed, e.g. numeric module ids or
/// a minified `n(4)`
fn unrewritten_loads(
    body: &str,
    ctx: &ImportContext<'_>,
    reported: &[Range<usize>],
) -> Vec<Diagnostic> {
    ctx.patterns
        .loader_call
        .captures_iter(body)
        .filter_map(|captures| captures.get(1))
        .filter(|call| !reported.iter().any(|range| range.contains(&call.start())))
        .map(|call| {
            let open = body[call.end()..]
                .find('(')
                .map_or(call.end(), |offset| call.end() + offset);
            let text = matching_close(body, open)
                .map(|close| &body[call.start()..=close])
                .filter(|text| !text.contains('\n'))
                .unwrap_or(call.as_str());
            Diagnostic::new(
                ctx.module_path,
                Stage::Imports,
                format!("loader call `{text}` could not be rewritten; left untouched"),
            )
        })
        .collect()
}

/// Rewrite every recognised dependency load in `body`
pub fn rewrite_imports(body: String, ctx: &ImportContext<'_>) -> ImportRewrite {
    let mut result = ImportRewrite::default();
    let (body, loads, side_effects) = detect_loads(&body, ctx, &mut result.diagnostics);

    let mut statements: Vec<(usize, String)> = Vec::new();
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    let mut taken: FxIndexSet<String> = FxIndexSet::default();

    for load in loads {
        let specifier = ctx.specifier(&load.resolved, load.request.as_deref());
        let plan = plan_import(&body, &load, &mut taken);
        trace!(
            "{}: `{}` -> {} import from {}",
            ctx.module_path, load.local, plan.kind, specifier
        );
        for statement in plan.statements(&specifier) {
            statements.push((load.offset, statement));
        }
        edits.extend(plan.edits);
        result.dependencies.push(load.resolved.clone());
        result.bindings.push(ImportBinding {
            local: load.local,
            request: load.request,
            resolved: load.resolved,
            kind: plan.kind,
        });
    }

    for load in side_effects {
        let request = Some(load.request.as_str()).filter(|r| !r.is_empty());
        let specifier = ctx.specifier(&load.resolved, request);
        statements.push((load.offset, format!("import '{specifier}';")));
        result.dependencies.push(load.resolved);
    }

    statements.sort_by_key(|(offset, _)| *offset);
    result.imports = statements.into_iter().map(|(_, s)| s).collect();
    result.body = apply_edits(&body, edits);

    debug!(
        "{}: rewrote {} dependency loads",
        ctx.module_path,
        result.imports.len()
    );
    result
}

/// The import statement(s) and body edits for one load
#[derive(Debug)]
struct ImportPlan {
    kind: ImportKind,
    default_name: Option<String>,
    /// `(exported, local)` pairs
    named: Vec<(String, String)>,
    namespace_name: Option<String>,
    edits: Vec<(Range<usize>, String)>,
}

impl ImportPlan {
    fn statements(&self, specifier: &str) -> Vec<String> {
        let named = self
            .named
            .iter()
            .map(|(exported, local)| {
                if exported == local {
                    exported.clone()
                } else {
                    format!("{exported} as {local}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");
        let clause = match (&self.default_name, named.is_empty()) {
            (Some(default), true) => default.clone(),
            (Some(default), false) => format!("{default}, {{ {named} }}"),
            (None, false) => format!("{{ {named} }}"),
            (None, true) => String::new(),
        };
        let mut statements = Vec::with_capacity(2);
        if !clause.is_empty() {
            statements.push(format!("import {clause} from '{specifier}';"));
        }
        if let Some(namespace) = &self.namespace_name {
            statements.push(format!("import * as {namespace} from '{specifier}';"));
        }
        statements
    }
}

/// Classify one load and plan its rewrite; `taken` holds the local names
/// earlier loads of the same module already bound
fn plan_import(body: &str, load: &DetectedLoad, taken: &mut FxIndexSet<String>) -> ImportPlan {
    let wrapper_kind = if load.wrappers.is_empty() {
        ImportKind::Default
    } else {
        ImportKind::NamespaceDefaultWrapped
    };

    let Some(stem) = generated_stem(&load.local) else {
        // A hand-written `require` binding keeps its own name
        taken.insert(load.local.clone());
        let edits = wrapper_edits(body, &load.wrappers, &load.local);
        return ImportPlan {
            kind: wrapper_kind,
            default_name: Some(load.local.clone()),
            named: Vec::new(),
            namespace_name: None,
            edits,
        };
    };

    let recovered = recover_name(&stem);
    let usages = collect_usages(body, &load.local);

    let mut members: Vec<String> = Vec::new();
    let mut default_used = !load.wrappers.is_empty();
    let mut has_bare = false;
    for usage in &usages {
        match usage {
            Usage::Member { name, .. } if name == "default" => default_used = true,
            Usage::Member { name, .. } => {
                if !members.contains(name) {
                    members.push(name.clone());
                }
            }
            Usage::Bare { .. } => has_bare = true,
        }
    }

    let (kind, default_base, namespace_base) = if !members.is_empty() {
        let default_base = default_used.then(|| unique_name(&recovered, "Default", &members));
        let namespace_base = has_bare.then(|| {
            let mut local_names = members.clone();
            local_names.extend(default_base.iter().cloned());
            unique_name(&recovered, "Namespace", &local_names)
        });
        (ImportKind::Named, default_base, namespace_base)
    } else if default_used {
        (wrapper_kind, Some(recovered.clone()), None)
    } else if is_pascal_word(&stem) {
        (ImportKind::Default, Some(recovered.clone()), None)
    } else {
        members.push(recovered.clone());
        (ImportKind::Named, None, None)
    };

    let named: Vec<(String, String)> = members
        .into_iter()
        .map(|member| {
            let local = claim_name(&member, taken);
            (member, local)
        })
        .collect();
    let default_name = default_base.map(|base| claim_name(&base, taken));
    let namespace_name = namespace_base.map(|base| claim_name(&base, taken));

    let member_local = |member: &str| {
        named
            .iter()
            .find(|(exported, _)| exported == member)
            .map_or_else(|| member.to_owned(), |(_, local)| local.clone())
    };
    let default_target = default_name.clone().unwrap_or_else(|| recovered.clone());
    let bare_name = namespace_name
        .clone()
        .or_else(|| default_name.clone())
        .unwrap_or_else(|| member_local(&recovered));

    let mut edits = wrapper_edits(body, &load.wrappers, &default_target);
    for usage in usages {
        match usage {
            Usage::Member { range, name } if name == "default" => {
                edits.push((range, default_target.clone()));
            }
            Usage::Member { range, name } => edits.push((range, member_local(&name))),
            Usage::Bare { range } => edits.push((range, bare_name.clone())),
        }
    }

    ImportPlan {
        kind,
        default_name,
        named,
        namespace_name,
        edits,
    }
}

/// Classify every reference to `local` in `body`
fn collect_usages(body: &str, local: &str) -> Vec<Usage> {
    identifier_occurrences(body, local)
        .into_iter()
        .map(|start| {
            let end = start + local.len();
            let Some((name, member_end)) = member_after(body, end) else {
                return Usage::Bare { range: start..end };
            };
            Usage::Member {
                range: widen_to_call_wrapper(body, start..member_end),
                name,
            }
        })
        .collect()
}

/// Grow `range` over a receiver-free call wrapper around it: webpack 5's
/// `(0, x.member)` or webpack 4's `Object(x.member)`
fn widen_to_call_wrapper(body: &str, range: Range<usize>) -> Range<usize> {
    call_wrapper_start(&body[..range.start])
        .and_then(|open| {
            let rest = &body[range.end..];
            let close = range.end + (rest.len() - rest.trim_start().len());
            rest.trim_start()
                .starts_with(')')
                .then_some(open..close + 1)
        })
        .unwrap_or(range)
}

/// Member name accessed at `pos` (`.name`, `["name"]` or `['name']`)
fn member_after(body: &str, pos: usize) -> Option<(String, usize)> {
    let rest = &body[pos..];
    if let Some(after_dot) = rest.strip_prefix('.') {
        let len = after_dot
            .find(|c: char| !is_identifier_char(c))
            .unwrap_or(after_dot.len());
        let name = &after_dot[..len];
        return is_identifier(name).then(|| (name.to_owned(), pos + 1 + len));
    }
    let inner = rest.strip_prefix('[')?;
    let trimmed = inner.trim_start();
    let quote = trimmed.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let after_quote = &trimmed[1..];
    let name_len = after_quote.find(quote)?;
    let name = &after_quote[..name_len];
    let tail = &after_quote[name_len + 1..];
    let close = tail.trim_start().strip_prefix(']')?;
    if !is_identifier(name) {
        return None;
    }
    let consumed = rest.len() - close.len();
    Some((name.to_owned(), pos + consumed))
}

/// Start of a `(0,` or `Object(` prefix ending exactly at the end of `before`
fn call_wrapper_start(before: &str) -> Option<usize> {
    let trimmed = before.trim_end();
    if let Some(callee) = trimmed
        .strip_suffix('(')
        .and_then(|rest| rest.strip_suffix("Object"))
    {
        let standalone = callee
            .chars()
            .next_back()
            .is_none_or(|c| !is_identifier_char(c) && c != '.');
        return standalone.then_some(callee.len());
    }
    let trimmed = trimmed.strip_suffix(',')?;
    let trimmed = trimmed.trim_end().strip_suffix('0')?;
    let trimmed = trimmed.trim_end().strip_suffix('(')?;
    let preceded_by_callee = trimmed
        .chars()
        .next_back()
        .is_some_and(|c| is_identifier_char(c) || c == ')' || c == ']');
    (!preceded_by_callee).then_some(trimmed.len())
}

/// Rewrite `wrapper.a`, `wrapper()` and bare `wrapper` to `target`
fn wrapper_edits(body: &str, wrappers: &[String], target: &str) -> Vec<(Range<usize>, String)> {
    let mut edits = Vec::new();
    for wrapper in wrappers {
        for start in identifier_occurrences(body, wrapper) {
            let end = start + wrapper.len();
            let rest = &body[end..];
            let extra = if rest.starts_with(".a") && !rest[2..].starts_with(is_identifier_char) {
                2
            } else if let Some(after_open) = rest.strip_prefix('(') {
                let inner = after_open.trim_start();
                if inner.starts_with(')') {
                    1 + (after_open.len() - inner.len()) + 1
                } else {
                    0
                }
            } else {
                0
            };
            edits.push((
                widen_to_call_wrapper(body, start..end + extra),
                target.to_owned(),
            ));
        }
    }
    edits
}

/// Human-readable stem of a generated binding name, if it is one
pub fn generated_stem(local: &str) -> Option<String> {
    let captures = GENERATED_BINDING.captures(local)?;
    let mut segments: Vec<&str> = captures[1]
        .split('_')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.len() > 1
        && segments
            .last()
            .is_some_and(|last| EXTENSION_SEGMENTS.contains(last))
    {
        segments.pop();
    }
    Some(segments.join("_"))
}

/// A single capitalised word without separators, e.g. `Globals`
pub fn is_pascal_word(stem: &str) -> bool {
    stem.chars().next().is_some_and(|c| c.is_uppercase())
        && stem.chars().all(char::is_alphanumeric)
}

/// Identifier recovered from a stem by dropping separator characters
pub fn recover_name(stem: &str) -> String {
    let name: String = stem.chars().filter(|c| c.is_alphanumeric()).collect();
    match name.chars().next() {
        None => "module".to_owned(),
        Some(first) if first.is_ascii_digit() => format!("_{name}"),
        Some(_) => name,
    }
}

/// `base`, or `base` + `suffix` when `base` is already taken
fn unique_name(base: &str, suffix: &str, taken: &[String]) -> String {
    if taken.iter().any(|t| t == base) {
        format!("{base}{suffix}")
    } else {
        base.to_owned()
    }
}

/// Reserve `base` in `taken`, numbering it (`utils2`, `utils3`, ...) when an
/// earlier load already bound it
fn claim_name(base: &str, taken: &mut FxIndexSet<String>) -> String {
    let name = if taken.contains(base) {
        (2usize..)
            .map(|n| format!("{base}{n}"))
            .find(|candidate| !taken.contains(candidate))
            .unwrap_or_else(|| format!("{base}_"))
    } else {
        base.to_owned()
    };
    taken.insert(name.clone());
    name
}
