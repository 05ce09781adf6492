//! Final cleanup of a rewritten module
//!
//! Only text that is unambiguously bundler output is removed: runtime helper
//! calls that carry no binding, webpack's annotation comments and marker
//! lines. Anything that could be user code stays, even if a rewrite stage
//! missed it.

use cow_utils::CowUtils;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    runtime_patterns::RuntimePatterns,
    syntax::{apply_edits, block_comment_ranges},
    types::{DEFAULT_REQUIRE_PARAM, Diagnostic, Stage},
};

/// Inline `/* harmony ... */`, `/*#__PURE__*/`, `/* binding */` and friends
static INLINE_ANNOTATIONS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"/\*[ \t]*(?:harmony [^*]*|binding|reexport [^*]*|module decorator)[ \t]*\*/[ \t]?|/\*#__PURE__\*/",
    )
    .expect("valid annotation regex")
});

/// Whole-line `/*! ... */` export-info comments webpack prints
static INFO_COMMENT_LINES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*/\*![ \t]*(?:exports provided|no static exports found|no exports provided|ModuleConcatenation bailout|namespace exports|export [^*]*\[|runtime requirements|other exports|unknown exports|all exports used|dynamic exports|exports \[|side effects|export default binding)[^\n]*?\*/[ \t]*(?:\r?\n)?",
    )
    .expect("valid info-comment regex")
});

/// Lines made only of a `/***/` module-separator marker
static MARKER_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^/\*{3}/[ \t]*(?:\r?\n|$)").expect("valid marker regex"));

/// `"use strict";` directive webpack adds at the top of harmony modules
static LEADING_USE_STRICT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\A\s*["']use strict["'];?[ \t]*(?:\r?\n)?"#).expect("valid directive regex")
});

static TRAILING_BLANKS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)[ \t]+$").expect("valid trailing-blank regex"));

/// Three or more blank lines in a row
static EXCESS_NEWLINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{4,}").expect("valid newline regex"));

/// Identifiers that must not survive into reconstructed source
const INTERNAL_BINDINGS: &[&str] = &[
    "__webpack_require__",
    "__webpack_exports__",
    "__webpack_module_cache__",
    "__WEBPACK_IMPORTED_MODULE_",
    "__WEBPACK_DEFAULT_EXPORT__",
    "__WEBPACK_REEXPORT_OBJECT__",
    "__unused_webpack_",
];

/// Strip residual boilerplate and normalise whitespace
pub fn finalize(body: String, patterns: &RuntimePatterns) -> String {
    let body = body.as_str().cow_replace("\r\n", "\n");
    let body = patterns.namespace_marker.replace_all(&body, "");
    let body = patterns.module_decorator.replace_all(&body, "");
    let body = patterns.es_module_marker.replace_all(&body, "");
    let body = INFO_COMMENT_LINES.replace_all(&body, "");
    let body = MARKER_LINES.replace_all(&body, "");
    let body = LEADING_USE_STRICT.replace(&body, "");
    let body = strip_inline_annotations(&body);
    normalize_whitespace(&body)
}

/// Remove annotation comments that are real comments, leaving look-alikes
/// inside string and template literals alone
fn strip_inline_annotations(text: &str) -> String {
    let comments = block_comment_ranges(text);
    let edits = INLINE_ANNOTATIONS
        .find_iter(text)
        .filter(|found| {
            comments
                .binary_search_by_key(&found.start(), |range| range.start)
                .is_ok()
        })
        .map(|found| (found.range(), String::new()))
        .collect();
    apply_edits(text, edits)
}

/// Trim trailing blanks per line, collapse three or more blank lines to one
/// and trim the whole text
pub fn normalize_whitespace(text: &str) -> String {
    let text = TRAILING_BLANKS.replace_all(text, "");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    text.trim().to_owned()
}

/// Report bundler-internal names still present in finished module text
pub fn check_residuals(
    text: &str,
    module_path: &str,
    patterns: &RuntimePatterns,
) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = INTERNAL_BINDINGS
        .iter()
        .filter(|name| text.contains(*name))
        .map(|name| {
            Diagnostic::new(
                module_path,
                Stage::Postcondition,
                format!("residual bundler binding `{name}`"),
            )
        })
        .collect();
    // The default loader name is already covered by the binding list
    if patterns.params.require != DEFAULT_REQUIRE_PARAM && patterns.loader_call.is_match(text) {
        diagnostics.push(Diagnostic::new(
            module_path,
            Stage::Postcondition,
            format!("residual module loader call `{}(...)`", patterns.params.require),
        ));
    }
    diagnostics
}
