//! Bundle scanner: splits a webpack bundle into module records
//!
//! The scan is structural. It finds the module registry, cuts it into spans
//! at each `/***/ "<path>":` declaration and then looks for the wrapper
//! opening at the head of each span and the wrapper close at its tail. Taking
//! the *last* close marker inside a span means text in a body that happens to
//! look like a close marker cannot truncate the body.
//!
//! Webpack 5 does not always register the entry module. It may instead inline
//! it after the runtime bootstrap, below `var __webpack_exports__ = {};` and
//! usually inside an IIFE, marked only by its `!*** <path> ***!` banner. Those
//! entries are recovered too and are given the default wrapper parameter names.

use std::ops::Range;

use log::{debug, trace, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    config::Config,
    error::UnbundleError,
    module_registry::ModuleRegistry,
    runtime_patterns::RuntimePatterns,
    types::{
        DEFAULT_EXPORTS_PARAM, DEFAULT_MODULE_PARAM, DEFAULT_REQUIRE_PARAM, Diagnostic,
        ModuleRecord, Stage,
    },
};

/// Start of the module registry for webpack 5 and webpack 4 output
static REGISTRY_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)(?:var[ \t]+__webpack_modules__[ \t]*=[ \t]*\([ \t]*\{|__webpack_modules__[ \t]*=[ \t]*\{|^/\*{6}/[ \t]*\([ \t]*[\[{])",
    )
    .expect("valid registry regex")
});

/// The bootstrap gutter that follows the registry
static REGISTRY_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^/\*{6}/").expect("valid registry end regex"));

/// `/***/ "./src/a.js":`, the key of one registry entry
static PATH_DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^/\*{3}/[ \t]*(?:"([^"\n]+)"|'([^'\n]+)')[ \t]*:"#)
        .expect("valid path declaration regex")
});

/// `/***/ (function(a, b, c) {` or `/***/ ((a, b, c) => {`
static WRAPPER_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^/\*{3}/[ \t]*\(\s*(?:function[ \t]*\(([^)]*)\)|\(([^)]*)\)[ \t]*=>|([A-Za-z_$][\w$]*)[ \t]*=>)\s*\{",
    )
    .expect("valid wrapper regex")
});

/// `/***/ })` with an optional trailing comma, alone on its line
static WRAPPER_CLOSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^/\*{3}/[ \t]*\}\)[ \t]*,?[ \t]*$").expect("valid wrapper close regex")
});

/// `var __webpack_exports__ = {};`, which opens webpack 5's startup code
static ENTRY_STARTUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*var[ \t]+__webpack_exports__[ \t]*=[ \t]*\{\}[ \t]*;?[ \t]*$")
        .expect("valid startup regex")
});

/// The three-line `!*** <path> ***!` banner above an inlined entry
static ENTRY_BANNER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*/\*!\*+!\*\\[ \t]*\r?\n[ \t]*!\*{3}[ \t]+(.+?)[ \t]+\*{3}![ \t]*\r?\n[ \t]*\\\*+/[ \t]*(?:\r?\n)?",
    )
    .expect("valid entry banner regex")
});

/// An IIFE opening directly before an entry banner
static ENTRY_IIFE_OPEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:\(\(\)[ \t]*=>|\(function[ \t]*\(\)|!function[ \t]*\(\))[ \t]*\{\s*(?:["']use strict["'];?\s*)?\z"#,
    )
    .expect("valid entry wrapper regex")
});

/// `})();` (or `}();`) closing an entry IIFE
static ENTRY_IIFE_CLOSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\}\)?\(\)\)?[ \t]*;?[ \t]*$").expect("valid entry close regex")
});

/// Logical module name for diagnostics about an entry without a banner
const UNNAMED_ENTRY: &str = "<inlined entry>";

/// Records found in a bundle plus the problems met on the way
#[derive(Debug, Default)]
pub struct ScanOutput {
    pub registry: ModuleRegistry,
    pub diagnostics: Vec<Diagnostic>,
}

fn registry_bounds(text: &str) -> Result<Range<usize>, UnbundleError> {
    let open = REGISTRY_OPEN
        .find(text)
        .ok_or_else(UnbundleError::registry_not_found)?;
    let rest = &text[open.end()..];
    let end = REGISTRY_END.find(rest).map_or(rest.len(), |m| m.start());
    Ok(open.end()..open.end() + end)
}

/// Locate the registry and return the text between its opening and its end
pub fn registry_section(text: &str) -> Result<&str, UnbundleError> {
    Ok(&text[registry_bounds(text)?])
}

/// Split raw bundle text into module records, dropping excluded paths
pub fn scan(text: &str, config: &Config) -> Result<ScanOutput, UnbundleError> {
    let bounds = registry_bounds(text)?;
    let section = &text[bounds.clone()];
    let mut output = ScanOutput::default();

    let declarations: Vec<(usize, usize, &str)> = PATH_DECLARATION
        .captures_iter(section)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let path = RuntimePatterns::quoted_path(&captures, 1, 2)?;
            Some((whole.start(), whole.end(), path))
        })
        .collect();
    debug!("Found {} module declarations", declarations.len());

    for (index, &(_, declaration_end, path)) in declarations.iter().enumerate() {
        let span_end = declarations
            .get(index + 1)
            .map_or(section.len(), |&(next_start, _, _)| next_start);
        let span = &section[declaration_end..span_end];

        if config.is_excluded(path) {
            trace!("Excluding {path}");
            output.registry.add_excluded(path.to_owned())?;
            continue;
        }

        match scan_record(path, span) {
            Ok((record, diagnostic)) => {
                if let Some(diagnostic) = diagnostic {
                    warn!("{diagnostic}");
                    output.diagnostics.push(diagnostic);
                }
                output.registry.add_module(record)?;
            }
            Err(diagnostic) => {
                warn!("{diagnostic}");
                output.diagnostics.push(diagnostic);
            }
        }
    }

    for (path, body) in inlined_entries(&text[bounds.end..], &mut output.diagnostics) {
        if config.is_excluded(path) {
            trace!("Excluding inlined entry {path}");
            output.registry.add_excluded(path.to_owned())?;
            continue;
        }
        debug!("Recovered inlined entry module {path}");
        let params = vec![
            DEFAULT_MODULE_PARAM.to_owned(),
            DEFAULT_EXPORTS_PARAM.to_owned(),
            DEFAULT_REQUIRE_PARAM.to_owned(),
        ];
        output
            .registry
            .add_module(ModuleRecord::new(path, params, body))?;
    }

    if output.registry.is_empty() {
        return Err(UnbundleError::NoModulesFound {
            prefix: config.excluded_path_prefix.clone(),
        });
    }
    debug!(
        "Scanned {} modules ({} excluded)",
        output.registry.len(),
        output.registry.excluded_count()
    );
    Ok(output)
}

/// Entry modules inlined in the startup code after the registry, as
/// `(path, body)` pairs in bundle order
fn inlined_entries<'a>(
    tail: &'a str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<(&'a str, &'a str)> {
    let Some(startup) = ENTRY_STARTUP.find(tail) else {
        return Vec::new();
    };
    let rest = &tail[startup.end()..];
    let section = &rest[..REGISTRY_END.find(rest).map_or(rest.len(), |m| m.start())];

    // (iife or banner start, body start, path, wrapped)
    let banners: Vec<(usize, usize, &str, bool)> = ENTRY_BANNER
        .captures_iter(section)
        .filter_map(|captures| {
            let whole = captures.get(0)?;
            let path = captures.get(1)?.as_str();
            let opener = ENTRY_IIFE_OPEN.find(&section[..whole.start()]);
            let start = opener.map_or(whole.start(), |m| m.start());
            Some((start, whole.end(), path, opener.is_some()))
        })
        .collect();

    if banners.is_empty() {
        if !section.trim().is_empty() {
            let diagnostic = Diagnostic::new(
                UNNAMED_ENTRY,
                Stage::Scan,
                "startup code has no module banner; inlined entry not recovered",
            );
            warn!("{diagnostic}");
            diagnostics.push(diagnostic);
        }
        return Vec::new();
    }

    banners
        .iter()
        .enumerate()
        .map(|(index, &(_, body_start, path, wrapped))| {
            let span_end = banners
                .get(index + 1)
                .map_or(section.len(), |&(next_start, _, _, _)| next_start);
            let span = &section[body_start..span_end];
            let body = if wrapped {
                ENTRY_IIFE_CLOSE
                    .find_iter(span)
                    .last()
                    .map_or(span, |close| &span[..close.start()])
            } else {
                span
            };
            (path, body)
        })
        .collect()
}

/// Build one record from the span following its path declaration
fn scan_record(
    path: &str,
    span: &str,
) -> Result<(ModuleRecord, Option<Diagnostic>), Diagnostic> {
    let Some(open) = WRAPPER_OPEN.captures(span) else {
        return Err(Diagnostic::new(
            path,
            Stage::Scan,
            "no module wrapper found; entry skipped",
        ));
    };
    let Some(open_match) = open.get(0) else {
        return Err(Diagnostic::new(path, Stage::Scan, "unreadable wrapper"));
    };
    let params = match (open.get(1), open.get(2), open.get(3)) {
        (Some(list), _, _) | (None, Some(list), _) => parse_params(list.as_str()),
        (None, None, Some(single)) => vec![single.as_str().to_owned()],
        (None, None, None) => Vec::new(),
    };

    let body_start = open_match.end();
    let close = WRAPPER_CLOSE
        .find_iter(&span[body_start..])
        .last()
        .map(|m| body_start + m.start());

    let (body, diagnostic) = match close {
        Some(close) => (&span[body_start..close], None),
        None => (
            &span[body_start..],
            Some(Diagnostic::new(
                path,
                Stage::Scan,
                "wrapper close not found; keeping the rest of the entry as its body",
            )),
        ),
    };
    Ok((ModuleRecord::new(path, params, body), diagnostic))
}

/// Split a wrapper's parameter list, ignoring comments and blanks
fn parse_params(list: &str) -> Vec<String> {
    crate::syntax::strip_block_comments(list)
        .split(',')
        .map(str::trim)
        .filter(|param| !param.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn webpack5_bundle(entries: &[(&str, &str)]) -> String {
        let mut bundle = String::from(
            "/******/ (() => { // webpackBootstrap\n/******/ \tvar __webpack_modules__ = ({\n\n",
        );
        for (path, body) in entries {
            bundle.push_str(&format!(
                "/***/ \"{path}\":\n/*!**********!*\\\n  !*** {path} ***!\n  \\**********/\n/***/ ((__unused_webpack_module, __webpack_exports__, __webpack_require__) => {{\n\n{body}\n\n/***/ }}),\n\n"
            ));
        }
        bundle.push_str("/******/ \t});\n/******/ })();\n");
        bundle
    }

    #[test]
    fn test_missing_registry_is_format_error() {
        let error = scan("console.log('hi');", &Config::default()).expect_err("no registry");
        assert_eq!(error.to_string(), "format error: registry not found");
    }

    #[test]
    fn test_excluded_modules_are_filtered() {
        let bundle = webpack5_bundle(&[
            ("./src/a.js", "const a = 1;"),
            ("./node_modules/lib/index.js", "const lib = 1;"),
            ("./src/b.js", "const b = 2;"),
            ("./node_modules/other/index.js", "const other = 1;"),
            ("./src/c.js", "const c = 3;"),
        ]);
        let output = scan(&bundle, &Config::default()).expect("scan succeeds");
        let paths: Vec<&str> = output.registry.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["./src/a.js", "./src/b.js", "./src/c.js"]);
        assert_eq!(output.registry.excluded_count(), 2);
    }

    #[test]
    fn test_only_excluded_modules_is_no_modules_found() {
        let bundle = webpack5_bundle(&[("./node_modules/lib/index.js", "const lib = 1;")]);
        let error = scan(&bundle, &Config::default()).expect_err("all filtered");
        assert!(matches!(error, UnbundleError::NoModulesFound { .. }));
    }

    #[test]
    fn test_body_with_close_marker_literal_is_intact() {
        let body = "const marker = \"/***/ })\";\nconst other = `\n/***/ })\n`;";
        let bundle = webpack5_bundle(&[("./src/a.js", body), ("./src/b.js", "const b = 2;")]);
        let output = scan(&bundle, &Config::default()).expect("scan succeeds");
        let record = output.registry.get("./src/a.js").expect("record present");
        assert_eq!(record.body.trim(), body);
        assert_eq!(
            record.params,
            vec![
                "__unused_webpack_module",
                "__webpack_exports__",
                "__webpack_require__"
            ]
        );
    }

    #[test]
    fn test_webpack4_function_wrappers() {
        let bundle = concat!(
            "/******/ (function(modules) { // webpackBootstrap\n",
            "/******/ \treturn __webpack_require__(__webpack_require__.s = \"./src/index.js\");\n",
            "/******/ })\n",
            "/************************************************************************/\n",
            "/******/ ({\n",
            "\n",
            "/***/ \"./src/index.js\":\n",
            "/*!**********************!*\\\n",
            "  !*** ./src/index.js ***!\n",
            "  \\**********************/\n",
            "/*! no exports provided */\n",
            "/***/ (function(module, __webpack_exports__, __webpack_require__) {\n",
            "\n",
            "\"use strict\";\n",
            "console.log(1);\n",
            "\n",
            "/***/ })\n",
            "\n",
            "/******/ });\n",
        );
        let output = scan(bundle, &Config::default()).expect("scan succeeds");
        assert_eq!(output.registry.len(), 1);
        let record = output.registry.get("./src/index.js").expect("record present");
        assert_eq!(record.body.trim(), "\"use strict\";\nconsole.log(1);");
        assert_eq!(record.params[0], "module");
    }

    #[test]
    fn test_minified_params_and_missing_close() {
        let bundle = concat!(
            "var __webpack_modules__ = ({\n",
            "/***/ \"./src/a.js\":\n",
            "/***/ ((e, t, n) => {\n",
            "n.r(t);\n",
            "/***/ \"./src/b.js\":\n",
            "/***/ (() => {\n",
            "console.log(2);\n",
            "/***/ })\n",
            "/******/ });\n",
        );
        let output = scan(bundle, &Config::default()).expect("scan succeeds");
        let a = output.registry.get("./src/a.js").expect("a present");
        assert_eq!(a.params, vec!["e", "t", "n"]);
        assert_eq!(a.body.trim(), "n.r(t);");
        let b = output.registry.get("./src/b.js").expect("b present");
        assert!(b.params.is_empty());
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].stage, Stage::Scan);
    }

    /// A registry holding `./src/a.js` followed by webpack 5's runtime and
    /// `startup`
    fn with_startup(startup: &str) -> String {
        let mut bundle = webpack5_bundle(&[("./src/a.js", "const a = 1;")]);
        bundle.truncate(bundle.len() - "/******/ })();\n".len());
        bundle.push_str(concat!(
            "/************************************************************************/\n",
            "/******/ \t// The module cache\n",
            "/******/ \tvar __webpack_module_cache__ = {};\n",
            "/******/ \t\n",
            "/************************************************************************/\n",
        ));
        bundle.push_str(startup);
        bundle.push_str("/******/ })()\n;\n");
        bundle
    }

    #[test]
    fn test_inlined_entry_modules_are_recovered() {
        let bundle = with_startup(concat!(
            "var __webpack_exports__ = {};\n",
            "// This entry need to be wrapped in an IIFE because it need to be isolated against other modules in the chunk.\n",
            "(() => {\n",
            "/*!**********************!*\\\n",
            "  !*** ./src/index.js ***!\n",
            "  \\**********************/\n",
            "console.log(\"index\");\n",
            "})();\n",
            "\n",
            "// This entry need to be wrapped in an IIFE because it need to be in strict mode.\n",
            "(() => {\n",
            "\"use strict\";\n",
            "/*!**********************!*\\\n",
            "  !*** ./src/other.js ***!\n",
            "  \\**********************/\n",
            "console.log(\"other\");\n",
            "})();\n",
            "\n",
        ));
        let output = scan(&bundle, &Config::default()).expect("scan succeeds");
        let paths: Vec<&str> = output.registry.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["./src/a.js", "./src/index.js", "./src/other.js"]);
        assert!(output.diagnostics.is_empty());

        let index = output.registry.get("./src/index.js").expect("index present");
        assert_eq!(index.body.trim(), "console.log(\"index\");");
        assert_eq!(index.wrapper_params().require, DEFAULT_REQUIRE_PARAM);
        let other = output.registry.get("./src/other.js").expect("other present");
        assert_eq!(other.body.trim(), "console.log(\"other\");");
    }

    #[test]
    fn test_unwrapped_inlined_entry() {
        let bundle = with_startup(concat!(
            "var __webpack_exports__ = {};\n",
            "/*!**********************!*\\\n",
            "  !*** ./src/index.js ***!\n",
            "  \\**********************/\n",
            "(function () {})();\n",
            "console.log(1);\n",
        ));
        let output = scan(&bundle, &Config::default()).expect("scan succeeds");
        let index = output.registry.get("./src/index.js").expect("index present");
        assert_eq!(index.body.trim(), "(function () {})();\nconsole.log(1);");
    }

    #[test]
    fn test_inlined_entry_without_banner_is_reported() {
        let bundle = with_startup(concat!(
            "var __webpack_exports__ = {};\n",
            "(() => {\n",
            "console.log(1);\n",
            "})();\n",
        ));
        let output = scan(&bundle, &Config::default()).expect("scan succeeds");
        assert_eq!(output.registry.len(), 1);
        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].stage, Stage::Scan);
    }

    #[test]
    fn test_excluded_inlined_entry() {
        let bundle = with_startup(concat!(
            "var __webpack_exports__ = {};\n",
            "/*!***********************************!*\\\n",
            "  !*** ./node_modules/app/index.js ***!\n",
            "  \\***********************************/\n",
            "console.log(1);\n",
        ));
        let output = scan(&bundle, &Config::default()).expect("scan succeeds");
        assert_eq!(output.registry.len(), 1);
        assert_eq!(output.registry.excluded_count(), 1);
    }

    #[test]
    fn test_duplicate_path_is_format_error() {
        let bundle = webpack5_bundle(&[("./src/a.js", "1;"), ("./src/a.js", "2;")]);
        let error = scan(&bundle, &Config::default()).expect_err("duplicate path");
        assert!(error.to_string().contains("duplicate module path"));
    }
}
