//! Patterns for the bundle runtime's boilerplate inside one module body
//!
//! Wrapper parameters are not fixed (minified bundles pass `e, t, n`), so the
//! patterns are compiled from the parameter names each record declares.

use regex::{Regex, escape};

use crate::types::WrapperParams;

/// Optional `/* harmony ... */` marker webpack prints before runtime calls
const HARMONY_MARKER: &str = r"(?:/\*[ \t]*harmony [^*]*\*/[ \t]*)?";
/// Optional `/*#__PURE__*/` annotation
const PURE_MARKER: &str = r"(?:/\*#__PURE__\*/[ \t]*)?";
/// `/*! request */` annotation; group captures the request
const REQUEST_ANNOTATION: &str = r"/\*!?[ \t]*(.*?)[ \t]*\*/";
/// A quoted module path; one of the two groups captures it
const QUOTED_PATH: &str = r#"(?:"([^"\n]*)"|'([^'\n]*)')"#;
/// Trailing blanks and the line break, consumed with the statement
const LINE_END: &str = r"[ \t]*(?:\r?\n)?";
const IDENT: &str = r"[A-Za-z_$][\w$]*";

/// Compiled boilerplate patterns for one set of wrapper parameters
#[derive(Debug, Clone)]
pub struct RuntimePatterns {
    pub params: WrapperParams,
    /// `var local = require(/*! request */ "path");`
    pub annotated_load: Regex,
    /// `require(/*! request */ "path");` as a bare statement
    pub side_effect_load: Regex,
    /// `var local_default = require.n(local);`
    pub interop_wrapper: Regex,
    /// `require.d(exports, {` opening an object registration
    pub export_object: Regex,
    /// `require.d(exports, "name", ` opening a single registration
    pub export_single: Regex,
    /// `exports["default"] = ` at the start of a statement
    pub default_export_assign: Regex,
    /// `module.exports = ` at the module's top level
    pub module_exports: Regex,
    /// `exports.name = ` at the module's top level
    pub exports_member: Regex,
    /// `require.r(exports);`
    pub namespace_marker: Regex,
    /// `module = require.nmd(module);` and the harmony-module variant
    pub module_decorator: Regex,
    /// `Object.defineProperty(exports, "__esModule", { value: true });`
    pub es_module_marker: Regex,
    /// Any direct call of the loader; group 1 is the loader name
    pub loader_call: Regex,
}

impl RuntimePatterns {
    pub fn new(params: &WrapperParams) -> Result<Self, regex::Error> {
        let module = escape(&params.module);
        let exports = escape(&params.exports);
        let require = escape(&params.require);

        Ok(Self {
            params: params.clone(),
            annotated_load: Regex::new(&format!(
                r"(?m)^[ \t]*{HARMONY_MARKER}(?:var|let|const)[ \t]+({IDENT})[ \t]*=[ \t]*{PURE_MARKER}{require}\([ \t]*{REQUEST_ANNOTATION}[ \t]*{QUOTED_PATH}[ \t]*\)[ \t]*;?{LINE_END}"
            ))?,
            side_effect_load: Regex::new(&format!(
                r"(?m)^[ \t]*{HARMONY_MARKER}{require}\([ \t]*{REQUEST_ANNOTATION}[ \t]*{QUOTED_PATH}[ \t]*\)[ \t]*;{LINE_END}"
            ))?,
            interop_wrapper: Regex::new(&format!(
                r"(?m)^[ \t]*{HARMONY_MARKER}(?:var|let|const)[ \t]+({IDENT})[ \t]*=[ \t]*{PURE_MARKER}{require}\.n\([ \t]*({IDENT})[ \t]*\)[ \t]*;?{LINE_END}"
            ))?,
            export_object: Regex::new(&format!(
                r"(?m)^[ \t]*{HARMONY_MARKER}{require}\.d(\()[ \t]*{exports}[ \t]*,[ \t]*\{{"
            ))?,
            export_single: Regex::new(&format!(
                r"(?m)^[ \t]*{HARMONY_MARKER}{require}\.d(\()[ \t]*{exports}[ \t]*,[ \t]*{QUOTED_PATH}[ \t]*,"
            ))?,
            default_export_assign: Regex::new(&format!(
                r#"(?m)^([ \t]*){HARMONY_MARKER}{exports}\[[ \t]*["']default["'][ \t]*\][ \t]*=[ \t]*"#
            ))?,
            module_exports: Regex::new(&format!(r"(?m)^{module}\.exports[ \t]*=[ \t]*"))?,
            exports_member: Regex::new(&format!(r"(?m)^{exports}\.({IDENT})[ \t]*=[ \t]*"))?,
            namespace_marker: Regex::new(&format!(
                r"(?m)^[ \t]*{require}\.r\([ \t]*{exports}[ \t]*\)[ \t]*;?{LINE_END}"
            ))?,
            module_decorator: Regex::new(&format!(
                r"(?m)^[ \t]*(?:/\*[ \t]*module decorator[ \t]*\*/[ \t]*)?{module}[ \t]*=[ \t]*{PURE_MARKER}{require}\.[hn]md\([ \t]*{module}[ \t]*\)[ \t]*;?{LINE_END}"
            ))?,
            es_module_marker: Regex::new(&format!(
                r#"(?m)^[ \t]*(?:Object\.defineProperty\([ \t]*{exports}[ \t]*,[ \t]*["']__esModule["'][ \t]*,[ \t]*\{{[ \t]*value:[ \t]*(?:true|!0)[ \t]*\}}[ \t]*\)|{exports}\.__esModule[ \t]*=[ \t]*(?:true|!0))[ \t]*;?{LINE_END}"#
            ))?,
            loader_call: Regex::new(&format!(r"(?:^|[^\w$.])({require})[ \t]*\("))?,
        })
    }

    /// Quoted path from a match of a pattern ending in [`QUOTED_PATH`]
    pub fn quoted_path<'h>(
        captures: &regex::Captures<'h>,
        double: usize,
        single: usize,
    ) -> Option<&'h str> {
        captures
            .get(double)
            .or_else(|| captures.get(single))
            .map(|m| m.as_str())
    }
}
