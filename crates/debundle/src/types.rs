//! Shared type definitions for the debundle crate
//!
//! Records produced by the bundle scanner and the transient bindings the
//! rewrite stages detect while they work on a single module body.

use std::hash::BuildHasherDefault;

use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHasher;

/// Type alias for FxHasher-based IndexMap
pub type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;
/// Type alias for FxHasher-based IndexSet
pub type FxIndexSet<T> = IndexSet<T, BuildHasherDefault<FxHasher>>;

/// Parameter names used when a wrapper declares fewer than three parameters
pub const DEFAULT_MODULE_PARAM: &str = "module";
pub const DEFAULT_EXPORTS_PARAM: &str = "__webpack_exports__";
pub const DEFAULT_REQUIRE_PARAM: &str = "__webpack_require__";

/// One module extracted from the bundle's module registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    /// Bundle-internal module key, e.g. `./src/a/B.js`
    pub path: String,
    /// Formal parameters of the wrapper function, in declaration order
    pub params: Vec<String>,
    /// Module body text between the wrapper's opening and closing braces
    pub body: String,
    /// Resolved paths of the dependencies found while rewriting imports
    pub dependencies: Vec<String>,
}

impl ModuleRecord {
    pub fn new(path: impl Into<String>, params: Vec<String>, body: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params,
            body: body.into(),
            dependencies: Vec::new(),
        }
    }

    /// The logical path with any leading `./` removed; this is the output key
    pub fn output_path(&self) -> &str {
        crate::path_resolver::strip_current_dir(&self.path)
    }

    /// Wrapper parameter names, falling back to webpack's defaults for
    /// positions the wrapper does not declare
    pub fn wrapper_params(&self) -> WrapperParams {
        let param = |index: usize, fallback: &str| {
            self.params
                .get(index)
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .unwrap_or(fallback)
                .to_owned()
        };
        WrapperParams {
            module: param(0, DEFAULT_MODULE_PARAM),
            exports: param(1, DEFAULT_EXPORTS_PARAM),
            require: param(2, DEFAULT_REQUIRE_PARAM),
        }
    }
}

/// The three bindings a module wrapper receives from the bundle runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WrapperParams {
    pub module: String,
    pub exports: String,
    pub require: String,
}

/// Shape of the import statement emitted for a dependency load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportKind {
    /// `import Name from '...'`
    Default,
    /// `import { A, B } from '...'`
    Named,
    /// Default import reached through the bundle's interop-default helper
    NamespaceDefaultWrapped,
}

impl std::fmt::Display for ImportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Named => write!(f, "named"),
            Self::NamespaceDefaultWrapped => write!(f, "namespace-default-wrapped"),
        }
    }
}

/// A dependency load detected inside one module body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Local variable the bundle bound the loaded module to
    pub local: String,
    /// Request string from the inline annotation comment, e.g. `./a/B.js`
    pub request: Option<String>,
    /// Bundle-internal path of the dependency
    pub resolved: String,
    pub kind: ImportKind,
}

/// Declaration form an exported local resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclarationKind {
    Class,
    Function,
    Variable,
    Default,
}

impl std::fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Class => write!(f, "class"),
            Self::Function => write!(f, "function"),
            Self::Variable => write!(f, "variable"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// An export registration detected inside one module body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBinding {
    /// Name consumers import the value under
    pub exported: String,
    /// Expression the registration's getter returns
    pub local: String,
    /// Filled in once the declaration scan has run
    pub kind: Option<DeclarationKind>,
}

/// Pipeline stage a diagnostic originates from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Scan,
    Imports,
    Exports,
    Finalize,
    Postcondition,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scan => write!(f, "scan"),
            Self::Imports => write!(f, "imports"),
            Self::Exports => write!(f, "exports"),
            Self::Finalize => write!(f, "finalize"),
            Self::Postcondition => write!(f, "postcondition"),
        }
    }
}

/// A per-module problem that did not stop the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub module: String,
    pub stage: Stage,
    pub message: String,
}

impl Diagnostic {
    pub fn new(module: impl Into<String>, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            stage,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.module, self.stage, self.message)
    }
}
