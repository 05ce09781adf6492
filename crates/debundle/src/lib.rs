//! Recovers the individual ES modules packed into a webpack bundle
//!
//! [`unbundle`] scans the bundle's module registry, rewrites each
//! application module's loader calls and export registrations into `import`
//! and `export` syntax, and strips the remaining runtime boilerplate.
//! [`writer::write_modules`] lays the results out on disk.

pub mod bundle_scanner;
pub mod config;
pub mod error;
pub mod export_rewriter;
pub mod finalizer;
pub mod import_rewriter;
pub mod module_registry;
pub mod path_resolver;
pub mod pipeline;
pub mod runtime_patterns;
pub mod syntax;
pub mod types;
pub mod writer;

pub use config::Config;
pub use error::UnbundleError;
pub use pipeline::{ModuleOutput, Pipeline, UnbundleOutput, unbundle};
pub use types::{Diagnostic, Stage};
