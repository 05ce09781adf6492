//! Unbundling pipeline
//!
//! The scanner runs once over the whole bundle; every record then goes
//! through imports, exports and finalization independently of all others.
//! Records are processed on a rayon pool and collected back in scan order.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::{
    bundle_scanner,
    config::Config,
    error::UnbundleError,
    export_rewriter::rewrite_exports,
    finalizer::{check_residuals, finalize},
    import_rewriter::{ImportContext, rewrite_imports},
    runtime_patterns::RuntimePatterns,
    types::{Diagnostic, ExportBinding, FxIndexMap, ImportBinding, ModuleRecord, Stage, WrapperParams},
};

/// Reconstructed source for one module
#[derive(Debug, Clone)]
pub struct ModuleOutput {
    /// Bundle-internal path the module came from
    pub path: String,
    /// Where the module is written, relative to the output directory
    pub output_path: String,
    pub text: String,
    pub imports: Vec<ImportBinding>,
    pub exports: Vec<ExportBinding>,
    /// Resolved paths of the module's dependencies
    pub dependencies: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Everything one run produces
#[derive(Debug, Default)]
pub struct UnbundleOutput {
    /// Output path (logical path without `./`) to module text, in scan order
    pub modules: FxIndexMap<String, String>,
    /// Per-module results, in scan order
    pub details: Vec<ModuleOutput>,
    /// Local problems from every stage, scanner first
    pub diagnostics: Vec<Diagnostic>,
    /// Number of registry entries dropped by the excluded-path filter
    pub excluded: usize,
}

/// A configured unbundling run
#[derive(Debug, Clone)]
pub struct Pipeline<'a> {
    config: &'a Config,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            cancel_flag: None,
        }
    }

    /// Check `flag` before each module; once set the run stops with
    /// [`UnbundleError::Cancelled`]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Scan `text` and rewrite every application module it contains
    pub fn run(&self, text: &str) -> Result<UnbundleOutput, UnbundleError> {
        let scan = bundle_scanner::scan(text, self.config)?;
        let excluded = scan.registry.excluded_count();
        let mut diagnostics = scan.diagnostics;
        let records = scan.registry.into_records();

        // Records sharing wrapper parameters share compiled patterns
        let mut patterns: FxIndexMap<WrapperParams, RuntimePatterns> = FxIndexMap::default();
        for record in &records {
            let params = record.wrapper_params();
            if !patterns.contains_key(&params) {
                let compiled = RuntimePatterns::new(&params)?;
                patterns.insert(params, compiled);
            }
        }
        debug!(
            "Rewriting {} modules with {} wrapper signatures",
            records.len(),
            patterns.len()
        );

        let process = || {
            records
                .into_par_iter()
                .map(|record| {
                    if self.is_cancelled() {
                        return Err(UnbundleError::Cancelled);
                    }
                    let params = record.wrapper_params();
                    let Some(patterns) = patterns.get(&params) else {
                        return Err(UnbundleError::Format(format!(
                            "no patterns compiled for `{}`",
                            record.path
                        )));
                    };
                    process_module(record, patterns, self.config)
                })
                .collect::<Result<Vec<ModuleOutput>, UnbundleError>>()
        };

        let details = match self.config.jobs {
            Some(jobs) => rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()?
                .install(process)?,
            None => process()?,
        };

        let mut modules = FxIndexMap::default();
        for module in &details {
            for diagnostic in &module.diagnostics {
                warn!("{diagnostic}");
            }
            diagnostics.extend(module.diagnostics.iter().cloned());

            let output_path = &module.output_path;
            if modules.contains_key(output_path) {
                let diagnostic = Diagnostic::new(
                    &module.path,
                    Stage::Finalize,
                    format!("output path `{output_path}` already taken; module skipped"),
                );
                warn!("{diagnostic}");
                diagnostics.push(diagnostic);
                continue;
            }
            modules.insert(output_path.clone(), module.text.clone());
        }

        info!(
            "Recovered {} modules ({} excluded, {} diagnostics)",
            modules.len(),
            excluded,
            diagnostics.len()
        );
        Ok(UnbundleOutput {
            modules,
            details,
            diagnostics,
            excluded,
        })
    }
}

/// Rewrite one record into reconstructed module source
pub fn process_module(
    mut record: ModuleRecord,
    patterns: &RuntimePatterns,
    config: &Config,
) -> Result<ModuleOutput, UnbundleError> {
    let ctx = ImportContext {
        module_path: &record.path,
        patterns,
        config,
    };
    let imports = rewrite_imports(std::mem::take(&mut record.body), &ctx);
    let exports = rewrite_exports(imports.body, &record.path, patterns)?;

    let body = finalize(exports.body, patterns);
    let text = match (imports.imports.is_empty(), body.is_empty()) {
        (true, _) => body,
        (false, true) => imports.imports.join("\n"),
        (false, false) => format!("{}\n\n{body}", imports.imports.join("\n")),
    };

    let mut diagnostics = imports.diagnostics;
    diagnostics.extend(exports.diagnostics);
    diagnostics.extend(check_residuals(&text, &record.path, patterns));

    record.dependencies = imports.dependencies;
    let output_path = record.output_path().to_owned();
    Ok(ModuleOutput {
        path: record.path,
        output_path,
        text,
        imports: imports.bindings,
        exports: exports.bindings,
        dependencies: record.dependencies,
        diagnostics,
    })
}

/// Run the whole pipeline over `text` with `config`
pub fn unbundle(text: &str, config: &Config) -> Result<UnbundleOutput, UnbundleError> {
    Pipeline::new(config).run(text)
}
