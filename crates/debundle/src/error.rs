//! Fatal errors surfaced to callers of the unbundling pipeline
//!
//! Per-module problems never become errors; they are reported as
//! [`Diagnostic`](crate::types::Diagnostic) values instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum UnbundleError {
    /// The input is not a bundle this crate understands
    #[error("format error: {0}")]
    Format(String),

    /// Every record was filtered out or the registry held no modules
    #[error("no application modules found (excluded prefix `{prefix}`)")]
    NoModulesFound { prefix: String },

    /// The caller's cancellation flag was set between modules
    #[error("unbundling cancelled")]
    Cancelled,

    #[error("invalid rewrite pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl UnbundleError {
    pub(crate) fn registry_not_found() -> Self {
        Self::Format("registry not found".to_owned())
    }

    /// Whether the error means the input was not the expected bundle format
    pub fn is_format_mismatch(&self) -> bool {
        matches!(self, Self::Format(_) | Self::NoModulesFound { .. })
    }
}
