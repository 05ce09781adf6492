//! Writes recovered modules to an output directory

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::types::FxIndexMap;

/// Whether `logical` stays inside the output directory once joined to it
fn is_contained(logical: &str) -> bool {
    Path::new(logical)
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

/// Write every `(output path, text)` pair below `out_dir`
///
/// Parent directories are created as needed and each file ends with a
/// newline. With `clean` set, an existing `out_dir` is removed first. Paths
/// that would leave `out_dir` are skipped with a warning. Returns the files
/// written, in input order.
pub fn write_modules(
    out_dir: &Path,
    modules: &FxIndexMap<String, String>,
    clean: bool,
) -> Result<Vec<PathBuf>> {
    if clean && out_dir.exists() {
        debug!("Removing stale output directory {}", out_dir.display());
        std::fs::remove_dir_all(out_dir).with_context(|| {
            format!("Failed to clean output directory: {}", out_dir.display())
        })?;
    }
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let mut written = Vec::with_capacity(modules.len());
    for (logical, text) in modules {
        if logical.is_empty() || !is_contained(logical) {
            warn!("Skipping module with unsafe output path `{logical}`");
            continue;
        }
        let target = out_dir.join(logical);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let mut contents = text.clone();
        if !contents.ends_with('\n') {
            contents.push('\n');
        }
        std::fs::write(&target, contents)
            .with_context(|| format!("Failed to write module: {}", target.display()))?;
        debug!("Wrote {}", target.display());
        written.push(target);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;

    fn modules(entries: &[(&str, &str)]) -> FxIndexMap<String, String> {
        entries
            .iter()
            .map(|(path, text)| ((*path).to_owned(), (*text).to_owned()))
            .collect()
    }

    #[test]
    fn test_writes_nested_files_with_trailing_newline() {
        let dir = TempDir::new().expect("temp dir");
        let out = dir.path().join("out");
        let written = write_modules(
            &out,
            &modules(&[("src/a/B.js", "export const b = 1;"), ("src/Main.js", "")]),
            false,
        )
        .expect("write succeeds");
        assert_eq!(written, vec![out.join("src/a/B.js"), out.join("src/Main.js")]);
        assert_eq!(
            std::fs::read_to_string(out.join("src/a/B.js")).expect("read back"),
            "export const b = 1;\n"
        );
    }

    #[test]
    fn test_refuses_escaping_paths() {
        let dir = TempDir::new().expect("temp dir");
        let out = dir.path().join("out");
        let written = write_modules(
            &out,
            &modules(&[("../evil.js", "x"), ("/abs.js", "x"), ("ok.js", "x")]),
            false,
        )
        .expect("write succeeds");
        assert_eq!(written, vec![out.join("ok.js")]);
        assert!(!dir.path().join("evil.js").exists());
    }

    #[test]
    fn test_clean_removes_stale_files() {
        let dir = TempDir::new().expect("temp dir");
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).expect("create out");
        std::fs::write(out.join("stale.js"), "old").expect("write stale");

        write_modules(&out, &modules(&[("fresh.js", "new")]), true).expect("write succeeds");
        assert!(!out.join("stale.js").exists());
        assert!(out.join("fresh.js").exists());

        std::fs::write(out.join("kept.js"), "old").expect("write kept");
        write_modules(&out, &modules(&[("fresh.js", "new")]), false).expect("write succeeds");
        assert!(out.join("kept.js").exists());
    }
}
