//! Relative import specifiers between bundle-internal module paths
//!
//! Logical paths always use `/` separators regardless of the host platform,
//! so resolution works on path segments rather than `std::path`.

/// Script extensions removed when `strip-import-extensions` is enabled
const SCRIPT_EXTENSIONS: &[&str] = &[".js", ".jsx", ".mjs", ".cjs", ".ts", ".tsx"];

/// Remove every leading `./` from a logical path
pub fn strip_current_dir(path: &str) -> &str {
    let mut stripped = path;
    while let Some(rest) = stripped.strip_prefix("./") {
        stripped = rest;
    }
    stripped
}

/// Split a logical path into segments, folding `.` and `..`
///
/// A `..` that would climb above the first segment is kept as-is.
fn normalize_segments(path: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.last().is_some_and(|last| *last != "..") {
                    segments.pop();
                } else {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }
    segments
}

/// Compute the specifier that imports `to` from a module located at `from`
///
/// The result always starts with `./` or `../`.
pub fn resolve(from: &str, to: &str) -> String {
    let from_segments = normalize_segments(strip_current_dir(from));
    let to_segments = normalize_segments(strip_current_dir(to));

    let from_dir = &from_segments[..from_segments.len().saturating_sub(1)];

    // The target's file name is never part of the shared directory prefix
    let shared = from_dir
        .iter()
        .zip(&to_segments)
        .take_while(|(a, b)| a == b)
        .count()
        .min(to_segments.len().saturating_sub(1));

    let mut parts = vec![".."; from_dir.len() - shared];
    parts.extend_from_slice(&to_segments[shared..]);
    let joined = parts.join("/");

    if joined.starts_with("../") || joined == ".." {
        joined
    } else {
        format!("./{joined}")
    }
}

/// Drop a trailing script extension from a specifier
pub fn strip_script_extension(specifier: &str) -> &str {
    SCRIPT_EXTENSIONS
        .iter()
        .find_map(|ext| specifier.strip_suffix(ext))
        .filter(|rest| !rest.is_empty() && !rest.ends_with('/'))
        .unwrap_or(specifier)
}

/// Whether `path` lies under `prefix`, ignoring leading `./` on both sides
pub fn has_path_prefix(path: &str, prefix: &str) -> bool {
    let prefix = strip_current_dir(prefix);
    !prefix.is_empty() && strip_current_dir(path).starts_with(prefix)
}
