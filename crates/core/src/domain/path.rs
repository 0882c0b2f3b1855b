// Cross-platform path rendering
//
// Paths handled by the orchestrator usually belong to another machine (a worker that may run a
// different OS than the coordinator), so they are kept as strings and rendered per target
// platform instead of going through std::path.

use crate::domain::node::Platform;

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// Trim one trailing separator and convert every separator to the target platform convention.
pub fn normalize_path(path: &str, platform: Platform) -> String {
    let trimmed = match path.chars().last() {
        Some(c) if is_separator(c) => &path[..path.len() - 1],
        _ => path,
    };
    match platform {
        Platform::Windows => trimmed.replace('/', "\\"),
        Platform::Linux => trimmed.replace('\\', "/"),
    }
}

/// True for `/x`, `\x`, `\\server\share` and drive-qualified `C:\x` paths.
pub fn is_absolute(path: &str) -> bool {
    let mut chars = path.chars();
    match (chars.next(), chars.next()) {
        (Some(c), _) if is_separator(c) => true,
        (Some(drive), Some(':')) => drive.is_ascii_alphabetic(),
        _ => false,
    }
}

/// Append `child` to `base`. An absolute child replaces the base.
///
/// The joint uses `/`; callers run [`normalize_path`] before handing the result to a node.
pub fn join(base: &str, child: &str) -> String {
    if child.is_empty() {
        return base.to_string();
    }
    if base.is_empty() || is_absolute(child) {
        return child.to_string();
    }
    let base = base.trim_end_matches(is_separator);
    let child = child.trim_start_matches(is_separator);
    format!("{base}/{child}")
}

/// Strip `base` from the front of `path`, comparing separators loosely.
///
/// Returns the remainder in `/` form, or `None` when `path` is not below `base`.
pub fn relative_to(path: &str, base: &str) -> Option<String> {
    let path = normalize_path(path, Platform::Linux);
    let base = normalize_path(base, Platform::Linux);
    if base.is_empty() {
        return Some(path.trim_start_matches('/').to_string());
    }
    let rest = path.strip_prefix(base.as_str())?;
    if rest.is_empty() {
        return Some(String::new());
    }
    rest.strip_prefix('/').map(str::to_string)
}
