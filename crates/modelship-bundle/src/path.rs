use crate::BundleError;

/// Normalize an archive entry name into a bundle path.
///
/// Backslashes become forward slashes, leading `./` and `/` go away and
/// empty or `.` components are dropped. `..` is rejected outright. An
/// entry that normalizes to nothing yields an empty string.
pub fn normalize(raw: &str) -> Result<String, BundleError> {
    let unified = raw.replace('\\', "/");
    let mut parts = Vec::new();
    for component in unified.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(BundleError::UnsafePath(raw.to_string())),
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// Files that archivers add on their own and that never belong in a deployment.
pub fn is_platform_junk(path: &str) -> bool {
    let first = path.split('/').next().unwrap_or("");
    let last = path.rsplit('/').next().unwrap_or("");
    first == "__MACOSX" || last == ".DS_Store"
}

/// When every file lives under the same top-level directory, drop that directory.
pub fn strip_shared_root(files: Vec<(String, Vec<u8>)>) -> Vec<(String, Vec<u8>)> {
    let root = match files.first().and_then(|(p, _)| p.split_once('/')) {
        Some((root, _)) => root.to_string(),
        None => return files,
    };
    let prefix = format!("{root}/");
    if !files.iter().all(|(p, _)| p.starts_with(&prefix)) {
        return files;
    }
    files
        .into_iter()
        .map(|(p, c)| (p[prefix.len()..].to_string(), c))
        .collect()
}
