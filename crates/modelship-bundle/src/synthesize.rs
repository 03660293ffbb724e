//! Generated files merged into every deployment.
//!
//! The deploy descriptor always wins over a user file at the same path;
//! the readme is only added when the archive brought none. Both are plain
//! text rendered from their inputs alone, so the same bundle and timestamp
//! always produce the same bytes.

use chrono::{DateTime, SecondsFormat, Utc};
use modelship_core::FileBundle;
use serde::{Deserialize, Serialize};

pub const DEPLOY_CONFIG_PATH: &str = "render.yaml";
pub const README_PATH: &str = "README.md";

const FALLBACK_SERVICE_NAME: &str = "model-app";
const MAX_SERVICE_NAME_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestOptions {
    pub python_version: String,
    pub build_command: String,
    pub start_command: String,
}

impl Default for ManifestOptions {
    fn default() -> Self {
        Self {
            python_version: "3.11.0".to_string(),
            build_command: "pip install -r requirements.txt".to_string(),
            start_command:
                "streamlit run load_model.py --server.port $PORT --server.address 0.0.0.0"
                    .to_string(),
        }
    }
}

/// Service name derived from the archive filename: the stem, lowercased,
/// with every run of characters outside `[a-z0-9]` collapsed into `-`.
pub fn service_name(archive_filename: &str) -> String {
    let base = archive_filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(archive_filename);
    let lower = base.to_ascii_lowercase();
    let stem = [".tar.gz", ".tgz", ".zip"]
        .iter()
        .find_map(|ext| lower.strip_suffix(ext))
        .unwrap_or(&lower);

    let mut name = String::with_capacity(stem.len());
    for ch in stem.chars() {
        if ch.is_ascii_alphanumeric() {
            name.push(ch);
        } else if !name.ends_with('-') {
            name.push('-');
        }
    }
    let trimmed: String = name
        .trim_matches('-')
        .chars()
        .take(MAX_SERVICE_NAME_LEN)
        .collect();
    let trimmed = trimmed.trim_end_matches('-');
    if trimmed.is_empty() {
        FALLBACK_SERVICE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

fn yaml_quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

pub fn render_deploy_config(service: &str, options: &ManifestOptions) -> String {
    format!(
        "services:\n\
         \x20 - type: web\n\
         \x20   name: {name}\n\
         \x20   runtime: python\n\
         \x20   plan: free\n\
         \x20   buildCommand: {build}\n\
         \x20   startCommand: {start}\n\
         \x20   envVars:\n\
         \x20     - key: PYTHON_VERSION\n\
         \x20       value: {python}\n",
        name = yaml_quote(service),
        build = yaml_quote(&options.build_command),
        start = yaml_quote(&options.start_command),
        python = yaml_quote(&options.python_version),
    )
}

pub fn render_readme(
    service: &str,
    archive_filename: &str,
    archive_size: u64,
    paths: &[&str],
    generated_at: DateTime<Utc>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {service}\n\n"));
    out.push_str(&format!(
        "Model deployment generated from `{archive_filename}`.\n\n"
    ));
    out.push_str("## Files\n\n");
    for path in paths {
        out.push_str(&format!("- `{path}`\n"));
    }
    out.push('\n');
    out.push_str("## Details\n\n");
    out.push_str(&format!("- Archive size: {archive_size} bytes\n"));
    out.push_str(&format!(
        "- Generated: {}\n\n",
        generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    ));
    out.push_str("## Run locally\n\n");
    out.push_str("```bash\n");
    out.push_str("pip install -r requirements.txt\n");
    out.push_str("streamlit run load_model.py\n");
    out.push_str("```\n\n");
    out.push_str("## Deploy\n\n");
    out.push_str(&format!(
        "`{DEPLOY_CONFIG_PATH}` describes the web service; connect this repository to Render to deploy it.\n"
    ));
    out
}

/// Merge the generated deploy descriptor and, when needed, a readme into `bundle`.
///
/// The readme goes to exactly [`README_PATH`]: a freshly initialized
/// repository already holds one there, so any other spelling would leave
/// that file behind next to the user's.
pub fn synthesize_manifests(
    mut bundle: FileBundle,
    archive_filename: &str,
    archive_size: u64,
    generated_at: DateTime<Utc>,
    options: &ManifestOptions,
) -> FileBundle {
    let service = service_name(archive_filename);

    let config = render_deploy_config(&service, options);
    if bundle.insert(DEPLOY_CONFIG_PATH, config).is_some() {
        tracing::debug!("replaced user-supplied {DEPLOY_CONFIG_PATH}");
    }

    let paths: Vec<&str> = bundle.paths().collect();
    let readme = render_readme(&service, archive_filename, archive_size, &paths, generated_at);
    if !bundle.insert_if_absent(README_PATH, readme) {
        tracing::debug!("keeping user-supplied {README_PATH}");
    }

    bundle
}
