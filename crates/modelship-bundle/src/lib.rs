pub mod error;
pub mod extract;
pub mod path;
pub mod synthesize;

pub use error::BundleError;
pub use extract::{extract_archive, BundleLimits, REQUIRED_ENTRIES};
pub use synthesize::{synthesize_manifests, ManifestOptions, DEPLOY_CONFIG_PATH, README_PATH};
