pub mod error;
pub mod hash;
pub mod id;
pub mod object;
pub mod types;

pub use error::CoreError;
pub use hash::{content_hash, fingerprint_bundle};
pub use id::ObjectHash;
pub use types::{
    BranchHead, FileBundle, FileMode, RepositoryDescriptor, TreeEntry, Visibility,
};
