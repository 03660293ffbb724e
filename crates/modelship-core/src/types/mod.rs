pub mod bundle;
pub mod repository;
pub mod tree;

pub use bundle::FileBundle;
pub use repository::{BranchHead, RepositoryDescriptor, Visibility};
pub use tree::{FileMode, TreeEntry};
