use serde::{Deserialize, Serialize};

use crate::id::ObjectHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn is_private(&self) -> bool {
        matches!(self, Visibility::Private)
    }
}

/// A repository as reported by the host right after creation or lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    pub name: String,
    pub owner_login: String,
    pub default_branch: String,
    pub html_url: String,
    pub full_name: String,
}

/// Tip of a branch: the commit a ref points at and that commit's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchHead {
    pub commit: ObjectHash,
    pub tree: ObjectHash,
}
