use serde::{Deserialize, Serialize};

use crate::id::ObjectHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileMode {
    Regular,
    Executable,
    Symlink,
    Directory,
}

impl FileMode {
    /// Octal mode string as written in git tree objects.
    pub fn as_git_mode(&self) -> &'static str {
        match self {
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
            FileMode::Symlink => "120000",
            FileMode::Directory => "40000",
        }
    }

    /// Object type the entry points at.
    pub fn object_type(&self) -> &'static str {
        match self {
            FileMode::Directory => "tree",
            _ => "blob",
        }
    }
}

/// One path in a tree, pointing at an object that already exists on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: FileMode,
    pub hash: ObjectHash,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, hash: ObjectHash) -> Self {
        Self {
            path: path.into(),
            mode: FileMode::Regular,
            hash,
        }
    }
}
