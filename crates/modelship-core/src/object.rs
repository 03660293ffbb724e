//! Git object framing for blobs, trees and commits.
//!
//! The host identifies every object by the digest of its framed bytes,
//! so identical content always frames (and hashes) identically.

use crate::id::ObjectHash;
use crate::types::{FileMode, TreeEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }
}

fn frame(kind: ObjectKind, body: &[u8]) -> Vec<u8> {
    let header = format!("{} {}\0", kind.as_str(), body.len());
    let mut result = Vec::with_capacity(header.len() + body.len());
    result.extend_from_slice(header.as_bytes());
    result.extend_from_slice(body);
    result
}

/// Blob format: "blob <size>\0<data>"
pub fn frame_blob(data: &[u8]) -> Vec<u8> {
    frame(ObjectKind::Blob, data)
}

/// Tree format: "tree <size>\0" followed by "<mode> <path>\0<raw digest>" per entry.
///
/// Entries are sorted the way git sorts them: directories compare as if
/// their name had a trailing slash.
pub fn frame_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut sorted: Vec<&TreeEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| sort_key(e));

    let mut body = Vec::new();
    for entry in sorted {
        body.extend_from_slice(entry.mode.as_git_mode().as_bytes());
        body.push(b' ');
        body.extend_from_slice(entry.path.as_bytes());
        body.push(0);
        body.extend_from_slice(&entry.hash.to_bytes());
    }
    frame(ObjectKind::Tree, &body)
}

fn sort_key(entry: &TreeEntry) -> String {
    if entry.mode == FileMode::Directory {
        format!("{}/", entry.path)
    } else {
        entry.path.clone()
    }
}

/// Signature line data for commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub timestamp_secs: i64,
}

/// Commit format:
/// tree <hex>
/// parent <hex>  (one per parent)
/// author <name> <email> <timestamp> +0000
/// committer <name> <email> <timestamp> +0000
///
/// <message>
pub fn frame_commit(
    tree: &ObjectHash,
    parents: &[ObjectHash],
    signature: &Signature,
    message: &str,
) -> Vec<u8> {
    let mut content = String::new();
    content.push_str(&format!("tree {tree}\n"));
    for parent in parents {
        content.push_str(&format!("parent {parent}\n"));
    }
    let who = format!(
        "{} <{}> {} +0000",
        signature.name, signature.email, signature.timestamp_secs
    );
    content.push_str(&format!("author {who}\n"));
    content.push_str(&format!("committer {who}\n"));
    content.push('\n');
    content.push_str(message);
    if !message.ends_with('\n') {
        content.push('\n');
    }
    frame(ObjectKind::Commit, content.as_bytes())
}
