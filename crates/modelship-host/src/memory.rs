//! Deterministic in-memory [`RepositoryHost`].
//!
//! Objects are addressed exactly the way a sha256 git store addresses them,
//! so identical content yields identical hashes across calls and
//! repositories. Faults and readiness lag can be injected through
//! [`MemoryHostOptions`], and every call is recorded for inspection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use modelship_core::object::{frame_blob, frame_commit, frame_tree, Signature};
use modelship_core::{content_hash, BranchHead, ObjectHash, RepositoryDescriptor, TreeEntry};
use tokio::sync::Mutex;

use crate::host::{NewRepository, RepositoryHost};
use crate::throttle::Admission;
use crate::HostError;

const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";

#[derive(Debug, Clone)]
pub struct MemoryHostOptions {
    pub owner: String,
    pub default_branch: String,
    /// Branch reads answer `NotFound` this many times after a repository is created.
    pub ready_after_reads: u32,
    /// Every call fails with `Unauthorized`.
    pub reject_credentials: bool,
    /// `create_blob` fails for content containing this byte string.
    pub fail_blob_containing: Option<Vec<u8>>,
    /// Simulated latency of each `create_blob` call.
    pub blob_latency: Option<Duration>,
    /// `update_ref` fails for every call.
    pub fail_ref_updates: bool,
}

impl Default for MemoryHostOptions {
    fn default() -> Self {
        Self {
            owner: "modelship-bot".to_string(),
            default_branch: "main".to_string(),
            ready_after_reads: 0,
            reject_credentials: false,
            fail_blob_containing: None,
            blob_latency: None,
            fail_ref_updates: false,
        }
    }
}

/// One recorded call against the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    CreateRepository(String),
    GetRepository(String),
    GetBranchRef(String),
    CreateBlob(String),
    CreateTree(String),
    CreateCommit(String),
    UpdateRef { repo: String, force: bool },
}

#[derive(Debug, Clone)]
struct CommitRecord {
    tree: ObjectHash,
    parents: Vec<ObjectHash>,
    message: String,
}

#[derive(Debug)]
struct MemoryRepo {
    descriptor: RepositoryDescriptor,
    blobs: HashMap<ObjectHash, Bytes>,
    trees: HashMap<ObjectHash, BTreeMap<String, TreeEntry>>,
    commits: HashMap<ObjectHash, CommitRecord>,
    refs: HashMap<String, ObjectHash>,
    pending_reads: u32,
}

impl MemoryRepo {
    fn is_ancestor(&self, ancestor: &ObjectHash, of: &ObjectHash) -> bool {
        let mut stack = vec![of.clone()];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if &id == ancestor {
                return true;
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(record) = self.commits.get(&id) {
                stack.extend(record.parents.iter().cloned());
            }
        }
        false
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    repos: BTreeMap<String, MemoryRepo>,
    calls: Vec<HostCall>,
    clock: i64,
}

#[derive(Debug)]
pub struct MemoryHost {
    options: MemoryHostOptions,
    state: Mutex<MemoryState>,
    blobs_in_flight: AtomicUsize,
    peak_blobs_in_flight: AtomicUsize,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new(MemoryHostOptions::default())
    }
}

fn store_tree(repo: &mut MemoryRepo, entries: BTreeMap<String, TreeEntry>) -> ObjectHash {
    let list: Vec<TreeEntry> = entries.values().cloned().collect();
    let id = content_hash(&frame_tree(&list));
    repo.trees.insert(id.clone(), entries);
    id
}

fn store_commit(
    repo: &mut MemoryRepo,
    clock: i64,
    tree: &ObjectHash,
    parents: &[ObjectHash],
    message: &str,
) -> ObjectHash {
    let signature = Signature {
        name: "memory-host".to_string(),
        email: "memory-host@localhost".to_string(),
        timestamp_secs: clock,
    };
    let id = content_hash(&frame_commit(tree, parents, &signature, message));
    repo.commits.insert(
        id.clone(),
        CommitRecord {
            tree: tree.clone(),
            parents: parents.to_vec(),
            message: message.to_string(),
        },
    );
    id
}

fn repo_mut<'a>(state: &'a mut MemoryState, name: &str) -> Result<&'a mut MemoryRepo, HostError> {
    state
        .repos
        .get_mut(name)
        .ok_or_else(|| HostError::NotFound(format!("repository {name}")))
}

fn unprocessable(endpoint: &str, body: impl Into<String>) -> HostError {
    HostError::Api {
        endpoint: endpoint.to_string(),
        status: 422,
        body: body.into(),
    }
}

impl MemoryHost {
    pub fn new(options: MemoryHostOptions) -> Self {
        Self {
            options,
            state: Mutex::new(MemoryState::default()),
            blobs_in_flight: AtomicUsize::new(0),
            peak_blobs_in_flight: AtomicUsize::new(0),
        }
    }

    async fn record(&self, call: HostCall) -> Result<(), HostError> {
        self.state.lock().await.calls.push(call);
        if self.options.reject_credentials {
            return Err(HostError::Unauthorized("Bad credentials".to_string()));
        }
        Ok(())
    }

    pub async fn calls(&self) -> Vec<HostCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn repository_names(&self) -> Vec<String> {
        self.state.lock().await.repos.keys().cloned().collect()
    }

    /// Commit a branch points at, bypassing readiness lag.
    pub async fn branch_head(&self, repo: &str, branch: &str) -> Option<ObjectHash> {
        let state = self.state.lock().await;
        state.repos.get(repo)?.refs.get(branch).cloned()
    }

    /// Paths in the tree of `commit`.
    pub async fn commit_paths(&self, repo: &str, commit: &ObjectHash) -> Option<Vec<String>> {
        let state = self.state.lock().await;
        let repo = state.repos.get(repo)?;
        let record = repo.commits.get(commit)?;
        let tree = repo.trees.get(&record.tree)?;
        Some(tree.keys().cloned().collect())
    }

    /// Entries of the tree of `commit`, sorted by path.
    pub async fn commit_entries(&self, repo: &str, commit: &ObjectHash) -> Option<Vec<TreeEntry>> {
        let state = self.state.lock().await;
        let repo = state.repos.get(repo)?;
        let record = repo.commits.get(commit)?;
        Some(repo.trees.get(&record.tree)?.values().cloned().collect())
    }

    pub async fn commit_message(&self, repo: &str, commit: &ObjectHash) -> Option<String> {
        let state = self.state.lock().await;
        Some(state.repos.get(repo)?.commits.get(commit)?.message.clone())
    }

    pub async fn commit_parents(&self, repo: &str, commit: &ObjectHash) -> Option<Vec<ObjectHash>> {
        let state = self.state.lock().await;
        Some(state.repos.get(repo)?.commits.get(commit)?.parents.clone())
    }

    /// Content of `path` as published on `branch`.
    pub async fn read_file(&self, repo: &str, branch: &str, path: &str) -> Option<Bytes> {
        let state = self.state.lock().await;
        let repo = state.repos.get(repo)?;
        let head = repo.refs.get(branch)?;
        let tree = repo.trees.get(&repo.commits.get(head)?.tree)?;
        repo.blobs.get(&tree.get(path)?.hash).cloned()
    }

    /// Most `create_blob` calls observed running at the same time.
    pub fn peak_blob_concurrency(&self) -> usize {
        self.peak_blobs_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryHost for MemoryHost {
    fn bounded(self: Arc<Self>, _admission: Admission) -> Arc<dyn RepositoryHost> {
        self
    }

    async fn create_repository(
        &self,
        request: &NewRepository,
    ) -> Result<RepositoryDescriptor, HostError> {
        self.record(HostCall::CreateRepository(request.name.clone())).await?;
        let mut state = self.state.lock().await;
        if state.repos.contains_key(&request.name) {
            return Err(HostError::Conflict(format!(
                "name already exists on this account: {}",
                request.name
            )));
        }

        let owner = &self.options.owner;
        let branch = self.options.default_branch.clone();
        let descriptor = RepositoryDescriptor {
            name: request.name.clone(),
            owner_login: owner.clone(),
            default_branch: branch.clone(),
            html_url: format!("https://memory.host/{owner}/{}", request.name),
            full_name: format!("{owner}/{}", request.name),
        };

        state.clock += 1;
        let clock = state.clock;
        let mut repo = MemoryRepo {
            descriptor: descriptor.clone(),
            blobs: HashMap::new(),
            trees: HashMap::new(),
            commits: HashMap::new(),
            refs: HashMap::new(),
            pending_reads: self.options.ready_after_reads,
        };

        if request.initialize {
            let readme = Bytes::from(format!("# {}\n", request.name));
            let blob = content_hash(&frame_blob(&readme));
            repo.blobs.insert(blob.clone(), readme);
            let mut entries = BTreeMap::new();
            entries.insert("README.md".to_string(), TreeEntry::blob("README.md", blob));
            let tree = store_tree(&mut repo, entries);
            let commit = store_commit(&mut repo, clock, &tree, &[], INITIAL_COMMIT_MESSAGE);
            repo.refs.insert(branch, commit);
        }

        state.repos.insert(request.name.clone(), repo);
        Ok(descriptor)
    }

    async fn get_repository(&self, name: &str) -> Result<Option<RepositoryDescriptor>, HostError> {
        self.record(HostCall::GetRepository(name.to_string())).await?;
        let state = self.state.lock().await;
        Ok(state.repos.get(name).map(|r| r.descriptor.clone()))
    }

    async fn get_branch_ref(
        &self,
        repo: &RepositoryDescriptor,
        branch: &str,
    ) -> Result<BranchHead, HostError> {
        self.record(HostCall::GetBranchRef(repo.name.clone())).await?;
        let mut state = self.state.lock().await;
        let repo = repo_mut(&mut state, &repo.name)?;
        if repo.pending_reads > 0 {
            repo.pending_reads -= 1;
            return Err(HostError::NotFound("Git Repository is empty.".to_string()));
        }
        let commit = repo
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| HostError::NotFound(format!("branch {branch}")))?;
        let tree = repo
            .commits
            .get(&commit)
            .map(|c| c.tree.clone())
            .ok_or_else(|| HostError::NotFound(format!("commit {commit}")))?;
        Ok(BranchHead { commit, tree })
    }

    async fn create_blob(
        &self,
        repo: &RepositoryDescriptor,
        content: &[u8],
    ) -> Result<ObjectHash, HostError> {
        self.record(HostCall::CreateBlob(repo.name.clone())).await?;

        let now = self.blobs_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_blobs_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(latency) = self.options.blob_latency {
            tokio::time::sleep(latency).await;
        }
        self.blobs_in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(needle) = &self.options.fail_blob_containing {
            if content.windows(needle.len()).any(|w| w == needle.as_slice()) {
                return Err(HostError::Api {
                    endpoint: "create_blob".to_string(),
                    status: 500,
                    body: "injected blob failure".to_string(),
                });
            }
        }

        let id = content_hash(&frame_blob(content));
        let mut state = self.state.lock().await;
        let repo = repo_mut(&mut state, &repo.name)?;
        repo.blobs
            .entry(id.clone())
            .or_insert_with(|| Bytes::copy_from_slice(content));
        Ok(id)
    }

    async fn create_tree(
        &self,
        repo: &RepositoryDescriptor,
        base_tree: &ObjectHash,
        entries: &[TreeEntry],
    ) -> Result<ObjectHash, HostError> {
        self.record(HostCall::CreateTree(repo.name.clone())).await?;
        let mut state = self.state.lock().await;
        let repo = repo_mut(&mut state, &repo.name)?;

        let mut merged = repo
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| unprocessable("create_tree", format!("base_tree {base_tree} not found")))?;
        for entry in entries {
            if !repo.blobs.contains_key(&entry.hash) {
                return Err(unprocessable(
                    "create_tree",
                    format!("tree.sha {} is not a valid blob", entry.hash),
                ));
            }
            merged.insert(entry.path.clone(), entry.clone());
        }
        Ok(store_tree(repo, merged))
    }

    async fn create_commit(
        &self,
        repo: &RepositoryDescriptor,
        message: &str,
        tree: &ObjectHash,
        parents: &[ObjectHash],
    ) -> Result<ObjectHash, HostError> {
        self.record(HostCall::CreateCommit(repo.name.clone())).await?;
        let mut state = self.state.lock().await;
        state.clock += 1;
        let clock = state.clock;
        let repo = repo_mut(&mut state, &repo.name)?;

        if !repo.trees.contains_key(tree) {
            return Err(unprocessable("create_commit", format!("tree {tree} not found")));
        }
        if let Some(missing) = parents.iter().find(|p| !repo.commits.contains_key(*p)) {
            return Err(unprocessable(
                "create_commit",
                format!("parent {missing} not found"),
            ));
        }
        Ok(store_commit(repo, clock, tree, parents, message))
    }

    async fn update_ref(
        &self,
        repo: &RepositoryDescriptor,
        branch: &str,
        commit: &ObjectHash,
        force: bool,
    ) -> Result<(), HostError> {
        self.record(HostCall::UpdateRef {
            repo: repo.name.clone(),
            force,
        })
        .await?;
        if self.options.fail_ref_updates {
            return Err(HostError::Api {
                endpoint: "update_ref".to_string(),
                status: 500,
                body: "injected ref failure".to_string(),
            });
        }

        let mut state = self.state.lock().await;
        let repo = repo_mut(&mut state, &repo.name)?;
        if !repo.commits.contains_key(commit) {
            return Err(unprocessable("update_ref", format!("object {commit} not found")));
        }
        if !force {
            if let Some(current) = repo.refs.get(branch) {
                if !repo.is_ancestor(current, commit) {
                    return Err(HostError::Conflict("Update is not a fast forward".to_string()));
                }
            }
        }
        repo.refs.insert(branch.to_string(), commit.clone());
        Ok(())
    }
}
