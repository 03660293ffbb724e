use modelship_core::{ObjectHash, RepositoryDescriptor};
use serde::{Deserialize, Serialize};

/// What a caller gets back from a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// The repository name.
    pub deployment_id: String,
    pub repository_url: String,
    pub deploy_url: String,
    pub file_count: usize,
    pub commit: ObjectHash,
    pub message: String,
}

pub fn assemble_result(
    repo: &RepositoryDescriptor,
    file_count: usize,
    commit: ObjectHash,
    deploy_url_template: &str,
) -> DeploymentResult {
    DeploymentResult {
        deployment_id: repo.name.clone(),
        repository_url: repo.html_url.clone(),
        deploy_url: deploy_url_template.replace("{repository_url}", &repo.html_url),
        file_count,
        commit,
        message: format!("Published {file_count} files to {}", repo.full_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_every_field() {
        let repo = RepositoryDescriptor {
            name: "model-deploy-abc".into(),
            owner_login: "octo".into(),
            default_branch: "main".into(),
            html_url: "https://github.com/octo/model-deploy-abc".into(),
            full_name: "octo/model-deploy-abc".into(),
        };
        let commit = ObjectHash::from_hex(&"a".repeat(40)).unwrap();
        let result = assemble_result(
            &repo,
            4,
            commit.clone(),
            "https://render.com/deploy?repo={repository_url}",
        );
        assert_eq!(result.deployment_id, "model-deploy-abc");
        assert_eq!(
            result.deploy_url,
            "https://render.com/deploy?repo=https://github.com/octo/model-deploy-abc"
        );
        assert_eq!(result.file_count, 4);
        assert_eq!(result.commit, commit);
        assert_eq!(result.message, "Published 4 files to octo/model-deploy-abc");
    }
}
