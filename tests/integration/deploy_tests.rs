use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use modelship_bundle::BundleError;
use modelship_host::{HostCall, MemoryHost, MemoryHostOptions, Throttled};
use modelship_publish::{
    DeployRequest, DeployStage, DeployState, DeploymentPipeline, NamingStrategy, PublishError,
    PublishSettings,
};
use tokio_util::sync::CancellationToken;

fn zip_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn tar_gz_of(entries: &[(&str, &str)]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        builder.append_data(&mut header, name, data.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn minimal_archive() -> Vec<u8> {
    zip_of(&[
        ("load_model.py", "import streamlit as st\nst.write('hi')\n"),
        ("requirements.txt", "streamlit\nscikit-learn\n"),
    ])
}

fn settings() -> PublishSettings {
    let mut settings = PublishSettings::default();
    settings.readiness.initial_delay_ms = 1;
    settings.readiness.max_delay_ms = 4;
    settings
}

async fn deploy(
    host: &Arc<MemoryHost>,
    settings: PublishSettings,
    request: DeployRequest,
) -> (DeploymentPipeline, Result<modelship_publish::DeploymentResult, PublishError>) {
    let mut pipeline = DeploymentPipeline::new(host.clone(), settings);
    let result = pipeline.run(request, CancellationToken::new()).await;
    (pipeline, result)
}

fn count(calls: &[HostCall], pred: impl Fn(&HostCall) -> bool) -> usize {
    calls.iter().filter(|c| pred(c)).count()
}

// === Minimal upload publishes exactly four files ===
#[tokio::test]
async fn minimal_archive_publishes_four_entries() {
    let host = Arc::new(MemoryHost::default());
    let (pipeline, result) = deploy(
        &host,
        settings(),
        DeployRequest::new(minimal_archive(), "iris.zip"),
    )
    .await;
    let result = result.unwrap();

    assert_eq!(pipeline.state(), &DeployState::Published);
    assert_eq!(result.file_count, 4);

    let paths = host
        .commit_paths(&result.deployment_id, &result.commit)
        .await
        .unwrap();
    assert_eq!(
        paths,
        vec!["README.md", "load_model.py", "render.yaml", "requirements.txt"]
    );

    let readme = host
        .read_file(&result.deployment_id, "main", "README.md")
        .await
        .unwrap();
    assert!(readme.starts_with(b"# iris\n"));

    let calls = host.calls().await;
    assert_eq!(count(&calls, |c| matches!(c, HostCall::CreateBlob(_))), 4);
    assert_eq!(count(&calls, |c| matches!(c, HostCall::CreateTree(_))), 1);
    assert_eq!(count(&calls, |c| matches!(c, HostCall::CreateCommit(_))), 1);
    // The branch moves once, forced, and last.
    assert_eq!(
        calls.last(),
        Some(&HostCall::UpdateRef {
            repo: result.deployment_id.clone(),
            force: true
        })
    );
}

// === Missing required entry fails before any remote call ===
#[tokio::test]
async fn missing_requirements_makes_no_remote_calls() {
    let host = Arc::new(MemoryHost::default());
    let archive = zip_of(&[("load_model.py", "print()")]);
    let (pipeline, result) = deploy(&host, settings(), DeployRequest::new(archive, "m.zip")).await;

    match result.unwrap_err() {
        PublishError::Validation(BundleError::MissingRequiredFiles { missing }) => {
            assert_eq!(missing, vec!["requirements.txt".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(host.calls().await.is_empty());
    assert!(host.repository_names().await.is_empty());
    assert!(matches!(
        pipeline.state(),
        DeployState::Failed {
            stage: DeployStage::Validating,
            ..
        }
    ));
}

// === Deadline during blob upload leaves the branch at its base ===
#[tokio::test]
async fn timeout_while_building_objects_keeps_base_ref() {
    let host = Arc::new(MemoryHost::new(MemoryHostOptions {
        blob_latency: Some(Duration::from_millis(30)),
        ..MemoryHostOptions::default()
    }));
    let mut entries = vec![
        ("load_model.py".to_string(), "import st".to_string()),
        ("requirements.txt".to_string(), "st".to_string()),
    ];
    for i in 0..20 {
        entries.push((format!("models/part{i:02}.bin"), format!("chunk {i}")));
    }
    let refs: Vec<(&str, &str)> = entries.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
    let archive = zip_of(&refs);

    let mut settings = settings();
    settings.pipeline.blob_concurrency = 1;
    let request = DeployRequest::new(archive, "big.zip").with_timeout(Duration::from_millis(200));
    let (pipeline, result) = deploy(&host, settings, request).await;

    let err = result.unwrap_err();
    let repository = match &err {
        PublishError::Timeout {
            stage: DeployStage::BuildingObjects,
            repository: Some(repository),
        } => repository.clone(),
        other => panic!("unexpected error: {other}"),
    };
    assert!(matches!(
        pipeline.state(),
        DeployState::Failed {
            stage: DeployStage::BuildingObjects,
            ..
        }
    ));

    let head = host.branch_head(&repository, "main").await.unwrap();
    assert_eq!(
        host.commit_message(&repository, &head).await.as_deref(),
        Some("Initial commit")
    );
    let calls = host.calls().await;
    assert_eq!(count(&calls, |c| matches!(c, HostCall::CreateCommit(_))), 0);
    assert_eq!(count(&calls, |c| matches!(c, HostCall::UpdateRef { .. })), 0);
    // The orphaned repository is reported, not deleted.
    assert_eq!(host.repository_names().await, vec![repository]);
}

// === Identical bytes share one blob, across paths and repositories ===
#[tokio::test]
async fn identical_content_has_identical_blob_identity() {
    let host = Arc::new(MemoryHost::default());
    let archive = zip_of(&[
        ("load_model.py", "shared = True\n"),
        ("requirements.txt", "numpy\n"),
        ("copy_of_loader.py", "shared = True\n"),
    ]);

    let (_, first) = deploy(
        &host,
        settings(),
        DeployRequest::new(archive.clone(), "a.zip").with_requester("alice"),
    )
    .await;
    let (_, second) = deploy(
        &host,
        settings(),
        DeployRequest::new(archive, "a.zip").with_requester("bob"),
    )
    .await;
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_ne!(first.deployment_id, second.deployment_id);

    let a = host
        .commit_entries(&first.deployment_id, &first.commit)
        .await
        .unwrap();
    let b = host
        .commit_entries(&second.deployment_id, &second.commit)
        .await
        .unwrap();
    let hash_of = |entries: &[modelship_core::TreeEntry], path: &str| {
        entries.iter().find(|e| e.path == path).unwrap().hash.clone()
    };
    assert_eq!(hash_of(&a, "load_model.py"), hash_of(&a, "copy_of_loader.py"));
    assert_eq!(hash_of(&a, "load_model.py"), hash_of(&b, "load_model.py"));
    assert_eq!(hash_of(&a, "requirements.txt"), hash_of(&b, "requirements.txt"));
}

// === Retrying the same upload resumes onto the same repository ===
#[tokio::test]
async fn repeated_upload_resumes_without_new_commit() {
    let host = Arc::new(MemoryHost::default());
    let archive = zip_of(&[
        ("load_model.py", "import st"),
        ("requirements.txt", "st"),
        ("README.md", "# My model\n"),
    ]);

    let (_, first) = deploy(
        &host,
        settings(),
        DeployRequest::new(archive.clone(), "model.zip").with_requester("carol"),
    )
    .await;
    let (pipeline, second) = deploy(
        &host,
        settings(),
        DeployRequest::new(archive, "model.zip").with_requester("carol"),
    )
    .await;
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(pipeline.state(), &DeployState::Published);
    assert_eq!(first.deployment_id, second.deployment_id);
    assert_eq!(first.commit, second.commit);
    assert_eq!(host.repository_names().await.len(), 1);

    let calls = host.calls().await;
    assert_eq!(count(&calls, |c| matches!(c, HostCall::CreateCommit(_))), 1);
    assert_eq!(count(&calls, |c| matches!(c, HostCall::GetRepository(_))), 1);
}

// === Wall-clock naming treats a collision as fatal ===
#[tokio::test]
async fn timestamp_naming_collision_is_a_conflict() {
    let host = Arc::new(MemoryHost::default());
    let mut settings = settings();
    settings.repository.naming = NamingStrategy::Timestamp;
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();

    let (_, first) = deploy(
        &host,
        settings.clone(),
        DeployRequest::new(minimal_archive(), "iris.zip").with_generated_at(at),
    )
    .await;
    assert!(first.is_ok());

    let (_, second) = deploy(
        &host,
        settings,
        DeployRequest::new(minimal_archive(), "iris.zip").with_generated_at(at),
    )
    .await;
    let err = second.unwrap_err();
    assert_eq!(err.http_status(), 422);
    assert!(matches!(err, PublishError::Conflict { ref name } if name == "model-deploy-1709283600000"));
}

// === A slow-to-appear branch is waited for ===
#[tokio::test]
async fn waits_for_branch_readiness() {
    let host = Arc::new(MemoryHost::new(MemoryHostOptions {
        ready_after_reads: 3,
        ..MemoryHostOptions::default()
    }));
    let (_, result) = deploy(&host, settings(), DeployRequest::new(minimal_archive(), "iris.zip")).await;
    assert!(result.is_ok());
    let reads = count(&host.calls().await, |c| matches!(c, HostCall::GetBranchRef(_)));
    assert_eq!(reads, 4);
}

// === Readiness gives up and reports the repository ===
#[tokio::test]
async fn readiness_exhaustion_is_a_provisioning_failure() {
    let host = Arc::new(MemoryHost::new(MemoryHostOptions {
        ready_after_reads: 1_000,
        ..MemoryHostOptions::default()
    }));
    let mut settings = settings();
    settings.readiness.max_attempts = 3;
    let (pipeline, result) = deploy(&host, settings, DeployRequest::new(minimal_archive(), "iris.zip")).await;

    let err = result.unwrap_err();
    assert!(matches!(err, PublishError::RepositoryProvisioning { .. }));
    assert!(err.repository().is_some());
    assert!(matches!(
        pipeline.state(),
        DeployState::Failed {
            stage: DeployStage::AwaitingBaseRef,
            ..
        }
    ));
}

// === Same inputs, same outputs ===
#[tokio::test]
async fn deployment_is_reproducible() {
    let at = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let mut results = Vec::new();
    for _ in 0..2 {
        let host = Arc::new(MemoryHost::default());
        let (_, result) = deploy(
            &host,
            settings(),
            DeployRequest::new(minimal_archive(), "iris.zip")
                .with_requester("dave")
                .with_generated_at(at),
        )
        .await;
        results.push(result.unwrap());
    }
    assert_eq!(results[0], results[1]);
}

// === gzip'd tar uploads behave like zip uploads ===
#[tokio::test]
async fn tar_gz_archive_with_wrapper_directory() {
    let host = Arc::new(MemoryHost::default());
    let archive = tar_gz_of(&[
        ("project/load_model.py", "import st"),
        ("project/requirements.txt", "st"),
        ("project/model.pkl", "weights"),
    ]);
    let (_, result) = deploy(&host, settings(), DeployRequest::new(archive, "project.tar.gz")).await;
    let result = result.unwrap();
    let paths = host
        .commit_paths(&result.deployment_id, &result.commit)
        .await
        .unwrap();
    assert_eq!(
        paths,
        vec![
            "README.md",
            "load_model.py",
            "model.pkl",
            "render.yaml",
            "requirements.txt"
        ]
    );
    let config = host
        .read_file(&result.deployment_id, "main", "render.yaml")
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&config).contains("name: \"project\""));
}

// === Concurrent deployments share one request budget ===
#[tokio::test]
async fn concurrent_deployments_share_the_limiter() {
    let memory = MemoryHost::new(MemoryHostOptions {
        blob_latency: Some(Duration::from_millis(5)),
        ..MemoryHostOptions::default()
    });
    let host = Arc::new(Throttled::new(memory, 2));

    let mut tasks = tokio::task::JoinSet::new();
    for requester in ["u1", "u2", "u3"] {
        let host = host.clone();
        tasks.spawn(async move {
            let mut pipeline = DeploymentPipeline::new(host, settings());
            pipeline
                .run(
                    DeployRequest::new(minimal_archive(), "iris.zip").with_requester(requester),
                    CancellationToken::new(),
                )
                .await
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    assert!(host.inner().peak_blob_concurrency() <= 2);
    assert_eq!(host.inner().repository_names().await.len(), 3);
}

// === A deadline that passes while waiting on the limiter issues nothing ===
#[tokio::test]
async fn deadline_expiring_behind_the_limiter_creates_nothing() {
    let host = Arc::new(Throttled::new(MemoryHost::default(), 1));
    let held = host.limiter().acquire_owned().await.unwrap();
    let releaser = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(held);
    });

    let mut pipeline = DeploymentPipeline::new(host.clone(), settings());
    let err = pipeline
        .run(
            DeployRequest::new(minimal_archive(), "iris.zip")
                .with_timeout(Duration::from_millis(50)),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    releaser.await.unwrap();

    assert!(matches!(
        err,
        PublishError::Timeout {
            stage: DeployStage::Provisioning,
            repository: None
        }
    ));
    assert_eq!(err.http_status(), 500);
    assert!(host.inner().calls().await.is_empty());
    assert!(host.inner().repository_names().await.is_empty());
}

// === Cancelling mid-run stops before the next stage and names the repository ===
#[tokio::test]
async fn cancellation_while_waiting_on_the_limiter_stops_the_run() {
    let memory = MemoryHost::new(MemoryHostOptions {
        blob_latency: Some(Duration::from_millis(200)),
        ..MemoryHostOptions::default()
    });
    // One request at a time: the other uploads queue on the limiter.
    let host = Arc::new(Throttled::new(memory, 1));
    let mut settings = settings();
    settings.pipeline.blob_concurrency = 4;

    let cancel = CancellationToken::new();
    let canceller = {
        let cancel = cancel.clone();
        let host = host.clone();
        tokio::spawn(async move {
            // Cancel once the first blob upload is in flight.
            loop {
                let calls = host.inner().calls().await;
                if calls.iter().any(|c| matches!(c, HostCall::CreateBlob(_))) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            cancel.cancel();
        })
    };

    let mut pipeline = DeploymentPipeline::new(host.clone(), settings);
    let err = pipeline
        .run(DeployRequest::new(minimal_archive(), "iris.zip"), cancel)
        .await
        .unwrap_err();
    canceller.await.unwrap();

    let names = host.inner().repository_names().await;
    assert_eq!(names.len(), 1);
    match &err {
        PublishError::Cancelled { stage, repository } => {
            assert_eq!(*stage, DeployStage::BuildingObjects);
            assert_eq!(repository.as_deref(), Some(names[0].as_str()));
        }
        other => panic!("unexpected error: {other}"),
    }

    let calls = host.inner().calls().await;
    assert_eq!(count(&calls, |c| matches!(c, HostCall::CreateBlob(_))), 1);
    assert_eq!(count(&calls, |c| matches!(c, HostCall::CreateTree(_))), 0);
    let head = host.inner().branch_head(&names[0], "main").await.unwrap();
    assert_eq!(
        host.inner().commit_message(&names[0], &head).await.as_deref(),
        Some("Initial commit")
    );
}

// === A lowercase readme is a user file; the tree still has one entry per path ===
#[tokio::test]
async fn lowercase_readme_keeps_entry_count_exact() {
    let host = Arc::new(MemoryHost::default());
    let archive = zip_of(&[
        ("load_model.py", "import streamlit as st\n"),
        ("requirements.txt", "streamlit\n"),
        ("readme.md", "my notes\n"),
    ]);
    let (_, result) = deploy(&host, settings(), DeployRequest::new(archive, "iris.zip")).await;
    let result = result.unwrap();

    let paths = host
        .commit_paths(&result.deployment_id, &result.commit)
        .await
        .unwrap();
    assert_eq!(
        paths,
        vec!["README.md", "load_model.py", "readme.md", "render.yaml", "requirements.txt"]
    );
    assert_eq!(result.file_count, paths.len());

    let generated = host
        .read_file(&result.deployment_id, "main", "README.md")
        .await
        .unwrap();
    assert!(generated.starts_with(b"# iris\n"));
    let user = host
        .read_file(&result.deployment_id, "main", "readme.md")
        .await
        .unwrap();
    assert_eq!(&user[..], b"my notes\n");
}
