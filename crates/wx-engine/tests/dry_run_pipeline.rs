use chrono::NaiveDate;
use uuid::Uuid;

use wx_common::{validate_step_sequence, Cycle, Flags, ModelProfile, RunContext, StepName};
use wx_engine::PipelineDriver;
use wx_metrics::{InMemoryPublisher, MetricSink};
use wx_store::{ObjectStoreClient, ObjectStoreConfig};

fn test_context(work_dir: &std::path::Path) -> RunContext {
    RunContext {
        run_id: Uuid::new_v4(),
        model_profile: ModelProfile::hrrr_default(),
        cycle: Cycle::new(NaiveDate::from_ymd_opt(2026, 7, 27).unwrap(), 12),
        forecast_hours: vec![0, 1, 2],
        workspace_root: work_dir.join("hrrr").join("20260727T12z"),
        log_dir: work_dir.join("logs"),
        bucket_override: None,
        flags: Flags {
            dry_run: true,
            upload_enabled: false,
            tiles_enabled: true,
            ..Flags::default()
        },
        started_at: chrono::Utc::now(),
    }
}

fn test_store() -> ObjectStoreClient {
    ObjectStoreClient::new(&ObjectStoreConfig {
        endpoint: Some("http://127.0.0.1:1".to_string()),
        bucket: "test-bucket".to_string(),
        access_key_id: None,
        secret_access_key: None,
        region: "us-east-1".to_string(),
        allow_http: true,
    })
    .unwrap()
}

#[tokio::test]
async fn dry_run_completes_all_six_stages_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = test_context(tmp.path());
    let metrics = MetricSink::new(InMemoryPublisher::default(), ctx.run_id, ctx.model_profile.name.clone());

    let driver = PipelineDriver::new(ctx, metrics, test_store());
    let report = driver.run().await.expect("dry run should succeed end to end");

    assert!(validate_step_sequence(&report.records));
    assert_eq!(report.records.len(), 6);

    let download = &report.records[0];
    assert_eq!(download.name, StepName::Download);
    assert_eq!(download.artifact_count, 3);

    // upload and metadata were disabled for this run and should show as
    // skipped rather than missing or failed.
    let upload = &report.records[4];
    assert_eq!(upload.name, StepName::Upload);
    assert_eq!(upload.outcome, wx_common::Outcome::Skipped);

    let metadata = &report.records[5];
    assert_eq!(metadata.name, StepName::Metadata);
    assert_eq!(metadata.outcome, wx_common::Outcome::Skipped);
}

#[tokio::test]
async fn workspace_scratch_dirs_are_removed_after_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let ctx = test_context(tmp.path());
    let workspace_root = ctx.workspace_root.clone();
    let metrics = MetricSink::new(InMemoryPublisher::default(), ctx.run_id, ctx.model_profile.name.clone());

    let driver = PipelineDriver::new(ctx, metrics, test_store());
    driver.run().await.expect("dry run should succeed");

    assert!(!workspace_root.join("downloads").exists());
    assert!(!workspace_root.join("processed").exists());
    assert!(!workspace_root.join("colored").exists());
    assert!(!workspace_root.join("tiles").exists());
}

#[tokio::test]
async fn a_second_concurrent_run_is_rejected_while_the_first_holds_the_lock() {
    use wx_step_runner::WorkspaceGuard;

    let tmp = tempfile::tempdir().unwrap();
    let ctx = test_context(tmp.path());
    let lock_path = ctx.lock_path();
    let _held_guard = WorkspaceGuard::create(ctx.workspace_root.clone()).unwrap();
    let _lock = wx_engine::LockGuard::acquire(&lock_path).unwrap();

    let metrics = MetricSink::new(InMemoryPublisher::default(), ctx.run_id, ctx.model_profile.name.clone());
    let driver = PipelineDriver::new(ctx, metrics, test_store());
    let err = driver.run().await.unwrap_err();
    assert!(matches!(err, wx_common::PipelineError::AlreadyRunning(_)));
}
