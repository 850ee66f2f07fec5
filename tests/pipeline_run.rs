mod common;

use std::time::Duration;

use async_trait::async_trait;
use common::{RecordingWarehouse, etl_config};
use sparkify_dwh::error::{AppError, Result};
use sparkify_dwh::models::{Stage, Table};
use sparkify_dwh::pipeline::{Pipeline, PipelineState, RunMode, StageProgress};
use sparkify_dwh::storage::SourceProbe;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn full_run_executes_statements_in_stage_order() {
    let config = etl_config();
    let warehouse = RecordingWarehouse::new();

    let mut pipeline = Pipeline::new(&config, &warehouse);
    pipeline.run(RunMode::Full).await.unwrap();

    let heads = warehouse.heads();
    assert_eq!(heads.len(), 20);
    assert!(heads[..7].iter().all(|h| h.starts_with("DROP TABLE IF EXISTS")));
    assert!(heads[7..14].iter().all(|h| h.starts_with("CREATE TABLE")));
    assert!(heads[14].starts_with("COPY staging_events FROM"));
    assert!(heads[15].starts_with("COPY staging_songs FROM"));
    assert!(heads[16].starts_with("INSERT INTO songplays"));

    let dimensions: Vec<_> = heads[17..].iter().map(String::as_str).collect();
    assert!(dimensions[0].starts_with("INSERT INTO users"));
    assert!(dimensions[1].starts_with("INSERT INTO songs"));
    assert!(dimensions[2].starts_with("INSERT INTO artists"));

    let report = pipeline.report();
    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.schema, StageProgress { completed: 14, total: 14 });
    assert_eq!(report.staging, StageProgress { completed: 2, total: 2 });
    assert_eq!(report.transform, StageProgress { completed: 4, total: 4 });
    assert_eq!(report.rows_inserted.get(&Table::Songplays), Some(&3));
    assert!(report.finished_at.is_some());
}

#[tokio::test]
async fn schema_stage_is_repeatable() {
    let config = etl_config();
    let warehouse = RecordingWarehouse::new();

    for _ in 0..2 {
        let mut pipeline = Pipeline::new(&config, &warehouse);
        pipeline.create_tables().await.unwrap();
        assert_eq!(pipeline.state(), &PipelineState::SchemaReady);
    }

    let executed = warehouse.executed();
    assert_eq!(executed.len(), 28);
    assert_eq!(executed[..14], executed[14..]);
}

#[tokio::test]
async fn failing_create_names_stage_and_table() {
    let config = etl_config();
    let warehouse = RecordingWarehouse::new().failing_on("CREATE TABLE songplays");

    let mut pipeline = Pipeline::new(&config, &warehouse);
    let err = pipeline.run(RunMode::Full).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::Statement {
            stage: Stage::Schema,
            table: Table::Songplays,
            ..
        }
    ));

    let report = pipeline.report();
    // Seven drops and the two staging creates went through.
    assert_eq!(report.schema, StageProgress { completed: 9, total: 14 });
    assert_eq!(report.staging, StageProgress::default());
    assert!(matches!(
        report.state,
        PipelineState::Failed { stage: Stage::Schema, .. }
    ));
    assert_eq!(warehouse.executed().len(), 10);
}

#[tokio::test]
async fn failing_copy_reports_source_path() {
    let config = etl_config();
    let warehouse = RecordingWarehouse::new().failing_on("COPY staging_songs");

    let mut pipeline = Pipeline::new(&config, &warehouse);
    let err = pipeline.run(RunMode::EtlOnly).await.unwrap_err();

    let message = err.to_string();
    assert!(message.contains("staging_songs"));
    assert!(message.contains("s3://udacity-dend/song_data"));
    assert_eq!(pipeline.report().staging.completed, 1);
    assert!(matches!(
        pipeline.state(),
        PipelineState::Failed { stage: Stage::Staging, .. }
    ));
}

#[tokio::test]
async fn etl_only_skips_the_schema_stage() {
    let config = etl_config();
    let warehouse = RecordingWarehouse::new();

    let mut pipeline = Pipeline::new(&config, &warehouse);
    pipeline.run(RunMode::EtlOnly).await.unwrap();

    let heads = warehouse.heads();
    assert_eq!(heads.len(), 6);
    assert!(heads.iter().all(|h| !h.starts_with("DROP") && !h.starts_with("CREATE")));
    assert_eq!(pipeline.report().schema, StageProgress::default());
    assert_eq!(pipeline.state(), &PipelineState::Done);
}

#[tokio::test]
async fn etl_requires_copy_parameters() {
    let mut config = etl_config();
    config.iam_role.arn.clear();
    let warehouse = RecordingWarehouse::new();

    let mut pipeline = Pipeline::new(&config, &warehouse);
    let err = pipeline.run(RunMode::EtlOnly).await.unwrap_err();

    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().contains("IAM_ROLE.ARN"));
    assert!(warehouse.executed().is_empty());
    assert!(matches!(
        pipeline.state(),
        PipelineState::Failed { stage: Stage::Staging, .. }
    ));
}

#[tokio::test]
async fn schema_only_requires_connection_keys() {
    let mut config = etl_config();
    config.cluster.host.clear();
    let warehouse = RecordingWarehouse::new();

    let mut pipeline = Pipeline::new(&config, &warehouse);
    let err = pipeline.create_tables().await.unwrap_err();

    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().contains("CLUSTER.HOST"));
    assert!(warehouse.executed().is_empty());
    assert!(matches!(
        pipeline.state(),
        PipelineState::Failed { stage: Stage::Schema, .. }
    ));
}

#[test]
fn each_mode_checks_its_keys_without_a_warehouse() {
    let mut config = etl_config();
    config.s3.song_data.clear();
    assert!(RunMode::SchemaOnly.validate(&config).is_ok());
    assert!(RunMode::EtlOnly.validate(&config).is_err());
    assert!(RunMode::Full.validate(&config).is_err());

    config.cluster.db_port = None;
    let message = RunMode::SchemaOnly.validate(&config).unwrap_err().to_string();
    assert!(message.contains("CLUSTER.DB_PORT"));

    assert_eq!(RunMode::EtlOnly.first_stage(), Stage::Staging);
    assert_eq!(RunMode::SchemaOnly.first_stage(), Stage::Schema);
}

#[tokio::test]
async fn cancellation_stops_between_statements() {
    let config = etl_config();
    let cancel = CancellationToken::new();
    let warehouse = RecordingWarehouse::new().cancelling_after(3, cancel.clone());

    let mut pipeline = Pipeline::new(&config, &warehouse).with_cancellation(cancel);
    let err = pipeline.run(RunMode::Full).await.unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(warehouse.executed().len(), 3);
    assert_eq!(pipeline.report().schema.completed, 3);
    assert!(matches!(
        pipeline.state(),
        PipelineState::Failed { stage: Stage::Schema, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn concurrent_dimensions_all_complete() {
    let mut config = etl_config();
    config.pipeline.concurrent_dimensions = true;
    let warehouse = RecordingWarehouse::new().with_delay(Duration::from_millis(50));

    let mut pipeline = Pipeline::new(&config, &warehouse);
    pipeline.run(RunMode::EtlOnly).await.unwrap();

    let report = pipeline.report();
    assert_eq!(report.transform, StageProgress { completed: 4, total: 4 });
    for table in [Table::Songplays, Table::Users, Table::Songs, Table::Artists] {
        assert_eq!(report.rows_inserted.get(&table), Some(&3), "{table}");
    }
    // The fact insert always runs first.
    assert!(warehouse.heads()[2].starts_with("INSERT INTO songplays"));
}

#[tokio::test]
async fn concurrent_failure_still_credits_other_dimensions() {
    let mut config = etl_config();
    config.pipeline.concurrent_dimensions = true;
    let warehouse = RecordingWarehouse::new().failing_on("INSERT INTO songs");

    let mut pipeline = Pipeline::new(&config, &warehouse);
    let err = pipeline.run(RunMode::EtlOnly).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::Statement {
            table: Table::Songs,
            ..
        }
    ));
    let report = pipeline.report();
    assert_eq!(report.transform.completed, 3);
    assert!(report.rows_inserted.contains_key(&Table::Users));
    assert!(report.rows_inserted.contains_key(&Table::Artists));
    assert!(!report.rows_inserted.contains_key(&Table::Songs));
}

#[tokio::test]
async fn time_dimension_runs_after_songplays() {
    let mut config = etl_config();
    config.pipeline.populate_time = true;
    let warehouse = RecordingWarehouse::new();

    let mut pipeline = Pipeline::new(&config, &warehouse);
    pipeline.run(RunMode::EtlOnly).await.unwrap();

    let heads = warehouse.heads();
    assert!(heads.last().unwrap().starts_with("INSERT INTO times"));
    assert!(heads[2].starts_with("INSERT INTO songplays"));
    assert_eq!(pipeline.report().transform.total, 5);
}

#[tokio::test]
async fn unmatched_events_are_reported() {
    let config = etl_config();
    let warehouse = RecordingWarehouse::new()
        .with_scalar("NOT EXISTS", 2)
        .with_scalar("FROM staging_events e WHERE", 5)
        .with_scalar("FROM songplays", 3);

    let mut pipeline = Pipeline::new(&config, &warehouse);
    pipeline.run(RunMode::EtlOnly).await.unwrap();

    let report = pipeline.report();
    assert_eq!(report.play_events, Some(5));
    assert_eq!(report.unmatched_events, Some(2));
    assert_eq!(report.row_counts.get(&Table::Songplays), Some(&3));
}

#[tokio::test]
async fn lock_file_rejects_an_overlapping_run() {
    let tmp = TempDir::new().unwrap();
    let lock_path = tmp.path().join("dwh.lock");
    std::fs::write(&lock_path, "pid=1").unwrap();

    let mut config = etl_config();
    config.pipeline.lock_file = Some(lock_path.clone());
    let warehouse = RecordingWarehouse::new();

    let mut pipeline = Pipeline::new(&config, &warehouse);
    let err = pipeline.run(RunMode::Full).await.unwrap_err();

    assert!(matches!(err, AppError::Locked(ref p) if p == &lock_path));
    assert!(warehouse.executed().is_empty());
    assert!(lock_path.exists());
}

#[tokio::test]
async fn report_serializes_with_state_tag() {
    let config = etl_config();
    let warehouse = RecordingWarehouse::new();

    let mut pipeline = Pipeline::new(&config, &warehouse);
    pipeline.run(RunMode::SchemaOnly).await.unwrap();

    let json = serde_json::to_value(pipeline.into_report()).unwrap();
    assert_eq!(json["state"]["state"], "schema_ready");
    assert_eq!(json["schema"]["completed"], 14);
}

/// Probe that reports one prefix as empty.
struct MissingPrefix(&'static str);

#[async_trait]
impl SourceProbe for MissingPrefix {
    async fn verify_prefix(&self, uri: &str) -> Result<()> {
        if uri == self.0 {
            Err(AppError::connection(uri, "no objects under prefix"))
        } else {
            Ok(())
        }
    }

    async fn verify_object(&self, _uri: &str) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn preflight_fails_before_copying_a_missing_source() {
    let config = etl_config();
    let warehouse = RecordingWarehouse::new();
    let probe = MissingPrefix("s3://udacity-dend/song_data");

    let mut pipeline = Pipeline::new(&config, &warehouse).with_probe(&probe);
    let err = pipeline.run(RunMode::EtlOnly).await.unwrap_err();

    assert!(matches!(err, AppError::Connection { ref target, .. } if target == probe.0));
    assert_eq!(warehouse.heads().len(), 1);
    assert!(warehouse.heads()[0].starts_with("COPY staging_events"));
    assert!(matches!(
        pipeline.state(),
        PipelineState::Failed { stage: Stage::Staging, .. }
    ));
}
