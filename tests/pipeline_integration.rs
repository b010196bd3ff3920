//! Pipeline Integration Tests for sensorgen
//!
//! End-to-end lifecycle tests against file-backed SQLite stores.

use std::time::Duration;

use sensorgen::config::AppConfig;
use sensorgen::model::{HarmonicModel, HarmonicParams, HUMIDITY_CEILING};
use sensorgen::{
    Channel, MeasurementKind, Pipeline, PipelineBuilder, PipelineError, SeasonalModel,
    SeasonalParams, SqlitePool,
};
use tempfile::TempDir;

// =============================================================================
// Test Helpers
// =============================================================================

/// Temporary store URL; the directory must outlive the test.
fn temp_store(name: &str) -> (TempDir, String) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!("sqlite:{}", dir.path().join(name).display());
    (dir, url)
}

fn climate_builder(url: &str) -> PipelineBuilder {
    Pipeline::builder("climate", url)
        .noise_seed(Some(1))
        .channel(Channel::new(
            MeasurementKind::Temperature,
            vec![1],
            SeasonalModel::temperature(SeasonalParams::temperature_defaults()).unwrap(),
        ))
        .channel(Channel::new(
            MeasurementKind::Humidity,
            vec![2],
            SeasonalModel::humidity(SeasonalParams::humidity_defaults()).unwrap(),
        ))
}

fn acceleration_builder(url: &str, sensors: Vec<i64>) -> PipelineBuilder {
    let model = HarmonicModel::generate(&HarmonicParams::default(), sensors.len()).unwrap();
    Pipeline::builder("accelerations", url)
        .noise_seed(Some(2))
        .channel(Channel::new(MeasurementKind::Acceleration, sensors, model))
}

async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql)
        .fetch_one(pool.inner())
        .await
        .expect("Count query failed")
}

async fn run_to_completion(pipeline: &mut Pipeline) -> sensorgen::RunSummary {
    pipeline.start().await.expect("Failed to start pipeline");
    tokio::time::timeout(Duration::from_secs(30), pipeline.finished())
        .await
        .expect("Pipeline did not finish");
    pipeline
        .stop()
        .await
        .expect("Failed to stop pipeline")
        .expect("Pipeline was not running")
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_double_start_is_rejected() {
    let (_dir, url) = temp_store("double.db");
    let mut pipeline = climate_builder(&url).sample_rate(10.0).build().unwrap();

    pipeline.start().await.unwrap();
    assert!(pipeline.is_running());

    match pipeline.start().await {
        Err(PipelineError::AlreadyRunning(name)) => assert_eq!(name, "climate"),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    assert!(pipeline.is_running(), "rejected start must not disturb the run");

    assert!(pipeline.stop().await.unwrap().is_some());
    assert!(!pipeline.is_running());
}

#[tokio::test]
async fn test_stop_without_start_is_noop() {
    let (_dir, url) = temp_store("idle.db");
    let mut pipeline = climate_builder(&url).build().unwrap();

    assert!(pipeline.stop().await.unwrap().is_none());
    assert!(pipeline.stop().await.unwrap().is_none());

    // `finished` returns immediately when idle.
    tokio::time::timeout(Duration::from_secs(1), pipeline.finished())
        .await
        .expect("finished() blocked on an idle pipeline");
}

#[tokio::test]
async fn test_restart_after_stop() {
    let (_dir, url) = temp_store("restart.db");
    let mut pipeline = climate_builder(&url)
        .sample_rate(500.0)
        .tick_limit(Some(5))
        .build()
        .unwrap();

    let first = run_to_completion(&mut pipeline).await;
    let second = run_to_completion(&mut pipeline).await;
    assert_eq!(first.producer.ticks, 5);
    assert_eq!(second.producer.ticks, 5);

    let pool = SqlitePool::connect(&url).await.unwrap();
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM timestamps").await, 10);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM sensors").await, 2);

    let stamps: Vec<f64> =
        sqlx::query_scalar("SELECT CAST(timestamp AS REAL) FROM timestamps ORDER BY id")
            .fetch_all(pool.inner())
            .await
            .unwrap();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
}

// =============================================================================
// Pacing
// =============================================================================

#[tokio::test]
async fn test_run_duration_paces_ticks() {
    let (_dir, url) = temp_store("paced.db");
    let mut pipeline = acceleration_builder(&url, vec![1, 2])
        .sample_rate(10.0)
        .run_duration(Some(Duration::from_secs(1)))
        .build()
        .unwrap();

    let summary = run_to_completion(&mut pipeline).await;
    assert!(
        (9..=11).contains(&summary.producer.ticks),
        "expected about 10 ticks, got {}",
        summary.producer.ticks
    );
    assert!(summary.is_lossless());

    let pool = SqlitePool::connect(&url).await.unwrap();
    let stamps: Vec<f64> =
        sqlx::query_scalar("SELECT CAST(timestamp AS REAL) FROM timestamps ORDER BY id")
            .fetch_all(pool.inner())
            .await
            .unwrap();
    assert_eq!(stamps.len() as u64, summary.producer.ticks);
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));

    let span = stamps[stamps.len() - 1] - stamps[0];
    assert!(span < 1.5, "ticks spread over {span}s");
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_drain_commits_partial_batch() {
    let (_dir, url) = temp_store("drain.db");
    let mut pipeline = acceleration_builder(&url, vec![1, 2, 3])
        .sample_rate(1000.0)
        .batch_size(20)
        .tick_limit(Some(37))
        .build()
        .unwrap();

    let summary = run_to_completion(&mut pipeline).await;
    assert_eq!(summary.producer.ticks, 37);
    assert_eq!(summary.consumer.commits, 2);
    assert_eq!(summary.consumer.ticks_committed, 37);
    assert_eq!(summary.consumer.rows_committed, 37 * 3);
    assert!(summary.is_lossless());

    let pool = SqlitePool::connect(&url).await.unwrap();
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM timestamps").await, 37);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM accelerations").await, 111);
}

#[tokio::test]
async fn test_stop_mid_run_loses_nothing() {
    let (_dir, url) = temp_store("midrun.db");
    let mut pipeline = climate_builder(&url)
        .sample_rate(200.0)
        .batch_size(1000)
        .build()
        .unwrap();

    pipeline.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    let summary = pipeline.stop().await.unwrap().unwrap();

    assert!(summary.producer.ticks > 0);
    assert!(summary.is_lossless());
    // Nothing reached the size threshold, so the drain made the only commit.
    assert_eq!(summary.consumer.commits, 1);

    let pool = SqlitePool::connect(&url).await.unwrap();
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM timestamps").await as u64,
        summary.producer.ticks
    );
}

#[tokio::test]
async fn test_referential_integrity() {
    let (_dir, url) = temp_store("integrity.db");
    let mut pipeline = climate_builder(&url)
        .sample_rate(1000.0)
        .batch_size(7)
        .tick_limit(Some(30))
        .build()
        .unwrap();
    run_to_completion(&mut pipeline).await;

    let pool = SqlitePool::connect(&url).await.unwrap();
    for table in ["temperature", "humidity"] {
        let orphans = count(
            &pool,
            &format!(
                "SELECT COUNT(*) FROM {table} m
                 LEFT JOIN timestamps t ON t.id = m.timestamp_id
                 LEFT JOIN sensors s ON s.id = m.sensor_id
                 WHERE t.id IS NULL OR s.id IS NULL"
            ),
        )
        .await;
        assert_eq!(orphans, 0, "{table} has dangling references");
        assert_eq!(count(&pool, &format!("SELECT COUNT(*) FROM {table}")).await, 30);
    }

    // Every tick carries exactly one reading per sensor.
    let uneven = count(
        &pool,
        "SELECT COUNT(*) FROM timestamps t
         WHERE (SELECT COUNT(*) FROM temperature m WHERE m.timestamp_id = t.id) != 1
            OR (SELECT COUNT(*) FROM humidity m WHERE m.timestamp_id = t.id) != 1",
    )
    .await;
    assert_eq!(uneven, 0);

    let max_humidity: f64 = sqlx::query_scalar("SELECT MAX(humidity) FROM humidity")
        .fetch_one(pool.inner())
        .await
        .unwrap();
    assert!(max_humidity <= HUMIDITY_CEILING);
}

#[tokio::test]
async fn test_pipelines_share_store_idempotently() {
    let (_dir, url) = temp_store("shared.db");

    let mut climate = climate_builder(&url)
        .sample_rate(1000.0)
        .tick_limit(Some(3))
        .build()
        .unwrap();
    let mut accelerations = acceleration_builder(&url, vec![2, 3, 4])
        .sample_rate(1000.0)
        .tick_limit(Some(4))
        .build()
        .unwrap();

    run_to_completion(&mut climate).await;
    run_to_completion(&mut accelerations).await;
    run_to_completion(&mut climate).await;

    let pool = SqlitePool::connect(&url).await.unwrap();
    let numbers: Vec<i64> =
        sqlx::query_scalar("SELECT sensor_number FROM sensors ORDER BY sensor_number")
            .fetch_all(pool.inner())
            .await
            .unwrap();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM timestamps").await, 10);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM temperature").await, 6);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM accelerations").await, 12);
}

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn test_shipped_config_builds() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/sensorgen.yaml");
    let config = AppConfig::load(path).expect("Shipped config must be valid");

    let names: Vec<&str> = config.pipelines.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["climate", "accelerations"]);

    for pipeline_config in &config.pipelines {
        let pipeline = pipeline_config.to_pipeline().unwrap();
        assert!(!pipeline.is_running());
    }
}

#[tokio::test]
async fn test_config_driven_run() {
    let (dir, url) = temp_store("configured.db");
    let yaml = format!(
        r#"
pipelines:
  - name: bench
    store: "{url}"
    sample_rate: 1000
    batch_size: 4
    tick_limit: 10
    noise_seed: 9
    channels:
      - kind: temperature
        sensors: [11, 12]
      - kind: acceleration
        sensors: [21]
"#
    );
    let config = AppConfig::from_yaml(&yaml).unwrap();
    let mut pipeline = config.pipelines[0].to_pipeline().unwrap();

    let summary = run_to_completion(&mut pipeline).await;
    assert_eq!(summary.producer.ticks, 10);
    assert_eq!(summary.consumer.commits, 3);
    assert_eq!(summary.consumer.rows_committed, 30);

    let pool = SqlitePool::connect(&url).await.unwrap();
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM temperature").await, 20);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM accelerations").await, 10);
    drop(dir);
}
