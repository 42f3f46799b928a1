//! End-to-end driver runs over an in-memory archive and temp directories.

mod common;

use std::sync::Arc;

use common::{seed_inputs, test_config, unit, MemoryArchive};
use geosfp_common::{CalendarRange, OutputTarget, UnitSchedule};
use met_dataset::{DatasetIo, GridArchiveIo};
use pipeline::{
    JobStatus, PipelineDriver, PipelineError, RunMode, RunStatus, Stage, TargetConfig,
};
use test_utils::{assert_approx_eq, assert_no_partial_files, fixtures, surface_dataset, temp_test_dir};

fn six_days() -> UnitSchedule {
    CalendarRange::parse(fixtures::dates::RANGE_START, fixtures::dates::RANGE_END)
        .unwrap()
        .into()
}

fn driver(config: pipeline::PipelineConfig, archive: Arc<MemoryArchive>) -> PipelineDriver {
    PipelineDriver::with_components(config, archive, Arc::new(GridArchiveIo::new())).unwrap()
}

#[tokio::test]
async fn test_fetch_range_all_present_is_success() {
    let tmp = temp_test_dir();
    let archive = MemoryArchive::new();
    let driver = driver(test_config(tmp.path()), archive.clone());

    let report = driver.run(&six_days(), RunMode::Fetch).await.unwrap();
    assert_eq!(report.len(), fixtures::dates::RANGE_DAYS);
    assert_eq!(report.status(), RunStatus::Success);
    assert!(report.finished_at.is_some());

    let keys: Vec<String> = report.results().iter().map(|r| r.unit.key()).collect();
    assert_eq!(keys.first().map(String::as_str), Some("20140820"));
    assert_eq!(keys.last().map(String::as_str), Some("20140825"));

    // Second pass touches nothing.
    let calls = archive.calls();
    let report = driver.run(&six_days(), RunMode::Fetch).await.unwrap();
    assert!(report.results().iter().all(|r| r.status == JobStatus::Skipped));
    assert_eq!(report.status(), RunStatus::Success);
    assert_eq!(archive.calls(), calls);
}

#[tokio::test]
async fn test_interior_failure_is_partial() {
    let tmp = temp_test_dir();
    let archive = MemoryArchive::new();
    archive.fail_day("20140822");
    let driver = driver(test_config(tmp.path()), archive);

    let report = driver.run(&six_days(), RunMode::Fetch).await.unwrap();
    assert_eq!(report.len(), 6);
    assert_eq!(report.status(), RunStatus::Partial);
    assert_eq!(report.status().exit_code(), 2);
    assert_eq!(report.units_to_rerun(), vec!["20140822"]);
    assert_eq!(report.counts().success, 5);
}

#[tokio::test]
async fn test_every_unit_failing_is_failed() {
    let tmp = temp_test_dir();
    let archive = MemoryArchive::new();
    for day in ["20140820", "20140821"] {
        archive.fail_day(day);
    }
    let driver = driver(test_config(tmp.path()), archive);
    let schedule = UnitSchedule::parse_list("20140820,20140821").unwrap();

    let report = driver.run(&schedule, RunMode::Fetch).await.unwrap();
    assert_eq!(report.status(), RunStatus::Failed);
    assert_eq!(report.status().exit_code(), 1);
}

#[tokio::test]
async fn test_augment_range_writes_tsoil() {
    let tmp = temp_test_dir();
    let config = test_config(tmp.path());
    let io = GridArchiveIo::new();
    seed_inputs(
        &io,
        config.augment_input_root(),
        &config.augment.input_template,
        CalendarRange::parse("20140820", "20140825").unwrap(),
        fixtures::grid::SIMPLE_4X4,
        24,
    );
    let driver = driver(config, MemoryArchive::new());

    let report = driver.run(&six_days(), RunMode::Augment).await.unwrap();
    assert_eq!(report.len(), 6);
    assert_eq!(report.status(), RunStatus::Success);
    assert!(report.results().iter().all(|r| r.stage == Stage::Augment));

    let (_, out) = driver.augment_paths(&unit("20140823"));
    assert!(out.ends_with("2014/08/GEOSFP.20140823.A1.2x25.nc"));
    let written = io.read_dataset(&out).unwrap();
    assert!(written.has_variable(fixtures::variables::TSOIL1));
    assert_eq!(
        written.variable("TSOIL1").unwrap().attribute("day_of_year"),
        Some("235")
    );
    assert_no_partial_files!(tmp.path());
}

#[tokio::test]
async fn test_augment_is_deterministic() {
    let tmp = temp_test_dir();
    let config = test_config(tmp.path());
    let io = GridArchiveIo::new();
    seed_inputs(
        &io,
        config.augment_input_root(),
        &config.augment.input_template,
        [unit("20140820")],
        fixtures::grid::SIMPLE_4X4,
        24,
    );

    let mut first_config = config.clone();
    first_config.augment.output_root = tmp.path().join("first");
    let mut second_config = config.clone();
    second_config.augment.output_root = tmp.path().join("second");

    let schedule = UnitSchedule::parse_list("20140820").unwrap();
    let first = driver(first_config, MemoryArchive::new());
    let second = driver(second_config, MemoryArchive::new());
    first.run(&schedule, RunMode::Augment).await.unwrap();
    second.run(&schedule, RunMode::Augment).await.unwrap();

    let (_, a) = first.augment_paths(&unit("20140820"));
    let (_, b) = second.augment_paths(&unit("20140820"));
    assert_eq!(std::fs::read(&a).unwrap(), std::fs::read(&b).unwrap());
    assert!(io.read_dataset(&a).unwrap().fields_equal(&io.read_dataset(&b).unwrap()));
}

#[tokio::test]
async fn test_augment_missing_input_is_reported() {
    let tmp = temp_test_dir();
    let driver = driver(test_config(tmp.path()), MemoryArchive::new());
    let schedule = UnitSchedule::parse_list("20140820").unwrap();

    let report = driver.run(&schedule, RunMode::Augment).await.unwrap();
    assert_eq!(report.status(), RunStatus::Failed);
    let detail = report.results()[0].detail.clone().unwrap();
    assert!(detail.contains("Missing input"), "{}", detail);
}

#[tokio::test]
async fn test_augment_without_temperature_is_transform_failure() {
    let tmp = temp_test_dir();
    let config = test_config(tmp.path());
    let io = GridArchiveIo::new();
    let (raw, _) = driver(config.clone(), MemoryArchive::new()).augment_paths(&unit("20140820"));
    io.write_atomic(&test_utils::dataset_without_temperature(fixtures::grid::SIMPLE_4X4), &raw)
        .unwrap();

    let driver = driver(config, MemoryArchive::new());
    let schedule = UnitSchedule::parse_list("20140820,20140821").unwrap();
    let report = driver.run(&schedule, RunMode::Augment).await.unwrap();

    assert_eq!(report.len(), 2);
    let detail = report.results()[0].detail.clone().unwrap();
    assert!(detail.contains("Transform failed"), "{}", detail);
    assert!(report.results()[1].detail.clone().unwrap().contains("Missing input"));
}

#[tokio::test]
async fn test_fetch_and_augment_skips_augment_after_failed_fetch() {
    let tmp = temp_test_dir();
    let archive = MemoryArchive::new();
    archive.fail_day("20140821");
    let driver = driver(test_config(tmp.path()), archive);
    let schedule = UnitSchedule::parse_list("20140821").unwrap();

    let report = driver.run(&schedule, RunMode::FetchAndAugment).await.unwrap();
    let results = report.results();
    assert_eq!(results.len(), 2);
    assert_eq!((results[0].stage, results[0].status), (Stage::Fetch, JobStatus::Failed));
    assert_eq!((results[1].stage, results[1].status), (Stage::Augment, JobStatus::Failed));
    let detail = results[1].detail.as_deref().unwrap();
    assert!(detail.contains("Missing input"), "{}", detail);
    assert!(detail.contains(fixtures::collections::SLV), "{}", detail);
}

#[tokio::test]
async fn test_process_month_requires_month_units() {
    let tmp = temp_test_dir();
    let archive = MemoryArchive::new();
    let mut config = test_config(tmp.path());
    config.process.outputs.insert(
        "2x2.5".to_string(),
        TargetConfig {
            root_dir: tmp.path().join("out"),
            coarsen: 1,
        },
    );
    let driver = driver(config, archive.clone());

    let err = driver.run(&six_days(), RunMode::ProcessMonth).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidRange(_)));
    assert!(err.is_fatal());
    assert_eq!(archive.calls(), 0);
    assert!(!tmp.path().join("out").exists());
}

#[tokio::test]
async fn test_process_month_without_targets_is_config_error() {
    let tmp = temp_test_dir();
    let driver = driver(test_config(tmp.path()), MemoryArchive::new());
    let months = UnitSchedule::parse_list("201808").unwrap();

    let err = driver.run(&months, RunMode::ProcessMonth).await.unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[tokio::test]
async fn test_process_month_fans_out_through_driver() {
    let tmp = temp_test_dir();
    let mut config = test_config(tmp.path());
    for target in [
        OutputTarget::new("2x2.5", tmp.path().join("GEOS_2x2.5")),
        OutputTarget::new("4x5", tmp.path().join("GEOS_4x5")).with_coarsen(2),
    ] {
        config.process.outputs.insert(
            target.label.clone(),
            TargetConfig {
                root_dir: target.root_dir,
                coarsen: target.coarsen,
            },
        );
    }
    let io = GridArchiveIo::new();
    seed_inputs(
        &io,
        config.augment_input_root(),
        &config.augment.input_template,
        unit("201602").days(),
        fixtures::grid::SIMPLE_4X4,
        2,
    );
    let driver = driver(config, MemoryArchive::new());

    let months = UnitSchedule::parse_list(fixtures::dates::MONTH_FEB_2016).unwrap();
    let report = driver.run(&months, RunMode::ProcessMonth).await.unwrap();
    assert_eq!(report.len(), 29 * 2);
    assert_eq!(report.status(), RunStatus::Success);

    let coarse = io
        .read_dataset(&tmp.path().join("GEOS_4x5/2016/02/GEOSFP.20160229.A1.4x5.nc"))
        .unwrap();
    assert_eq!(coarse.dimension_len("lon"), Some(2));
    assert!(coarse.has_variable("TSOIL1"));
}

#[tokio::test]
async fn test_cancelled_run_stops_before_next_unit() {
    let tmp = temp_test_dir();
    let archive = MemoryArchive::new();
    let driver = driver(test_config(tmp.path()), archive.clone());

    driver.cancellation_token().cancel();
    let report = driver.run(&six_days(), RunMode::Fetch).await.unwrap();
    assert!(report.cancelled);
    assert!(report.is_empty());
    assert_eq!(archive.calls(), 0);

    assert_eq!(report.status(), RunStatus::Partial);
    assert_ne!(report.status().exit_code(), 0);
    assert_eq!(report.pending().len(), fixtures::dates::RANGE_DAYS);
    let rerun = report.units_to_rerun();
    assert_eq!(rerun.first().map(String::as_str), Some(fixtures::dates::RANGE_START));
    assert_eq!(rerun.last().map(String::as_str), Some(fixtures::dates::RANGE_END));
}

#[tokio::test]
async fn test_cancelled_month_list_lists_every_month_for_rerun() {
    let tmp = temp_test_dir();
    let driver = driver(test_config(tmp.path()), MemoryArchive::new());
    let months = UnitSchedule::parse_list(fixtures::dates::MONTH_LIST).unwrap();

    driver.cancellation_token().cancel();
    let report = driver.run(&months, RunMode::Fetch).await.unwrap();
    assert_eq!(report.units_to_rerun(), vec!["201805", "201806", "201807"]);
    assert_eq!(report.status(), RunStatus::Partial);
}

#[tokio::test]
async fn test_fetch_and_augment_uses_fetched_files() {
    let tmp = temp_test_dir();
    let config = test_config(tmp.path());
    let io = GridArchiveIo::new();
    let archive = MemoryArchive::new();
    archive.serve_dataset(&io, &surface_dataset(fixtures::grid::SIMPLE_4X4, 1));
    let driver = driver(config, archive.clone());

    let report = driver.run(&six_days(), RunMode::FetchAndAugment).await.unwrap();
    assert_eq!(report.len(), 2 * fixtures::dates::RANGE_DAYS);
    assert_eq!(report.status(), RunStatus::Success);
    assert!(report.results().iter().all(|r| r.status == JobStatus::Success));

    let day = unit("20140823");
    let inputs = driver.fetched_inputs(&day);
    assert_eq!(inputs.len(), 2);
    assert!(inputs.iter().all(|p| p.is_file()));

    let (_, out) = driver.augment_paths(&day);
    let written = io.read_dataset(&out).unwrap();
    assert_eq!(written.dimension_len("time"), Some(2));
    let ts = written.variable(fixtures::variables::TS).unwrap();
    let tsoil = written.variable(fixtures::variables::TSOIL1).unwrap();
    assert_eq!(tsoil.attribute("day_of_year"), Some("235"));
    // Identical hours: no diurnal anomaly, so the daily mean carries through.
    for (a, b) in ts.data.iter().zip(&tsoil.data) {
        assert_approx_eq!(*a, *b, 1e-3);
    }
    assert_no_partial_files!(tmp.path());

    // Rerun touches neither the archive nor the outputs.
    let calls = archive.calls();
    let report = driver.run(&six_days(), RunMode::FetchAndAugment).await.unwrap();
    assert!(report.results().iter().all(|r| r.status == JobStatus::Skipped));
    assert_eq!(archive.calls(), calls);
}

#[tokio::test]
async fn test_fetch_and_augment_requires_fetched_collection() {
    let tmp = temp_test_dir();
    let archive = MemoryArchive::new();
    let mut config = test_config(tmp.path());
    config.augment.raw_collection = fixtures::collections::FLX.to_string();
    let driver = driver(config, archive.clone());

    let err = driver.run(&six_days(), RunMode::FetchAndAugment).await.unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
    assert_eq!(archive.calls(), 0);
}
