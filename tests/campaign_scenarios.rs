//! End-to-end campaign scenarios
//!
//! Toyota Way: Jidoka (built-in quality)
//! A killed or repeated run must never change what a finished run produced.

mod common;

use arrow::array::Array;
use common::{bytes, campaign_config, f64_col, read_table, scratch_dir, str_col, ScriptedSimulator};
use trueno_sweep::campaign::Campaign;
use trueno_sweep::failure::{read_failure_log, FailureKind};
use trueno_sweep::Error;

#[test]
fn test_five_samples_one_failure() {
    let dir = scratch_dir("five_one_failure");
    let campaign = Campaign::new(campaign_config(&dir, 5, 2, 2, 1)).unwrap();
    let summary = campaign
        .run(ScriptedSimulator::new().infeasible("S_00003"))
        .unwrap();

    let parts = campaign.paths().parts_dir();
    for name in ["part_0_2.parquet", "part_2_4.parquet", "part_4_5.parquet"] {
        assert!(parts.join(name).is_file(), "{name} missing");
    }
    assert_eq!(std::fs::read_dir(&parts).unwrap().count(), 3);

    let failures = read_failure_log(campaign.paths().failure_log()).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].sample_id, "S_00003");
    assert_eq!(failures[0].error_kind, FailureKind::SimulatorInfeasible);

    let features = read_table(&campaign.paths().features());
    assert_eq!(features.num_rows(), 5);
    let ids: Vec<_> = str_col(&features, "sample_id").iter().flatten().collect();
    assert_eq!(ids, vec!["S_00000", "S_00001", "S_00002", "S_00003", "S_00004"]);
    for column in ["objective_value", "width__T1", "mid__T1"] {
        let values = f64_col(&features, column);
        assert!(values.is_null(3), "{column} should be null for S_00003");
        assert_eq!(values.null_count(), 1, "{column}");
    }
    // Target T1 is [c - 1, c + 2]: width 3.
    assert!((f64_col(&features, "width__T1").value(0) - 3.0).abs() < 1e-12);

    let long = read_table(&campaign.paths().intervals_long());
    assert_eq!(long.num_rows(), 4);

    let schedule = summary.schedule().unwrap();
    assert_eq!(schedule.chunks_total, 3);
    assert_eq!(schedule.samples_succeeded, 4);
    assert_eq!(schedule.samples_failed, 1);
    assert_eq!(summary.failed_samples(), 1);
    assert!(campaign.paths().metadata().is_file());
    assert!(campaign.paths().summary().is_file());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_restart_recomputes_nothing() {
    let dir = scratch_dir("restart_idempotent");
    let config = campaign_config(&dir, 5, 2, 2, 2);

    let first = Campaign::new(config.clone()).unwrap();
    first
        .run(ScriptedSimulator::new().infeasible("S_00003"))
        .unwrap();
    let features_before = bytes(&first.paths().features());
    let design_before = bytes(&first.paths().design());

    let second = Campaign::new(config).unwrap();
    let simulator = ScriptedSimulator::new().infeasible("S_00003");
    let calls = simulator.call_counter();
    let summary = second.run(simulator).unwrap();

    assert_eq!(calls.get(), 0);
    let schedule = summary.schedule().unwrap();
    assert_eq!(schedule.chunks_skipped, 3);
    assert_eq!(schedule.chunks_processed, 0);
    assert_eq!(bytes(&second.paths().features()), features_before);
    assert_eq!(bytes(&second.paths().design()), design_before);
    // The failure log survives a run that processed nothing.
    assert_eq!(read_failure_log(second.paths().failure_log()).unwrap().len(), 1);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_deleted_chunk_is_the_only_one_recomputed() {
    let dir = scratch_dir("deleted_chunk");
    let config = campaign_config(&dir, 5, 2, 2, 1);

    let campaign = Campaign::new(config.clone()).unwrap();
    campaign
        .run(ScriptedSimulator::new().infeasible("S_00003"))
        .unwrap();
    let parts = campaign.paths().parts_dir();
    let first_chunk = bytes(&parts.join("part_0_2.parquet"));
    let last_chunk = bytes(&parts.join("part_4_5.parquet"));
    let middle_chunk = bytes(&parts.join("part_2_4.parquet"));
    let features = bytes(&campaign.paths().features());

    std::fs::remove_file(parts.join("part_2_4.parquet")).unwrap();

    let simulator = ScriptedSimulator::new().infeasible("S_00003");
    let calls = simulator.call_counter();
    let summary = Campaign::new(config).unwrap().run(simulator).unwrap();

    assert_eq!(calls.get(), 2, "only S_00002 and S_00003 are re-evaluated");
    assert_eq!(summary.schedule().unwrap().chunks_processed, 1);
    assert_eq!(bytes(&parts.join("part_0_2.parquet")), first_chunk);
    assert_eq!(bytes(&parts.join("part_4_5.parquet")), last_chunk);
    assert_eq!(bytes(&parts.join("part_2_4.parquet")), middle_chunk);
    assert_eq!(bytes(&campaign.paths().features()), features);

    let failures = read_failure_log(campaign.paths().failure_log()).unwrap();
    assert_eq!(failures.len(), 1, "recomputed failure is not logged twice");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_recomputed_chunk_clears_stale_failure() {
    let dir = scratch_dir("stale_failure");
    let config = campaign_config(&dir, 5, 2, 1, 1);

    let campaign = Campaign::new(config.clone()).unwrap();
    campaign
        .run(ScriptedSimulator::new().infeasible("S_00003"))
        .unwrap();
    std::fs::remove_file(campaign.paths().parts_dir().join("part_2_4.parquet")).unwrap();

    // The simulator was fixed between invocations.
    Campaign::new(config).unwrap().run(ScriptedSimulator::new()).unwrap();

    assert!(read_failure_log(campaign.paths().failure_log())
        .unwrap()
        .is_empty());
    let features = read_table(&campaign.paths().features());
    assert_eq!(f64_col(&features, "width__T1").null_count(), 0);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_total_failure_still_completes() {
    let dir = scratch_dir("total_failure");
    let campaign = Campaign::new(campaign_config(&dir, 5, 2, 2, 3)).unwrap();
    let summary = campaign.run(ScriptedSimulator::new().fail_all()).unwrap();

    assert_eq!(summary.feature_rows(), 5);
    assert_eq!(summary.samples_with_results(), 0);
    assert_eq!(read_failure_log(campaign.paths().failure_log()).unwrap().len(), 5);

    let features = read_table(&campaign.paths().features());
    assert_eq!(features.num_rows(), 5);
    for column in ["objective_value", "width__T1", "mid__T3"] {
        assert_eq!(f64_col(&features, column).null_count(), 5, "{column}");
    }
    // Design columns are never null.
    assert_eq!(f64_col(&features, "atpm").null_count(), 0);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_collect_matches_run_output() {
    let dir = scratch_dir("collect_matches");
    let config = campaign_config(&dir, 7, 3, 2, 2);
    let campaign = Campaign::new(config.clone()).unwrap();
    campaign
        .run(ScriptedSimulator::new().infeasible("S_00005"))
        .unwrap();
    let features = bytes(&campaign.paths().features());
    std::fs::remove_file(campaign.paths().features()).unwrap();

    let summary = Campaign::new(config).unwrap().collect().unwrap();
    assert!(summary.schedule().is_none());
    assert_eq!(summary.failed_samples(), 1);
    assert_eq!(bytes(&campaign.paths().features()), features);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_copied_artifact_is_rejected_as_duplicate() {
    let dir = scratch_dir("duplicate_artifact");
    let config = campaign_config(&dir, 4, 2, 1, 1);
    let campaign = Campaign::new(config.clone()).unwrap();
    campaign.run(ScriptedSimulator::new()).unwrap();

    let parts = campaign.paths().parts_dir();
    std::fs::copy(parts.join("part_0_2.parquet"), parts.join("part_8_10.parquet")).unwrap();

    let err = Campaign::new(config).unwrap().collect().unwrap_err();
    assert!(
        matches!(err, Error::DuplicateSample { ref sample_id, .. } if sample_id == "S_00000"),
        "{err}"
    );

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_chunk_size_does_not_change_features() {
    let small = scratch_dir("chunking_small");
    let large = scratch_dir("chunking_large");

    let a = Campaign::new(campaign_config(&small, 9, 2, 3, 2)).unwrap();
    a.run(ScriptedSimulator::new().infeasible("S_00004")).unwrap();
    let b = Campaign::new(campaign_config(&large, 9, 9, 1, 2)).unwrap();
    b.run(ScriptedSimulator::new().infeasible("S_00004")).unwrap();

    assert_eq!(
        read_table(&a.paths().features()),
        read_table(&b.paths().features())
    );

    std::fs::remove_dir_all(&small).ok();
    std::fs::remove_dir_all(&large).ok();
}

#[cfg(unix)]
#[test]
fn test_command_simulator_end_to_end() {
    use trueno_sweep::config::SimulatorSection;

    let dir = scratch_dir("command_simulator");
    let mut config = campaign_config(&dir, 3, 2, 2, 1);
    config.simulator = SimulatorSection {
        command: Some("sh".to_string()),
        args: vec![
            "-c".to_string(),
            r#"req=$(cat); case "$req" in
                 *target_interval*) echo '{"lower": -1.0, "upper": 1.0}' ;;
                 *) echo '{"status": "optimal", "objective_value": 2.0}' ;;
               esac"#
                .to_string(),
        ],
        ..SimulatorSection::default()
    };

    let campaign = Campaign::new(config).unwrap();
    let simulator = campaign.config().command_simulator().unwrap();
    let summary = campaign.run(simulator).unwrap();

    assert_eq!(summary.samples_with_results(), 3);
    let features = read_table(&campaign.paths().features());
    let width = f64_col(&features, "width__T1");
    assert!(width.iter().flatten().all(|w| (w - 2.0).abs() < 1e-12));

    std::fs::remove_dir_all(&dir).ok();
}
