use super::common::*;
use chrono::{TimeZone, Utc};
use std::path::PathBuf;
use std::sync::Arc;

use crate::fares::artifact::ModelBundle;
use crate::fares::domain::{Ratecode, TripInput};
use crate::fares::ensemble::EnsembleConfig;
use crate::fares::model::{FareModel, ModelRegistry, ModelUnavailableError};
use crate::fares::rules::{FareSchedule, RuleEngine};
use crate::fares::service::FareEstimationService;
use crate::fares::training::{train_bundle, TrainingError};

fn trained_at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

fn scratch_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("fare-estimator-{name}-{}", std::process::id()))
}

#[test]
fn trains_a_verifiable_bundle_from_history() {
    let mut records = synthetic_history(240);
    records[3].ratecode = Ratecode::Negotiated;
    records[5].fare.total_amount = 1.0;

    let outcome = train_bundle(
        &records,
        &RuleEngine::default(),
        &small_ensemble_config(),
        trained_at(),
    )
    .expect("training succeeds");

    assert_eq!(outcome.report.accepted, 238);
    assert_eq!(outcome.report.excluded_for("unmetered_ratecode"), 1);
    assert_eq!(outcome.report.excluded_for("itemization_mismatch"), 1);
    assert_eq!(outcome.bundle.manifest().training_rows, 238);
    assert_eq!(outcome.bundle.ensemble().members().len(), 3);
    assert!(outcome.bundle.verify().is_ok());
    assert!(outcome.training_rmse.is_finite());

    let split_model = outcome.bundle.split_model();
    assert_eq!(split_model.tip.kind(), "hurdle");
    assert_eq!(split_model.tolls.kind(), "absent");
}

#[test]
fn tips_follow_the_pickup_zones_that_tipped() {
    let mut records = synthetic_history(240);
    for record in &mut records {
        if record.trip.pickup_location_id != 161 {
            record.fare.tip_amount = 0.0;
            record.fare.total_amount = cents(record.fare.itemized_sum());
        }
    }
    let config = EnsembleConfig {
        feature_fraction: 1.0,
        ..small_ensemble_config()
    };
    let outcome = train_bundle(&records, &RuleEngine::default(), &config, trained_at())
        .expect("training succeeds");
    assert_eq!(outcome.report.accepted, 240);

    let service = FareEstimationService::new(
        RuleEngine::default(),
        Arc::new(ModelRegistry::with_model(outcome.bundle)),
    );
    let tipped = TripInput::new(ZONES[0], ZONES[1], 2.9, 12.0, 14, 3, 5).expect("valid trip");
    let untipped = TripInput::new(ZONES[4], ZONES[3], 2.9, 12.0, 14, 3, 5).expect("valid trip");

    let tipped = service.estimate_trip(&tipped).expect("estimates").breakdown;
    let untipped = service.estimate_trip(&untipped).expect("estimates").breakdown;
    assert!(tipped.tip > 0.0, "{tipped:?}");
    assert_eq!(untipped.tip, 0.0, "{untipped:?}");
    assert!(untipped.fare > 0.0);
}

#[test]
fn training_is_deterministic_for_a_seed() {
    let records = synthetic_history(120);
    let rules = RuleEngine::default();
    let config = small_ensemble_config();

    let first = train_bundle(&records, &rules, &config, trained_at()).expect("trains");
    let second = train_bundle(&records, &rules, &config, trained_at()).expect("trains");
    assert_eq!(
        first.bundle.manifest().checksum,
        second.bundle.manifest().checksum
    );
    assert_eq!(first.bundle.version(), second.bundle.version());
}

#[test]
fn training_without_usable_records_fails() {
    let mut records = synthetic_history(4);
    for record in &mut records {
        record.ratecode = Ratecode::GroupRide;
    }

    let result = train_bundle(
        &records,
        &RuleEngine::default(),
        &small_ensemble_config(),
        trained_at(),
    );
    assert!(matches!(
        result,
        Err(TrainingError::EmptyTrainingSet { excluded: 4 })
    ));
}

#[test]
fn trained_bundle_serves_estimates_after_reload() {
    let records = synthetic_history(200);
    let outcome = train_bundle(
        &records,
        &RuleEngine::default(),
        &small_ensemble_config(),
        trained_at(),
    )
    .expect("training succeeds");

    let dir = scratch_dir("reload");
    let path = dir.join("bundle.json");
    outcome.bundle.save(&path).expect("bundle saves");

    let service: FareEstimationService<ModelBundle> =
        FareEstimationService::new(RuleEngine::default(), Arc::new(ModelRegistry::empty()));
    let version = service.reload_from(&path).expect("reload succeeds");
    assert_eq!(version, outcome.bundle.version());
    assert_eq!(service.model_version(), Some(version));

    let estimate = service
        .estimate(&midtown_request())
        .expect("estimate succeeds");
    let breakdown = estimate.breakdown;
    assert!(breakdown.fare > 0.0);
    assert!(breakdown.congestion_surcharge > 0.0);
    assert!(breakdown.rushhour_surcharge > 0.0);
    assert!((breakdown.total - breakdown.component_sum()).abs() < 1e-6);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn failed_reload_keeps_the_previous_model() {
    let outcome = train_bundle(
        &synthetic_history(120),
        &RuleEngine::default(),
        &small_ensemble_config(),
        trained_at(),
    )
    .expect("training succeeds");
    let original = outcome.bundle.version().to_string();

    let service = FareEstimationService::new(
        RuleEngine::default(),
        Arc::new(ModelRegistry::with_model(outcome.bundle.clone())),
    );

    let missing = scratch_dir("missing").join("absent.json");
    assert!(matches!(
        service.reload_from(&missing),
        Err(ModelUnavailableError::LoadFailed(_))
    ));
    assert_eq!(service.model_version(), Some(original.clone()));

    let mut schedule = FareSchedule::nyc_yellow();
    schedule.mta_tax = 0.75;
    let strict = FareEstimationService::new(
        RuleEngine::new(schedule),
        Arc::new(ModelRegistry::with_model(outcome.bundle.clone())),
    );
    let dir = scratch_dir("schedule");
    let path = dir.join("bundle.json");
    outcome.bundle.save(&path).expect("bundle saves");
    assert!(matches!(
        strict.reload_from(&path),
        Err(ModelUnavailableError::LoadFailed(_))
    ));
    assert_eq!(strict.model_version(), Some(original));

    let _ = std::fs::remove_dir_all(&dir);
}
