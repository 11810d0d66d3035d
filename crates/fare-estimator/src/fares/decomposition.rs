use std::collections::BTreeMap;

use tracing::{debug, info};

use super::domain::{Ratecode, TripInput, TripRecord, ValidationError, ITEMIZATION_TOLERANCE};
use super::features::{build_features, FeatureVector, ZoneEncoding};
use super::rules::RuleEngine;

/// Residuals this close below zero are float noise from summing cents.
const RESIDUAL_EPSILON: f64 = 1e-9;

/// Why a historical record cannot be used as a training target.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataInconsistencyError {
    #[error("invalid trip fields: {0}")]
    InvalidTrip(#[from] ValidationError),
    #[error("itemized components sum to {itemized} but total is {total}")]
    ItemizationMismatch { itemized: f64, total: f64 },
    #[error("ratecode {0:?} is not priced by the meter")]
    UnmeteredRatecode(Ratecode),
    #[error("deterministic components {deterministic} exceed total {total}")]
    NegativeResidual { total: f64, deterministic: f64 },
}

impl DataInconsistencyError {
    pub fn reason(&self) -> &'static str {
        match self {
            DataInconsistencyError::InvalidTrip(_) => "invalid_trip",
            DataInconsistencyError::ItemizationMismatch { .. } => "itemization_mismatch",
            DataInconsistencyError::UnmeteredRatecode(_) => "unmetered_ratecode",
            DataInconsistencyError::NegativeResidual { .. } => "negative_residual",
        }
    }
}

/// Part of a historical fare the rules cannot explain, with the observed
/// tip and variable tolls it contains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualTarget {
    pub trip: TripInput,
    pub residual: f64,
    pub tip: f64,
    pub variable_tolls: f64,
}

/// Split a record into its validated trip and residual target. Records are
/// rejected rather than clipped so the target distribution stays honest.
pub fn decompose_target(
    record: &TripRecord,
    rules: &RuleEngine,
) -> Result<ResidualTarget, DataInconsistencyError> {
    let trip = TripInput::from_request(&record.trip)?;

    if !record.ratecode.is_metered() {
        return Err(DataInconsistencyError::UnmeteredRatecode(record.ratecode));
    }

    let fare = &record.fare;
    let itemized = fare.itemized_sum();
    if (itemized - fare.total_amount).abs() > ITEMIZATION_TOLERANCE {
        return Err(DataInconsistencyError::ItemizationMismatch {
            itemized,
            total: fare.total_amount,
        });
    }

    let components = rules.compute_deterministic(&trip);
    let deterministic = components.total();
    let residual = fare.total_amount - deterministic;
    if residual < -RESIDUAL_EPSILON {
        return Err(DataInconsistencyError::NegativeResidual {
            total: fare.total_amount,
            deterministic,
        });
    }

    Ok(ResidualTarget {
        trip,
        residual: residual.max(0.0),
        tip: fare.tip_amount.max(0.0),
        variable_tolls: (fare.tolls_amount - components.fixed_tolls).max(0.0),
    })
}

/// Feature vector and residual for one record, given a fitted encoding.
pub fn decompose(
    record: &TripRecord,
    rules: &RuleEngine,
    encoding: &ZoneEncoding,
) -> Result<(FeatureVector, f64), DataInconsistencyError> {
    let target = decompose_target(record, rules)?;
    Ok((
        build_features(&target.trip, encoding, rules),
        target.residual,
    ))
}

/// Counts of accepted and excluded records from a batch decomposition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecompositionReport {
    pub accepted: usize,
    pub excluded: BTreeMap<&'static str, usize>,
}

impl DecompositionReport {
    pub fn excluded_total(&self) -> usize {
        self.excluded.values().sum()
    }

    pub fn excluded_for(&self, reason: &str) -> usize {
        self.excluded.get(reason).copied().unwrap_or(0)
    }
}

/// Decompose every record, skipping the inconsistent ones.
pub fn decompose_batch(
    records: &[TripRecord],
    rules: &RuleEngine,
) -> (Vec<ResidualTarget>, DecompositionReport) {
    let mut targets = Vec::with_capacity(records.len());
    let mut report = DecompositionReport::default();

    for (index, record) in records.iter().enumerate() {
        match decompose_target(record, rules) {
            Ok(target) => {
                targets.push(target);
                report.accepted += 1;
            }
            Err(err) => {
                debug!(
                    record = index,
                    reason = err.reason(),
                    error = %err,
                    "excluding trip record"
                );
                *report.excluded.entry(err.reason()).or_default() += 1;
            }
        }
    }

    info!(
        accepted = report.accepted,
        excluded = report.excluded_total(),
        "decomposed trip history"
    );
    (targets, report)
}
