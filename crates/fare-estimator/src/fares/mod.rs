//! Hybrid fare estimation: deterministic surcharge rules plus a learned
//! ensemble for the residual fare.
//!
//! Training decomposes historical fares into rule components and a residual,
//! fits the ensemble on the residual and the tip and toll models on its
//! parts, and writes a checksummed bundle.
//! Inference rebuilds the itemized fare from the rules and the published
//! bundle.

pub mod artifact;
pub mod decomposition;
pub mod domain;
pub mod ensemble;
pub mod features;
pub mod history;
pub mod model;
pub mod recompose;
pub mod router;
pub mod rules;
pub mod service;
pub mod split;
pub mod training;

#[cfg(test)]
mod tests;

pub use artifact::{ArtifactError, BundleManifest, BundlePayload, ModelBundle};
pub use decomposition::{
    decompose, decompose_batch, decompose_target, DataInconsistencyError, DecompositionReport,
    ResidualTarget,
};
pub use domain::{
    FareBreakdown, FareComponent, ObservedFare, PredictionError, Ratecode, TripInput, TripRecord,
    TripRequest, ValidationError,
};
pub use ensemble::{CombinationRule, Ensemble, EnsembleConfig, EnsembleError};
pub use features::{
    build_features, build_split_features, FeatureVector, SplitFeatures, ZoneEncoding,
    FEATURE_COUNT, FEATURE_NAMES, SPLIT_FEATURE_COUNT, SPLIT_FEATURE_NAMES,
};
pub use history::{load_trip_history, read_trip_history, HistoryError};
pub use model::{FareModel, ModelRegistry, ModelUnavailableError};
pub use recompose::{recompose, ResidualSplit};
pub use router::fare_router;
pub use rules::{DeterministicComponents, FareSchedule, RuleEngine};
pub use service::{EstimationError, FareEstimate, FareEstimationService};
pub use split::{ShareModel, SplitModel};
pub use training::{train_bundle, TrainingError, TrainingOutcome};
