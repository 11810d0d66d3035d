use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use serde_json::Value;

use crate::fares::domain::{ObservedFare, PredictionError, TripInput, TripRecord, TripRequest};
use crate::fares::ensemble::{BoosterConfig, EnsembleConfig};
use crate::fares::features::{FeatureVector, SplitFeatures, ZoneEncoding};
use crate::fares::model::{FareModel, ModelRegistry};
use crate::fares::recompose::ResidualSplit;
use crate::fares::rules::RuleEngine;
use crate::fares::service::FareEstimationService;

pub(super) fn midtown_request() -> TripRequest {
    TripRequest {
        trip_distance: 5.2,
        pickup_location_id: 161,
        dropoff_location_id: 230,
        duration_min: 18.0,
        pickup_hour: 18,
        pickup_day: 2,
        pickup_month: 6,
    }
}

pub(super) fn midtown_payload() -> Value {
    serde_json::json!({
        "trip_distance": 5.2,
        "PULocationID": 161,
        "DOLocationID": 230,
        "duration_min": 18,
        "pickup_hour": 18,
        "pickup_day": 2,
        "pickup_month": 6
    })
}

/// Fixed-output model that counts how often it is asked for a prediction.
pub(super) struct CountingModel {
    calls: Arc<AtomicUsize>,
    residual: f64,
    encoding: ZoneEncoding,
    split: ResidualSplit,
}

impl CountingModel {
    pub(super) fn new(residual: f64) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = Self {
            calls: calls.clone(),
            residual,
            encoding: ZoneEncoding::fit(&Vec::new()),
            split: ResidualSplit {
                tip_share: 0.15,
                toll_share: 0.0,
            },
        };
        (model, calls)
    }
}

impl FareModel for CountingModel {
    fn version(&self) -> &str {
        "counting-test-model"
    }

    fn zone_encoding(&self) -> &ZoneEncoding {
        &self.encoding
    }

    fn residual_split(&self, _features: &SplitFeatures) -> Result<ResidualSplit, PredictionError> {
        Ok(self.split)
    }

    fn predict_residual(&self, _features: &FeatureVector) -> Result<f64, PredictionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.residual)
    }
}

pub(super) struct FailingModel {
    encoding: ZoneEncoding,
}

impl Default for FailingModel {
    fn default() -> Self {
        Self {
            encoding: ZoneEncoding::fit(&Vec::new()),
        }
    }
}

impl FareModel for FailingModel {
    fn version(&self) -> &str {
        "failing-test-model"
    }

    fn zone_encoding(&self) -> &ZoneEncoding {
        &self.encoding
    }

    fn residual_split(&self, _features: &SplitFeatures) -> Result<ResidualSplit, PredictionError> {
        Ok(ResidualSplit::default())
    }

    fn predict_residual(&self, _features: &FeatureVector) -> Result<f64, PredictionError> {
        Err(PredictionError::NonFiniteOutput { value: f64::NAN })
    }
}

pub(super) fn counting_service(
    residual: f64,
) -> (FareEstimationService<CountingModel>, Arc<AtomicUsize>) {
    let (model, calls) = CountingModel::new(residual);
    let service = FareEstimationService::new(
        RuleEngine::default(),
        Arc::new(ModelRegistry::with_model(model)),
    );
    (service, calls)
}

pub(super) fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 4096)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn small_ensemble_config() -> EnsembleConfig {
    EnsembleConfig {
        members: 3,
        booster: BoosterConfig {
            trees: 25,
            learning_rate: 0.2,
            max_depth: 3,
            min_samples_leaf: 3,
        },
        ..EnsembleConfig::default()
    }
}

pub(super) const ZONES: [i64; 10] = [161, 230, 236, 237, 48, 142, 132, 138, 79, 100];

pub(super) fn cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Deterministic, internally consistent trip history priced with the
/// default schedule plus a linear meter and a 15% tip.
pub(super) fn synthetic_history(count: usize) -> Vec<TripRecord> {
    let rules = RuleEngine::default();
    (0..count)
        .map(|i| {
            let distance = 0.5 + (i % 20) as f64 * 0.6;
            let duration = distance * 4.0 + (i % 5) as f64;
            let request = TripRequest {
                trip_distance: distance,
                pickup_location_id: ZONES[i % ZONES.len()],
                dropoff_location_id: ZONES[(i * 3 + 1) % ZONES.len()],
                duration_min: duration,
                pickup_hour: ((i * 7) % 24) as i64,
                pickup_day: (i % 7) as i64,
                pickup_month: (1 + i % 12) as i64,
            };
            let trip = TripInput::from_request(&request).expect("synthetic trip is valid");
            let components = rules.compute_deterministic(&trip);

            let metered = cents(3.0 + 2.5 * distance + 0.5 * duration);
            let tip = cents(metered * 0.15);
            let mut fare = ObservedFare {
                fare_amount: metered,
                extra: components.rushhour_surcharge + components.airport_surcharge,
                mta_tax: components.mta_tax,
                tip_amount: tip,
                tolls_amount: components.fixed_tolls,
                improvement_surcharge: components.improvement_surcharge,
                congestion_surcharge: components.congestion_surcharge,
                airport_fee: components.airport_fee,
                total_amount: 0.0,
            };
            fare.total_amount = cents(fare.itemized_sum());

            TripRecord {
                trip: request,
                ratecode: rules.ratecode(&trip),
                fare,
            }
        })
        .collect()
}
