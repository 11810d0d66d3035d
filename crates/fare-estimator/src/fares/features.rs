use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use super::domain::{TripInput, MAX_ZONE_ID};
use super::rules::zones::LAGUARDIA_AIRPORT;
use super::rules::RuleEngine;

pub const FEATURE_COUNT: usize = 13;

/// Column order of every [`FeatureVector`]; persisted in the model bundle.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "trip_distance",
    "duration_min",
    "pickup_hour",
    "pickup_day",
    "pickup_month",
    "pickup_zone_encoded",
    "dropoff_zone_encoded",
    "hour_sin",
    "hour_cos",
    "is_weekend",
    "is_rush_hour",
    "average_speed_mph",
    "ratecode",
];

pub const SPLIT_FEATURE_COUNT: usize = 11;

/// Column order of every [`SplitFeatures`]. Zones enter as raw ids.
pub const SPLIT_FEATURE_NAMES: [&str; SPLIT_FEATURE_COUNT] = [
    "trip_distance",
    "ratecode",
    "pickup_zone",
    "dropoff_zone",
    "duration_min",
    "is_rush_hour",
    "pickup_day",
    "average_speed_mph",
    "is_laguardia",
    "in_congestion_zone",
    "residual",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|candidate| *candidate == name)
            .map(|index| self.0[index])
    }
}

/// Frequency encoding of pickup and drop-off zones, fitted on the training
/// trips and reused verbatim at inference.
///
/// Zones never seen during training encode to 0.0; predictions for them fall
/// back to whatever the trees learned for the rarest zones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneEncoding {
    pickup: Vec<f64>,
    dropoff: Vec<f64>,
}

impl ZoneEncoding {
    const TABLE_LEN: usize = MAX_ZONE_ID as usize + 1;

    pub fn fit<'a, I>(trips: I) -> Self
    where
        I: IntoIterator<Item = &'a TripInput>,
    {
        let mut pickup = vec![0.0; Self::TABLE_LEN];
        let mut dropoff = vec![0.0; Self::TABLE_LEN];
        let mut total = 0usize;

        for trip in trips {
            if let Some(slot) = pickup.get_mut(trip.pickup_zone as usize) {
                *slot += 1.0;
            }
            if let Some(slot) = dropoff.get_mut(trip.dropoff_zone as usize) {
                *slot += 1.0;
            }
            total += 1;
        }

        if total > 0 {
            let total = total as f64;
            pickup.iter_mut().for_each(|count| *count /= total);
            dropoff.iter_mut().for_each(|count| *count /= total);
        }

        Self { pickup, dropoff }
    }

    pub fn pickup(&self, zone: u16) -> f64 {
        self.pickup.get(zone as usize).copied().unwrap_or(0.0)
    }

    pub fn dropoff(&self, zone: u16) -> f64 {
        self.dropoff.get(zone as usize).copied().unwrap_or(0.0)
    }

    pub fn validate(&self) -> Result<(), String> {
        for (label, table) in [("pickup", &self.pickup), ("dropoff", &self.dropoff)] {
            if table.len() != Self::TABLE_LEN {
                return Err(format!(
                    "{label} table has {} entries, expected {}",
                    table.len(),
                    Self::TABLE_LEN
                ));
            }
            if table
                .iter()
                .any(|share| !share.is_finite() || *share < 0.0 || *share > 1.0)
            {
                return Err(format!("{label} table contains shares outside [0, 1]"));
            }
        }
        Ok(())
    }
}

/// Build the model input for a trip. Only flags are taken from the rule
/// engine; surcharge amounts never enter the feature vector.
pub fn build_features(
    trip: &TripInput,
    encoding: &ZoneEncoding,
    rules: &RuleEngine,
) -> FeatureVector {
    let hour_angle = TAU * f64::from(trip.pickup_hour) / 24.0;

    FeatureVector([
        trip.trip_distance,
        trip.duration_min,
        f64::from(trip.pickup_hour),
        f64::from(trip.pickup_day),
        f64::from(trip.pickup_month),
        encoding.pickup(trip.pickup_zone),
        encoding.dropoff(trip.dropoff_zone),
        hour_angle.sin(),
        hour_angle.cos(),
        flag(trip.is_weekend()),
        flag(rules.is_rush_hour(trip)),
        trip.average_speed_mph(),
        f64::from(rules.ratecode(trip).code()),
    ])
}

/// Input of the tip and toll models. `residual` is the observed residual
/// during training and the predicted one at inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitFeatures([f64; SPLIT_FEATURE_COUNT]);

impl SplitFeatures {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        SPLIT_FEATURE_NAMES
            .iter()
            .position(|candidate| *candidate == name)
            .map(|index| self.0[index])
    }
}

pub fn build_split_features(trip: &TripInput, rules: &RuleEngine, residual: f64) -> SplitFeatures {
    SplitFeatures([
        trip.trip_distance,
        f64::from(rules.ratecode(trip).code()),
        f64::from(trip.pickup_zone),
        f64::from(trip.dropoff_zone),
        trip.duration_min,
        flag(rules.is_rush_hour(trip)),
        f64::from(trip.pickup_day),
        trip.average_speed_mph(),
        flag(trip.touches(LAGUARDIA_AIRPORT)),
        flag(rules.in_congestion_zone(trip)),
        residual,
    ])
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}
