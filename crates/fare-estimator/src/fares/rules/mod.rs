//! Deterministic fee rules: every surcharge that can be computed from trip
//! metadata alone, without the model.

mod schedule;
pub mod zones;

pub use schedule::{AirportFee, FareSchedule, RushHourWindow, TollCrossing, TollDirection};

use serde::Serialize;

use super::domain::{Ratecode, TripInput};
use zones::{ZoneSet, JFK_AIRPORT, LAGUARDIA_AIRPORT, NEWARK_AIRPORT, OUT_OF_CITY_ZONES};

/// Surcharges and fixed tolls owed on a trip. Recomputed per request.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct DeterministicComponents {
    pub mta_tax: f64,
    pub improvement_surcharge: f64,
    pub congestion_surcharge: f64,
    pub airport_fee: f64,
    pub airport_surcharge: f64,
    pub rushhour_surcharge: f64,
    pub fixed_tolls: f64,
}

impl DeterministicComponents {
    pub fn total(&self) -> f64 {
        self.named().iter().map(|(_, amount)| amount).sum()
    }

    pub fn named(&self) -> [(&'static str, f64); 7] {
        [
            ("mta_tax", self.mta_tax),
            ("improvement_surcharge", self.improvement_surcharge),
            ("congestion_surcharge", self.congestion_surcharge),
            ("airport_fee", self.airport_fee),
            ("airport_surcharge", self.airport_surcharge),
            ("rushhour_surcharge", self.rushhour_surcharge),
            ("fixed_tolls", self.fixed_tolls),
        ]
    }
}

/// Pure evaluator over a [`FareSchedule`]; identical trips always yield
/// identical components.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    schedule: FareSchedule,
    congestion: ZoneSet,
}

impl RuleEngine {
    pub fn new(schedule: FareSchedule) -> Self {
        let congestion = ZoneSet::new(&schedule.congestion_zones);
        Self {
            schedule,
            congestion,
        }
    }

    pub fn schedule(&self) -> &FareSchedule {
        &self.schedule
    }

    pub fn compute_deterministic(&self, trip: &TripInput) -> DeterministicComponents {
        DeterministicComponents {
            mta_tax: self.schedule.mta_tax,
            improvement_surcharge: self.schedule.improvement_surcharge,
            congestion_surcharge: self.congestion_surcharge(trip),
            airport_fee: self.airport_fee(trip),
            airport_surcharge: self.airport_surcharge(trip),
            rushhour_surcharge: if self.is_rush_hour(trip) {
                self.schedule.rush_hour.amount
            } else {
                0.0
            },
            fixed_tolls: self.fixed_tolls(trip),
        }
    }

    pub fn in_congestion_zone(&self, trip: &TripInput) -> bool {
        self.congestion.contains(trip.pickup_zone) || self.congestion.contains(trip.dropoff_zone)
    }

    pub fn is_rush_hour(&self, trip: &TripInput) -> bool {
        trip.is_weekday() && self.schedule.rush_hour.contains(trip.pickup_hour)
    }

    /// Ratecode the meter would select for this trip.
    pub fn ratecode(&self, trip: &TripInput) -> Ratecode {
        if trip.touches(JFK_AIRPORT) {
            Ratecode::Jfk
        } else if trip.touches(NEWARK_AIRPORT) {
            Ratecode::Newark
        } else if OUT_OF_CITY_ZONES.contains(&trip.dropoff_zone) {
            Ratecode::NassauWestchester
        } else {
            Ratecode::Standard
        }
    }

    fn congestion_surcharge(&self, trip: &TripInput) -> f64 {
        if self.in_congestion_zone(trip) {
            self.schedule.congestion_surcharge
        } else {
            0.0
        }
    }

    fn airport_fee(&self, trip: &TripInput) -> f64 {
        if trip.touches(JFK_AIRPORT) {
            self.schedule.airport_fee.for_month(trip.pickup_month)
        } else {
            0.0
        }
    }

    fn airport_surcharge(&self, trip: &TripInput) -> f64 {
        let mut surcharge = 0.0;
        if trip.touches(LAGUARDIA_AIRPORT) {
            surcharge += self.schedule.laguardia_surcharge;
        }
        if trip.dropoff_zone == NEWARK_AIRPORT && trip.pickup_zone != NEWARK_AIRPORT {
            surcharge += self.schedule.newark_dropoff_surcharge;
        }
        surcharge
    }

    fn fixed_tolls(&self, trip: &TripInput) -> f64 {
        self.schedule
            .toll_crossings
            .iter()
            .filter(|crossing| crossing.charges(trip.pickup_zone, trip.dropoff_zone))
            .map(|crossing| crossing.amount)
            .sum()
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(FareSchedule::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trip(pickup: i64, dropoff: i64, hour: i64, day: i64, month: i64) -> TripInput {
        TripInput::new(pickup, dropoff, 3.0, 15.0, hour, day, month).expect("valid trip")
    }

    #[test]
    fn flat_fees_apply_to_every_trip() {
        let engine = RuleEngine::default();
        let components = engine.compute_deterministic(&trip(75, 74, 10, 3, 5));
        assert_eq!(components.mta_tax, 0.50);
        assert_eq!(components.improvement_surcharge, 1.00);
        assert_eq!(components.congestion_surcharge, 0.0);
        assert_eq!(components.airport_fee, 0.0);
        assert_eq!(components.airport_surcharge, 0.0);
        assert_eq!(components.rushhour_surcharge, 0.0);
        assert_eq!(components.fixed_tolls, 0.0);
        assert!((components.total() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn congestion_applies_when_either_end_is_in_the_zone() {
        let engine = RuleEngine::default();
        assert_eq!(
            engine
                .compute_deterministic(&trip(161, 230, 10, 3, 5))
                .congestion_surcharge,
            2.50
        );
        assert_eq!(
            engine
                .compute_deterministic(&trip(138, 161, 10, 3, 5))
                .congestion_surcharge,
            2.50
        );
        assert_eq!(
            engine
                .compute_deterministic(&trip(161, 138, 10, 3, 5))
                .congestion_surcharge,
            2.50
        );
    }

    #[test]
    fn newark_to_laguardia_follows_airport_rules_only() {
        let engine = RuleEngine::default();
        let components = engine.compute_deterministic(&trip(1, 138, 10, 3, 5));
        assert_eq!(components.congestion_surcharge, 0.0);
        assert_eq!(components.airport_surcharge, 5.00);
        assert_eq!(components.airport_fee, 0.0);
        assert_eq!(components.fixed_tolls, 14.06);
    }

    #[test]
    fn newark_surcharge_depends_on_direction() {
        let engine = RuleEngine::default();
        let to_newark = engine.compute_deterministic(&trip(161, 1, 10, 3, 5));
        let from_newark = engine.compute_deterministic(&trip(1, 161, 10, 3, 5));
        assert_eq!(to_newark.airport_surcharge, 20.00);
        assert_eq!(from_newark.airport_surcharge, 0.0);
        assert_eq!(to_newark.fixed_tolls, from_newark.fixed_tolls);
    }

    #[test]
    fn jfk_fee_is_seasonal() {
        let engine = RuleEngine::default();
        assert_eq!(
            engine
                .compute_deterministic(&trip(132, 161, 10, 3, 2))
                .airport_fee,
            1.25
        );
        assert_eq!(
            engine
                .compute_deterministic(&trip(161, 132, 10, 3, 8))
                .airport_fee,
            1.75
        );
    }

    #[test]
    fn rush_hour_only_on_weekday_evenings() {
        let engine = RuleEngine::default();
        let amount = |hour, day| {
            engine
                .compute_deterministic(&trip(75, 74, hour, day, 6))
                .rushhour_surcharge
        };
        assert!(amount(18, 2) > 0.0);
        assert_eq!(amount(16, 1), 2.50);
        assert_eq!(amount(19, 5), 2.50);
        assert_eq!(amount(10, 2), 0.0);
        assert_eq!(amount(20, 2), 0.0);
        assert_eq!(amount(15, 2), 0.0);
        assert_eq!(amount(18, 0), 0.0);
        assert_eq!(amount(18, 6), 0.0);
    }

    #[test]
    fn staten_island_toll_is_charged_inbound() {
        let engine = RuleEngine::default();
        assert_eq!(
            engine
                .compute_deterministic(&trip(161, 5, 10, 3, 5))
                .fixed_tolls,
            6.94
        );
        assert_eq!(
            engine
                .compute_deterministic(&trip(5, 161, 10, 3, 5))
                .fixed_tolls,
            0.0
        );
    }

    #[test]
    fn identical_trips_yield_identical_components() {
        let engine = RuleEngine::default();
        for pickup in [1_i64, 5, 132, 138, 161, 230, 265] {
            for hour in [0_i64, 8, 17, 23] {
                let input = trip(pickup, 230, hour, 2, 6);
                assert_eq!(
                    engine.compute_deterministic(&input),
                    engine.compute_deterministic(&input)
                );
                assert_eq!(
                    engine.compute_deterministic(&input),
                    RuleEngine::default().compute_deterministic(&input)
                );
            }
        }
    }

    #[test]
    fn derives_ratecode_from_zones() {
        let engine = RuleEngine::default();
        assert_eq!(engine.ratecode(&trip(132, 161, 10, 3, 5)), Ratecode::Jfk);
        assert_eq!(engine.ratecode(&trip(161, 1, 10, 3, 5)), Ratecode::Newark);
        assert_eq!(
            engine.ratecode(&trip(161, 265, 10, 3, 5)),
            Ratecode::NassauWestchester
        );
        assert_eq!(engine.ratecode(&trip(161, 230, 10, 3, 5)), Ratecode::Standard);
    }
}
