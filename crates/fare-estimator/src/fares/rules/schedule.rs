use serde::{Deserialize, Serialize};

use super::zones::{MANHATTAN_CONGESTION_ZONES, NEWARK_AIRPORT, STATEN_ISLAND_ZONES};

/// Flat fees and surcharge rules applied on top of the metered fare.
///
/// The schedule a model was trained against is stored in its bundle, since
/// the residual targets are only meaningful relative to these amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareSchedule {
    pub mta_tax: f64,
    pub improvement_surcharge: f64,
    pub congestion_surcharge: f64,
    pub congestion_zones: Vec<u16>,
    pub airport_fee: AirportFee,
    pub laguardia_surcharge: f64,
    pub newark_dropoff_surcharge: f64,
    pub rush_hour: RushHourWindow,
    pub toll_crossings: Vec<TollCrossing>,
}

impl FareSchedule {
    /// NYC yellow cab schedule.
    pub fn nyc_yellow() -> Self {
        Self {
            mta_tax: 0.50,
            improvement_surcharge: 1.00,
            congestion_surcharge: 2.50,
            congestion_zones: MANHATTAN_CONGESTION_ZONES.to_vec(),
            airport_fee: AirportFee {
                reduced: 1.25,
                reduced_through_month: 3,
                standard: 1.75,
            },
            laguardia_surcharge: 5.00,
            newark_dropoff_surcharge: 20.00,
            rush_hour: RushHourWindow {
                start_hour: 16,
                end_hour: 20,
                amount: 2.50,
            },
            toll_crossings: vec![
                TollCrossing {
                    name: "hudson-river".to_string(),
                    zones: vec![NEWARK_AIRPORT],
                    direction: TollDirection::Both,
                    amount: 14.06,
                },
                TollCrossing {
                    name: "verrazzano-narrows".to_string(),
                    zones: STATEN_ISLAND_ZONES.to_vec(),
                    direction: TollDirection::Inbound,
                    amount: 6.94,
                },
            ],
        }
    }
}

impl Default for FareSchedule {
    fn default() -> Self {
        Self::nyc_yellow()
    }
}

/// JFK access fee, discounted early in the year.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AirportFee {
    pub reduced: f64,
    pub reduced_through_month: u8,
    pub standard: f64,
}

impl AirportFee {
    pub fn for_month(&self, month: u8) -> f64 {
        if month <= self.reduced_through_month {
            self.reduced
        } else {
            self.standard
        }
    }
}

/// Weekday evening surcharge window, `[start_hour, end_hour)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RushHourWindow {
    pub start_hour: u8,
    pub end_hour: u8,
    pub amount: f64,
}

impl RushHourWindow {
    pub fn contains(&self, hour: u8) -> bool {
        hour >= self.start_hour && hour < self.end_hour
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TollDirection {
    Inbound,
    Outbound,
    Both,
}

/// A bridge or tunnel charged when a trip enters or leaves a set of zones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TollCrossing {
    pub name: String,
    pub zones: Vec<u16>,
    pub direction: TollDirection,
    pub amount: f64,
}

impl TollCrossing {
    /// Exactly one endpoint must lie inside the zone set.
    pub fn charges(&self, pickup_zone: u16, dropoff_zone: u16) -> bool {
        let pickup_inside = self.zones.contains(&pickup_zone);
        let dropoff_inside = self.zones.contains(&dropoff_zone);

        match self.direction {
            TollDirection::Inbound => !pickup_inside && dropoff_inside,
            TollDirection::Outbound => pickup_inside && !dropoff_inside,
            TollDirection::Both => pickup_inside != dropoff_inside,
        }
    }
}
