use serde::{Deserialize, Serialize};

pub const MIN_ZONE_ID: u16 = 1;
pub const MAX_ZONE_ID: u16 = 265;

/// Tolerance used when checking that observed fare items add up to the total.
pub const ITEMIZATION_TOLERANCE: f64 = 0.01;

/// Loosely typed trip as it arrives over HTTP or from a history export.
///
/// Field names follow the TLC trip record columns. Values are only range
/// checked when converted into a [`TripInput`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TripRequest {
    pub trip_distance: f64,
    #[serde(rename = "PULocationID")]
    pub pickup_location_id: i64,
    #[serde(rename = "DOLocationID")]
    pub dropoff_location_id: i64,
    pub duration_min: f64,
    pub pickup_hour: i64,
    pub pickup_day: i64,
    pub pickup_month: i64,
}

/// Validated trip attributes consumed by the rule engine and feature builder.
///
/// `pickup_day` counts from Sunday (0) to Saturday (6).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TripInput {
    pub pickup_zone: u16,
    pub dropoff_zone: u16,
    pub trip_distance: f64,
    pub duration_min: f64,
    pub pickup_hour: u8,
    pub pickup_day: u8,
    pub pickup_month: u8,
}

impl TripInput {
    pub fn new(
        pickup_zone: i64,
        dropoff_zone: i64,
        trip_distance: f64,
        duration_min: f64,
        pickup_hour: i64,
        pickup_day: i64,
        pickup_month: i64,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            pickup_zone: zone("PULocationID", pickup_zone)?,
            dropoff_zone: zone("DOLocationID", dropoff_zone)?,
            trip_distance: non_negative("trip_distance", trip_distance)?,
            duration_min: non_negative("duration_min", duration_min)?,
            pickup_hour: bounded("pickup_hour", pickup_hour, 0, 23)?,
            pickup_day: bounded("pickup_day", pickup_day, 0, 6)?,
            pickup_month: bounded("pickup_month", pickup_month, 1, 12)?,
        })
    }

    pub fn is_weekday(&self) -> bool {
        (1..=5).contains(&self.pickup_day)
    }

    pub fn is_weekend(&self) -> bool {
        !self.is_weekday()
    }

    pub fn average_speed_mph(&self) -> f64 {
        if self.duration_min > 0.0 {
            self.trip_distance / (self.duration_min / 60.0)
        } else {
            0.0
        }
    }

    pub fn touches(&self, zone: u16) -> bool {
        self.pickup_zone == zone || self.dropoff_zone == zone
    }
}

impl TryFrom<TripRequest> for TripInput {
    type Error = ValidationError;

    fn try_from(request: TripRequest) -> Result<Self, Self::Error> {
        TripInput::from_request(&request)
    }
}

impl TripInput {
    pub fn from_request(request: &TripRequest) -> Result<Self, ValidationError> {
        Self::new(
            request.pickup_location_id,
            request.dropoff_location_id,
            request.trip_distance,
            request.duration_min,
            request.pickup_hour,
            request.pickup_day,
            request.pickup_month,
        )
    }
}

fn zone(field: &'static str, value: i64) -> Result<u16, ValidationError> {
    bounded(field, value, MIN_ZONE_ID as i64, MAX_ZONE_ID as i64)
}

fn bounded<T: TryFrom<i64>>(
    field: &'static str,
    value: i64,
    min: i64,
    max: i64,
) -> Result<T, ValidationError> {
    if !(min..=max).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            min,
            max,
            found: value,
        });
    }

    T::try_from(value).map_err(|_| ValidationError::OutOfRange {
        field,
        min,
        max,
        found: value,
    })
}

fn non_negative(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ValidationError::NegativeOrNonFinite {
            field,
            found: value,
        })
    }
}

/// Rejection raised before a trip reaches the model.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be between {min} and {max} (found {found})")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
        found: i64,
    },
    #[error("{field} must be a finite, non-negative number (found {found})")]
    NegativeOrNonFinite { field: &'static str, found: f64 },
}

/// Generic failure while evaluating the model or assembling a breakdown.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictionError {
    #[error("model produced a non-finite residual ({value})")]
    NonFiniteOutput { value: f64 },
    #[error("feature vector has {found} values but the model expects {expected}")]
    FeatureMismatch { expected: usize, found: usize },
    #[error("{component:?} would be negative ({amount})")]
    NegativeComponent {
        component: FareComponent,
        amount: f64,
    },
    #[error("breakdown total {total} does not match component sum {sum}")]
    TotalMismatch { total: f64, sum: f64 },
}

/// TLC ratecode categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ratecode {
    Standard,
    Jfk,
    Newark,
    NassauWestchester,
    Negotiated,
    GroupRide,
    Unknown,
}

impl Ratecode {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Standard,
            2 => Self::Jfk,
            3 => Self::Newark,
            4 => Self::NassauWestchester,
            5 => Self::Negotiated,
            6 => Self::GroupRide,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Standard => 1,
            Self::Jfk => 2,
            Self::Newark => 3,
            Self::NassauWestchester => 4,
            Self::Negotiated => 5,
            Self::GroupRide => 6,
            Self::Unknown => 99,
        }
    }

    /// Negotiated and shared rides are not priced by the meter.
    pub fn is_metered(self) -> bool {
        !matches!(self, Self::Negotiated | Self::GroupRide)
    }
}

/// Fare items as billed on a historical trip.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ObservedFare {
    pub fare_amount: f64,
    pub extra: f64,
    pub mta_tax: f64,
    pub tip_amount: f64,
    pub tolls_amount: f64,
    pub improvement_surcharge: f64,
    pub congestion_surcharge: f64,
    pub airport_fee: f64,
    pub total_amount: f64,
}

impl ObservedFare {
    pub fn itemized_sum(&self) -> f64 {
        self.fare_amount
            + self.extra
            + self.mta_tax
            + self.tip_amount
            + self.tolls_amount
            + self.improvement_surcharge
            + self.congestion_surcharge
            + self.airport_fee
    }

    pub fn is_consistent(&self) -> bool {
        (self.itemized_sum() - self.total_amount).abs() <= ITEMIZATION_TOLERANCE
    }
}

/// Historical trip used to build training targets.
#[derive(Debug, Clone, PartialEq)]
pub struct TripRecord {
    pub trip: TripRequest,
    pub ratecode: Ratecode,
    pub fare: ObservedFare,
}

/// Line items of an estimate, in response order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FareComponent {
    Fare,
    Tip,
    Tolls,
    AirportFee,
    AirportSurcharge,
    RushhourSurcharge,
    CongestionSurcharge,
    ImprovementSurcharge,
    MtaTax,
}

impl FareComponent {
    pub const ALL: [FareComponent; 9] = [
        FareComponent::Fare,
        FareComponent::Tip,
        FareComponent::Tolls,
        FareComponent::AirportFee,
        FareComponent::AirportSurcharge,
        FareComponent::RushhourSurcharge,
        FareComponent::CongestionSurcharge,
        FareComponent::ImprovementSurcharge,
        FareComponent::MtaTax,
    ];

    pub fn key(self) -> &'static str {
        match self {
            FareComponent::Fare => "fare",
            FareComponent::Tip => "tip",
            FareComponent::Tolls => "tolls",
            FareComponent::AirportFee => "airport_fee",
            FareComponent::AirportSurcharge => "airport_surcharge",
            FareComponent::RushhourSurcharge => "rushhour_surcharge",
            FareComponent::CongestionSurcharge => "congestion_surcharge",
            FareComponent::ImprovementSurcharge => "improvement_surcharge",
            FareComponent::MtaTax => "mta_tax",
        }
    }
}

/// Itemized estimate. Only built through the recomposer, which guarantees
/// `total` equals the sum of the other entries and nothing is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FareBreakdown {
    pub fare: f64,
    pub tip: f64,
    pub tolls: f64,
    pub airport_fee: f64,
    pub airport_surcharge: f64,
    pub rushhour_surcharge: f64,
    pub congestion_surcharge: f64,
    pub improvement_surcharge: f64,
    pub mta_tax: f64,
    pub total: f64,
}

impl FareBreakdown {
    pub fn amount(&self, component: FareComponent) -> f64 {
        match component {
            FareComponent::Fare => self.fare,
            FareComponent::Tip => self.tip,
            FareComponent::Tolls => self.tolls,
            FareComponent::AirportFee => self.airport_fee,
            FareComponent::AirportSurcharge => self.airport_surcharge,
            FareComponent::RushhourSurcharge => self.rushhour_surcharge,
            FareComponent::CongestionSurcharge => self.congestion_surcharge,
            FareComponent::ImprovementSurcharge => self.improvement_surcharge,
            FareComponent::MtaTax => self.mta_tax,
        }
    }

    pub fn components(&self) -> impl Iterator<Item = (FareComponent, f64)> + '_ {
        FareComponent::ALL
            .into_iter()
            .map(move |component| (component, self.amount(component)))
    }

    pub fn component_sum(&self) -> f64 {
        self.components().map(|(_, amount)| amount).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TripRequest {
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

    #[test]
    fn accepts_in_range_requests() {
        let trip = TripInput::try_from(request()).expect("valid trip");
        assert_eq!(trip.pickup_zone, 161);
        assert_eq!(trip.dropoff_zone, 230);
        assert!(trip.is_weekday());
        assert!((trip.average_speed_mph() - 17.333_333).abs() < 1e-5);
    }

    #[test]
    fn rejects_out_of_range_zone() {
        let mut request = request();
        request.pickup_location_id = 999;

        match TripInput::try_from(request) {
            Err(ValidationError::OutOfRange { field, found, .. }) => {
                assert_eq!(field, "PULocationID");
                assert_eq!(found, 999);
            }
            other => panic!("expected out of range error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_negative_and_non_finite_amounts() {
        let mut request = request();
        request.trip_distance = -1.0;
        assert!(matches!(
            TripInput::try_from(request.clone()),
            Err(ValidationError::NegativeOrNonFinite {
                field: "trip_distance",
                ..
            })
        ));

        request.trip_distance = 1.0;
        request.duration_min = f64::NAN;
        assert!(matches!(
            TripInput::try_from(request),
            Err(ValidationError::NegativeOrNonFinite {
                field: "duration_min",
                ..
            })
        ));
    }

    #[test]
    fn rejects_calendar_fields_outside_their_domain() {
        for (hour, day, month) in [(24, 2, 6), (10, 7, 6), (10, 2, 0), (10, 2, 13), (-1, 2, 6)] {
            let mut request = request();
            request.pickup_hour = hour;
            request.pickup_day = day;
            request.pickup_month = month;
            assert!(
                TripInput::try_from(request).is_err(),
                "hour {hour} day {day} month {month} should be rejected"
            );
        }
    }

    #[test]
    fn zero_duration_has_zero_speed() {
        let mut request = request();
        request.duration_min = 0.0;
        let trip = TripInput::try_from(request).expect("zero duration is allowed");
        assert_eq!(trip.average_speed_mph(), 0.0);
    }

    #[test]
    fn weekend_days_are_sunday_and_saturday() {
        let mut request = request();
        for (day, weekend) in [(0, true), (1, false), (5, false), (6, true)] {
            request.pickup_day = day;
            let trip = TripInput::try_from(request.clone()).expect("valid");
            assert_eq!(trip.is_weekend(), weekend, "day {day}");
        }
    }

    #[test]
    fn request_rejects_unknown_fields() {
        let payload = r#"{
            "trip_distance": 1.0, "PULocationID": 1, "DOLocationID": 2,
            "duration_min": 3.0, "pickup_hour": 4, "pickup_day": 5,
            "pickup_month": 6, "passenger_count": 2
        }"#;
        assert!(serde_json::from_str::<TripRequest>(payload).is_err());
    }

    #[test]
    fn observed_fare_consistency_uses_tolerance() {
        let fare = ObservedFare {
            fare_amount: 10.0,
            extra: 2.5,
            mta_tax: 0.5,
            tip_amount: 2.0,
            tolls_amount: 0.0,
            improvement_surcharge: 1.0,
            congestion_surcharge: 2.5,
            airport_fee: 0.0,
            total_amount: 18.504,
        };
        assert!(fare.is_consistent());

        let broken = ObservedFare {
            total_amount: 25.0,
            ..fare
        };
        assert!(!broken.is_consistent());
    }

    #[test]
    fn ratecode_codes_round_trip() {
        for code in [1, 2, 3, 4, 5, 6, 99] {
            assert_eq!(Ratecode::from_code(code).code() as i64, code);
        }
        assert!(!Ratecode::Negotiated.is_metered());
        assert!(Ratecode::Jfk.is_metered());
    }
}
