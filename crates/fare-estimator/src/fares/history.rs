//! Typed reader for historical trip exports in the TLC column layout.
//!
//! Time of day may come either as the decomposed `duration_min`,
//! `pickup_hour`, `pickup_day` and `pickup_month` columns or as raw
//! `tpep_pickup_datetime`/`tpep_dropoff_datetime` timestamps. Columns that
//! are not listed here are ignored.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer};

use super::domain::{ObservedFare, Ratecode, TripRecord, TripRequest};

pub fn load_trip_history(path: &Path) -> Result<Vec<TripRecord>, HistoryError> {
    let file = File::open(path).map_err(|source| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_trip_history(file)
}

pub fn read_trip_history<R: Read>(reader: R) -> Result<Vec<TripRecord>, HistoryError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();

    for (index, row) in csv_reader.deserialize::<HistoryRow>().enumerate() {
        let row = row?;
        records.push(row.into_record(index + 1)?);
    }

    Ok(records)
}

#[derive(Debug, Deserialize)]
struct HistoryRow {
    trip_distance: f64,
    #[serde(rename = "PULocationID")]
    pickup_location_id: i64,
    #[serde(rename = "DOLocationID")]
    dropoff_location_id: i64,
    #[serde(rename = "RatecodeID", default)]
    ratecode: Option<f64>,

    #[serde(default)]
    duration_min: Option<f64>,
    #[serde(default)]
    pickup_hour: Option<i64>,
    #[serde(default)]
    pickup_day: Option<i64>,
    #[serde(default)]
    pickup_month: Option<i64>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    tpep_pickup_datetime: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    tpep_dropoff_datetime: Option<String>,

    fare_amount: f64,
    #[serde(default)]
    extra: Option<f64>,
    #[serde(default)]
    mta_tax: Option<f64>,
    #[serde(default)]
    tip_amount: Option<f64>,
    #[serde(default)]
    tolls_amount: Option<f64>,
    #[serde(default)]
    improvement_surcharge: Option<f64>,
    #[serde(default)]
    congestion_surcharge: Option<f64>,
    #[serde(default, alias = "Airport_fee")]
    airport_fee: Option<f64>,
    total_amount: f64,
}

impl HistoryRow {
    fn into_record(self, row: usize) -> Result<TripRecord, HistoryError> {
        let timing = self.timing(row)?;

        Ok(TripRecord {
            trip: TripRequest {
                trip_distance: self.trip_distance,
                pickup_location_id: self.pickup_location_id,
                dropoff_location_id: self.dropoff_location_id,
                duration_min: timing.duration_min,
                pickup_hour: timing.hour,
                pickup_day: timing.day,
                pickup_month: timing.month,
            },
            ratecode: self
                .ratecode
                .map(|code| Ratecode::from_code(code.round() as i64))
                .unwrap_or(Ratecode::Standard),
            fare: ObservedFare {
                fare_amount: self.fare_amount,
                extra: self.extra.unwrap_or_default(),
                mta_tax: self.mta_tax.unwrap_or_default(),
                tip_amount: self.tip_amount.unwrap_or_default(),
                tolls_amount: self.tolls_amount.unwrap_or_default(),
                improvement_surcharge: self.improvement_surcharge.unwrap_or_default(),
                congestion_surcharge: self.congestion_surcharge.unwrap_or_default(),
                airport_fee: self.airport_fee.unwrap_or_default(),
                total_amount: self.total_amount,
            },
        })
    }

    fn timing(&self, row: usize) -> Result<Timing, HistoryError> {
        if let (Some(duration_min), Some(hour), Some(day), Some(month)) = (
            self.duration_min,
            self.pickup_hour,
            self.pickup_day,
            self.pickup_month,
        ) {
            return Ok(Timing {
                duration_min,
                hour,
                day,
                month,
            });
        }

        let pickup = self
            .tpep_pickup_datetime
            .as_deref()
            .ok_or(HistoryError::MissingPickupTime { row })?;
        let pickup = parse_datetime(pickup).ok_or_else(|| HistoryError::InvalidTimestamp {
            row,
            value: pickup.to_string(),
        })?;

        let duration_min = match (self.duration_min, self.tpep_dropoff_datetime.as_deref()) {
            (Some(duration), _) => duration,
            (None, Some(dropoff)) => {
                let dropoff =
                    parse_datetime(dropoff).ok_or_else(|| HistoryError::InvalidTimestamp {
                        row,
                        value: dropoff.to_string(),
                    })?;
                (dropoff - pickup).num_seconds() as f64 / 60.0
            }
            (None, None) => return Err(HistoryError::MissingPickupTime { row }),
        };

        Ok(Timing {
            duration_min,
            hour: i64::from(pickup.hour()),
            day: i64::from(pickup.weekday().num_days_from_sunday()),
            month: i64::from(pickup.month()),
        })
    }
}

struct Timing {
    duration_min: f64,
    hour: i64,
    day: i64,
    month: i64,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }

    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %I:%M:%S %p"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("failed to open trip history {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed trip history: {0}")]
    Csv(#[from] csv::Error),
    #[error("row {row} has neither decomposed time columns nor pickup/drop-off timestamps")]
    MissingPickupTime { row: usize },
    #[error("row {row} has an unreadable timestamp '{value}'")]
    InvalidTimestamp { row: usize, value: String },
}
