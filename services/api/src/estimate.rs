use crate::infra::load_service;
use clap::Args;
use fare_estimator::config::AppConfig;
use fare_estimator::error::AppError;
use fare_estimator::fares::{FareEstimate, RuleEngine, TripRequest};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub(crate) struct EstimateArgs {
    /// Bundle to predict with. Defaults to the configured model path.
    #[arg(long)]
    pub(crate) model: Option<PathBuf>,
    /// Trip distance in miles
    #[arg(long)]
    pub(crate) distance: f64,
    /// Trip duration in minutes
    #[arg(long)]
    pub(crate) duration: f64,
    /// TLC pickup zone (1-265)
    #[arg(long)]
    pub(crate) pickup_zone: i64,
    /// TLC dropoff zone (1-265)
    #[arg(long)]
    pub(crate) dropoff_zone: i64,
    /// Pickup hour (0-23)
    #[arg(long)]
    pub(crate) hour: i64,
    /// Pickup day of week, Sunday = 0
    #[arg(long)]
    pub(crate) day: i64,
    /// Pickup month (1-12)
    #[arg(long)]
    pub(crate) month: i64,
}

impl EstimateArgs {
    fn request(&self) -> TripRequest {
        TripRequest {
            trip_distance: self.distance,
            pickup_location_id: self.pickup_zone,
            dropoff_location_id: self.dropoff_zone,
            duration_min: self.duration,
            pickup_hour: self.hour,
            pickup_day: self.day,
            pickup_month: self.month,
        }
    }
}

pub(crate) fn run_estimate(args: EstimateArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let path = args.model.clone().unwrap_or(config.model.bundle_path);

    let service = load_service(&path, RuleEngine::default())?;
    let estimate = service.estimate(&args.request())?;

    render_estimate(
        service.model_version().as_deref().unwrap_or("unknown"),
        &estimate,
    );
    Ok(())
}

fn render_estimate(model_version: &str, estimate: &FareEstimate) {
    println!("Fare estimate (model {})", model_version);
    for (component, amount) in estimate.breakdown.components() {
        println!("  - {:<22} {:>8.2}", component.key(), amount);
    }
    println!("  = {:<22} {:>8.2}", "total", estimate.total_amount);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_arguments_onto_request_fields() {
        let args = EstimateArgs {
            model: None,
            distance: 5.2,
            duration: 18.0,
            pickup_zone: 161,
            dropoff_zone: 230,
            hour: 18,
            day: 2,
            month: 6,
        };

        let request = args.request();
        assert_eq!(request.pickup_location_id, 161);
        assert_eq!(request.dropoff_location_id, 230);
        assert_eq!(request.pickup_day, 2);
        assert!((request.trip_distance - 5.2).abs() < f64::EPSILON);
    }
}
