use serde::{Deserialize, Serialize};

use super::domain::{FareBreakdown, FareComponent, PredictionError};
use super::rules::DeterministicComponents;

const TOTAL_TOLERANCE: f64 = 1e-6;

/// Shares of one trip's residual attributed to the tip and to tolls the
/// fixed crossings do not cover. The rest is the metered fare.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResidualSplit {
    pub tip_share: f64,
    pub toll_share: f64,
}

impl Default for ResidualSplit {
    fn default() -> Self {
        Self {
            tip_share: 0.0,
            toll_share: 0.0,
        }
    }
}

/// Assemble the itemized estimate. Every line is rounded to cents and the
/// total is the sum of the rounded lines.
///
/// The fare takes what is left of the rounded residual after the tip and
/// variable tolls, so the three always add back up to it.
pub fn recompose(
    deterministic: &DeterministicComponents,
    residual: f64,
    split: ResidualSplit,
) -> Result<FareBreakdown, PredictionError> {
    if !residual.is_finite() {
        return Err(PredictionError::NonFiniteOutput { value: residual });
    }
    let residual = cents(residual.max(0.0));

    let tip = cents(residual * split.tip_share);
    let remaining = cents(residual - tip);
    let variable_tolls = cents(residual * split.toll_share).min(remaining);
    let fare = cents(remaining - variable_tolls);

    let mut breakdown = FareBreakdown {
        fare,
        tip,
        tolls: cents(deterministic.fixed_tolls + variable_tolls),
        airport_fee: cents(deterministic.airport_fee),
        airport_surcharge: cents(deterministic.airport_surcharge),
        rushhour_surcharge: cents(deterministic.rushhour_surcharge),
        congestion_surcharge: cents(deterministic.congestion_surcharge),
        improvement_surcharge: cents(deterministic.improvement_surcharge),
        mta_tax: cents(deterministic.mta_tax),
        total: 0.0,
    };
    breakdown.total = cents(breakdown.component_sum());

    check(&breakdown)?;
    Ok(breakdown)
}

fn check(breakdown: &FareBreakdown) -> Result<(), PredictionError> {
    for component in FareComponent::ALL {
        let amount = breakdown.amount(component);
        if !amount.is_finite() || amount < 0.0 {
            return Err(PredictionError::NegativeComponent { component, amount });
        }
    }

    let sum = breakdown.component_sum();
    if !breakdown.total.is_finite() || (breakdown.total - sum).abs() > TOTAL_TOLERANCE {
        return Err(PredictionError::TotalMismatch {
            total: breakdown.total,
            sum,
        });
    }
    Ok(())
}

fn cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
