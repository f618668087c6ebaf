//! Fare calculation.
//!
//! A pure function of distance, duration, and the configured rates. All
//! amounts are rounded to 2 decimals.

use serde::{Deserialize, Serialize};

use crate::db::PricingSettings;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FareBreakdown {
    pub base_fare: f64,
    pub final_fare: f64,
    pub platform_fee: f64,
    pub driver_earning: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute the fare breakdown for a trip.
///
/// `base = distance * rate_per_mile + duration * rate_per_minute`, floored
/// at the minimum fare; the platform fee is a percentage of the final fare
/// and the driver keeps the remainder.
pub fn calculate_fare(
    distance_miles: f64,
    duration_minutes: f64,
    settings: &PricingSettings,
) -> FareBreakdown {
    let base_fare = distance_miles * settings.base_rate_per_mile
        + duration_minutes * settings.base_rate_per_minute;
    let final_fare = base_fare.max(settings.minimum_fare);
    let platform_fee = final_fare * settings.platform_fee_percent / 100.0;
    let driver_earning = final_fare - platform_fee;

    FareBreakdown {
        base_fare: round2(base_fare),
        final_fare: round2(final_fare),
        platform_fee: round2(platform_fee),
        driver_earning: round2(driver_earning),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(per_mile: f64, per_minute: f64, minimum: f64, fee: f64) -> PricingSettings {
        PricingSettings {
            base_rate_per_mile: per_mile,
            base_rate_per_minute: per_minute,
            minimum_fare: minimum,
            platform_fee_percent: fee,
            ..PricingSettings::default()
        }
    }

    #[test]
    fn test_zero_trip_floors_at_minimum_fare() {
        let fare = calculate_fare(0.0, 0.0, &settings(1.5, 0.3, 5.0, 20.0));
        assert_eq!(fare.base_fare, 0.0);
        assert_eq!(fare.final_fare, 5.0);
        assert_eq!(fare.platform_fee, 1.0);
        assert_eq!(fare.driver_earning, 4.0);
    }

    #[test]
    fn test_standard_trip() {
        let fare = calculate_fare(5.0, 15.0, &settings(1.5, 0.3, 5.0, 20.0));
        assert_eq!(fare.base_fare, 12.0);
        assert_eq!(fare.final_fare, 12.0);
        assert_eq!(fare.platform_fee, 2.4);
        assert_eq!(fare.driver_earning, 9.6);
    }

    #[test]
    fn test_defaults_when_settings_missing() {
        let fare = calculate_fare(10.0, 20.0, &PricingSettings::default());
        // 10 * 1.5 + 20 * 0.3 = 21
        assert_eq!(fare.base_fare, 21.0);
        assert_eq!(fare.final_fare, 21.0);
        assert_eq!(fare.platform_fee, 4.2);
        assert_eq!(fare.driver_earning, 16.8);
    }

    #[test]
    fn test_rounding_to_two_decimals() {
        let fare = calculate_fare(1.0, 1.0, &settings(1.111, 0.333, 0.0, 33.0));
        // base = 1.111 + 0.333 = 1.444 -> 1.44
        assert_eq!(fare.base_fare, 1.44);
        assert_eq!(fare.final_fare, 1.44);
        // fee = 1.444 * 0.33 = 0.47652 -> 0.48
        assert_eq!(fare.platform_fee, 0.48);
        // earning = 1.444 - 0.47652 = 0.96748 -> 0.97
        assert_eq!(fare.driver_earning, 0.97);
    }

    #[test]
    fn test_fee_and_earning_partition_final_fare() {
        let fare = calculate_fare(7.3, 22.0, &settings(1.5, 0.3, 5.0, 20.0));
        let sum = fare.platform_fee + fare.driver_earning;
        assert!((sum - fare.final_fare).abs() < 0.011);
    }
}
