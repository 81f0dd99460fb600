//! Air Quality Index computed at ingestion time.
//!
//! The index is informational; risk evaluation works from raw concentrations.

use crate::models::{Pollutant, PollutantReading};

/// Value reported for concentrations above the top band.
pub const AQI_CEILING: i32 = 201;

/// (concentration upper bound, concentration lower bound, index low, index high)
const PM25_BANDS: [(f64, f64, f64, f64); 4] = [
    (12.0, 0.0, 0.0, 50.0),
    (35.4, 12.1, 51.0, 100.0),
    (55.4, 35.5, 101.0, 150.0),
    (150.4, 55.5, 151.0, 200.0),
];

const PM10_BANDS: [(f64, f64, f64, f64); 4] = [
    (54.0, 0.0, 0.0, 50.0),
    (154.0, 55.0, 51.0, 100.0),
    (254.0, 155.0, 101.0, 150.0),
    (354.0, 255.0, 151.0, 200.0),
];

fn interpolate(value: f64, bands: &[(f64, f64, f64, f64)]) -> i32 {
    for (upper, lower, index_low, index_high) in bands {
        if value <= *upper {
            let index = (value - lower) / (upper - lower) * (index_high - index_low) + index_low;
            // truncated, never rounded up
            return index.max(0.0) as i32;
        }
    }
    AQI_CEILING
}

pub fn pm25_index(pm25: f64) -> i32 {
    interpolate(pm25, &PM25_BANDS)
}

pub fn pm10_index(pm10: f64) -> i32 {
    interpolate(pm10, &PM10_BANDS)
}

/// Higher of the PM2.5 and PM10 sub-indices. Missing pollutants count as 0.
pub fn calculate_aqi(reading: &PollutantReading) -> i32 {
    let pm25 = reading.concentration(Pollutant::Pm25).unwrap_or(0.0);
    let pm10 = reading.concentration(Pollutant::Pm10).unwrap_or(0.0);
    pm25_index(pm25).max(pm10_index(pm10))
}

pub fn quality_rating(aqi: i32) -> &'static str {
    match aqi {
        i32::MIN..=50 => "good",
        51..=100 => "moderate",
        101..=150 => "unhealthy_for_sensitive_groups",
        151..=200 => "unhealthy",
        201..=300 => "very_unhealthy",
        _ => "hazardous",
    }
}
