//! CAMCA volumetric calculations
//!
//! Centralizes the conversion of linear package dimensions into the
//! chargeable shipping metrics used on every warehouse receipt, so every
//! create/update path produces the same derived values.

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

use crate::models::Transport;

/// Cubic inches to cubic feet conversion (CAMCA formula constant)
pub fn cubic_feet_factor() -> Decimal {
    // 0.000578746
    Decimal::new(578_746, 9)
}

/// Cubic feet to chargeable pounds conversion factor
pub fn volume_weight_factor() -> Decimal {
    // 10.4
    Decimal::new(104, 1)
}

/// Transit days added to the departure date per transport mode
pub fn transit_days(transport: Transport) -> i64 {
    match transport {
        Transport::Air => 2,
        Transport::Sea => 14,
    }
}

/// Compute package volume in cubic feet from dimensions in inches.
///
/// Rounded to 6 decimal places for storage stability.
pub fn volume_cubic_feet(length: Decimal, width: Decimal, height: Decimal) -> Decimal {
    (length * width * height * cubic_feet_factor()).round_dp(6)
}

/// Compute the volumetric (chargeable) weight in pounds from a volume in
/// cubic feet. Rounded to 3 decimal places.
pub fn volume_weight_lbs(volume: Decimal) -> Decimal {
    (volume * volume_weight_factor()).round_dp(3)
}

/// Estimate the arrival date in Costa Rica from the departure date.
///
/// Calendar-day addition: air +2 days, sea +14 days.
pub fn estimated_arrival(departure: NaiveDate, transport: Transport) -> NaiveDate {
    departure + Duration::days(transit_days(transport))
}

/// Format a warehouse receipt number: `WHR` + YYMMDD + zero-padded sequence.
///
/// The sequence is globally monotonic, so the full string stays unique even
/// across day boundaries. Four digits of padding; wider once the counter
/// passes 9999.
pub fn format_whr_number(date: NaiveDate, sequence: u64) -> String {
    format!("WHR{}{:04}", date.format("%y%m%d"), sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_volume_ten_inch_cube() {
        let volume = volume_cubic_feet(d("10"), d("10"), d("10"));
        assert_eq!(volume, d("0.578746"));
    }

    #[test]
    fn test_volume_weight_ten_inch_cube() {
        let volume = volume_cubic_feet(d("10"), d("10"), d("10"));
        assert_eq!(volume_weight_lbs(volume), d("6.019"));
    }

    #[test]
    fn test_volume_zero_dimensions() {
        assert_eq!(volume_cubic_feet(d("0"), d("10"), d("10")), d("0"));
        assert_eq!(volume_weight_lbs(d("0")), d("0"));
    }

    #[test]
    fn test_estimated_arrival_air() {
        let departure = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            estimated_arrival(departure, Transport::Air),
            NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()
        );
    }

    #[test]
    fn test_estimated_arrival_sea() {
        let departure = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            estimated_arrival(departure, Transport::Sea),
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
        );
    }

    #[test]
    fn test_estimated_arrival_crosses_month_boundary() {
        let departure = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(
            estimated_arrival(departure, Transport::Air),
            NaiveDate::from_ymd_opt(2024, 2, 2).unwrap()
        );
    }

    #[test]
    fn test_whr_number_format() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 5).unwrap();
        assert_eq!(format_whr_number(date, 1), "WHR2406050001");
        assert_eq!(format_whr_number(date, 42), "WHR2406050042");
    }

    #[test]
    fn test_whr_number_sequence_overflow_keeps_uniqueness() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 5).unwrap();
        assert_eq!(format_whr_number(date, 10000), "WHR24060510000");
    }
}
