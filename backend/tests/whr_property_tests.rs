//! Property-based tests for the pure warehouse calculations
//!
//! Covers the volumetric formulas, receipt-number formatting and the
//! estimated-arrival rule for arbitrary inputs.

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;

use shared::camca;
use shared::models::Transport;
use shared::validation;

/// Dimensions in inches, as hundredths to exercise fractional values
fn dimension_strategy() -> impl Strategy<Value = Decimal> {
    (1u32..=50_000).prop_map(|hundredths| Decimal::new(hundredths as i64, 2))
}

fn date_strategy() -> impl Strategy<Value = NaiveDate> {
    (2020i32..=2030, 1u32..=12, 1u32..=28)
        .prop_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

proptest! {
    #[test]
    fn volume_matches_the_camca_formula(
        length in dimension_strategy(),
        width in dimension_strategy(),
        height in dimension_strategy(),
    ) {
        let volume = camca::volume_cubic_feet(length, width, height);
        let expected = (length * width * height * camca::cubic_feet_factor()).round_dp(6);
        prop_assert_eq!(volume, expected);
        prop_assert!(volume >= Decimal::ZERO);
    }

    #[test]
    fn volume_weight_is_volume_times_ten_point_four(
        length in dimension_strategy(),
        width in dimension_strategy(),
        height in dimension_strategy(),
    ) {
        let volume = camca::volume_cubic_feet(length, width, height);
        let weight = camca::volume_weight_lbs(volume);
        prop_assert_eq!(weight, (volume * camca::volume_weight_factor()).round_dp(3));
    }

    #[test]
    fn volume_is_monotonic_in_each_dimension(
        length in dimension_strategy(),
        width in dimension_strategy(),
        height in dimension_strategy(),
    ) {
        let base = camca::volume_cubic_feet(length, width, height);
        let grown = camca::volume_cubic_feet(length + Decimal::ONE, width, height);
        prop_assert!(grown >= base);
    }

    #[test]
    fn whr_number_round_trips_date_and_sequence(
        date in date_strategy(),
        sequence in 1u64..=9999,
    ) {
        let number = camca::format_whr_number(date, sequence);
        prop_assert!(number.starts_with("WHR"));
        prop_assert_eq!(number.len(), 13);
        let formatted = date.format("%y%m%d").to_string();
        prop_assert_eq!(&number[3..9], formatted.as_str());
        prop_assert_eq!(number[9..].parse::<u64>().unwrap(), sequence);
    }

    #[test]
    fn estimated_arrival_offsets_by_transport(departure in date_strategy()) {
        let by_air = camca::estimated_arrival(departure, Transport::Air);
        let by_sea = camca::estimated_arrival(departure, Transport::Sea);
        prop_assert_eq!((by_air - departure).num_days(), 2);
        prop_assert_eq!((by_sea - departure).num_days(), 14);
        prop_assert!(by_sea > by_air);
    }

    #[test]
    fn short_search_tokens_are_always_rejected(token in "[a-z0-9 ]{0,2}") {
        prop_assert!(validation::validate_search_token(&token).is_err());
    }

    #[test]
    fn search_tokens_of_three_or_more_are_accepted(token in "[a-z0-9]{3,20}") {
        prop_assert!(validation::validate_search_token(&token).is_ok());
    }
}
