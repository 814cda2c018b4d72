//! Vesting arithmetic.
//!
//! A vesting address unlocks `release_per_year` of its initial allocation
//! for every full year since genesis, nothing before the cliff, and never
//! more than the whole allocation.

use chrono::{DateTime, Utc};
use shared_types::VestingSchedule;

const SECONDS_PER_YEAR: f64 = 365.25 * 24.0 * 60.0 * 60.0;

/// Fractional years between `genesis` and `at`. Negative if `at` precedes genesis.
pub fn years_between(genesis: DateTime<Utc>, at: DateTime<Utc>) -> f64 {
    (at - genesis).num_seconds() as f64 / SECONDS_PER_YEAR
}

/// Cliff length in years.
pub fn cliff_years(schedule: &VestingSchedule) -> f64 {
    f64::from(schedule.cliff_months) / 12.0
}

/// Fraction of the allocation unlocked after `years_passed`, in `[0, 1]`.
pub fn unlocked_fraction(schedule: &VestingSchedule, years_passed: f64) -> f64 {
    if years_passed < cliff_years(schedule) {
        return 0.0;
    }
    (years_passed.floor() * schedule.release_per_year).clamp(0.0, 1.0)
}

/// Absolute amount unlocked after `years_passed`.
pub fn unlocked_amount(schedule: &VestingSchedule, initial_allocation: f64, years_passed: f64) -> f64 {
    unlocked_fraction(schedule, years_passed) * initial_allocation
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_before_cliff() {
        let schedule = VestingSchedule::default();
        assert_eq!(unlocked_fraction(&schedule, 0.0), 0.0);
        assert_eq!(unlocked_fraction(&schedule, 0.99), 0.0);
    }

    #[test]
    fn test_whole_years_only() {
        let schedule = VestingSchedule::default();
        assert!((unlocked_fraction(&schedule, 1.0) - 0.2).abs() < 1e-12);
        assert!((unlocked_fraction(&schedule, 2.9) - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_capped_at_full_allocation() {
        let schedule = VestingSchedule::default();
        assert_eq!(unlocked_fraction(&schedule, 7.0), 1.0);
        assert_eq!(unlocked_amount(&schedule, 8_000_000.0, 12.0), 8_000_000.0);
    }

    #[test]
    fn test_cliff_longer_than_a_year() {
        let schedule = VestingSchedule {
            cliff_months: 18,
            ..VestingSchedule::default()
        };
        assert_eq!(unlocked_fraction(&schedule, 1.2), 0.0);
        assert!((unlocked_fraction(&schedule, 1.5) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_years_between() {
        let genesis: DateTime<Utc> = "2025-01-01T00:00:00Z".parse().unwrap();
        let later: DateTime<Utc> = "2027-01-02T12:00:00Z".parse().unwrap();
        let years = years_between(genesis, later);
        assert!(years > 2.0 && years < 2.01);
        assert!(years_between(later, genesis) < 0.0);
    }
}
