//! Retry schedule for failed webhook deliveries.
//!
//! A schedule is a table of delays indexed by attempt number, `1..=N`. The
//! largest key `N` doubles as the exhaustion threshold. Lookups past the end
//! wrap around modulo `N + 1` instead of clamping, so a lookup always yields a
//! delay even for an attempt count outside the table.

use std::{collections::BTreeMap, time::Duration};

use crate::error::{DeliveryError, Result};

const SECOND: u64 = 1;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Delays of the default schedule, in seconds, for attempts 1 through 19.
const DEFAULT_DELAYS_SECS: [u64; 19] = [
    10 * SECOND,
    30 * SECOND,
    90 * SECOND,
    3 * MINUTE,
    12 * MINUTE,
    36 * MINUTE,
    HOUR,
    2 * HOUR,
    4 * HOUR,
    6 * HOUR,
    8 * HOUR,
    12 * HOUR,
    16 * HOUR,
    DAY,
    2 * DAY,
    3 * DAY,
    4 * DAY,
    5 * DAY,
    6 * DAY,
];

/// Mapping from attempt number to backoff delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    delays: Vec<Duration>,
}

impl RetrySchedule {
    /// Builds a schedule from an attempt-number keyed table.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the table is empty or its
    /// keys are not exactly `1..=N`.
    pub fn new(table: BTreeMap<u32, Duration>) -> Result<Self> {
        if table.is_empty() {
            return Err(DeliveryError::configuration("retry schedule must not be empty"));
        }

        for (expected, attempt) in (1u32..).zip(table.keys()) {
            if *attempt != expected {
                return Err(DeliveryError::configuration(format!(
                    "retry schedule keys must be contiguous from 1, expected {expected} but found \
                     {attempt}"
                )));
            }
        }

        Ok(Self { delays: table.into_values().collect() })
    }

    /// Builds a schedule from an ordered list where entry `i` is the delay
    /// before attempt `i + 1`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Configuration` if the list is empty.
    pub fn from_delays(delays: Vec<Duration>) -> Result<Self> {
        if delays.is_empty() {
            return Err(DeliveryError::configuration("retry schedule must not be empty"));
        }
        if u32::try_from(delays.len()).is_err() {
            return Err(DeliveryError::configuration("retry schedule is too long"));
        }
        Ok(Self { delays })
    }

    /// Attempt count at which a unit stops being retried.
    pub fn exhaustion_threshold(&self) -> u32 {
        u32::try_from(self.delays.len()).unwrap_or(u32::MAX)
    }

    /// Whether a unit with `attempts` failures has used up the schedule.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.exhaustion_threshold()
    }

    /// Delay to wait before the attempt following `attempts` failures.
    ///
    /// Indexes the table at `attempts mod (N + 1)`. Slot 0 has no entry and
    /// yields a zero delay; it is only reached through the wrap.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let slot = u64::from(attempts) % (self.delays.len() as u64 + 1);
        match usize::try_from(slot) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(slot) => self.delays[slot - 1],
        }
    }

    /// Delays in attempt order.
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self { delays: DEFAULT_DELAYS_SECS.iter().map(|s| Duration::from_secs(*s)).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    #[test]
    fn default_schedule_spans_ten_seconds_to_six_days() {
        let schedule = RetrySchedule::default();

        assert_eq!(schedule.exhaustion_threshold(), 19);
        assert_eq!(schedule.delay_for(1), Duration::from_secs(10));
        assert_eq!(schedule.delay_for(5), Duration::from_secs(12 * 60));
        assert_eq!(schedule.delay_for(19), Duration::from_secs(6 * 24 * 60 * 60));
        assert!(schedule.delays().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn lookup_wraps_past_the_end() {
        let schedule = RetrySchedule::from_delays(secs(&[1, 2, 3])).unwrap();

        assert_eq!(schedule.delay_for(3), Duration::from_secs(3));
        assert_eq!(schedule.delay_for(4), Duration::ZERO);
        assert_eq!(schedule.delay_for(5), Duration::from_secs(1));
        assert_eq!(schedule.delay_for(7), Duration::from_secs(3));
        assert_eq!(schedule.delay_for(0), Duration::ZERO);
    }

    #[test]
    fn exhaustion_starts_at_largest_key() {
        let schedule = RetrySchedule::from_delays(secs(&[1, 2])).unwrap();

        assert!(!schedule.is_exhausted(0));
        assert!(!schedule.is_exhausted(1));
        assert!(schedule.is_exhausted(2));
        assert!(schedule.is_exhausted(3));
    }

    #[test]
    fn table_with_gap_is_rejected() {
        let table = BTreeMap::from([(1, Duration::from_secs(1)), (3, Duration::from_secs(3))]);
        let err = RetrySchedule::new(table).unwrap_err();
        assert!(matches!(err, DeliveryError::Configuration { .. }));
    }

    #[test]
    fn table_not_starting_at_one_is_rejected() {
        let table = BTreeMap::from([(0, Duration::from_secs(1)), (1, Duration::from_secs(3))]);
        assert!(RetrySchedule::new(table).is_err());
    }

    #[test]
    fn empty_schedule_is_rejected() {
        assert!(RetrySchedule::new(BTreeMap::new()).is_err());
        assert!(RetrySchedule::from_delays(Vec::new()).is_err());
    }

    #[test]
    fn contiguous_table_matches_list_form() {
        let table = BTreeMap::from([(2, Duration::from_secs(20)), (1, Duration::from_secs(10))]);
        assert_eq!(
            RetrySchedule::new(table).unwrap(),
            RetrySchedule::from_delays(secs(&[10, 20])).unwrap()
        );
    }
}
