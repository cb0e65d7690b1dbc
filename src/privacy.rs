//! Privacy guard.
//!
//! Decides whether an organization may release any summary at all, based
//! on the total number of records it holds.

use crate::error::PartialError;
use crate::models::{GuardDecision, GuardReason};

/// Minimum number of records when the organization configures none.
pub const DEFAULT_MINIMUM_NUMBER_OF_RECORDS: u64 = 3;

/// Environment variable an organization uses to override the minimum.
pub const MINIMUM_RECORDS_ENV: &str = "T_TEST_MINIMUM_NUMBER_OF_RECORDS";

/// Evaluate the guard for a dataset holding `local_record_count` rows.
pub fn evaluate(local_record_count: u64, minimum: u64) -> GuardDecision {
    if local_record_count >= minimum {
        GuardDecision {
            passed: true,
            reason: GuardReason::SufficientRecords {
                have: local_record_count,
                need: minimum,
            },
        }
    } else {
        GuardDecision {
            passed: false,
            reason: GuardReason::InsufficientRecords {
                have: local_record_count,
                need: minimum,
            },
        }
    }
}

impl GuardDecision {
    /// Convert a failed decision into the error reported to the aggregator.
    pub fn into_result(self) -> Result<(), PartialError> {
        match self.reason {
            GuardReason::InsufficientRecords { have, need } => {
                Err(PartialError::InsufficientRecords { have, need })
            }
            GuardReason::SufficientRecords { .. } => Ok(()),
        }
    }
}

/// Read the organization-local minimum from the environment.
///
/// Unset or unparsable values fall back to the default.
pub fn minimum_from_env() -> u64 {
    std::env::var(MINIMUM_RECORDS_ENV)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(DEFAULT_MINIMUM_NUMBER_OF_RECORDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_at_default_minimum() {
        let below = evaluate(2, DEFAULT_MINIMUM_NUMBER_OF_RECORDS);
        assert!(!below.passed);
        assert_eq!(
            below.reason,
            GuardReason::InsufficientRecords { have: 2, need: 3 }
        );

        let at = evaluate(3, DEFAULT_MINIMUM_NUMBER_OF_RECORDS);
        assert!(at.passed);
    }

    #[test]
    fn test_custom_minimum() {
        assert!(!evaluate(9, 10).passed);
        assert!(evaluate(10, 10).passed);
        assert!(evaluate(0, 0).passed);
    }

    #[test]
    fn test_into_result() {
        assert!(evaluate(5, 3).into_result().is_ok());
        assert_eq!(
            evaluate(1, 3).into_result(),
            Err(PartialError::InsufficientRecords { have: 1, need: 3 })
        );
    }
}
