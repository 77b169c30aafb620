//! Authoritative end-of-session instant.

use chrono::{DateTime, Duration, Utc};

use crate::error::DeadlineError;

/// Compute the instant at which a session must end.
///
/// The natural end is `started_at + allotted_duration_secs`; a hard deadline,
/// when present, caps it. The result depends only on the arguments, so a
/// session resumed from a persisted `started_at` lands on the same instant.
pub fn compute_deadline(
    started_at: DateTime<Utc>,
    allotted_duration_secs: i64,
    hard_deadline: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>, DeadlineError> {
    if allotted_duration_secs <= 0 {
        return Err(DeadlineError::InvalidDuration(allotted_duration_secs));
    }

    let natural_end = Duration::try_seconds(allotted_duration_secs)
        .and_then(|d| started_at.checked_add_signed(d))
        .ok_or(DeadlineError::InvalidDuration(allotted_duration_secs))?;

    Ok(match hard_deadline {
        Some(hard) => natural_end.min(hard),
        None => natural_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
    }

    #[test]
    fn natural_end_without_hard_deadline() {
        let deadline = compute_deadline(start(), 600, None).unwrap();
        assert_eq!(deadline, start() + Duration::seconds(600));
    }

    #[test]
    fn hard_deadline_caps_duration() {
        let hard = start() + Duration::seconds(300);
        let deadline = compute_deadline(start(), 600, Some(hard)).unwrap();
        assert_eq!(deadline, hard);
    }

    #[test]
    fn later_hard_deadline_is_ignored() {
        let hard = start() + Duration::hours(2);
        let deadline = compute_deadline(start(), 600, Some(hard)).unwrap();
        assert_eq!(deadline, start() + Duration::seconds(600));
    }

    #[test]
    fn rejects_non_positive_duration() {
        assert_eq!(
            compute_deadline(start(), 0, None),
            Err(DeadlineError::InvalidDuration(0))
        );
        assert_eq!(
            compute_deadline(start(), -30, None),
            Err(DeadlineError::InvalidDuration(-30))
        );
    }

    #[test]
    fn deadline_never_precedes_start_for_future_cutoffs() {
        for secs in [1_i64, 59, 600, 86_400] {
            let cutoffs = [
                None,
                Some(start() + Duration::seconds(1)),
                Some(start() + Duration::days(3)),
            ];
            for cutoff in cutoffs {
                let deadline = compute_deadline(start(), secs, cutoff).unwrap();
                assert!(deadline >= start(), "{secs}s / {cutoff:?} -> {deadline}");
            }
        }
    }

    #[test]
    fn same_inputs_same_deadline() {
        let hard = Some(start() + Duration::seconds(450));
        assert_eq!(
            compute_deadline(start(), 600, hard),
            compute_deadline(start(), 600, hard)
        );
    }
}
