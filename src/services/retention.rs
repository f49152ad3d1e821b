//! Day-count windows for backup expiry and data pruning

use chrono::{DateTime, Duration, Utc};

use crate::error::{AppError, Result};

/// Upper bound accepted for any retention window (about a century)
pub const MAX_RETENTION_DAYS: i64 = 36_500;

fn window(days: i64) -> Result<Duration> {
    if !(0..=MAX_RETENTION_DAYS).contains(&days) {
        return Err(AppError::BadRequest(format!(
            "Retention must be between 0 and {} days, got {}",
            MAX_RETENTION_DAYS, days
        )));
    }
    Duration::try_days(days)
        .ok_or_else(|| AppError::BadRequest(format!("Retention of {} days is out of range", days)))
}

/// `from` plus `days`
pub fn expires_after(from: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    from.checked_add_signed(window(days)?)
        .ok_or_else(|| AppError::BadRequest("Expiry date is out of range".to_string()))
}

/// Rows stamped before the returned instant are older than `days`
pub fn cutoff_before(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    now.checked_sub_signed(window(days)?)
        .ok_or_else(|| AppError::BadRequest("Retention cutoff is out of range".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds() {
        let now = Utc::now();
        assert_eq!(expires_after(now, 0).unwrap(), now);
        assert_eq!(cutoff_before(now, 2).unwrap(), now - Duration::days(2));
        assert!(expires_after(now, MAX_RETENTION_DAYS).is_ok());
    }

    #[test]
    fn test_out_of_range_is_bad_request() {
        let now = Utc::now();
        for days in [-1, MAX_RETENTION_DAYS + 1, 1_000_000_000_000, i64::MAX, i64::MIN] {
            assert!(matches!(expires_after(now, days), Err(AppError::BadRequest(_))));
            assert!(matches!(cutoff_before(now, days), Err(AppError::BadRequest(_))));
        }
    }
}
