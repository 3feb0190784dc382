//! Re-read-and-retry for compare-and-swap races.

use tether_core::TetherResult;

/// Run `op` up to `attempts` times, retrying only on concurrency conflicts.
///
/// `op` must re-read whatever it writes so a retry sees the winning version.
/// Non-retryable errors are returned immediately. At least one attempt is
/// always made.
pub fn retry_on_conflict<T>(
    attempts: u32,
    mut op: impl FnMut() -> TetherResult<T>,
) -> TetherResult<T> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Err(err) if err.is_retryable() && attempt < attempts => {
                tracing::debug!(attempt, error = %err, "Retrying after version conflict");
                attempt += 1;
            }
            Err(err) if err.is_retryable() => {
                tracing::warn!(attempts, error = %err, "Conflict retries exhausted");
                return Err(err);
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::{EntityType, ErrorKind, StorageError, TetherError};

    fn stale() -> TetherError {
        StorageError::StaleVersion {
            entity_type: EntityType::GagState,
            key: "AB12345678#0".to_string(),
            expected: Some(1),
            actual: Some(2),
        }
        .into()
    }

    #[test]
    fn test_succeeds_after_conflicts() {
        let mut calls = 0;
        let result = retry_on_conflict(3, || {
            calls += 1;
            if calls < 3 {
                Err(stale())
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_gives_up_after_attempts() {
        let mut calls = 0;
        let result: TetherResult<()> = retry_on_conflict(2, || {
            calls += 1;
            Err(stale())
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ConcurrencyConflict);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_does_not_retry_other_errors() {
        let mut calls = 0;
        let result: TetherResult<()> = retry_on_conflict(5, || {
            calls += 1;
            Err(TetherError::invalid_value("layer", "out of range"))
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let mut calls = 0;
        let result = retry_on_conflict(0, || {
            calls += 1;
            Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(calls, 1);
    }
}
