use crate::classify::{self, ErrorCategory};
use crate::error::{PkgmuxError, Result};

/// Re-run a fallible operation up to `retries` additional times.
///
/// Usage errors and interruption are never retried: the input will not get
/// better and a cancelled run must stop.
pub(super) fn with_retries<T, F>(retries: u32, mut operation: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut last_error: Option<PkgmuxError> = None;

    for _ in 0..=retries {
        match operation() {
            Ok(value) => return Ok(value),
            Err(PkgmuxError::Interrupted) => return Err(PkgmuxError::Interrupted),
            Err(e) => {
                if classify::classify(&e) == ErrorCategory::Usage {
                    return Err(e);
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| PkgmuxError::Other("operation failed".to_string())))
}

#[cfg(test)]
mod tests {
    use super::with_retries;
    use crate::error::PkgmuxError;

    #[test]
    fn succeeds_before_attempts_run_out() {
        let mut attempts = 0u32;
        let result = with_retries(3, || {
            attempts += 1;
            if attempts < 3 {
                Err(PkgmuxError::Other("temporary".to_string()))
            } else {
                Ok(attempts)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn returns_last_error_when_all_attempts_fail() {
        let mut attempts = 0u32;
        let err = with_retries(2, || -> Result<(), _> {
            attempts += 1;
            Err(PkgmuxError::Other(format!("fail-{attempts}")))
        })
        .expect_err("should fail");

        assert_eq!(attempts, 3); // initial try + 2 retries
        assert!(err.to_string().contains("fail-3"));
    }

    #[test]
    fn usage_errors_are_not_retried() {
        let mut attempts = 0u32;
        let _ = with_retries(5, || -> Result<(), _> {
            attempts += 1;
            Err(PkgmuxError::InvalidPackageName {
                name: "a;b".into(),
                reason: "unsafe".into(),
            })
        });
        assert_eq!(attempts, 1);
    }

    #[test]
    fn interruption_stops_immediately() {
        let mut attempts = 0u32;
        let err = with_retries(5, || -> Result<(), _> {
            attempts += 1;
            Err(PkgmuxError::Interrupted)
        })
        .expect_err("should fail");
        assert_eq!(attempts, 1);
        assert!(matches!(err, PkgmuxError::Interrupted));
    }
}
