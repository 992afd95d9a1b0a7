use std::thread;
use std::time::Duration;

use log::warn;
use longform_core::LlmConfig;

use crate::error::AdapterError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub sleep: Duration,
}

impl RetryConfig {
    pub const fn new(max_retries: usize, sleep: Duration) -> Self {
        Self { max_retries, sleep }
    }

    pub fn from_profile(profile: &LlmConfig) -> Self {
        Self::new(
            profile.max_retries.max(1),
            Duration::from_secs(profile.retry_interval),
        )
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            sleep: Duration::from_secs(5),
        }
    }
}

/// Runs `f` up to `max_retries` times. Errors that cannot improve on retry
/// are returned immediately.
pub fn call_with_retry<F, T>(mut f: F, config: &RetryConfig) -> Result<T, AdapterError>
where
    F: FnMut() -> Result<T, AdapterError>,
{
    let attempts = config.max_retries.max(1);
    let mut last_error: Option<AdapterError> = None;

    for attempt in 1..=attempts {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                warn!(
                    "[call_with_retry] attempt {}/{} failed: {}",
                    attempt, attempts, err
                );
                if attempt < attempts {
                    thread::sleep(config.sleep);
                }
                last_error = Some(err);
            }
        }
    }

    let err = last_error.unwrap_or(AdapterError::EmptyResponse);
    Err(AdapterError::retry_exhausted(attempts, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn instant(max_retries: usize) -> RetryConfig {
        RetryConfig::new(max_retries, Duration::ZERO)
    }

    fn unavailable() -> AdapterError {
        AdapterError::HttpStatus {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: "busy".into(),
        }
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let mut calls = 0;
        let result = call_with_retry(
            || {
                calls += 1;
                if calls < 3 {
                    Err(unavailable())
                } else {
                    Ok("正文")
                }
            },
            &instant(3),
        );
        assert_eq!(result.unwrap(), "正文");
        assert_eq!(calls, 3);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = call_with_retry(
            || {
                calls += 1;
                Err(AdapterError::MissingCredential {
                    variable: "DEEPSEEK_API_KEY".into(),
                })
            },
            &instant(5),
        );
        assert!(matches!(result, Err(AdapterError::MissingCredential { .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn gives_up_after_the_configured_attempts() {
        let mut calls = 0;
        let result: Result<(), _> = call_with_retry(
            || {
                calls += 1;
                Err(unavailable())
            },
            &instant(2),
        );
        assert!(matches!(
            result,
            Err(AdapterError::RetryExhausted { attempts: 2, .. })
        ));
        assert_eq!(calls, 2);
    }

    #[test]
    fn profile_values_are_used() {
        let mut profile = LlmConfig::deepseek();
        profile.max_retries = 0;
        profile.retry_interval = 1;
        let config = RetryConfig::from_profile(&profile);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.sleep, Duration::from_secs(1));
    }
}
