use longform_core::{LanguageModelError, LanguageModelErrorKind};
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to parse response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),
    #[error("no API key configured; set `api_key` or the `{variable}` environment variable")]
    MissingCredential { variable: String },
    #[error("unexpected http status {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("operation failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: usize,
        #[source]
        source: Box<AdapterError>,
    },
    #[error("API returned an empty response")]
    EmptyResponse,
}

impl AdapterError {
    pub fn retry_exhausted(attempts: usize, source: AdapterError) -> Self {
        AdapterError::RetryExhausted {
            attempts,
            source: Box::new(source),
        }
    }

    /// Transport failures, rate limits and server errors may succeed on a later attempt.
    /// Undecodable bodies and malformed requests fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Http(err) => !(err.is_decode() || err.is_builder()),
            AdapterError::HttpStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    pub fn model_error_kind(&self) -> LanguageModelErrorKind {
        match self {
            AdapterError::Http(err) if err.is_timeout() => LanguageModelErrorKind::Timeout,
            AdapterError::Http(err) if err.is_decode() => LanguageModelErrorKind::Malformed,
            AdapterError::Http(err) if err.is_builder() => LanguageModelErrorKind::Other,
            AdapterError::Http(_) => LanguageModelErrorKind::Transport,
            AdapterError::Json(_) => LanguageModelErrorKind::Malformed,
            AdapterError::InvalidConfig(_) => LanguageModelErrorKind::Other,
            AdapterError::MissingCredential { .. } => LanguageModelErrorKind::MissingCredential,
            AdapterError::HttpStatus { .. } => LanguageModelErrorKind::Status,
            AdapterError::RetryExhausted { source, .. } => source.model_error_kind(),
            AdapterError::EmptyResponse => LanguageModelErrorKind::EmptyResponse,
        }
    }
}

impl From<AdapterError> for LanguageModelError {
    fn from(err: AdapterError) -> Self {
        LanguageModelError::with_kind(err.model_error_kind(), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_statuses_are_retryable() {
        let server = AdapterError::HttpStatus {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        };
        let limited = AdapterError::HttpStatus {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        };
        let unauthorized = AdapterError::HttpStatus {
            status: StatusCode::UNAUTHORIZED,
            body: String::new(),
        };
        assert!(server.is_retryable());
        assert!(limited.is_retryable());
        assert!(!unauthorized.is_retryable());
        assert!(!AdapterError::EmptyResponse.is_retryable());
        assert!(!AdapterError::MissingCredential {
            variable: "DEEPSEEK_API_KEY".into()
        }
        .is_retryable());
    }

    #[test]
    fn malformed_requests_are_not_retried() {
        let built = reqwest::blocking::Client::new()
            .post("not a url")
            .build()
            .map(|_| ());
        let err = AdapterError::from(built.unwrap_err());
        assert!(!err.is_retryable());
        assert_eq!(err.model_error_kind(), LanguageModelErrorKind::Other);
    }

    #[test]
    fn exhausted_retries_report_the_last_cause() {
        let err = AdapterError::retry_exhausted(3, AdapterError::EmptyResponse);
        assert_eq!(err.model_error_kind(), LanguageModelErrorKind::EmptyResponse);

        let converted: LanguageModelError = err.into();
        assert_eq!(converted.kind(), LanguageModelErrorKind::EmptyResponse);
        assert!(converted.to_string().contains("after 3 attempts"));
    }
}
