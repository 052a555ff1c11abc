use std::time::Duration;

use chrono::Utc;

use muninn::{ErrorKind, MuninnError, RateLimitInfo, Result};

fn rate_limited() -> MuninnError {
    MuninnError::RateLimited {
        info: RateLimitInfo {
            limit: 10,
            remaining: 0,
            reset_at: Utc::now(),
        },
        retry_after: Duration::from_secs(30),
    }
}

#[test]
fn test_error_display() {
    let err = MuninnError::GenerationIncomplete("missing required collection `days`".into());
    assert!(err.to_string().contains("days"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(MuninnError::InvalidRequest("cyclic".into()))
    }
    assert!(returns_error().is_err());
}

#[test]
fn json_errors_are_invalid_requests() {
    let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    let err: MuninnError = json_err.into();
    assert_eq!(err.kind(), ErrorKind::InvalidRequest);
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn kinds() {
    assert_eq!(rate_limited().kind(), ErrorKind::RateLimited);
    assert_eq!(
        MuninnError::store("redis", "timeout").kind(),
        ErrorKind::StoreUnavailable
    );
    assert_eq!(
        MuninnError::GenerationFailed("503".into()).kind(),
        ErrorKind::GenerationFailed
    );
    assert_eq!(
        MuninnError::Configuration("bad".into()).kind(),
        ErrorKind::Internal
    );
}

#[test]
fn retryable_errors() {
    assert!(rate_limited().is_retryable());
    assert!(MuninnError::GenerationFailed("503".into()).is_retryable());
    assert!(MuninnError::GenerationIncomplete("null".into()).is_retryable());
    assert!(MuninnError::store("db", "down").is_retryable());
}

#[test]
fn non_retryable_errors() {
    assert!(!MuninnError::InvalidRequest("bad".into()).is_retryable());
    assert!(!MuninnError::Configuration("bad".into()).is_retryable());
}

#[test]
fn retry_after_only_on_rate_limit() {
    assert_eq!(rate_limited().retry_after(), Some(Duration::from_secs(30)));
    assert_eq!(MuninnError::GenerationFailed("x".into()).retry_after(), None);
}

#[test]
fn public_message_hides_infrastructure() {
    let err = MuninnError::store("postgres", "password authentication failed for user muninn");
    let message = err.public_message();
    assert!(!message.contains("postgres"));
    assert!(!message.contains("password"));

    let err = MuninnError::InvalidRequest("nesting too deep".into());
    assert!(err.public_message().contains("nesting too deep"));
}

#[test]
fn error_kind_serializes_as_name() {
    let json = serde_json::to_string(&ErrorKind::GenerationIncomplete).unwrap();
    assert_eq!(json, "\"GenerationIncomplete\"");
    assert_eq!(ErrorKind::RateLimited.to_string(), "RateLimited");
}
