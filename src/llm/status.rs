//! Mapping of HTTP failures onto the LLM error taxonomy

use reqwest::StatusCode;

use crate::core::PilotError;

/// Markers providers use when refusing content
const POLICY_MARKERS: &[&str] = &[
    "content_policy_violation",
    "content_filter",
    "content management policy",
    "responsibleaipolicyviolation",
];

/// Whether a response body describes a content-policy refusal
pub fn is_policy_refusal(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    POLICY_MARKERS.iter().any(|m| lower.contains(m))
}

/// Classify a non-success HTTP response
pub fn classify_failure(provider: &str, status: StatusCode, body: &str) -> PilotError {
    let detail = format!("{} API error ({}): {}", provider, status, body);

    if is_policy_refusal(body) {
        PilotError::ContentPolicy(detail)
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        PilotError::RateLimited(detail)
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        PilotError::LlmServer(detail)
    } else if status.is_client_error() {
        PilotError::LlmRejected(detail)
    } else {
        PilotError::Llm(detail)
    }
}

/// Classify a transport-level reqwest failure
pub fn classify_transport(provider: &str, base_url: &str, error: reqwest::Error) -> PilotError {
    if error.is_connect() {
        PilotError::llm(format!(
            "Cannot connect to {} at {}. Is it running?",
            provider, base_url
        ))
    } else if error.is_timeout() {
        PilotError::LlmServer(format!("{} request timed out: {}", provider, error))
    } else {
        PilotError::from(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("openai", StatusCode::TOO_MANY_REQUESTS, "slow down"),
            PilotError::RateLimited(_)
        ));
        assert!(matches!(
            classify_failure("openai", StatusCode::BAD_GATEWAY, ""),
            PilotError::LlmServer(_)
        ));
        assert!(matches!(
            classify_failure(
                "azure",
                StatusCode::BAD_REQUEST,
                r#"{"error":{"code":"content_filter"}}"#
            ),
            PilotError::ContentPolicy(_)
        ));
        assert!(matches!(
            classify_failure("ollama", StatusCode::NOT_FOUND, "model not found"),
            PilotError::LlmRejected(_)
        ));
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let err = classify_failure("openai", status, "invalid api key");
            assert!(!err.is_retryable(), "{} should be final", status);
        }
        assert!(classify_failure("openai", StatusCode::REQUEST_TIMEOUT, "").is_retryable());
        assert!(classify_failure("openai", StatusCode::TOO_MANY_REQUESTS, "").is_retryable());
    }
}
