//! Error types for lessonforge operations.
//!
//! Defines the error types shared across subsystems:
//! - LLM transport failures (HTTP, parsing, upstream status codes)
//! - Generation failures classified by retry eligibility
//!
//! Storage, validation, configuration and orchestration errors live next to
//! the code that raises them.

use std::fmt;

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: LITELLM_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Context length exceeded: {limit} tokens")]
    ContextLengthExceeded { limit: u32 },

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Kinds of generation failure that are worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// The per-call timeout elapsed.
    Timeout,
    /// Connection-level failure before a response arrived.
    Network,
    /// Upstream asked us to slow down (HTTP 429).
    RateLimited,
    /// Upstream server error (5xx, 408).
    Upstream(u16),
    /// The model answered, but not with a usable content payload.
    MalformedOutput,
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransientKind::Timeout => write!(f, "timeout"),
            TransientKind::Network => write!(f, "network"),
            TransientKind::RateLimited => write!(f, "rate_limited"),
            TransientKind::Upstream(code) => write!(f, "upstream_{}", code),
            TransientKind::MalformedOutput => write!(f, "malformed_output"),
        }
    }
}

/// Kinds of generation failure that will not improve on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermanentKind {
    /// The request itself was rejected as invalid (4xx other than auth/429).
    BadRequest,
    /// Credentials were missing or refused.
    Unauthorized,
    /// The upstream refused to produce the content.
    ContentPolicy,
    /// The client is not configured well enough to make a call.
    Configuration,
}

impl fmt::Display for PermanentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermanentKind::BadRequest => write!(f, "bad_request"),
            PermanentKind::Unauthorized => write!(f, "unauthorized"),
            PermanentKind::ContentPolicy => write!(f, "content_policy"),
            PermanentKind::Configuration => write!(f, "configuration"),
        }
    }
}

/// A classified failure from one generation call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("transient generation failure ({kind}): {message}")]
    Transient { kind: TransientKind, message: String },

    #[error("permanent generation failure ({kind}): {message}")]
    Permanent { kind: PermanentKind, message: String },
}

impl GenerationError {
    pub fn transient(kind: TransientKind, message: impl Into<String>) -> Self {
        GenerationError::Transient {
            kind,
            message: message.into(),
        }
    }

    pub fn permanent(kind: PermanentKind, message: impl Into<String>) -> Self {
        GenerationError::Permanent {
            kind,
            message: message.into(),
        }
    }

    /// Whether the retry controller may spend another attempt on this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerationError::Transient { .. })
    }
}

impl From<LlmError> for GenerationError {
    fn from(err: LlmError) -> Self {
        let message = err.to_string();
        match err {
            LlmError::Timeout { .. } => GenerationError::transient(TransientKind::Timeout, message),
            LlmError::RequestFailed(_) => {
                GenerationError::transient(TransientKind::Network, message)
            }
            LlmError::RateLimited(_) => {
                GenerationError::transient(TransientKind::RateLimited, message)
            }
            // An unreadable envelope from the upstream is treated like any other flaky answer.
            LlmError::ParseError(_) => {
                GenerationError::transient(TransientKind::MalformedOutput, message)
            }
            LlmError::ApiError { code, .. } => match code {
                429 => GenerationError::transient(TransientKind::RateLimited, message),
                408 | 500..=599 => GenerationError::transient(TransientKind::Upstream(code), message),
                401 | 403 => GenerationError::permanent(PermanentKind::Unauthorized, message),
                451 => GenerationError::permanent(PermanentKind::ContentPolicy, message),
                _ => GenerationError::permanent(PermanentKind::BadRequest, message),
            },
            LlmError::ContextLengthExceeded { .. } => {
                GenerationError::permanent(PermanentKind::BadRequest, message)
            }
            LlmError::MissingApiKey | LlmError::MissingApiBase => {
                GenerationError::permanent(PermanentKind::Configuration, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_error_classification() {
        let cases = [
            (LlmError::Timeout { seconds: 30 }, true),
            (LlmError::RequestFailed("connection reset".into()), true),
            (LlmError::RateLimited("slow down".into()), true),
            (
                LlmError::ApiError {
                    code: 503,
                    message: "unavailable".into(),
                },
                true,
            ),
            (
                LlmError::ApiError {
                    code: 400,
                    message: "bad".into(),
                },
                false,
            ),
            (
                LlmError::ApiError {
                    code: 401,
                    message: "no key".into(),
                },
                false,
            ),
            (LlmError::MissingApiBase, false),
            (LlmError::ContextLengthExceeded { limit: 8192 }, false),
        ];

        for (err, retryable) in cases {
            let label = err.to_string();
            assert_eq!(
                GenerationError::from(err).is_retryable(),
                retryable,
                "unexpected classification for {}",
                label
            );
        }
    }

    #[test]
    fn test_auth_failures_are_unauthorized() {
        let err = GenerationError::from(LlmError::ApiError {
            code: 403,
            message: "forbidden".into(),
        });
        assert!(matches!(
            err,
            GenerationError::Permanent {
                kind: PermanentKind::Unauthorized,
                ..
            }
        ));
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(TransientKind::Upstream(502).to_string(), "upstream_502");
        assert_eq!(PermanentKind::ContentPolicy.to_string(), "content_policy");
    }
}
