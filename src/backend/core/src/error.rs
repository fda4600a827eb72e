//! Error handling for the authorization core.
//!
//! This module provides:
//! - A single error type with machine-readable codes and error chaining
//! - Classification into the reconcile taxonomy (not-found, conflict,
//!   access-review failure, unexpected)
//! - Retry and severity hints consumed by the scheduler
//! - Metrics integration for error tracking
//!
//! # Usage
//!
//! ```rust,ignore
//! use dbaas_authz_core::error::{AuthzError, Result};
//!
//! fn lookup() -> Result<()> {
//!     Err(AuthzError::not_found("Config", "ns/cluster"))
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for authorization core operations.
pub type Result<T> = std::result::Result<T, AuthzError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Object store errors (1000-1099)
    ObjectNotFound,
    ObjectAlreadyExists,
    UpdateConflict,
    StoreUnavailable,
    StoreError,

    // Serialization errors (1100-1199)
    SerializationError,

    // Authorization review errors (2000-2099)
    AccessReviewFailed,

    // Admission errors (3000-3099)
    AdmissionDenied,

    // Configuration errors (5000-5099)
    ConfigurationError,
    InvalidConfiguration,

    // Runtime errors (9000-9099)
    ShutdownInProgress,
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::ObjectNotFound => 1000,
            Self::ObjectAlreadyExists => 1001,
            Self::UpdateConflict => 1002,
            Self::StoreUnavailable => 1003,
            Self::StoreError => 1004,

            Self::SerializationError => 1100,

            Self::AccessReviewFailed => 2000,

            Self::AdmissionDenied => 3000,

            Self::ConfigurationError => 5000,
            Self::InvalidConfiguration => 5001,

            Self::ShutdownInProgress => 9000,
            Self::InternalError => 9001,
        }
    }

    /// Check if this error is retryable by the scheduler.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ObjectAlreadyExists
                | Self::UpdateConflict
                | Self::StoreUnavailable
                | Self::StoreError
                | Self::AccessReviewFailed
        )
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "store",
            1100..=1199 => "serialization",
            2000..=2099 => "access_review",
            3000..=3099 => "admission",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Expected outcomes of concurrent operation (not found, conflicts)
    Low,
    /// Degraded but recoverable (access review failures)
    Medium,
    /// Store or serialization failures
    High,
    /// Bugs
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::ObjectNotFound
            | ErrorCode::ObjectAlreadyExists
            | ErrorCode::UpdateConflict
            | ErrorCode::AdmissionDenied
            | ErrorCode::ShutdownInProgress => Self::Low,

            ErrorCode::AccessReviewFailed => Self::Medium,

            ErrorCode::StoreUnavailable
            | ErrorCode::StoreError
            | ErrorCode::SerializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::InvalidConfiguration => Self::High,

            ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Kind of the object involved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_kind: Option<String>,

    /// `namespace/name` (or `name` when cluster scoped) of the object involved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, kind: impl Into<String>, key: impl Into<String>) -> Self {
        self.object_kind = Some(kind.into());
        self.object_key = Some(key.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for the authorization core.
#[derive(Error, Debug)]
pub struct AuthzError {
    /// Machine-readable error code
    code: ErrorCode,

    /// Human-readable message
    message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for AuthzError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl AuthzError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and message.
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            message: message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, "An internal error occurred")
            .with_internal_message(message)
    }

    /// Create a not found error for an object.
    pub fn not_found(kind: impl Into<String>, key: impl Into<String>) -> Self {
        let kind = kind.into();
        let key = key.into();
        Self::new(ErrorCode::ObjectNotFound, format!("{} not found: {}", kind, key))
            .with_details(ErrorDetails::new().with_object(kind, key))
    }

    /// Create an already-exists error for an object.
    pub fn already_exists(kind: impl Into<String>, key: impl Into<String>) -> Self {
        let kind = kind.into();
        let key = key.into();
        Self::new(
            ErrorCode::ObjectAlreadyExists,
            format!("{} already exists: {}", kind, key),
        )
        .with_details(ErrorDetails::new().with_object(kind, key))
    }

    /// Create an optimistic-concurrency conflict error.
    pub fn conflict(kind: impl Into<String>, key: impl Into<String>) -> Self {
        let kind = kind.into();
        let key = key.into();
        Self::new(
            ErrorCode::UpdateConflict,
            format!("{} {} was modified concurrently", kind, key),
        )
        .with_details(ErrorDetails::new().with_object(kind, key))
    }

    /// Create an access review failure.
    pub fn access_review(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::AccessReviewFailed, message)
    }

    /// Create an admission denial.
    pub fn admission_denied(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::AdmissionDenied, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }

    /// Create a serialization error.
    pub fn serialization(source: serde_json::Error) -> Self {
        Self::new(ErrorCode::SerializationError, "Failed to (de)serialize object")
            .with_internal_message(source.to_string())
            .with_source(source)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::ObjectNotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.code == ErrorCode::UpdateConflict
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    pub fn category(&self) -> &'static str {
        self.code.category()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Observability
    // ─────────────────────────────────────────────────────────────────────────

    fn record_metrics(&self) {
        counter!(
            "dbaas_authz_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category()
        )
        .increment(1);
    }

    /// Log this error at a level matching its severity.
    pub fn log(&self) {
        match self.severity() {
            ErrorSeverity::Low => tracing::debug!(
                code = %self.code,
                internal = ?self.internal_message,
                "{}",
                self.message
            ),
            ErrorSeverity::Medium => tracing::warn!(
                code = %self.code,
                internal = ?self.internal_message,
                "{}",
                self.message
            ),
            ErrorSeverity::High | ErrorSeverity::Critical => tracing::error!(
                code = %self.code,
                internal = ?self.internal_message,
                details = ?self.details,
                "{}",
                self.message
            ),
        }
    }
}

impl From<serde_json::Error> for AuthzError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}

impl From<config::ConfigError> for AuthzError {
    fn from(err: config::ConfigError) -> Self {
        Self::new(ErrorCode::ConfigurationError, "Failed to load configuration")
            .with_internal_message(err.to_string())
            .with_source(err)
    }
}

impl From<reqwest::Error> for AuthzError {
    fn from(err: reqwest::Error) -> Self {
        Self::access_review("Access review request failed")
            .with_internal_message(err.to_string())
            .with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_is_retryable() {
        assert!(ErrorCode::UpdateConflict.is_retryable());
        assert!(ErrorCode::StoreUnavailable.is_retryable());
        assert!(!ErrorCode::ObjectNotFound.is_retryable());
        assert!(!ErrorCode::AdmissionDenied.is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(ErrorCode::UpdateConflict.category(), "store");
        assert_eq!(ErrorCode::AccessReviewFailed.category(), "access_review");
        assert_eq!(ErrorCode::InvalidConfiguration.category(), "configuration");
        assert_eq!(ErrorCode::InternalError.category(), "internal");
    }

    #[test]
    fn test_not_found_details() {
        let err = AuthzError::not_found("Config", "ns/c1");
        assert!(err.is_not_found());
        assert_eq!(err.details().object_kind.as_deref(), Some("Config"));
        assert_eq!(err.details().object_key.as_deref(), Some("ns/c1"));
        assert_eq!(err.to_string(), "[ObjectNotFound] Config not found: ns/c1");
    }

    #[test]
    fn test_conflict_severity() {
        let err = AuthzError::conflict("RoleBinding", "ns/x");
        assert!(err.is_conflict());
        assert!(err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Low);
    }

    #[test]
    fn test_internal_message_in_display() {
        let err = AuthzError::internal("boom");
        assert_eq!(err.code(), ErrorCode::InternalError);
        assert!(err.to_string().contains("(internal: boom)"));
    }
}
