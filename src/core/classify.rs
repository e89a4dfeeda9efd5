//! Failure classification
//!
//! Maps a raw failure message onto a small set of categories, each with a
//! fixed remediation hint for the operator. Classification is total: every
//! message gets a category, `Unknown` when nothing matches.

use serde::Serialize;
use std::fmt;

/// Failure category, checked in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    NotFound,
    ParameterValidationRequiredMissing,
    ParameterValidation,
    Timeout,
    SessionExpired,
    Unknown,
}

impl ErrorCategory {
    /// Fixed remediation lines shown under the failure header
    pub fn remediation(&self) -> &'static [&'static str] {
        match self {
            ErrorCategory::NotFound => &[
                "Tool not found. Use --list-only (or 'list' in interactive mode) to see available tools.",
            ],
            ErrorCategory::ParameterValidationRequiredMissing => &[
                "The server requires parameters that weren't provided.",
                "💡 This may indicate the tool schema doesn't correctly mark required parameters.",
                "💡 Try calling the tool again and provide values for parameters that seem required.",
            ],
            ErrorCategory::ParameterValidation => {
                &["Parameter error. Check parameter format and required fields."]
            }
            ErrorCategory::Timeout => &[
                "Request timed out. Try increasing --call-timeout (tool calls) or --timeout (connection and listing).",
            ],
            ErrorCategory::SessionExpired => &["Session expired. Please restart mcprobe."],
            ErrorCategory::Unknown => &[],
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::NotFound => "not found",
            ErrorCategory::ParameterValidationRequiredMissing => "required parameter missing",
            ErrorCategory::ParameterValidation => "parameter validation",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::SessionExpired => "session expired",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A raw failure together with its category
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub original_message: String,
}

impl ClassifiedError {
    pub fn new(category: ErrorCategory, original_message: impl Into<String>) -> Self {
        ClassifiedError {
            category,
            original_message: original_message.into(),
        }
    }

    pub fn remediation(&self) -> &'static [&'static str] {
        self.category.remediation()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.category, self.original_message)
    }
}

/// Classify a raw failure message.
///
/// Substrings are matched in priority order: "not found", "parameter" with
/// "required", "parameter", "timeout", then "invalid session id". Only the
/// session rule ignores case.
pub fn classify(message: &str) -> ClassifiedError {
    let category = if message.contains("not found") {
        ErrorCategory::NotFound
    } else if message.contains("parameter") && message.contains("required") {
        ErrorCategory::ParameterValidationRequiredMissing
    } else if message.contains("parameter") {
        ErrorCategory::ParameterValidation
    } else if message.contains("timeout") {
        ErrorCategory::Timeout
    } else if message.to_lowercase().contains("invalid session id") {
        ErrorCategory::SessionExpired
    } else {
        ErrorCategory::Unknown
    };

    ClassifiedError::new(category, message)
}
