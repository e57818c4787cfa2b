use crate::domain::model::CarrierId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FreightError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("{carrier} answered HTTP {status}: {body}")]
    CarrierStatus {
        carrier: CarrierId,
        status: u16,
        body: String,
    },

    #[error("{carrier} returned an unexpected response: {message}")]
    UnexpectedResponse { carrier: CarrierId, message: String },

    #[error("{carrier} does not know location '{location}'")]
    LocationNotFound { carrier: CarrierId, location: String },

    #[error("{carrier} did not answer within {limit:?}")]
    DeadlineExceeded { carrier: CarrierId, limit: Duration },

    #[error("{carrier} quote task panicked: {message}")]
    TaskPanicked { carrier: CarrierId, message: String },

    #[error("{carrier} credentials are not configured: {message}")]
    CredentialsMissing { carrier: CarrierId, message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

pub type Result<T> = std::result::Result<T, FreightError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Carrier,
    Configuration,
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// 對外輸出的錯誤格式 `{success:false, error, details, status}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub details: String,
    pub status: u16,
}

impl FreightError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FreightError::ApiError(_) | FreightError::DeadlineExceeded { .. } => {
                ErrorCategory::Network
            }
            FreightError::CarrierStatus { .. }
            | FreightError::UnexpectedResponse { .. }
            | FreightError::TaskPanicked { .. }
            | FreightError::SerializationError(_) => ErrorCategory::Carrier,
            FreightError::CredentialsMissing { .. }
            | FreightError::ConfigError { .. }
            | FreightError::ConfigValidationError { .. }
            | FreightError::InvalidConfigValueError { .. }
            | FreightError::MissingConfigError { .. } => ErrorCategory::Configuration,
            FreightError::LocationNotFound { .. } | FreightError::ValidationError { .. } => {
                ErrorCategory::Input
            }
            FreightError::ZipError(_) | FreightError::CsvError(_) | FreightError::IoError(_) => {
                ErrorCategory::Output
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Carrier | ErrorCategory::Input => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::Output => ErrorSeverity::Critical,
        }
    }

    /// 錯誤對應的 HTTP 狀態碼，盡量保留承運商的原始狀態碼
    pub fn status_code(&self) -> u16 {
        match self {
            FreightError::CarrierStatus { status, .. } => *status,
            FreightError::ApiError(e) => e.status().map(|s| s.as_u16()).unwrap_or(502),
            FreightError::DeadlineExceeded { .. } => 504,
            FreightError::LocationNotFound { .. } => 404,
            FreightError::ValidationError { .. } => 422,
            FreightError::UnexpectedResponse { .. } | FreightError::SerializationError(_) => 502,
            _ => 500,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            FreightError::ApiError(_) => "Carrier API could not be reached".to_string(),
            FreightError::CarrierStatus { carrier, status, .. } => {
                format!("{} rejected the request (HTTP {})", carrier, status)
            }
            FreightError::UnexpectedResponse { carrier, .. } => {
                format!("{} returned a response without a price", carrier)
            }
            FreightError::LocationNotFound { carrier, location } => {
                format!("{} does not serve '{}'", carrier, location)
            }
            FreightError::DeadlineExceeded { carrier, .. } => {
                format!("{} took too long to answer", carrier)
            }
            FreightError::CredentialsMissing { carrier, .. } => {
                format!("{} credentials are not configured", carrier)
            }
            FreightError::ConfigError { .. }
            | FreightError::ConfigValidationError { .. }
            | FreightError::InvalidConfigValueError { .. }
            | FreightError::MissingConfigError { .. } => format!("Invalid configuration: {}", self),
            FreightError::ValidationError { message } => format!("Invalid shipment: {}", message),
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => "Check network connectivity or raise http.timeout_seconds",
            ErrorCategory::Carrier => "Retry later, the carrier API may be degraded",
            ErrorCategory::Configuration => {
                "Check the TOML configuration and the carrier credential environment variables"
            }
            ErrorCategory::Input => "Check city names and cargo dimensions",
            ErrorCategory::Output => "Check that the output directory is writable",
        }
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            error: self.user_friendly_message(),
            details: self.to_string(),
            status: self.status_code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carrier_status_keeps_original_code() {
        let err = FreightError::CarrierStatus {
            carrier: CarrierId::Pek,
            status: 403,
            body: "forbidden".to_string(),
        };

        let body = err.to_error_body();
        assert!(!body.success);
        assert_eq!(body.status, 403);
        assert!(body.details.contains("forbidden"));
        assert_eq!(err.category(), ErrorCategory::Carrier);
    }

    #[test]
    fn test_error_body_serializes_success_flag() {
        let err = FreightError::LocationNotFound {
            carrier: CarrierId::Kit,
            location: "Атлантида".to_string(),
        };

        let json = serde_json::to_value(err.to_error_body()).unwrap();
        assert_eq!(json["success"], serde_json::Value::Bool(false));
        assert_eq!(json["status"], 404);
    }

    #[test]
    fn test_severity_ordering() {
        let deadline = FreightError::DeadlineExceeded {
            carrier: CarrierId::Cdek,
            limit: Duration::from_millis(250),
        };
        let config = FreightError::ConfigError {
            message: "broken".to_string(),
        };
        assert!(deadline.severity() < config.severity());
        assert_eq!(deadline.status_code(), 504);
        assert!(deadline.to_string().ends_with("within 250ms"));
    }
}
