//! Error types for Mailgate

use thiserror::Error;

/// Main error type for Mailgate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Module already registered: {0}")]
    DuplicateModule(String),

    #[error("Duplicate instance name: {0}")]
    DuplicateInstance(String),

    #[error("DNS error: {0}")]
    Dns(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Mailgate
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a configuration error scoped to one directive of one check instance
    pub fn directive(instance: &str, directive: &str, message: impl std::fmt::Display) -> Self {
        Error::Config(format!("{}: {}: {}", instance, directive, message))
    }

    /// Returns true if this error must abort process startup
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::UnknownModule(_)
                | Error::DuplicateModule(_)
                | Error::DuplicateInstance(_)
        )
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::UnknownModule(_) => "UNKNOWN_MODULE",
            Error::DuplicateModule(_) => "DUPLICATE_MODULE",
            Error::DuplicateInstance(_) => "DUPLICATE_INSTANCE",
            Error::Dns(_) => "DNS_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_error_message() {
        let err = Error::directive("spf_strict", "fail_action", "unknown token 'drop'");
        assert_eq!(
            err.to_string(),
            "Configuration error: spf_strict: fail_action: unknown token 'drop'"
        );
        assert_eq!(err.code(), "CONFIG_ERROR");
        assert!(err.is_fatal_at_startup());
    }

    #[test]
    fn test_dns_error_not_fatal() {
        let err = Error::Dns("timeout".to_string());
        assert!(!err.is_fatal_at_startup());
        assert_eq!(err.code(), "DNS_ERROR");
    }
}
