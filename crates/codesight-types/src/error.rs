//! Error types and handling for codesight
//!
//! Service failures are mostly absorbed by the sync engine and turned into empty
//! results; the variants here describe what can still travel up a call stack.

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// Low severity - operation can continue
    Low,
    /// Medium severity - operation should be retried
    Medium,
    /// High severity - operation should be aborted
    High,
}

/// Main error type for codesight operations
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// File content could not be provided
    #[error("Cannot read content of {path}: {message}")]
    Content {
        /// Bundle path of the file
        path: String,
        /// Reason reported by the content provider
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Transport or non-success service status
    #[error("Network error: {message}")]
    Network {
        /// Error message describing the network issue
        message: String,
    },

    /// The service rejected the token
    #[error("Unauthorized: the service rejected the API token")]
    Unauthorized,

    /// The service answered with a response that cannot be interpreted
    #[error("Malformed service response: {message}")]
    Protocol {
        /// What was missing or inconsistent
        message: String,
    },

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// I/O and content errors
    Io,
    /// Configuration errors
    Config,
    /// Network errors, including authorization
    Network,
    /// Malformed responses
    Protocol,
    /// Cancellation
    Cancelled,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } | Self::Content { .. } => ErrorKind::Io,
            Self::Config { .. } => ErrorKind::Config,
            Self::Network { .. } | Self::Unauthorized => ErrorKind::Network,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Io { .. } => ErrorSeverity::Medium,
            Self::Content { .. } => ErrorSeverity::Low,
            Self::Config { .. } => ErrorSeverity::High,
            Self::Network { .. } => ErrorSeverity::Medium,
            Self::Unauthorized => ErrorSeverity::High,
            Self::Protocol { .. } => ErrorSeverity::Medium,
            Self::Cancelled => ErrorSeverity::Low,
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Io { message } => {
                message.contains("Interrupted")
                    || message.contains("WouldBlock")
                    || message.contains("TimedOut")
            }
            Self::Network { .. } | Self::Protocol { .. } | Self::Content { .. } => true,
            Self::Cancelled | Self::Config { .. } | Self::Unauthorized => false,
        }
    }

    /// Check if this error should trigger a retry.
    ///
    /// Transient service failures qualify; a rejected token does not.
    pub fn should_retry(&self) -> bool {
        self.is_recoverable() && self.severity() <= ErrorSeverity::Medium
    }

    /// Check if this error is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Create a new content error
    pub fn content<P: Into<String>, S: Into<String>>(path: P, message: S) -> Self {
        Self::Content {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new malformed-response error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_error_severity_consistency(message in ".*") {
            let errors = vec![
                Error::Io { message: message.clone() },
                Error::Config { message: message.clone() },
                Error::Network { message: message.clone() },
                Error::Protocol { message: message.clone() },
            ];

            for error in errors {
                let kind = error.kind();
                match error {
                    Error::Io { .. } => prop_assert_eq!(kind, ErrorKind::Io),
                    Error::Config { .. } => prop_assert_eq!(kind, ErrorKind::Config),
                    Error::Network { .. } => prop_assert_eq!(kind, ErrorKind::Network),
                    Error::Protocol { .. } => prop_assert_eq!(kind, ErrorKind::Protocol),
                    _ => {}
                }
            }
        }

        #[test]
        fn test_retry_implies_recoverable(message in ".*") {
            let error = Error::Io { message };
            if error.should_retry() {
                prop_assert!(error.is_recoverable());
                prop_assert!(error.severity() <= ErrorSeverity::Medium);
            }
        }
    }

    #[test]
    fn test_error_severity_ordering() {
        assert!(ErrorSeverity::Low < ErrorSeverity::Medium);
        assert!(ErrorSeverity::Medium < ErrorSeverity::High);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "test file");
        let error = Error::from(io_error);

        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(error.to_string().contains("test file"));
    }

    #[test]
    fn test_unauthorized_is_not_retried() {
        let error = Error::Unauthorized;
        assert_eq!(error.kind(), ErrorKind::Network);
        assert!(!error.is_recoverable());
        assert!(!error.should_retry());
    }

    #[test]
    fn test_cancelled_error() {
        let error = Error::Cancelled;
        assert!(error.is_cancelled());
        assert_eq!(error.severity(), ErrorSeverity::Low);
        assert!(!error.should_retry());
    }

    #[test]
    fn test_network_error_is_retried() {
        let error = Error::network("check-bundle failed: 503 Service Unavailable");
        assert_eq!(error.kind(), ErrorKind::Network);
        assert_eq!(error.severity(), ErrorSeverity::Medium);
        assert!(error.should_retry());
    }

    #[test]
    fn test_content_error_message() {
        let error = Error::content("/src/a.py", "file vanished");
        assert_eq!(error.kind(), ErrorKind::Io);
        assert!(error.to_string().contains("/src/a.py"));
        assert!(error.should_retry());
    }
}
