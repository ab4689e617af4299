/// Unified error types for the SMP resolver core
use thiserror::Error;

/// Main error type for resolver operations
#[derive(Error, Debug)]
pub enum SmpError {
    /// Participant identifier parse/validation failures
    #[error("Invalid participant identifier: {0}")]
    InvalidIdentifier(String),

    /// DNS resolver errors and timeouts (NXDOMAIN is not an error)
    #[error("DNS resolution error: {0}")]
    DnsFailure(String),

    /// Non-success, non-redirect HTTP response
    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Network, TLS, timeout, body-read, or redirect-overflow errors
    #[error("HTTP transport error for {url}: {message}")]
    HttpTransport { url: String, message: String },

    /// Malformed XML or missing mandatory element
    #[error("XML parse error in {document}: {message}")]
    XmlParse { document: String, message: String },

    /// X.509 certificate decode failures
    #[error("Certificate parse error: {0}")]
    CertificateParse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SmpError {
    /// Shorthand for transport errors carrying the request URL
    pub fn transport(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        SmpError::HttpTransport {
            url: url.into(),
            message: err.to_string(),
        }
    }

    /// Whether this error is a transport-level failure (connection, TLS,
    /// timeout) as opposed to an HTTP status response
    pub fn is_transport(&self) -> bool {
        matches!(self, SmpError::HttpTransport { .. })
    }
}

/// Result type alias for resolver operations
pub type SmpResult<T> = Result<T, SmpError>;
