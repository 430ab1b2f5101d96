use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the `adsrpc-api` crate.
///
/// Every variant belongs to exactly one category (transport, authentication,
/// API call, validation, local I/O). Callers that need to branch, e.g. to
/// wait out a reboot or re-login, use the `is_*` predicates rather than
/// matching individual variants.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The device answered with an HTTP error status (>= 400).
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Response body was not the JSON the protocol promises, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Authentication ──────────────────────────────────────────────
    /// SID acquisition failed: rejected credentials or an unexpected auth response.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── RPC ─────────────────────────────────────────────────────────
    /// The device returned a non-zero status code for a well-formed call.
    #[error("API call error (status {code:?}): {response}")]
    ApiCall {
        code: Option<i64>,
        response: serde_json::Value,
    },

    // ── Validation ──────────────────────────────────────────────────
    /// Caller input rejected before any network activity.
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    /// A local file handed to an upload does not exist.
    #[error("local file not found: {}", path.display())]
    LocalFileNotFound { path: PathBuf },

    // ── Local I/O ───────────────────────────────────────────────────
    /// Reading an upload source or writing a download target failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns `true` for network, HTTP, and response-decoding failures.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::HttpStatus { .. }
                | Self::Deserialization { .. }
                | Self::InvalidUrl(_)
                | Self::Tls(_)
        )
    }

    /// Returns `true` if the SID could not be acquired.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if the device rejected the call with a status code.
    pub fn is_api_call(&self) -> bool {
        matches!(self, Self::ApiCall { .. })
    }

    /// Returns `true` if the request was rejected locally before touching the network.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::LocalFileNotFound { .. })
    }

    /// Returns `true` if the request timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// The HTTP status code, if this error carries one.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The protocol status code of a rejected call.
    pub fn api_status_code(&self) -> Option<i64> {
        match self {
            Self::ApiCall { code, .. } => *code,
            _ => None,
        }
    }
}
