//! Error types for authorization and authorized requests
//!
//! Two failure kinds matter to callers: `Authentication` (missing or rejected
//! credentials, CSRF state mismatch, failed token exchanges) and `Api`
//! (timeouts, transport failures, non-401 error statuses). Both carry an
//! `ErrorDetail` with whatever HTTP context was available.

use std::fmt;

use serde_json::Value;

use crate::constants::TOKEN_EXPIRED_MSG;

/// Method and URL of the request that failed. Headers are not captured so
/// bearer tokens never end up in error messages.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: reqwest::Method,
    pub url: String,
}

/// Context attached to authentication and API errors.
#[derive(Debug, Default)]
pub struct ErrorDetail {
    pub message: String,
    /// HTTP status of the triggering response, if there was one
    pub status: Option<u16>,
    /// Parsed JSON body, or the raw body as a JSON string if it wasn't JSON
    pub body: Option<Value>,
    pub request: Option<RequestInfo>,
    /// Underlying transport error
    pub source: Option<reqwest::Error>,
}

impl ErrorDetail {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_request(mut self, request: RequestInfo) -> Self {
        self.request = Some(request);
        self
    }

    pub fn with_source(mut self, source: reqwest::Error) -> Self {
        self.source = Some(source);
        self
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {status})")?;
        }
        if let Some(request) = &self.request {
            write!(f, " [{} {}]", request.method, request.url)?;
        }
        Ok(())
    }
}

/// Errors from authorization flows and authorized requests.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("authentication error: {0}")]
    Authentication(Box<ErrorDetail>),

    #[error("API error: {0}")]
    Api(Box<ErrorDetail>),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),
}

impl Error {
    /// Authentication error with only a message.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Authentication(Box::new(ErrorDetail::new(message)))
    }

    /// API error with only a message.
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api(Box::new(ErrorDetail::new(message)))
    }

    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            Self::Authentication(detail) | Self::Api(detail) => Some(detail),
            _ => None,
        }
    }

    /// HTTP status of the response that triggered the error.
    pub fn status(&self) -> Option<u16> {
        self.detail().and_then(|d| d.status)
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// A 401 whose body is `{"error": {"message": "The access token expired"}}`.
    pub fn is_token_expired(&self) -> bool {
        let Some(detail) = self.detail() else {
            return false;
        };
        detail.status == Some(401)
            && detail
                .body
                .as_ref()
                .and_then(|body| body.get("error"))
                .and_then(|error| error.get("message"))
                .and_then(Value::as_str)
                == Some(TOKEN_EXPIRED_MSG)
    }

    /// Reclassify an API failure as an authentication failure, prefixing the
    /// message. HTTP context is preserved. Other variants pass through.
    pub fn into_authentication(self, message: &str) -> Self {
        match self {
            Self::Api(mut detail) | Self::Authentication(mut detail) => {
                detail.message = format!("{message}: {}", detail.message);
                Self::Authentication(detail)
            }
            other => other,
        }
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
