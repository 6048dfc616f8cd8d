//! Crate-wide error taxonomy.
//!
//! Every fallible operation in this crate returns [`Result<T>`], and every
//! failure eventually maps to one of the RFC 6749 §5.2 wire codes. The
//! mapping happens once, here, so callers never have to guess which HTTP
//! status or `tracing` level a given failure deserves.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Result type alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// RFC 6749 §5.2 / RFC 8707 / RFC 6750 error codes this server can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidRequest,
    InvalidClient,
    InvalidGrant,
    UnsupportedGrantType,
    InvalidTarget,
    InsufficientScope,
    ServerError,
}

impl ErrorCode {
    /// The wire `error` value for this code.
    pub const fn wire(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::InvalidTarget => "invalid_target",
            Self::InsufficientScope => "insufficient_scope",
            Self::ServerError => "server_error",
        }
    }

    const fn status(self) -> StatusCode {
        match self {
            Self::InvalidClient => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope => StatusCode::FORBIDDEN,
            Self::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidRequest
            | Self::InvalidGrant
            | Self::UnsupportedGrantType
            | Self::InvalidTarget => StatusCode::BAD_REQUEST,
        }
    }
}

/// Whether a failure was caused by the caller (logged at `warn!`, never
/// alerted on) or by this server / the upstream provider (logged at
/// `error!` with a correlation id, alerted on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warn,
    Issue,
}

/// The crate's single error type.
///
/// Constructed via the `Error::invalid_*`/`Error::server_error` family so
/// that every call site states its intent (and wire code) explicitly rather
/// than matching on a generic variant later.
#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub description: String,
    pub severity: Severity,
    /// Set only for `insufficient_scope`: the scope the caller was missing.
    pub required_scope: Option<String>,
    /// Set only for `server_error`: an opaque id echoed as `X-Event-ID`.
    pub correlation_id: Option<String>,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.wire(), self.description)
    }
}

impl std::error::Error for Error {}

impl Error {
    fn new(code: ErrorCode, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            code,
            description: description.into(),
            severity,
            required_scope: None,
            correlation_id: None,
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, description, Severity::Warn)
    }

    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidClient, description, Severity::Warn)
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidGrant, description, Severity::Warn)
    }

    pub fn unsupported_grant_type() -> Self {
        Self::new(
            ErrorCode::UnsupportedGrantType,
            "Grant type not supported",
            Severity::Warn,
        )
    }

    pub fn invalid_target(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidTarget, description, Severity::Warn)
    }

    pub fn insufficient_scope(scope: impl Into<String>) -> Self {
        let scope = scope.into();
        let mut err = Self::new(
            ErrorCode::InsufficientScope,
            format!("Missing required scope: {scope}"),
            Severity::Warn,
        );
        err.required_scope = Some(scope);
        err
    }

    /// A failure this server is responsible for: upstream 5xx, parse
    /// failures, decryption failures, or a violated internal invariant.
    /// Always carries a correlation id so an operator can find the matching
    /// `error!` log line from the client-visible `X-Event-ID` header.
    pub fn server_error(description: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorCode::ServerError, description, Severity::Issue);
        err.correlation_id = Some(uuid::Uuid::new_v4().to_string());
        err
    }

    /// An upstream 4xx response: the caller's fault, surfaced as
    /// `invalid_grant`, never alerted on.
    pub fn upstream_rejected(status: StatusCode, description: impl Into<String>) -> Self {
        tracing::warn!(upstream_status = %status, "upstream rejected request");
        Self::invalid_grant(description)
    }

    fn log(&self) {
        match self.severity {
            Severity::Warn => {
                tracing::warn!(code = self.code.wire(), description = %self.description, "request rejected");
            }
            Severity::Issue => {
                tracing::error!(
                    code = self.code.wire(),
                    description = %self.description,
                    correlation_id = self.correlation_id.as_deref().unwrap_or(""),
                    "internal failure"
                );
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    error_description: &'a str,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        self.log();

        let status = self.code.status();
        let body = Json(ErrorBody {
            error: self.code.wire(),
            error_description: &self.description,
        });
        let mut response = (status, body).into_response();

        if self.code == ErrorCode::InvalidClient {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"token\""),
            );
        }
        if self.code == ErrorCode::InsufficientScope {
            let scope = self.required_scope.as_deref().unwrap_or("");
            let value = format!(
                "Bearer error=\"insufficient_scope\", scope=\"{scope}\""
            );
            if let Ok(header_value) = HeaderValue::from_str(&value) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, header_value);
            }
        }
        if let Some(correlation_id) = &self.correlation_id
            && let Ok(header_value) = HeaderValue::from_str(correlation_id)
        {
            response
                .headers_mut()
                .insert("x-event-id", header_value);
        }

        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
            .headers_mut()
            .insert(header::PRAGMA, HeaderValue::from_static("no-cache"));

        response
    }
}
