//! Dispatch error taxonomy and its wire encoding.

use serde::{Deserialize, Serialize};

use crate::envelope::ErrorEntry;

// ── Wire messages ───────────────────────────────────────────────────

/// Generic message for failures whose detail must not reach the client.
pub const GENERIC_MESSAGE: &str = "Exception";
/// Message sent when a command is rejected by the authorization gate.
pub const ACCESS_DENIED_MESSAGE: &str = "Access denied";
/// Message sent when an identity already has a live connection.
pub const DUPLICATE_IDENTITY_MESSAGE: &str = "Only one username connection is allowed";

/// Failure category. Each kind owns a distinct, stable integer code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Inbound message could not be decoded.
    Decode,
    /// Authorization hook rejected the command.
    AuthDenied,
    /// No command registered for the (domain, group, method) triple.
    UnknownCommand,
    /// Handler returned an error while executing.
    HandlerFailure,
    /// Identity already registered to another live connection.
    DuplicateIdentity,
    /// A declared required parameter was absent or null.
    MissingParam,
    /// Parameters were present but had the wrong shape.
    InvalidParams,
    /// Handler exceeded the per-command deadline.
    Timeout,
}

impl ErrorKind {
    /// Distinct integer code used by [`ErrorCodeStyle::Distinct`].
    pub const fn code(self) -> i64 {
        match self {
            Self::Decode => 1,
            Self::AuthDenied => 2,
            Self::UnknownCommand => 3,
            Self::HandlerFailure => 4,
            Self::DuplicateIdentity => 5,
            Self::MissingParam => 6,
            Self::InvalidParams => 7,
            Self::Timeout => 8,
        }
    }

    /// Stable label for logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decode => "DECODE_ERROR",
            Self::AuthDenied => "AUTH_DENIED",
            Self::UnknownCommand => "UNKNOWN_COMMAND",
            Self::HandlerFailure => "HANDLER_FAILURE",
            Self::DuplicateIdentity => "DUPLICATE_IDENTITY",
            Self::MissingParam => "MISSING_PARAM",
            Self::InvalidParams => "INVALID_PARAMS",
            Self::Timeout => "TIMEOUT",
        }
    }
}

/// How error codes are written on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCodeStyle {
    /// Every error carries code `0`; clients tell failures apart by message.
    #[default]
    Legacy,
    /// Every error carries its [`ErrorKind::code`].
    Distinct,
}

/// Error raised anywhere between decoding a request and producing its reply.
#[derive(Debug, thiserror::Error)]
pub enum ChatterError {
    /// Malformed inbound message.
    #[error("malformed message: {reason}")]
    Decode {
        /// Parser detail.
        reason: String,
    },

    /// Authorization hook rejected the command.
    #[error("{message}")]
    AuthDenied {
        /// Explicit wire code chosen by the hook, if any.
        code: Option<i64>,
        /// Human-readable message.
        message: String,
    },

    /// No such command in the connection's domain.
    #[error("unknown command {domain}:{group}.{method}")]
    UnknownCommand {
        /// Connection domain.
        domain: String,
        /// Requested group.
        group: String,
        /// Requested method.
        method: String,
    },

    /// Handler failed while executing.
    #[error("handler failed: {message}")]
    HandlerFailure {
        /// Failure detail (logged, never sent).
        message: String,
    },

    /// Identity already held by a live connection.
    #[error("identity '{identity}' is already connected")]
    DuplicateIdentity {
        /// The contested identity.
        identity: String,
    },

    /// Required parameter absent or null.
    #[error("missing required parameter '{name}'")]
    MissingParam {
        /// Parameter name.
        name: String,
    },

    /// Parameters failed typed decoding.
    #[error("invalid parameters: {message}")]
    InvalidParams {
        /// Decoder detail.
        message: String,
    },

    /// Handler ran past its deadline.
    #[error("command timed out after {elapsed_ms} ms")]
    Timeout {
        /// The deadline that elapsed.
        elapsed_ms: u64,
    },
}

impl ChatterError {
    /// Standard access-denied rejection.
    pub fn access_denied() -> Self {
        Self::AuthDenied {
            code: None,
            message: ACCESS_DENIED_MESSAGE.into(),
        }
    }

    /// Wrap any displayable failure as a handler failure.
    pub fn handler(err: impl std::fmt::Display) -> Self {
        Self::HandlerFailure {
            message: err.to_string(),
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode { .. } => ErrorKind::Decode,
            Self::AuthDenied { .. } => ErrorKind::AuthDenied,
            Self::UnknownCommand { .. } => ErrorKind::UnknownCommand,
            Self::HandlerFailure { .. } => ErrorKind::HandlerFailure,
            Self::DuplicateIdentity { .. } => ErrorKind::DuplicateIdentity,
            Self::MissingParam { .. } => ErrorKind::MissingParam,
            Self::InvalidParams { .. } => ErrorKind::InvalidParams,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Whether the offending connection must be closed after the reply.
    pub fn closes_connection(&self) -> bool {
        matches!(self, Self::DuplicateIdentity { .. })
    }

    /// Message safe to show the client.
    ///
    /// Internal failures collapse to [`GENERIC_MESSAGE`]; their detail only
    /// goes to the log.
    pub fn wire_message(&self) -> String {
        match self {
            Self::Decode { .. }
            | Self::UnknownCommand { .. }
            | Self::HandlerFailure { .. }
            | Self::Timeout { .. } => GENERIC_MESSAGE.into(),
            Self::DuplicateIdentity { .. } => DUPLICATE_IDENTITY_MESSAGE.into(),
            Self::AuthDenied { .. } | Self::MissingParam { .. } | Self::InvalidParams { .. } => {
                self.to_string()
            }
        }
    }

    /// Wire code under the given style.
    pub fn wire_code(&self, style: ErrorCodeStyle) -> i64 {
        match (self, style) {
            (Self::AuthDenied { code: Some(code), .. }, _) => *code,
            (_, ErrorCodeStyle::Legacy) => 0,
            (_, ErrorCodeStyle::Distinct) => self.kind().code(),
        }
    }

    /// Convert to an entry of the `errors` list.
    pub fn to_entry(&self, style: ErrorCodeStyle) -> ErrorEntry {
        ErrorEntry {
            code: self.wire_code(style),
            message: self.wire_message(),
        }
    }
}
