//! The gate-failure taxonomy.
//!
//! Every validation gate returns `Result<T, GateError>` instead of panicking
//! or throwing: decisions stay observable and serializable all the way up to
//! the action handlers, which turn a `GateError` into the `{status, error,
//! message}` JSON body and the matching exit code from the spec's table.

use serde::Serialize;
use thiserror::Error;

/// One variant per stable error code. The string code and exit code are
/// derived, not hand-maintained twice — see [`GateError::code`] and
/// [`GateError::exit_code`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GateError {
    #[error("schema validation failed: {0}")]
    SchemaError(String),

    #[error("keyId form invalid: {0}")]
    KeyIdInvalid(String),

    #[error("timestamp skew exceeded")]
    TimestampSkewExceeded,

    #[error("signing key unavailable: {0}")]
    SignatureKeyUnavailable(String),

    #[error("signature invalid")]
    SignatureInvalid,

    #[error("key not trusted: {0}")]
    KeyNotTrusted(String),

    #[error("key deprecated: {0}")]
    KeyDeprecated(String),

    #[error("key/requester mismatch: {0}")]
    KeyRequesterMismatch(String),

    #[error("key lifecycle invalid: {0}")]
    KeyLifecycleInvalid(String),

    #[error("key not yet valid: {0}")]
    KeyNotYetValid(String),

    #[error("key expired: {0}")]
    KeyExpired(String),

    #[error("key store config invalid: {0}")]
    KeyConfigInvalid(String),

    #[error("nonce already observed (replay)")]
    ReplayNonce,

    #[error("rate limit exceeded, retry after {retry_after_sec}s")]
    RateLimitExceeded { retry_after_sec: i64 },

    #[error("requester not allowed")]
    RequesterNotAllowed,

    #[error("command not allowed")]
    CommandNotAllowed,

    #[error("adapter not allowed")]
    AdapterNotAllowed,

    #[error("path denied by deny pattern")]
    PathDeniedByPattern,

    #[error("no filesystem roots defined for requester")]
    NoFilesystemRootsDefined,

    #[error("cwd outside allowed roots")]
    PathOutsideRoots,

    #[error("shell command denied")]
    ShellCmdDenied,

    #[error("shell command not allowlisted")]
    ShellCmdNotAllowlisted,

    #[error("policy signature missing")]
    PolicySignatureMissing,

    #[error("policy signature invalid")]
    PolicySignatureInvalid,

    #[error("policy signer key store unavailable: {0}")]
    PolicySignerKeyStoreUnavailable(String),

    #[error("policy signer not trusted: {0}")]
    PolicySignerNotTrusted(String),

    #[error("policy version invalid: {0}")]
    PolicyVersionInvalid(String),

    #[error("policy createdAt invalid: {0}")]
    PolicyCreatedAtInvalid(String),

    #[error("policy createdAt skew exceeded")]
    PolicyCreatedAtSkewExceeded,

    #[error("policy version regression")]
    PolicyVersionRegression,

    #[error("policy createdAt regression")]
    PolicyCreatedAtRegression,

    #[error("integrity failure: {0}")]
    IntegrityFailure(String),

    #[error("adapter execution error: {0}")]
    AdapterExecutionError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// The stable string code surfaced in `{status:"error", error:CODE, ...}`.
    pub fn code(&self) -> &'static str {
        use GateError::*;
        match self {
            SchemaError(_) => "SCHEMA_ERROR",
            KeyIdInvalid(_) => "KEY_ID_INVALID",
            TimestampSkewExceeded => "TIMESTAMP_SKEW_EXCEEDED",
            SignatureKeyUnavailable(_) => "SIGNATURE_KEY_UNAVAILABLE",
            SignatureInvalid => "SIGNATURE_INVALID",
            KeyNotTrusted(_) => "KEY_NOT_TRUSTED",
            KeyDeprecated(_) => "KEY_DEPRECATED",
            KeyRequesterMismatch(_) => "KEY_REQUESTER_MISMATCH",
            KeyLifecycleInvalid(_) => "KEY_LIFECYCLE_INVALID",
            KeyNotYetValid(_) => "KEY_NOT_YET_VALID",
            KeyExpired(_) => "KEY_EXPIRED",
            KeyConfigInvalid(_) => "KEY_CONFIG_INVALID",
            ReplayNonce => "REPLAY_NONCE",
            RateLimitExceeded { .. } => "RATE_LIMIT_EXCEEDED",
            RequesterNotAllowed => "REQUESTER_NOT_ALLOWED",
            CommandNotAllowed => "COMMAND_NOT_ALLOWED",
            AdapterNotAllowed => "ADAPTER_NOT_ALLOWED",
            PathDeniedByPattern => "PATH_DENIED_BY_PATTERN",
            NoFilesystemRootsDefined => "NO_FILESYSTEM_ROOTS_DEFINED",
            PathOutsideRoots => "PATH_OUTSIDE_ROOTS",
            ShellCmdDenied => "SHELL_CMD_DENIED",
            ShellCmdNotAllowlisted => "SHELL_CMD_NOT_ALLOWLISTED",
            PolicySignatureMissing => "POLICY_SIGNATURE_MISSING",
            PolicySignatureInvalid => "POLICY_SIGNATURE_INVALID",
            PolicySignerKeyStoreUnavailable(_) => "POLICY_SIGNER_KEY_STORE_UNAVAILABLE",
            PolicySignerNotTrusted(_) => "POLICY_SIGNER_NOT_TRUSTED",
            PolicyVersionInvalid(_) => "POLICY_VERSION_INVALID",
            PolicyCreatedAtInvalid(_) => "POLICY_CREATED_AT_INVALID",
            PolicyCreatedAtSkewExceeded => "POLICY_CREATED_AT_SKEW_EXCEEDED",
            PolicyVersionRegression => "POLICY_VERSION_REGRESSION",
            PolicyCreatedAtRegression => "POLICY_CREATED_AT_REGRESSION",
            IntegrityFailure(_) => "INTEGRITY_FAILURE",
            AdapterExecutionError(_) => "ADAPTER_EXECUTION_ERROR",
            Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The deterministic exit code from spec.md's exit-code table.
    pub fn exit_code(&self) -> i32 {
        use GateError::*;
        match self {
            Internal(_) => 1,
            RequesterNotAllowed
            | CommandNotAllowed
            | AdapterNotAllowed
            | PathDeniedByPattern
            | NoFilesystemRootsDefined
            | PathOutsideRoots
            | ShellCmdDenied
            | ShellCmdNotAllowlisted => 2,
            SignatureInvalid
            | SignatureKeyUnavailable(_)
            | KeyIdInvalid(_)
            | KeyNotTrusted(_)
            | KeyDeprecated(_)
            | KeyRequesterMismatch(_)
            | KeyLifecycleInvalid(_)
            | KeyNotYetValid(_)
            | KeyExpired(_)
            | KeyConfigInvalid(_) => 3,
            ReplayNonce => 4,
            SchemaError(_) => 5,
            TimestampSkewExceeded => 6,
            RateLimitExceeded { .. } => 7,
            PolicySignatureMissing
            | PolicySignatureInvalid
            | PolicySignerKeyStoreUnavailable(_)
            | PolicySignerNotTrusted(_)
            | PolicyVersionInvalid(_)
            | PolicyCreatedAtInvalid(_)
            | PolicyCreatedAtSkewExceeded
            | PolicyVersionRegression
            | PolicyCreatedAtRegression
            | IntegrityFailure(_) => 8,
            AdapterExecutionError(_) => 9,
        }
    }
}

impl From<std::io::Error> for GateError {
    fn from(e: std::io::Error) -> Self {
        GateError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for GateError {
    fn from(e: serde_json::Error) -> Self {
        GateError::Internal(e.to_string())
    }
}

/// The `{status:"error", error:CODE, message}` body for a top-level failure.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub error: &'static str,
    pub message: String,
}

impl From<&GateError> for ErrorBody {
    fn from(e: &GateError) -> Self {
        ErrorBody {
            status: "error",
            error: e.code(),
            message: e.to_string(),
        }
    }
}
