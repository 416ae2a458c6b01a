use thiserror::Error as ThisError;

/// Error taxonomy for the model-version lifecycle engine and the request
/// mediator (spec §7). These are *kinds*, not wire codes: the HTTP and
/// binary-RPC layers each translate an [`ErrorCode`] into their own status
/// representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No error occurred; the healthy `error_code` of a Version Record.
    Ok,
    /// Model name unknown, or no `AVAILABLE` version matches the request.
    NotFound,
    /// Request body malformed, tensor shape/dtype mismatch, JSON parse failure.
    InvalidInput,
    /// Engine construction failed. Recorded on the Version Record; not
    /// surfaced per-request except through `GetModelStatus`.
    LoadFailed,
    /// Acquisition refused because the version is `UNLOADING` or `END`.
    /// Always translated to [`ErrorCode::NotFound`] at the mediator boundary.
    UnloadPending,
    /// Storage backend permission/transport failure (spec §4.1, §4.6).
    /// Distinct from `Internal`: a missing model root is not this — it
    /// yields an empty version set, not an error.
    IoError,
    /// Unexpected failure.
    Internal,
    /// Request deadline crossed mid-`infer`.
    DeadlineExceeded,
}

impl ErrorCode {
    /// Short machine-readable name, used by the binary RPC status fields.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Ok => "OK",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InvalidInput => "INVALID_ARGUMENT",
            ErrorCode::LoadFailed => "LOAD_FAILED",
            ErrorCode::UnloadPending => "UNLOAD_PENDING",
            ErrorCode::IoError => "IO_ERROR",
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
        }
    }

    /// Inverse of [`ErrorCode::as_str`], used when deserializing a binary-RPC
    /// status field back into an `ErrorCode`.
    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "OK" => ErrorCode::Ok,
            "NOT_FOUND" => ErrorCode::NotFound,
            "INVALID_ARGUMENT" => ErrorCode::InvalidInput,
            "LOAD_FAILED" => ErrorCode::LoadFailed,
            "UNLOAD_PENDING" => ErrorCode::UnloadPending,
            "IO_ERROR" => ErrorCode::IoError,
            "INTERNAL" => ErrorCode::Internal,
            "DEADLINE_EXCEEDED" => ErrorCode::DeadlineExceeded,
            _ => return None,
        })
    }
}

/// Error produced anywhere in the lifecycle engine or serving envelope.
#[derive(Debug, ThisError, Clone)]
#[error("{}: {message}", code.as_str())]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
}

impl Error {
    pub fn new<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Error {
            code,
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Return the [`ErrorCode`] of the error.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Return the error description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create() {
        const ERROR_CODE: ErrorCode = ErrorCode::NotFound;
        const ERROR_DESCRIPTION: &str = "some error";

        let err = Error::new(ERROR_CODE, ERROR_DESCRIPTION);

        assert_eq!(err.code(), ERROR_CODE);
        assert_eq!(err.message(), ERROR_DESCRIPTION);
        assert_eq!(err.to_string(), "NOT_FOUND: some error");
    }
}
