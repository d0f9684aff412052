//! Transfer error taxonomy and remote error decoding.

use http::StatusCode;
use thiserror::Error;

use crate::models::{BlobType, StorageMode};

/// Azure Storage error codes the transfer layer reacts to.
///
/// Codes the layer has no specific handling for are kept verbatim in
/// [`ErrorCode::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    AuthenticationFailed,
    AuthorizationFailure,
    AuthorizationPermissionMismatch,
    BlobAlreadyExists,
    BlobNotFound,
    ContainerAlreadyExists,
    ContainerBeingDeleted,
    ContainerNotFound,
    InternalError,
    InvalidBlobOrBlock,
    InvalidBlobType,
    InvalidBlockId,
    InvalidBlockList,
    InvalidHeaderValue,
    InvalidPageRange,
    InvalidRange,
    Md5Mismatch,
    OperationTimedOut,
    ResourceAlreadyExists,
    ResourceNotFound,
    ServerBusy,
    Other(String),
}

impl ErrorCode {
    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::AuthenticationFailed => "AuthenticationFailed",
            ErrorCode::AuthorizationFailure => "AuthorizationFailure",
            ErrorCode::AuthorizationPermissionMismatch => "AuthorizationPermissionMismatch",
            ErrorCode::BlobAlreadyExists => "BlobAlreadyExists",
            ErrorCode::BlobNotFound => "BlobNotFound",
            ErrorCode::ContainerAlreadyExists => "ContainerAlreadyExists",
            ErrorCode::ContainerBeingDeleted => "ContainerBeingDeleted",
            ErrorCode::ContainerNotFound => "ContainerNotFound",
            ErrorCode::InternalError => "InternalError",
            ErrorCode::InvalidBlobOrBlock => "InvalidBlobOrBlock",
            ErrorCode::InvalidBlobType => "InvalidBlobType",
            ErrorCode::InvalidBlockId => "InvalidBlockId",
            ErrorCode::InvalidBlockList => "InvalidBlockList",
            ErrorCode::InvalidHeaderValue => "InvalidHeaderValue",
            ErrorCode::InvalidPageRange => "InvalidPageRange",
            ErrorCode::InvalidRange => "InvalidRange",
            ErrorCode::Md5Mismatch => "Md5Mismatch",
            ErrorCode::OperationTimedOut => "OperationTimedOut",
            ErrorCode::ResourceAlreadyExists => "ResourceAlreadyExists",
            ErrorCode::ResourceNotFound => "ResourceNotFound",
            ErrorCode::ServerBusy => "ServerBusy",
            ErrorCode::Other(code) => code.as_str(),
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "AuthenticationFailed" => ErrorCode::AuthenticationFailed,
            "AuthorizationFailure" => ErrorCode::AuthorizationFailure,
            "AuthorizationPermissionMismatch" => ErrorCode::AuthorizationPermissionMismatch,
            "BlobAlreadyExists" => ErrorCode::BlobAlreadyExists,
            "BlobNotFound" => ErrorCode::BlobNotFound,
            "ContainerAlreadyExists" => ErrorCode::ContainerAlreadyExists,
            "ContainerBeingDeleted" => ErrorCode::ContainerBeingDeleted,
            "ContainerNotFound" => ErrorCode::ContainerNotFound,
            "InternalError" => ErrorCode::InternalError,
            "InvalidBlobOrBlock" => ErrorCode::InvalidBlobOrBlock,
            "InvalidBlobType" => ErrorCode::InvalidBlobType,
            "InvalidBlockId" => ErrorCode::InvalidBlockId,
            "InvalidBlockList" => ErrorCode::InvalidBlockList,
            "InvalidHeaderValue" => ErrorCode::InvalidHeaderValue,
            "InvalidPageRange" => ErrorCode::InvalidPageRange,
            "InvalidRange" => ErrorCode::InvalidRange,
            "Md5Mismatch" => ErrorCode::Md5Mismatch,
            "OperationTimedOut" => ErrorCode::OperationTimedOut,
            "ResourceAlreadyExists" => ErrorCode::ResourceAlreadyExists,
            "ResourceNotFound" => ErrorCode::ResourceNotFound,
            "ServerBusy" => ErrorCode::ServerBusy,
            other => ErrorCode::Other(other.to_string()),
        }
    }

    /// Returns the HTTP status the service pairs with this code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidBlobOrBlock
            | ErrorCode::InvalidBlockId
            | ErrorCode::InvalidBlockList
            | ErrorCode::InvalidHeaderValue
            | ErrorCode::InvalidPageRange
            | ErrorCode::Md5Mismatch => StatusCode::BAD_REQUEST,

            ErrorCode::AuthenticationFailed => StatusCode::UNAUTHORIZED,

            ErrorCode::AuthorizationFailure | ErrorCode::AuthorizationPermissionMismatch => {
                StatusCode::FORBIDDEN
            }

            ErrorCode::BlobNotFound | ErrorCode::ContainerNotFound | ErrorCode::ResourceNotFound => {
                StatusCode::NOT_FOUND
            }

            ErrorCode::BlobAlreadyExists
            | ErrorCode::ContainerAlreadyExists
            | ErrorCode::ContainerBeingDeleted
            | ErrorCode::InvalidBlobType
            | ErrorCode::ResourceAlreadyExists => StatusCode::CONFLICT,

            ErrorCode::InvalidRange => StatusCode::RANGE_NOT_SATISFIABLE,

            ErrorCode::InternalError | ErrorCode::OperationTimedOut => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            ErrorCode::ServerBusy => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::Other(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Returns the default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::AuthenticationFailed => {
                "Server failed to authenticate the request. Make sure the value of the \
                 Authorization header is formed correctly including the signature."
            }
            ErrorCode::AuthorizationFailure => {
                "This request is not authorized to perform this operation."
            }
            ErrorCode::BlobNotFound => "The specified blob does not exist.",
            ErrorCode::ContainerAlreadyExists => "The specified container already exists.",
            ErrorCode::ContainerNotFound => "The specified container does not exist.",
            ErrorCode::InvalidBlobType => "The blob type is invalid for this operation.",
            ErrorCode::InvalidBlockId => "The specified block ID is invalid.",
            ErrorCode::InvalidBlockList => "The specified block list is invalid.",
            ErrorCode::InvalidPageRange => "The page range specified is invalid.",
            ErrorCode::InvalidRange => {
                "The range specified is invalid for the current size of the resource."
            }
            ErrorCode::ResourceNotFound => "The specified resource does not exist.",
            ErrorCode::InternalError => {
                "The server encountered an internal error. Please retry the request."
            }
            ErrorCode::ServerBusy => "The server is currently unable to receive requests.",
            _ => "An error occurred while processing the request.",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error answered by the remote store.
#[derive(Debug, Clone, Error)]
#[error("{status} {code}: {message}")]
pub struct RemoteError {
    pub status: StatusCode,
    pub code: ErrorCode,
    pub message: String,
    pub request_id: Option<String>,
}

impl RemoteError {
    /// Creates a remote error with the code's usual status and default message.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            status: code.status_code(),
            message: code.default_message().to_string(),
            code,
            request_id: None,
        }
    }

    /// Creates a remote error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
            request_id: None,
        }
    }

    /// Overrides the HTTP status.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Sets the request ID for this error.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Errors surfaced by the transfer layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The existing remote object is of a different blob type than requested.
    #[error("existing blob type {actual} mismatch with mode {requested}")]
    TypeMismatch {
        requested: StorageMode,
        actual: BlobType,
    },

    /// The operation cannot be served for the mode.
    #[error("cannot {operation} with incompatible mode {mode}: only blob protocols are supported")]
    UnsupportedMode {
        mode: StorageMode,
        operation: &'static str,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The store answered with a body the client could not decode.
    #[error("malformed service response: {0}")]
    InvalidResponse(String),

    #[error("transport failure: {message}")]
    Transport { message: String, timed_out: bool },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        StorageError::InvalidInput(message.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        StorageError::InvalidResponse(message.into())
    }

    pub fn transport(message: impl Into<String>, timed_out: bool) -> Self {
        StorageError::Transport {
            message: message.into(),
            timed_out,
        }
    }

    /// Returns the remote error, looking through retry exhaustion.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            StorageError::Remote(e) => Some(e),
            StorageError::RetriesExhausted { source, .. } => source.remote(),
            _ => None,
        }
    }

    /// Whether the store reported the resource as absent.
    pub fn is_not_found(&self) -> bool {
        self.remote()
            .map(|e| e.status == StatusCode::NOT_FOUND)
            .unwrap_or(false)
    }

    /// Whether the store reported the resource as already present.
    pub fn is_already_exists(&self) -> bool {
        self.remote()
            .map(|e| {
                matches!(
                    e.code,
                    ErrorCode::ContainerAlreadyExists
                        | ErrorCode::BlobAlreadyExists
                        | ErrorCode::ResourceAlreadyExists
                )
            })
            .unwrap_or(false)
    }

    /// Whether a transport-level retry may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Transport { .. } => true,
            StorageError::Remote(e) => matches!(
                e.status,
                StatusCode::REQUEST_TIMEOUT
                    | StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::INTERNAL_SERVER_ERROR
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
                    | StatusCode::GATEWAY_TIMEOUT
            ),
            _ => false,
        }
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
