use snaphunt_common::protocol::STATUS_OK;

use crate::api::ApiError;
use crate::capture::CaptureError;

/// Every failure the room session can observe. None of these end the process; each one
/// resolves to a notice on screen and a path back to a valid phase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera available: {0}")]
    DeviceUnavailable(String),
    #[error("network unavailable: {0}")]
    TransportFailure(String),
    #[error("rejected by server ({status}): {message}")]
    RejectedByServer { status: u16, message: String },
    #[error("ignored stale event: {0}")]
    StaleEvent(String),
}

impl ClientError {
    /// Whether the user can act on this error by trying again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::PermissionDenied
                | ClientError::DeviceUnavailable(_)
                | ClientError::TransportFailure(_)
        )
    }
}

impl From<CaptureError> for ClientError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::PermissionDenied => ClientError::PermissionDenied,
            CaptureError::DeviceUnavailable(reason) => ClientError::DeviceUnavailable(reason),
            other => ClientError::DeviceUnavailable(other.to_string()),
        }
    }
}

impl From<ApiError> for ClientError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Rejected { status, message } => {
                ClientError::RejectedByServer { status, message }
            }
            ApiError::MissingDetails => ClientError::RejectedByServer {
                status: STATUS_OK,
                message: err.to_string(),
            },
            ApiError::Invalid(reason) => ClientError::RejectedByServer {
                status: 400,
                message: reason.to_string(),
            },
            ApiError::Transport(_) | ApiError::Decode(_) | ApiError::Url(_) => {
                ClientError::TransportFailure(err.to_string())
            }
        }
    }
}
