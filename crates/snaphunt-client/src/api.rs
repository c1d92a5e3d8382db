//! Request/response calls around the room session: create, join, upload, exit.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use snaphunt_common::protocol::{
    ApiResponse, CreateRoomRequest, JoinRoomRequest, RoomDetails, SubmissionReceipt,
    SubmissionUpload,
};
use snaphunt_common::room::ValidationError;
use url::Url;
use uuid::Uuid;

use crate::capture::ImageBlob;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("server answered {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("successful response carried no details")]
    MissingDetails,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("bad endpoint: {0}")]
    Url(#[from] url::ParseError),
}

/// Unwrap the common response envelope.
pub fn decode_envelope<T>(envelope: ApiResponse<T>) -> Result<T, ApiError> {
    if !envelope.is_success() {
        return Err(ApiError::Rejected {
            status: envelope.status_code,
            message: envelope.message,
        });
    }
    envelope.details.ok_or(ApiError::MissingDetails)
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base: Url,
    auth_token: Option<Arc<str>>,
}

impl ApiClient {
    pub fn new(base: Url) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base,
            auth_token: None,
        })
    }

    /// Same client, authenticated with a session token.
    pub fn with_token(&self, token: &str) -> Self {
        Self {
            client: self.client.clone(),
            base: self.base.clone(),
            auth_token: Some(Arc::from(token)),
        }
    }

    pub async fn create_room(&self, request: &CreateRoomRequest) -> Result<RoomDetails, ApiError> {
        request.validate()?;
        tracing::info!(room = %request.room_name, tasks = request.tasks.len(), "creating room");
        let envelope = self.post("rooms", request).await?;
        decode_envelope(envelope)
    }

    pub async fn join_room(&self, request: &JoinRoomRequest) -> Result<RoomDetails, ApiError> {
        request.validate()?;
        tracing::info!(code = %request.room_code, name = %request.display_name, "joining room");
        let envelope = self.post("rooms/join", request).await?;
        decode_envelope(envelope)
    }

    pub async fn upload_submission(
        &self,
        room_id: Uuid,
        task_index: usize,
        image: &ImageBlob,
    ) -> Result<SubmissionReceipt, ApiError> {
        let body = SubmissionUpload {
            task_index,
            image_base64: image.to_base64(),
        };
        tracing::debug!(%room_id, task_index, bytes = image.len(), "uploading submission");
        let envelope = self
            .post(&format!("rooms/{room_id}/submissions"), &body)
            .await?;
        decode_envelope(envelope)
    }

    /// Tell the server this client is leaving. Details are not expected.
    pub async fn notify_exit(&self, room_id: Uuid) -> Result<(), ApiError> {
        let envelope: ApiResponse<serde_json::Value> = self
            .post(&format!("rooms/{room_id}/exit"), &serde_json::json!({}))
            .await?;
        if !envelope.is_success() {
            return Err(ApiError::Rejected {
                status: envelope.status_code,
                message: envelope.message,
            });
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base.join(path)?)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<ApiResponse<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let mut builder = self.client.post(url).json(body);
        if let Some(ref token) = self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        match serde_json::from_str::<ApiResponse<T>>(&text) {
            Ok(envelope) => Ok(envelope),
            // errors from proxies and the like come without an envelope
            Err(_) if !status.is_success() => Err(ApiError::Rejected {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("error").to_string(),
            }),
            Err(e) => Err(ApiError::Decode(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use snaphunt_common::protocol::STATUS_OK;

    use super::*;

    fn client() -> ApiClient {
        ApiClient::new(Url::parse("http://127.0.0.1:9/api/").unwrap()).unwrap()
    }

    #[test]
    fn test_envelope_success() {
        let receipt = SubmissionReceipt {
            file_id: Uuid::new_v4(),
            task_index: 1,
        };
        let envelope = ApiResponse {
            status_code: STATUS_OK,
            message: "ok".into(),
            details: Some(receipt.clone()),
        };
        assert_eq!(decode_envelope(envelope).unwrap(), receipt);
    }

    #[test]
    fn test_envelope_failure_keeps_message() {
        let envelope: ApiResponse<SubmissionReceipt> = ApiResponse {
            status_code: 404,
            message: "room not found".into(),
            details: None,
        };
        match decode_envelope(envelope) {
            Err(ApiError::Rejected { status, message }) => {
                assert_eq!(status, 404);
                assert_eq!(message, "room not found");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_envelope_without_details() {
        let envelope: ApiResponse<RoomDetails> = ApiResponse {
            status_code: STATUS_OK,
            message: "ok".into(),
            details: None,
        };
        assert!(matches!(decode_envelope(envelope), Err(ApiError::MissingDetails)));
    }

    #[test]
    fn test_endpoints_stay_under_base() {
        let api = client();
        let room_id = Uuid::nil();
        assert_eq!(
            api.endpoint(&format!("rooms/{room_id}/exit")).unwrap().as_str(),
            "http://127.0.0.1:9/api/rooms/00000000-0000-0000-0000-000000000000/exit"
        );
        assert_eq!(api.endpoint("rooms/join").unwrap().as_str(), "http://127.0.0.1:9/api/rooms/join");
    }

    #[tokio::test]
    async fn test_invalid_join_never_reaches_network() {
        let request = JoinRoomRequest {
            room_code: "bad".into(),
            display_name: "Alice".into(),
            avatar_index: 0,
        };
        assert!(matches!(client().join_room(&request).await, Err(ApiError::Invalid(_))));
    }
}
