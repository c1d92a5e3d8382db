use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::room::Task;

/// Status code the server uses for every successful HTTP response.
pub const STATUS_OK: u16 = 200;

// -- Client -> Server (real-time channel) --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    // Handshake
    Hello {
        auth_token: String,
        version: String,
    },

    // Organizer
    RemoveParticipant {
        user_id: Uuid,
    },
    ReviewSubmission {
        file_id: Uuid,
        outcome: Verdict,
    },

    // Results
    RequestScoreboard,

    // Connection
    Ping,
}

// -- Server -> Client (real-time channel) --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    // Handshake
    Welcome {
        room_id: Uuid,
    },
    HandshakeError {
        reason: String,
    },

    // Roster (always the full list)
    RosterUpdate {
        participants: Vec<ParticipantInfo>,
    },
    Removed {
        reason: String,
    },

    // Schedule
    ScheduleUpdate {
        challenge_start_date: DateTime<Utc>,
        challenge_end_date: DateTime<Utc>,
    },

    // Submissions
    SubmissionVerdict {
        task_index: usize,
        outcome: Verdict,
    },
    SubmissionForReview(PendingReview),

    // Results
    FinalScores {
        scores: Vec<ScoreEntry>,
    },

    // Errors
    Error {
        code: ErrorCode,
        message: String,
    },

    // Connection
    Pong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Unauthorized,
    NotOrganizer,
    RoomNotFound,
    ParticipantNotFound,
    ChallengeNotRunning,
    InternalError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub user_id: Uuid,
    pub display_name: String,
    pub avatar_index: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub display_name: String,
    pub total_score: u32,
    /// Seconds spent between challenge start and each approved submission, summed.
    pub total_time_secs: u64,
}

/// A participant's upload waiting for the organizer's decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReview {
    pub file_id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub task_index: usize,
    pub image_base64: String,
}

// -- HTTP request/response bodies --

/// Envelope wrapped around every HTTP response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub status_code: u16,
    pub message: String,
    pub details: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    pub room_name: String,
    pub duration_minutes: u32,
    pub delay_minutes: u32,
    pub tasks: Vec<String>,
    pub randomize_order: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRoomRequest {
    pub room_code: String,
    pub display_name: String,
    pub avatar_index: u8,
}

/// Everything the client needs to run a room session, returned by create and join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDetails {
    pub room_id: Uuid,
    pub room_code: String,
    pub room_name: String,
    pub challenge_start_date: DateTime<Utc>,
    pub challenge_end_date: DateTime<Utc>,
    pub tasks: Vec<Task>,
    pub auth_token: String,
    /// Present only in join responses.
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionUpload {
    pub task_index: usize,
    pub image_base64: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub file_id: Uuid,
    pub task_index: usize,
}

// -- Serialization helpers --

pub fn serialize_message<T: Serialize>(msg: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    data: &str,
) -> Result<T, serde_json::Error> {
    serde_json::from_str(data)
}
