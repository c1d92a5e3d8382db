use std::ops::RangeInclusive;

use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::{CreateRoomRequest, JoinRoomRequest, RoomDetails};

// -- Validation bounds --

pub const ROOM_NAME_LEN: RangeInclusive<usize> = 3..=32;
pub const TASK_COUNT: RangeInclusive<usize> = 1..=20;
pub const TASK_DESCRIPTION_LEN: RangeInclusive<usize> = 3..=256;
pub const DELAY_MINUTES: RangeInclusive<u32> = 0..=1440;
pub const DURATION_MINUTES: RangeInclusive<u32> = 1..=1440;
pub const DISPLAY_NAME_LEN: RangeInclusive<usize> = 1..=24;
pub const AVATAR_COUNT: u8 = 16;
pub const ROOM_CODE_LEN: usize = 6;

// -- Tasks --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub index: usize,
    pub description: String,
}

/// Re-number tasks 0..n in the order they were received.
pub fn normalize_tasks(tasks: Vec<Task>) -> Vec<Task> {
    tasks
        .into_iter()
        .enumerate()
        .map(|(index, t)| Task {
            index,
            description: t.description,
        })
        .collect()
}

// -- Session --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Organizer,
    Participant { user_id: Uuid },
}

impl Role {
    pub fn is_organizer(&self) -> bool {
        matches!(self, Role::Organizer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSession {
    pub room_id: Uuid,
    pub room_code: String,
    pub room_name: String,
    pub role: Role,
    pub auth_token: String,
}

impl RoomSession {
    /// The role comes from the call that produced `details` (create or join), never from
    /// which optional fields happen to be present.
    pub fn from_details(details: &RoomDetails, role: Role) -> Self {
        Self {
            room_id: details.room_id,
            room_code: details.room_code.clone(),
            room_name: details.room_name.clone(),
            role,
            auth_token: details.auth_token.clone(),
        }
    }
}

// -- Validation --

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("room name must be {min}-{max} characters", min = ROOM_NAME_LEN.start(), max = ROOM_NAME_LEN.end())]
    RoomName,
    #[error("a room needs {min}-{max} tasks", min = TASK_COUNT.start(), max = TASK_COUNT.end())]
    TaskCount,
    #[error("task {0} must be {min}-{max} characters", min = TASK_DESCRIPTION_LEN.start(), max = TASK_DESCRIPTION_LEN.end())]
    TaskDescription(usize),
    #[error("delay must be {min}-{max} minutes", min = DELAY_MINUTES.start(), max = DELAY_MINUTES.end())]
    Delay,
    #[error("duration must be {min}-{max} minutes", min = DURATION_MINUTES.start(), max = DURATION_MINUTES.end())]
    Duration,
    #[error("display name must be {min}-{max} characters", min = DISPLAY_NAME_LEN.start(), max = DISPLAY_NAME_LEN.end())]
    DisplayName,
    #[error("avatar index must be below {count}", count = AVATAR_COUNT)]
    Avatar,
    #[error("room code must be {len} letters or digits", len = ROOM_CODE_LEN)]
    RoomCode,
}

impl CreateRoomRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !ROOM_NAME_LEN.contains(&self.room_name.trim().chars().count()) {
            return Err(ValidationError::RoomName);
        }
        if !TASK_COUNT.contains(&self.tasks.len()) {
            return Err(ValidationError::TaskCount);
        }
        if let Some(i) = self
            .tasks
            .iter()
            .position(|t| !TASK_DESCRIPTION_LEN.contains(&t.trim().chars().count()))
        {
            return Err(ValidationError::TaskDescription(i));
        }
        if !DELAY_MINUTES.contains(&self.delay_minutes) {
            return Err(ValidationError::Delay);
        }
        if !DURATION_MINUTES.contains(&self.duration_minutes) {
            return Err(ValidationError::Duration);
        }
        Ok(())
    }
}

impl JoinRoomRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.room_code.len() != ROOM_CODE_LEN
            || !self.room_code.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ValidationError::RoomCode);
        }
        if !DISPLAY_NAME_LEN.contains(&self.display_name.trim().chars().count()) {
            return Err(ValidationError::DisplayName);
        }
        if self.avatar_index >= AVATAR_COUNT {
            return Err(ValidationError::Avatar);
        }
        Ok(())
    }
}

pub fn random_avatar_index(rng: &mut impl Rng) -> u8 {
    rng.gen_range(0..AVATAR_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_request() -> CreateRoomRequest {
        CreateRoomRequest {
            room_name: "Park hunt".into(),
            duration_minutes: 5,
            delay_minutes: 0,
            tasks: vec!["A red door".into(), "Two dogs".into()],
            randomize_order: false,
        }
    }

    #[test]
    fn test_valid_create_request() {
        assert_eq!(create_request().validate(), Ok(()));
    }

    #[test]
    fn test_short_room_name() {
        let mut req = create_request();
        req.room_name = "ab".into();
        assert_eq!(req.validate(), Err(ValidationError::RoomName));
    }

    #[test]
    fn test_task_bounds() {
        let mut req = create_request();
        req.tasks.clear();
        assert_eq!(req.validate(), Err(ValidationError::TaskCount));

        let mut req = create_request();
        req.tasks.push("x".into());
        assert_eq!(req.validate(), Err(ValidationError::TaskDescription(2)));

        let mut req = create_request();
        req.tasks[0] = "y".repeat(257);
        assert_eq!(req.validate(), Err(ValidationError::TaskDescription(0)));
    }

    #[test]
    fn test_schedule_bounds() {
        let mut req = create_request();
        req.duration_minutes = 0;
        assert_eq!(req.validate(), Err(ValidationError::Duration));

        let mut req = create_request();
        req.delay_minutes = 1441;
        assert_eq!(req.validate(), Err(ValidationError::Delay));
    }

    #[test]
    fn test_join_request_validation() {
        let ok = JoinRoomRequest {
            room_code: "AB12CD".into(),
            display_name: "Alice".into(),
            avatar_index: 4,
        };
        assert_eq!(ok.validate(), Ok(()));

        let mut bad = ok.clone();
        bad.room_code = "AB-2CD".into();
        assert_eq!(bad.validate(), Err(ValidationError::RoomCode));

        let mut bad = ok.clone();
        bad.display_name = "   ".into();
        assert_eq!(bad.validate(), Err(ValidationError::DisplayName));

        let mut bad = ok;
        bad.avatar_index = AVATAR_COUNT;
        assert_eq!(bad.validate(), Err(ValidationError::Avatar));
    }

    #[test]
    fn test_normalize_tasks_reindexes() {
        let tasks = vec![
            Task {
                index: 7,
                description: "first".into(),
            },
            Task {
                index: 2,
                description: "second".into(),
            },
        ];
        let tasks = normalize_tasks(tasks);
        assert_eq!(tasks[0].index, 0);
        assert_eq!(tasks[1].index, 1);
        assert_eq!(tasks[1].description, "second");
    }

    #[test]
    fn test_session_role_is_explicit() {
        let details = RoomDetails {
            room_id: Uuid::new_v4(),
            room_code: "AB12CD".into(),
            room_name: "Park hunt".into(),
            challenge_start_date: Utc::now(),
            challenge_end_date: Utc::now(),
            tasks: Vec::new(),
            auth_token: "tok".into(),
            user_id: None,
        };
        let session = RoomSession::from_details(&details, Role::Organizer);
        assert!(session.role.is_organizer());

        let user_id = Uuid::new_v4();
        let session = RoomSession::from_details(&details, Role::Participant { user_id });
        assert_eq!(session.role, Role::Participant { user_id });
    }

    #[test]
    fn test_random_avatar_in_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            assert!(random_avatar_index(&mut rng) < AVATAR_COUNT);
        }
    }
}
