use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::lifecycle::{Phase, RoomView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    // Global
    Quit,
    ShowHelp,

    // Navigation
    NavigateUp,
    NavigateDown,

    // Waiting room (organizer)
    RemoveSelected,

    // Challenge (participant)
    Capture,
    Submit,
    RetryDevice,

    // Challenge (organizer)
    ApproveSelected,
    RejectSelected,

    // Results
    RefreshScores,
}

pub fn map_key(key: KeyEvent, view: &RoomView) -> Option<Action> {
    // Ctrl+C always quits
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Action::Quit);
    }

    let organizer = view.role.is_some_and(|r| r.is_organizer());
    match view.phase {
        Phase::Connecting => match key.code {
            KeyCode::Esc | KeyCode::Char('q') => Some(Action::Quit),
            _ => None,
        },

        Phase::WaitingRoom => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
            KeyCode::Char('?') => Some(Action::ShowHelp),
            KeyCode::Up | KeyCode::Char('k') if organizer => Some(Action::NavigateUp),
            KeyCode::Down | KeyCode::Char('j') if organizer => Some(Action::NavigateDown),
            KeyCode::Char('x') | KeyCode::Delete if organizer => Some(Action::RemoveSelected),
            _ => None,
        },

        Phase::ActiveChallenge(_) if organizer => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
            KeyCode::Char('?') => Some(Action::ShowHelp),
            KeyCode::Up | KeyCode::Char('k') => Some(Action::NavigateUp),
            KeyCode::Down | KeyCode::Char('j') => Some(Action::NavigateDown),
            KeyCode::Char('a') | KeyCode::Char('A') => Some(Action::ApproveSelected),
            KeyCode::Char('r') | KeyCode::Char('R') => Some(Action::RejectSelected),
            _ => None,
        },

        Phase::ActiveChallenge(_) => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
            KeyCode::Char('?') => Some(Action::ShowHelp),
            KeyCode::Char(' ') | KeyCode::Char('c') | KeyCode::Char('C') => Some(Action::Capture),
            KeyCode::Enter | KeyCode::Char('s') | KeyCode::Char('S') => Some(Action::Submit),
            KeyCode::Char('d') | KeyCode::Char('D') => Some(Action::RetryDevice),
            _ => None,
        },

        Phase::ChallengeOver => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
            KeyCode::Char('?') => Some(Action::ShowHelp),
            KeyCode::Char('r') | KeyCode::Char('R') => Some(Action::RefreshScores),
            _ => None,
        },

        Phase::Closed(_) => match key.code {
            KeyCode::Char('q') | KeyCode::Esc | KeyCode::Enter => Some(Action::Quit),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use snaphunt_common::room::Role;
    use uuid::Uuid;

    use super::*;
    use crate::capture::DEFAULT_PREVIEW_SIZE;
    use crate::lifecycle::{CloseReason, LifecycleConfig, RoomLifecycle};

    fn view(phase: Phase, role: Role) -> RoomView {
        let mut view = RoomLifecycle::new(
            LifecycleConfig {
                preview: DEFAULT_PREVIEW_SIZE,
            },
            None,
        )
        .view();
        view.phase = phase;
        view.role = Some(role);
        view
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn participant() -> Role {
        Role::Participant {
            user_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_ctrl_c_always_quits() {
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        for phase in [Phase::Connecting, Phase::ActiveChallenge(0), Phase::ChallengeOver] {
            assert_eq!(map_key(key, &view(phase, participant())), Some(Action::Quit));
        }
    }

    #[test]
    fn test_space_captures_for_participants_only() {
        let active = Phase::ActiveChallenge(1);
        assert_eq!(
            map_key(press(KeyCode::Char(' ')), &view(active.clone(), participant())),
            Some(Action::Capture)
        );
        assert_eq!(map_key(press(KeyCode::Char(' ')), &view(active, Role::Organizer)), None);
    }

    #[test]
    fn test_r_depends_on_phase() {
        assert_eq!(
            map_key(press(KeyCode::Char('r')), &view(Phase::ActiveChallenge(0), Role::Organizer)),
            Some(Action::RejectSelected)
        );
        assert_eq!(
            map_key(press(KeyCode::Char('r')), &view(Phase::ChallengeOver, Role::Organizer)),
            Some(Action::RefreshScores)
        );
    }

    #[test]
    fn test_only_organizer_removes() {
        assert_eq!(
            map_key(press(KeyCode::Char('x')), &view(Phase::WaitingRoom, Role::Organizer)),
            Some(Action::RemoveSelected)
        );
        assert_eq!(map_key(press(KeyCode::Char('x')), &view(Phase::WaitingRoom, participant())), None);
    }

    #[test]
    fn test_closed_screen_quits_on_enter() {
        let closed = Phase::Closed(CloseReason::Removed("bye".into()));
        assert_eq!(map_key(press(KeyCode::Enter), &view(closed, participant())), Some(Action::Quit));
    }
}
