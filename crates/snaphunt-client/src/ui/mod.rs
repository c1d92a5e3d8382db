pub mod challenge;
pub mod help_popup;
pub mod preview;
pub mod results;
pub mod review;
pub mod status;
pub mod waiting;

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, TableState},
    Frame,
};

use crate::lifecycle::{Phase, RoomView};

/// Row selection shared by the roster and review lists.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub table_state: TableState,
}

impl Selection {
    pub fn select_next(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        let i = match self.table_state.selected() {
            Some(i) => (i + 1) % len,
            None => 0,
        };
        self.table_state.select(Some(i));
    }

    pub fn select_prev(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        let i = match self.table_state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.table_state.select(Some(i));
    }

    /// Selected row, clamped to a list that may have shrunk since it was chosen.
    pub fn selected(&self, len: usize) -> Option<usize> {
        if len == 0 {
            return None;
        }
        Some(self.table_state.selected().unwrap_or(0).min(len - 1))
    }

    /// Table state for rendering, with the selection clamped to `len` rows.
    pub fn render_state(&self, len: usize) -> TableState {
        let mut state = self.table_state.clone();
        state.select(self.selected(len));
        state
    }
}

pub fn draw(frame: &mut Frame, view: &RoomView, selection: &Selection, show_help: bool) {
    match &view.phase {
        Phase::Connecting => status::draw_connecting(frame, view),
        Phase::WaitingRoom => waiting::draw(frame, view, selection),
        Phase::ActiveChallenge(_) if view.role.is_some_and(|r| r.is_organizer()) => {
            review::draw(frame, view, selection)
        }
        Phase::ActiveChallenge(_) => challenge::draw(frame, view),
        Phase::ChallengeOver => results::draw(frame, view),
        Phase::Closed(reason) => status::draw_closed(frame, reason),
    }
    if show_help {
        help_popup::draw_help_popup(frame, view);
    }
}

/// Title bar, body and help bar.
pub(crate) fn screen_layout(area: Rect) -> [Rect; 3] {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(5),    // Body
            Constraint::Length(3), // Help bar
        ])
        .split(area);
    [chunks[0], chunks[1], chunks[2]]
}

pub(crate) fn title_bar<'a>(view: &'a RoomView, subtitle: &'a str) -> Paragraph<'a> {
    let mut spans = vec![
        Span::styled(
            "  SNAPHUNT ",
            Style::default()
                .fg(Color::Rgb(255, 220, 50))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(subtitle, Style::default().fg(Color::Rgb(180, 180, 200))),
    ];
    if let Some(ref name) = view.room_name {
        spans.push(Span::styled(" - ", Style::default().fg(Color::Rgb(120, 120, 140))));
        spans.push(Span::styled(
            name.as_str(),
            Style::default()
                .fg(Color::Rgb(100, 200, 255))
                .add_modifier(Modifier::BOLD),
        ));
    }
    if let Some(ref code) = view.room_code {
        spans.push(Span::styled(
            format!("  [{}]", code),
            Style::default().fg(Color::Rgb(120, 120, 140)),
        ));
    }
    if let Some(countdown) = view.countdown {
        spans.push(Span::styled("   ", Style::default()));
        spans.push(Span::styled(
            countdown.to_string(),
            Style::default()
                .fg(Color::Rgb(100, 255, 150))
                .add_modifier(Modifier::BOLD),
        ));
    }
    Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::Rgb(60, 60, 80))),
    )
}

/// Help bar with the current notice, if any, in front of the key hints.
pub(crate) fn help_bar<'a>(notice: Option<&'a str>, keys: &[(&'a str, &'a str, Color)]) -> Paragraph<'a> {
    let mut spans = vec![Span::raw("  ")];
    if let Some(msg) = notice {
        spans.push(Span::styled(
            format!("{} | ", msg),
            Style::default().fg(Color::Rgb(255, 200, 100)),
        ));
    }
    for (key, label, color) in keys {
        spans.push(Span::styled(*key, Style::default().fg(*color)));
        spans.push(Span::styled(
            format!(" {}  ", label),
            Style::default().fg(Color::Rgb(120, 120, 140)),
        ));
    }
    Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::TOP)
            .border_style(Style::default().fg(Color::Rgb(60, 60, 80))),
    )
}

pub(crate) fn panel(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Rgb(80, 80, 100)))
        .title(title)
        .title_style(Style::default().fg(Color::Rgb(180, 180, 200)))
}
