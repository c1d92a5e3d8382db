use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Cell, Paragraph, Row, Table},
    Frame,
};

use crate::lifecycle::RoomView;

use super::{help_bar, panel, screen_layout, title_bar, Selection};

const AVATAR_COLORS: [Color; 6] = [
    Color::Rgb(100, 200, 255),
    Color::Rgb(255, 150, 100),
    Color::Rgb(150, 255, 150),
    Color::Rgb(255, 200, 100),
    Color::Rgb(200, 150, 255),
    Color::Rgb(255, 150, 200),
];

pub fn draw(frame: &mut Frame, view: &RoomView, selection: &Selection) {
    let [title_area, body, help_area] = screen_layout(frame.area());
    frame.render_widget(title_bar(view, "Waiting Room"), title_area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Countdown
            Constraint::Min(4),    // Roster
        ])
        .split(body);

    let countdown = view
        .countdown
        .map(|t| t.to_string())
        .unwrap_or_else(|| "--:--:--".to_string());
    let starts = Paragraph::new(Line::from(vec![
        Span::styled("  Challenge starts in ", Style::default().fg(Color::Rgb(180, 180, 200))),
        Span::styled(
            countdown,
            Style::default()
                .fg(Color::Rgb(255, 220, 50))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("   {} task(s)", view.task_count),
            Style::default().fg(Color::Rgb(120, 120, 140)),
        ),
    ]))
    .block(panel(" Schedule "));
    frame.render_widget(starts, chunks[0]);

    let roster_title = format!(" Participants ({}) ", view.roster.len());
    if view.roster.is_empty() {
        let empty = Paragraph::new(Span::styled(
            "  Nobody has joined yet. Share the room code!",
            Style::default().fg(Color::Rgb(120, 120, 140)),
        ))
        .block(panel(&roster_title));
        frame.render_widget(empty, chunks[1]);
    } else {
        let rows: Vec<Row> = view
            .roster
            .values()
            .map(|p| {
                let color = AVATAR_COLORS[p.avatar_index as usize % AVATAR_COLORS.len()];
                let marker = if view.pending_removals.contains(&p.user_id) {
                    Cell::from("removal requested").style(Style::default().fg(Color::Rgb(255, 150, 100)))
                } else {
                    Cell::from("")
                };
                Row::new(vec![
                    Cell::from(format!("#{:02}", p.avatar_index)).style(Style::default().fg(color)),
                    Cell::from(p.display_name.clone()).style(Style::default().fg(Color::Rgb(200, 200, 220))),
                    marker,
                ])
            })
            .collect();

        let widths = [
            Constraint::Length(5),
            Constraint::Percentage(50),
            Constraint::Min(18),
        ];
        let table = Table::new(rows, widths)
            .block(panel(&roster_title))
            .row_highlight_style(
                Style::default()
                    .bg(Color::Rgb(40, 40, 60))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol(" > ");

        let organizer = view.role.is_some_and(|r| r.is_organizer());
        if organizer {
            let mut state = selection.render_state(view.roster.len());
            frame.render_stateful_widget(table, chunks[1], &mut state);
        } else {
            frame.render_widget(table, chunks[1]);
        }
    }

    let help = if view.role.is_some_and(|r| r.is_organizer()) {
        help_bar(
            view.notice.as_deref(),
            &[
                ("[Up/Down]", "Select", Color::Rgb(100, 200, 255)),
                ("[X]", "Remove", Color::Rgb(255, 200, 100)),
                ("[?]", "Help", Color::Rgb(200, 150, 255)),
                ("[Q]", "Leave", Color::Rgb(255, 150, 100)),
            ],
        )
    } else {
        help_bar(
            view.notice.as_deref(),
            &[
                ("[?]", "Help", Color::Rgb(200, 150, 255)),
                ("[Q]", "Leave", Color::Rgb(255, 150, 100)),
            ],
        )
    };
    frame.render_widget(help, help_area);
}
