use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::lifecycle::RoomView;

type Section = (&'static str, Color, Vec<(&'static str, &'static str)>);

fn sections(organizer: bool) -> Vec<Section> {
    let mut sections = vec![(
        "HOW IT WORKS",
        Color::Rgb(255, 220, 50),
        vec![
            ("Waiting room", "The challenge starts when the countdown ends"),
            ("Challenge", "Tasks come one at a time, until the room's deadline"),
            ("Scores", "One point per approved photo, ties go to the fastest"),
        ],
    )];
    if organizer {
        sections.push((
            "ORGANIZER CONTROLS",
            Color::Rgb(100, 200, 255),
            vec![
                ("[j]/[k]", "Select participant or submission"),
                ("[X]", "Remove selected participant (waiting room)"),
                ("[A]", "Approve selected photo"),
                ("[R]", "Reject selected photo"),
            ],
        ));
    } else {
        sections.push((
            "CAPTURE CONTROLS",
            Color::Rgb(100, 200, 255),
            vec![
                ("[Space]/[C]", "Take a photo (again to retake)"),
                ("[Enter]/[S]", "Send the photo for review"),
                ("[D]", "Ask for the camera again"),
            ],
        ));
    }
    sections.push((
        "GENERAL",
        Color::Rgb(100, 255, 150),
        vec![
            ("[R]", "Refresh final scores"),
            ("[?]", "Toggle this help screen"),
            ("[Q]", "Leave the room"),
        ],
    ));
    sections
}

pub fn draw_help_popup(frame: &mut Frame, view: &RoomView) {
    let area = frame.area();

    // Center popup
    let popup_area = centered_rect(70, 80, area);

    // Clear background
    frame.render_widget(Clear, popup_area);

    let organizer = view.role.is_some_and(|r| r.is_organizer());
    let mut lines: Vec<Line> = Vec::new();
    lines.push(Line::from(""));

    for (title, color, items) in sections(organizer) {
        lines.push(Line::from(Span::styled(
            format!("  {}", title),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(""));
        for (key, desc) in items {
            lines.push(Line::from(vec![
                Span::styled(
                    format!("    {:<16}", key),
                    Style::default().fg(Color::Rgb(200, 200, 220)),
                ),
                Span::styled(desc, Style::default().fg(Color::Rgb(150, 150, 170))),
            ]));
        }
        lines.push(Line::from(""));
    }

    lines.push(Line::from(Span::styled(
        "  Press any key to close",
        Style::default().fg(Color::Rgb(100, 100, 120)),
    )));

    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Rgb(100, 200, 255)))
                .title(" Help ")
                .title_style(
                    Style::default()
                        .fg(Color::Rgb(255, 220, 50))
                        .add_modifier(Modifier::BOLD),
                ),
        );

    frame.render_widget(paragraph, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
