use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use crate::lifecycle::{CloseReason, RoomView};

fn centered_box(area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(30),
            Constraint::Length(9),
            Constraint::Percentage(30),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(25),
            Constraint::Percentage(50),
            Constraint::Percentage(25),
        ])
        .split(vertical[1])[1]
}

fn message_box<'a>(title: &'a str, border: Color, lines: Vec<Line<'a>>) -> Paragraph<'a> {
    Paragraph::new(lines)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(border))
                .title(title)
                .title_style(
                    Style::default()
                        .fg(Color::Rgb(255, 220, 50))
                        .add_modifier(Modifier::BOLD),
                ),
        )
}

pub fn draw_connecting(frame: &mut Frame, view: &RoomView) {
    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "Entering room...",
            Style::default().fg(Color::Rgb(180, 180, 200)),
        )),
    ];
    if let Some(ref notice) = view.notice {
        lines.push(Line::from(Span::styled(
            notice.as_str(),
            Style::default().fg(Color::Rgb(255, 100, 100)),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("[Esc]", Style::default().fg(Color::Rgb(255, 150, 100))),
        Span::styled(" Cancel", Style::default().fg(Color::Rgb(120, 120, 140))),
    ]));
    frame.render_widget(
        message_box(" SNAPHUNT ", Color::Rgb(100, 200, 255), lines),
        centered_box(frame.area()),
    );
}

pub fn draw_closed(frame: &mut Frame, reason: &CloseReason) {
    let (headline, detail, border) = match reason {
        CloseReason::Left => ("You left the room.", None, Color::Rgb(100, 200, 255)),
        CloseReason::Removed(why) => (
            "You were removed from the room.",
            Some(why.as_str()),
            Color::Rgb(255, 150, 100),
        ),
        CloseReason::Failed(why) => (
            "Could not enter the room.",
            Some(why.as_str()),
            Color::Rgb(255, 100, 100),
        ),
    };

    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            headline,
            Style::default()
                .fg(Color::Rgb(200, 200, 220))
                .add_modifier(Modifier::BOLD),
        )),
    ];
    if let Some(detail) = detail {
        lines.push(Line::from(Span::styled(
            detail,
            Style::default().fg(Color::Rgb(150, 150, 170)),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("[Q]", Style::default().fg(Color::Rgb(255, 150, 100))),
        Span::styled(" Quit", Style::default().fg(Color::Rgb(120, 120, 140))),
    ]));
    frame.render_widget(message_box(" SNAPHUNT ", border, lines), centered_box(frame.area()));
}
