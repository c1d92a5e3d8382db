use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Cell, Paragraph, Row, Table},
    Frame,
};

use crate::lifecycle::RoomView;

use super::preview::render_image;
use super::{help_bar, panel, screen_layout, title_bar, Selection};

/// Organizer's screen while the challenge runs.
pub fn draw(frame: &mut Frame, view: &RoomView, selection: &Selection) {
    let [title_area, body, help_area] = screen_layout(frame.area());
    frame.render_widget(title_bar(view, "Review"), title_area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(body);

    let queue_title = format!(" Submissions ({}) ", view.reviews.len());
    if view.reviews.is_empty() {
        let empty = Paragraph::new(Span::styled(
            "  No photos waiting. New submissions show up here.",
            Style::default().fg(Color::Rgb(120, 120, 140)),
        ))
        .block(panel(&queue_title));
        frame.render_widget(empty, columns[0]);
    } else {
        let header = Row::new(vec![
            Cell::from("Player").style(Style::default().fg(Color::Rgb(180, 180, 200))),
            Cell::from("Task").style(Style::default().fg(Color::Rgb(180, 180, 200))),
        ])
        .style(Style::default().add_modifier(Modifier::BOLD));

        let rows: Vec<Row> = view
            .reviews
            .iter()
            .map(|item| {
                Row::new(vec![
                    Cell::from(item.review.display_name.clone())
                        .style(Style::default().fg(Color::Rgb(200, 200, 220))),
                    Cell::from(format!("{}", item.review.task_index + 1))
                        .style(Style::default().fg(Color::Rgb(150, 150, 170))),
                ])
            })
            .collect();

        let table = Table::new(rows, [Constraint::Percentage(70), Constraint::Percentage(30)])
            .header(header)
            .block(panel(&queue_title))
            .row_highlight_style(
                Style::default()
                    .bg(Color::Rgb(40, 40, 60))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol(" > ");
        let mut state = selection.render_state(view.reviews.len());
        frame.render_stateful_widget(table, columns[0], &mut state);
    }

    let photo_block = panel(" Photo ");
    let inner = photo_block.inner(columns[1]);
    let selected = selection
        .selected(view.reviews.len())
        .and_then(|i| view.reviews.get(i));
    let lines = match selected {
        Some(item) => match item.preview {
            Some(ref image) => render_image(image, inner.width, inner.height),
            None => vec![Line::from(Span::styled(
                "  image could not be displayed",
                Style::default().fg(Color::Rgb(255, 150, 100)),
            ))],
        },
        None => Vec::new(),
    };
    frame.render_widget(Paragraph::new(lines).block(photo_block), columns[1]);

    let help = help_bar(
        view.notice.as_deref(),
        &[
            ("[Up/Down]", "Select", Color::Rgb(100, 200, 255)),
            ("[A]", "Approve", Color::Rgb(100, 255, 150)),
            ("[R]", "Reject", Color::Rgb(255, 200, 100)),
            ("[?]", "Help", Color::Rgb(200, 150, 255)),
            ("[Q]", "Leave", Color::Rgb(255, 150, 100)),
        ],
    );
    frame.render_widget(help, help_area);
}
