use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Cell, Paragraph, Row, Table},
    Frame,
};
use snaphunt_common::protocol::ScoreEntry;

use crate::lifecycle::RoomView;

use super::{help_bar, panel};

/// Highest score first; ties go to whoever was faster.
pub fn ranked(scores: &[ScoreEntry]) -> Vec<&ScoreEntry> {
    let mut ranked: Vec<&ScoreEntry> = scores.iter().collect();
    ranked.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then(a.total_time_secs.cmp(&b.total_time_secs))
    });
    ranked
}

fn format_duration(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

pub fn draw(frame: &mut Frame, view: &RoomView) {
    let area = frame.area();

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(15),
            Constraint::Length(3), // Title
            Constraint::Length(3), // Winner
            Constraint::Min(5),    // Score table
            Constraint::Length(3), // Help
            Constraint::Percentage(10),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(20),
            Constraint::Percentage(60),
            Constraint::Percentage(20),
        ])
        .split(vertical[3]);

    // Title
    let title = Paragraph::new(Line::from(vec![Span::styled(
        "  CHALLENGE OVER",
        Style::default()
            .fg(Color::Rgb(255, 220, 50))
            .add_modifier(Modifier::BOLD),
    )]))
    .alignment(Alignment::Center);
    frame.render_widget(title, vertical[1]);

    let Some(ref scores) = view.final_scores else {
        let waiting = Paragraph::new(Span::styled(
            "  Collecting final scores...",
            Style::default().fg(Color::Rgb(150, 150, 170)),
        ))
        .alignment(Alignment::Center);
        frame.render_widget(waiting, vertical[2]);
        draw_help(frame, view, vertical[4]);
        return;
    };
    let ranked = ranked(scores);

    // Winner announcement
    if let Some(winner) = ranked.first() {
        let announcement = Paragraph::new(Line::from(vec![
            Span::styled("  Winner: ", Style::default().fg(Color::Rgb(180, 180, 200))),
            Span::styled(
                winner.display_name.as_str(),
                Style::default()
                    .fg(Color::Rgb(100, 255, 150))
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(" !", Style::default().fg(Color::Rgb(255, 220, 50))),
        ]))
        .alignment(Alignment::Center);
        frame.render_widget(announcement, vertical[2]);
    }

    // Score table
    let header = Row::new(vec![
        Cell::from("Rank").style(Style::default().fg(Color::Rgb(180, 180, 200))),
        Cell::from("Player").style(Style::default().fg(Color::Rgb(180, 180, 200))),
        Cell::from("Score").style(Style::default().fg(Color::Rgb(180, 180, 200))),
        Cell::from("Time").style(Style::default().fg(Color::Rgb(180, 180, 200))),
    ])
    .style(Style::default().add_modifier(Modifier::BOLD))
    .bottom_margin(1);

    let podium_colors = [
        Color::Rgb(255, 220, 50),  // Gold
        Color::Rgb(180, 200, 220), // Silver
        Color::Rgb(210, 150, 100), // Bronze
    ];

    let rows: Vec<Row> = ranked
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let color = podium_colors.get(i).copied().unwrap_or(Color::Rgb(120, 120, 140));
            let style = if i == 0 {
                Style::default().fg(color).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(color)
            };
            Row::new(vec![
                Cell::from(format!("  #{}", i + 1)).style(style),
                Cell::from(entry.display_name.clone()).style(style),
                Cell::from(entry.total_score.to_string()).style(style),
                Cell::from(format_duration(entry.total_time_secs)).style(style),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(8),
        Constraint::Percentage(45),
        Constraint::Length(8),
        Constraint::Length(10),
    ];

    let table = Table::new(rows, widths)
        .header(header)
        .block(panel(" Final Scores "));
    frame.render_widget(table, horizontal[1]);

    draw_help(frame, view, vertical[4]);
}

fn draw_help(frame: &mut Frame, view: &RoomView, area: ratatui::layout::Rect) {
    let help = help_bar(
        view.notice.as_deref(),
        &[
            ("[R]", "Refresh", Color::Rgb(255, 200, 100)),
            ("[Q]", "Quit", Color::Rgb(255, 150, 100)),
        ],
    )
    .alignment(Alignment::Center);
    frame.render_widget(help, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, score: u32, time: u64) -> ScoreEntry {
        ScoreEntry {
            display_name: name.into(),
            total_score: score,
            total_time_secs: time,
        }
    }

    #[test]
    fn test_ranking_prefers_score_then_speed() {
        let scores = vec![entry("slow", 2, 900), entry("low", 1, 10), entry("fast", 2, 300)];
        let names: Vec<&str> = ranked(&scores).iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, ["fast", "slow", "low"]);
    }

    #[test]
    fn test_duration_format() {
        assert_eq!(format_duration(3_725), "01:02:05");
        assert_eq!(format_duration(0), "00:00:00");
    }
}
