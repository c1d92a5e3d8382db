use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Wrap},
    Frame,
};

use crate::capture::DeviceStatus;
use crate::lifecycle::RoomView;
use crate::submission::SubmissionStatus;

use super::preview::render_image;
use super::{help_bar, panel, screen_layout, title_bar};

fn status_line(status: Option<SubmissionStatus>) -> (&'static str, Color) {
    match status {
        None => ("Frame the task and press [Space] to take a photo", Color::Rgb(150, 150, 170)),
        Some(SubmissionStatus::Captured) => ("Photo taken. [Enter] to send, [Space] to retake", Color::Rgb(100, 200, 255)),
        Some(SubmissionStatus::Sent) => ("Sending...", Color::Rgb(255, 200, 100)),
        Some(SubmissionStatus::Pending) => ("Waiting for the organizer's verdict", Color::Rgb(200, 150, 255)),
        Some(SubmissionStatus::Approved) => ("Approved!", Color::Rgb(100, 255, 150)),
        Some(SubmissionStatus::Rejected) => ("Rejected. Try another photo", Color::Rgb(255, 150, 100)),
    }
}

fn device_line(device: Option<&DeviceStatus>) -> Option<(String, Color)> {
    match device? {
        DeviceStatus::Idle | DeviceStatus::Live => None,
        DeviceStatus::Acquiring => Some(("Waiting for camera access...".into(), Color::Rgb(255, 200, 100))),
        DeviceStatus::Warming => Some(("Camera starting...".into(), Color::Rgb(255, 200, 100))),
        DeviceStatus::PermissionDenied => Some((
            "Camera access denied. Allow it and press [D] to retry".into(),
            Color::Rgb(255, 100, 100),
        )),
        DeviceStatus::Unavailable(reason) => Some((
            format!("No camera: {}. Press [D] to retry", reason),
            Color::Rgb(255, 100, 100),
        )),
        DeviceStatus::Released => Some(("Camera released".into(), Color::Rgb(120, 120, 140))),
    }
}

pub fn draw(frame: &mut Frame, view: &RoomView) {
    let [title_area, body, help_area] = screen_layout(frame.area());
    frame.render_widget(title_bar(view, "Challenge"), title_area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(body);

    // Live preview
    let camera_title = match view.device_label {
        Some(ref label) => format!(" Camera: {} ", label),
        None => " Camera ".to_string(),
    };
    let preview_block = panel(&camera_title);
    let inner = preview_block.inner(columns[0]);
    let lines = match view.preview {
        Some(ref image) => render_image(image, inner.width, inner.height),
        None => vec![Line::from(Span::styled(
            "  no picture yet",
            Style::default().fg(Color::Rgb(80, 80, 100)),
        ))],
    };
    frame.render_widget(Paragraph::new(lines).block(preview_block), columns[0]);

    // Task and progress
    let mut lines = Vec::new();
    if let Some(ref task) = view.task {
        lines.push(Line::from(Span::styled(
            format!("  Task {} of {}", task.index + 1, view.task_count),
            Style::default().fg(Color::Rgb(180, 180, 200)),
        )));
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("  {}", task.description),
            Style::default()
                .fg(Color::Rgb(255, 220, 50))
                .add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::from(""));
    }
    let (status, color) = status_line(view.submission);
    lines.push(Line::from(Span::styled(format!("  {}", status), Style::default().fg(color))));
    if view.rejections > 0 {
        lines.push(Line::from(Span::styled(
            format!("  Rejected {} time(s) so far", view.rejections),
            Style::default().fg(Color::Rgb(120, 120, 140)),
        )));
    }
    if let Some((text, color)) = device_line(view.device.as_ref()) {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(format!("  {}", text), Style::default().fg(color))));
    }
    let details = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(panel(" Task "));
    frame.render_widget(details, columns[1]);

    let help = help_bar(
        view.notice.as_deref(),
        &[
            ("[Space]", "Capture", Color::Rgb(100, 200, 255)),
            ("[Enter]", "Send", Color::Rgb(100, 255, 150)),
            ("[D]", "Retry camera", Color::Rgb(255, 200, 100)),
            ("[?]", "Help", Color::Rgb(200, 150, 255)),
            ("[Q]", "Leave", Color::Rgb(255, 150, 100)),
        ],
    );
    frame.render_widget(help, help_area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_camera_needs_no_hint() {
        assert!(device_line(Some(&DeviceStatus::Live)).is_none());
        assert!(device_line(None).is_none());
        let (text, _) = device_line(Some(&DeviceStatus::Unavailable("busy".into()))).unwrap();
        assert!(text.contains("busy"));
    }
}
