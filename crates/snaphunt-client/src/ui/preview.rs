use image::imageops::{self, FilterType};
use image::RgbImage;
use ratatui::{
    style::{Color, Style},
    text::{Line, Span},
};

const UPPER_HALF: &str = "▀";

/// Draw an image with half-block cells: each terminal cell carries two pixel rows, the
/// upper one as foreground and the lower one as background. The picture is scaled to fit
/// `cols` x `rows` keeping its aspect ratio.
pub fn render_image(image: &RgbImage, cols: u16, rows: u16) -> Vec<Line<'static>> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || cols == 0 || rows == 0 {
        return Vec::new();
    }

    let scale = f64::min(cols as f64 / w as f64, (rows as f64 * 2.0) / h as f64);
    let out_w = ((w as f64 * scale).floor() as u32).clamp(1, cols as u32);
    let out_h = ((h as f64 * scale).floor() as u32).clamp(1, rows as u32 * 2);
    let scaled = imageops::resize(image, out_w, out_h, FilterType::Nearest);

    (0..out_h)
        .step_by(2)
        .map(|y| {
            let spans: Vec<Span<'static>> = (0..out_w)
                .map(|x| {
                    let top = scaled.get_pixel(x, y).0;
                    let style = Style::default().fg(Color::Rgb(top[0], top[1], top[2]));
                    let style = if y + 1 < out_h {
                        let bottom = scaled.get_pixel(x, y + 1).0;
                        style.bg(Color::Rgb(bottom[0], bottom[1], bottom[2]))
                    } else {
                        style
                    };
                    Span::styled(UPPER_HALF, style)
                })
                .collect();
            Line::from(spans)
        })
        .collect()
}
