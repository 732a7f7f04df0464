//! Chart and word-cloud rendering.
//!
//! [`ChartRenderer`] is the seam used by the tool executor and the chart
//! HTTP API. [`RasterRenderer`] draws onto a fixed 400x200 white canvas and
//! encodes the result as PNG.

mod font;

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use thiserror::Error;

pub const CANVAS_WIDTH: u32 = 400;
pub const CANVAS_HEIGHT: u32 = 200;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([64, 64, 64]);
const LABEL: Rgb<u8> = Rgb([32, 32, 32]);
const BAR_COLOR: Rgb<u8> = Rgb([0x4f, 0x46, 0xe5]);
const LINE_COLOR: Rgb<u8> = Rgb([0x05, 0x96, 0x69]);

/// Slice colours, cycled when there are more slices than entries.
const PALETTE: [Rgb<u8>; 10] = [
    Rgb([0x1f, 0x77, 0xb4]),
    Rgb([0xff, 0x7f, 0x0e]),
    Rgb([0x2c, 0xa0, 0x2c]),
    Rgb([0xd6, 0x27, 0x28]),
    Rgb([0x94, 0x67, 0xbd]),
    Rgb([0x8c, 0x56, 0x4b]),
    Rgb([0xe3, 0x77, 0xc2]),
    Rgb([0x7f, 0x7f, 0x7f]),
    Rgb([0xbc, 0xbd, 0x22]),
    Rgb([0x17, 0xbe, 0xcf]),
];

const WORD_COLORS: [Rgb<u8>; 6] = [
    Rgb([0x44, 0x01, 0x54]),
    Rgb([0x3b, 0x52, 0x8b]),
    Rgb([0x21, 0x90, 0x8d]),
    Rgb([0x5d, 0xc8, 0x63]),
    Rgb([0x2a, 0x78, 0x8e]),
    Rgb([0x41, 0x44, 0x87]),
];

const STOP_WORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have",
    "he", "her", "his", "i", "in", "is", "it", "its", "me", "my", "of", "on", "or", "our", "she",
    "so", "that", "the", "their", "them", "then", "there", "these", "they", "this", "to", "was",
    "we", "were", "what", "when", "which", "who", "will", "with", "you", "your",
];

const MAX_WORDS: usize = 60;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no data to render")]
    Empty,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Chart styles the renderer supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
}

impl ChartKind {
    pub fn title(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar chart",
            ChartKind::Line => "line chart",
            ChartKind::Pie => "pie chart",
        }
    }
}

impl std::fmt::Display for ChartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

/// Produces encoded PNG images.
pub trait ChartRenderer: Send + Sync {
    fn render_chart(&self, kind: ChartKind, values: &[f64]) -> RenderResult<Vec<u8>>;

    fn render_word_cloud(&self, text: &str) -> RenderResult<Vec<u8>>;
}

/// Software renderer built on the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterRenderer;

impl ChartRenderer for RasterRenderer {
    fn render_chart(&self, kind: ChartKind, values: &[f64]) -> RenderResult<Vec<u8>> {
        if values.is_empty() {
            return Err(RenderError::Empty);
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(RenderError::InvalidInput(format!("non-finite value {bad}")));
        }

        let mut canvas = Canvas::new();
        canvas.draw_title(kind.title());
        match kind {
            ChartKind::Bar => canvas.bar_chart(values),
            ChartKind::Line => canvas.line_chart(values),
            ChartKind::Pie => canvas.pie_chart(values)?,
        }
        canvas.encode()
    }

    fn render_word_cloud(&self, text: &str) -> RenderResult<Vec<u8>> {
        let words = word_frequencies(text);
        if words.is_empty() {
            return Err(RenderError::Empty);
        }

        let mut canvas = Canvas::new();
        canvas.word_cloud(&words);
        canvas.encode()
    }
}

/// Count words of two or more characters, skipping stop words, most
/// frequent first.
fn word_frequencies(text: &str) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for word in text
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\'').to_lowercase())
        .filter(|w| w.chars().count() >= 2)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| w.chars().all(|c| font::glyph(c).is_some()))
    {
        *counts.entry(word).or_default() += 1;
    }

    let mut words: Vec<_> = counts.into_iter().collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    words.truncate(MAX_WORDS);
    words
}

// =============================================================================
// Canvas
// =============================================================================

/// Plot area margins: left, right, top, bottom.
const MARGIN: (u32, u32, u32, u32) = (34, 12, 20, 18);

struct Canvas {
    img: RgbImage,
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: i64,
    y: i64,
    w: i64,
    h: i64,
}

/// Linear mapping from data values to pixel rows.
#[derive(Debug, Clone, Copy)]
struct YScale {
    lo: f64,
    hi: f64,
    bottom: i64,
    height: i64,
}

impl YScale {
    fn to_y(&self, v: f64) -> i64 {
        let t = (v - self.lo) / (self.hi - self.lo);
        self.bottom - (t * self.height as f64).round() as i64
    }
}

impl Rect {
    fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }
}

impl Canvas {
    fn new() -> Self {
        Self {
            img: RgbImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, WHITE),
        }
    }

    fn encode(&self) -> RenderResult<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.img.write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }

    fn put(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < CANVAS_WIDTH && (y as u32) < CANVAS_HEIGHT {
            self.img.put_pixel(x as u32, y as u32, color);
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgb<u8>) {
        for y in rect.y..rect.y + rect.h {
            for x in rect.x..rect.x + rect.w {
                self.put(x, y, color);
            }
        }
    }

    fn fill_circle(&mut self, cx: i64, cy: i64, r: i64, color: Rgb<u8>) {
        for y in -r..=r {
            for x in -r..=r {
                if x * x + y * y <= r * r {
                    self.put(cx + x, cy + y, color);
                }
            }
        }
    }

    /// Bresenham line, drawn `width` pixels thick.
    fn draw_line(&mut self, from: (i64, i64), to: (i64, i64), width: i64, color: Rgb<u8>) {
        let (mut x0, mut y0) = from;
        let (x1, y1) = to;
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let half = width / 2;

        loop {
            for oy in -half..=half {
                for ox in -half..=half {
                    self.put(x0 + ox, y0 + oy, color);
                }
            }
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    fn draw_text(&mut self, x: i64, y: i64, text: &str, scale: u32, color: Rgb<u8>) {
        let scale = scale as i64;
        let mut pen = x;
        for c in text.chars() {
            if let Some(rows) = font::glyph(c) {
                for (row, bits) in rows.iter().enumerate() {
                    for col in 0..font::GLYPH_WIDTH as i64 {
                        if bits & (0x10 >> col) != 0 {
                            self.fill_rect(
                                Rect {
                                    x: pen + col * scale,
                                    y: y + row as i64 * scale,
                                    w: scale,
                                    h: scale,
                                },
                                color,
                            );
                        }
                    }
                }
            }
            pen += font::ADVANCE as i64 * scale;
        }
    }

    fn draw_centered(&mut self, cx: i64, y: i64, text: &str, scale: u32, color: Rgb<u8>) {
        let w = font::text_width(text, scale) as i64;
        self.draw_text(cx - w / 2, y, text, scale, color);
    }

    fn draw_title(&mut self, title: &str) {
        self.draw_centered(CANVAS_WIDTH as i64 / 2, 5, title, 1, LABEL);
    }

    fn plot_area(&self) -> Rect {
        let (left, right, top, bottom) = MARGIN;
        Rect {
            x: left as i64,
            y: top as i64,
            w: (CANVAS_WIDTH - left - right) as i64,
            h: (CANVAS_HEIGHT - top - bottom) as i64,
        }
    }

    /// Draw axes and return the value to pixel-row mapping.
    fn axes(&mut self, values: &[f64]) -> YScale {
        let area = self.plot_area();
        let lo = values.iter().copied().fold(0.0_f64, f64::min);
        let mut hi = values.iter().copied().fold(0.0_f64, f64::max);
        if hi == lo {
            hi = lo + 1.0;
        }

        let bottom = area.y + area.h;
        self.draw_line((area.x, area.y), (area.x, bottom), 1, AXIS);
        self.draw_line((area.x, bottom), (area.x + area.w, bottom), 1, AXIS);

        let scale = YScale {
            lo,
            hi,
            bottom,
            height: area.h,
        };

        let top_label = format_tick(hi);
        let bottom_label = format_tick(lo);
        let label_w = |s: &str| font::text_width(s, 1) as i64;
        self.draw_text(area.x - 3 - label_w(&top_label), area.y, &top_label, 1, LABEL);
        self.draw_text(area.x - 3 - label_w(&bottom_label), bottom - 7, &bottom_label, 1, LABEL);
        if lo < 0.0 {
            let zero = scale.to_y(0.0);
            self.draw_line((area.x, zero), (area.x + area.w, zero), 1, AXIS);
        }

        scale
    }

    /// Centre of the i-th of `n` equal slots along the x axis.
    fn slot_center(&self, i: usize, n: usize) -> i64 {
        let area = self.plot_area();
        let slot = area.w as f64 / n as f64;
        area.x + (slot * (i as f64 + 0.5)).round() as i64
    }

    fn index_labels(&mut self, n: usize) {
        let area = self.plot_area();
        let slot = area.w as f64 / n as f64;
        let step = if slot < 14.0 { (14.0 / slot).ceil() as usize } else { 1 };
        for i in (0..n).step_by(step) {
            let cx = self.slot_center(i, n);
            self.draw_centered(cx, area.y + area.h + 4, &(i + 1).to_string(), 1, LABEL);
        }
    }

    fn bar_chart(&mut self, values: &[f64]) {
        let scale = self.axes(values);
        let n = values.len();
        let slot = self.plot_area().w as f64 / n as f64;
        let bar_w = ((slot * 0.8).round() as i64).max(1);
        let zero = scale.to_y(0.0);

        for (i, &v) in values.iter().enumerate() {
            let cx = self.slot_center(i, n);
            let y = scale.to_y(v);
            let (top, h) = if y < zero { (y, zero - y) } else { (zero, y - zero) };
            self.fill_rect(
                Rect {
                    x: cx - bar_w / 2,
                    y: top,
                    w: bar_w,
                    h: h.max(1),
                },
                BAR_COLOR,
            );
        }
        self.index_labels(n);
    }

    fn line_chart(&mut self, values: &[f64]) {
        let scale = self.axes(values);
        let n = values.len();
        let points: Vec<(i64, i64)> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| (self.slot_center(i, n), scale.to_y(v)))
            .collect();

        for pair in points.windows(2) {
            self.draw_line(pair[0], pair[1], 2, LINE_COLOR);
        }
        for &(x, y) in &points {
            self.fill_circle(x, y, 3, LINE_COLOR);
        }
        self.index_labels(n);
    }

    /// Slices start at three o'clock and run counter-clockwise.
    fn pie_chart(&mut self, values: &[f64]) -> RenderResult<()> {
        if values.iter().any(|v| *v < 0.0) {
            return Err(RenderError::InvalidInput(
                "pie values must be non-negative".to_string(),
            ));
        }
        let total: f64 = values.iter().sum();
        if total <= 0.0 {
            return Err(RenderError::InvalidInput(
                "pie values must not all be zero".to_string(),
            ));
        }

        let cx = CANVAS_WIDTH as i64 / 2;
        let cy = (CANVAS_HEIGHT as i64 + MARGIN.2 as i64) / 2;
        let r = (CANVAS_HEIGHT as i64 - MARGIN.2 as i64) / 2 - 14;

        let mut bounds = Vec::with_capacity(values.len());
        let mut acc = 0.0;
        for v in values {
            let start = acc;
            acc += v / total * TAU;
            bounds.push((start, acc));
        }

        for y in -r..=r {
            for x in -r..=r {
                if x * x + y * y > r * r {
                    continue;
                }
                let mut angle = (-y as f64).atan2(x as f64);
                if angle < 0.0 {
                    angle += TAU;
                }
                let slice = bounds
                    .iter()
                    .position(|(start, end)| angle >= *start && angle < *end)
                    .unwrap_or(values.len() - 1);
                self.put(cx + x, cy + y, PALETTE[slice % PALETTE.len()]);
            }
        }

        for (i, ((start, end), v)) in bounds.iter().zip(values).enumerate() {
            if *v == 0.0 {
                continue;
            }
            let mid = (start + end) / 2.0;
            let (dx, dy) = (mid.cos(), -mid.sin());

            let pct = format!("{:.1}%", v / total * 100.0);
            let px = cx + (dx * r as f64 * 0.6).round() as i64;
            let py = cy + (dy * r as f64 * 0.6).round() as i64 - 3;
            self.draw_centered(px, py, &pct, 1, WHITE);

            let lx = cx + (dx * (r as f64 + 9.0)).round() as i64;
            let ly = cy + (dy * (r as f64 + 9.0)).round() as i64 - 3;
            self.draw_centered(lx, ly, &(i + 1).to_string(), 1, LABEL);
        }
        Ok(())
    }

    /// Place words along an outward spiral from the centre, largest first.
    /// Words that find no free spot are skipped.
    fn word_cloud(&mut self, words: &[(String, usize)]) {
        let max = words.first().map(|(_, c)| *c).unwrap_or(1) as f64;
        let mut placed: Vec<Rect> = Vec::new();
        let (w, h) = (CANVAS_WIDTH as i64, CANVAS_HEIGHT as i64);

        for (i, (word, count)) in words.iter().enumerate() {
            let mut scale = 1 + ((*count as f64 / max) * 4.0).round() as u32;
            let spot = loop {
                let rect_w = font::text_width(word, scale) as i64;
                let rect_h = font::text_height(scale) as i64;
                if let Some(spot) = find_spot(&placed, rect_w, rect_h, w, h) {
                    break Some(spot);
                }
                if scale == 1 {
                    break None;
                }
                scale -= 1;
            };

            let Some(rect) = spot else {
                continue;
            };
            self.draw_text(rect.x, rect.y, word, scale, WORD_COLORS[i % WORD_COLORS.len()]);
            placed.push(Rect {
                x: rect.x - 2,
                y: rect.y - 2,
                w: rect.w + 4,
                h: rect.h + 4,
            });
        }
    }
}

fn find_spot(placed: &[Rect], rect_w: i64, rect_h: i64, w: i64, h: i64) -> Option<Rect> {
    if rect_w > w || rect_h > h {
        return None;
    }

    let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
    let mut t = 0.0_f64;
    while t < 200.0 {
        let radius = 2.0 * t;
        let x = (cx + radius * t.cos() * 1.6) as i64 - rect_w / 2;
        let y = (cy + radius * t.sin()) as i64 - rect_h / 2;
        let candidate = Rect {
            x,
            y,
            w: rect_w,
            h: rect_h,
        };
        let inside = x >= 0 && y >= 0 && x + rect_w <= w && y + rect_h <= h;
        if inside && !placed.iter().any(|r| r.intersects(&candidate)) {
            return Some(candidate);
        }
        t += 0.1;
    }
    None
}

fn format_tick(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e9 {
        format!("{}", v as i64)
    } else {
        format!("{v:.1}")
    }
}
