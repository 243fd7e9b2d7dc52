//! Placeholder image synthesis: the provider-free fallback.
//!
//! Draws three friendly outlined shapes and a centred label on a white
//! canvas. Shape positions are fixed fractions of the canvas; only the draw
//! order is shuffled per call. There is no failure path, which is what lets
//! acquisition always produce an image when the provider is missing or down.

use super::glyphs;
use image::{DynamicImage, Rgb, RgbImage};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Outline width of every shape, in pixels.
pub const STROKE_WIDTH: f32 = 12.0;

/// Column at which the label is word-wrapped.
pub const LABEL_WRAP_COLUMNS: usize = 30;

/// Top of the label block as a fraction of canvas height.
pub const LABEL_TOP: f32 = 0.05;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// One of the three placeholder shapes. Bounding boxes are
/// `(x0, y0, x1, y1)` as fractions of canvas width/height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Circle,
    Rectangle,
    Triangle,
}

impl Shape {
    pub const ALL: [Shape; 3] = [Shape::Circle, Shape::Rectangle, Shape::Triangle];

    pub fn bbox_fractions(self) -> (f32, f32, f32, f32) {
        match self {
            Shape::Circle => (0.2, 0.2, 0.4, 0.4),
            Shape::Rectangle => (0.55, 0.2, 0.8, 0.45),
            Shape::Triangle => (0.3, 0.6, 0.5, 0.85),
        }
    }

    fn bbox(self, w: u32, h: u32) -> (f32, f32, f32, f32) {
        let (a, b, c, d) = self.bbox_fractions();
        (a * w as f32, b * h as f32, c * w as f32, d * h as f32)
    }

    fn draw(self, canvas: &mut RgbImage) {
        let (x0, y0, x1, y1) = self.bbox(canvas.width(), canvas.height());
        match self {
            Shape::Circle => draw_ellipse_outline(canvas, x0, y0, x1, y1, STROKE_WIDTH),
            Shape::Rectangle => draw_rect_outline(canvas, x0, y0, x1, y1, STROKE_WIDTH),
            Shape::Triangle => {
                let pts = [(x0, y1), ((x0 + x1) / 2.0, y0), (x1, y1)];
                for i in 0..3 {
                    let (a, b) = (pts[i], pts[(i + 1) % 3]);
                    draw_thick_segment(canvas, a, b, STROKE_WIDTH);
                }
            }
        }
    }
}

/// Fallback image generator.
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderSynthesizer {
    width: u32,
    height: u32,
}

impl Default for PlaceholderSynthesizer {
    fn default() -> Self {
        Self::new(2480, 3508)
    }
}

impl PlaceholderSynthesizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Draw a placeholder with a thread-local RNG choosing the shape order.
    pub fn synthesize(&self, theme: &str, age_group: &str) -> DynamicImage {
        self.synthesize_with_rng(theme, age_group, &mut rand::thread_rng())
    }

    /// Draw a placeholder; `rng` only decides the shape draw order.
    pub fn synthesize_with_rng<R: Rng + ?Sized>(
        &self,
        theme: &str,
        age_group: &str,
        rng: &mut R,
    ) -> DynamicImage {
        let mut canvas = RgbImage::from_pixel(self.width, self.height, WHITE);

        let mut shapes = Shape::ALL;
        shapes.shuffle(rng);
        for shape in shapes {
            shape.draw(&mut canvas);
        }

        let label = format!("{} | Ages {}", title_case(theme), age_group);
        let lines = wrap(&label, LABEL_WRAP_COLUMNS);
        let scale = label_scale(self.width);
        let (text_w, _) = glyphs::text_bbox(&lines, scale);
        let x = (self.width as i64 - text_w as i64) / 2;
        let y = (self.height as f32 * LABEL_TOP) as i64;
        glyphs::draw_text_block(&mut canvas, &lines, x, y, scale, BLACK);

        debug!(
            "Placeholder: {}x{} px, order {:?}, label {:?}",
            self.width, self.height, shapes, label
        );
        DynamicImage::ImageRgb8(canvas)
    }
}

/// Glyph scale so the label stays legible on any canvas width.
fn label_scale(width: u32) -> u32 {
    (width / 400).max(1)
}

/// Upper-case the first letter of every run of letters, lower-case the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }
    out
}

/// Greedy word wrap at `width` columns; words longer than a line are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let word: String = word.into_iter().collect();
        if word.is_empty() {
            continue;
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

// ── Rasterisation helpers ────────────────────────────────────────────────

/// Clamp a float span to canvas pixel indices.
fn span(lo: f32, hi: f32, limit: u32) -> std::ops::Range<u32> {
    let lo = lo.floor().max(0.0) as u32;
    let hi = (hi.ceil().max(0.0) as u32).min(limit);
    lo.min(hi)..hi
}

fn draw_rect_outline(canvas: &mut RgbImage, x0: f32, y0: f32, x1: f32, y1: f32, stroke: f32) {
    for y in span(y0, y1 + 1.0, canvas.height()) {
        for x in span(x0, x1 + 1.0, canvas.width()) {
            let (fx, fy) = (x as f32, y as f32);
            let inner =
                fx >= x0 + stroke && fx <= x1 - stroke && fy >= y0 + stroke && fy <= y1 - stroke;
            if !inner {
                canvas.put_pixel(x, y, BLACK);
            }
        }
    }
}

fn draw_ellipse_outline(canvas: &mut RgbImage, x0: f32, y0: f32, x1: f32, y1: f32, stroke: f32) {
    let (cx, cy) = ((x0 + x1) / 2.0, (y0 + y1) / 2.0);
    let (a, b) = ((x1 - x0) / 2.0, (y1 - y0) / 2.0);
    let (ia, ib) = ((a - stroke).max(0.0), (b - stroke).max(0.0));
    let inside = |dx: f32, dy: f32, ra: f32, rb: f32| {
        ra > 0.0 && rb > 0.0 && (dx / ra).powi(2) + (dy / rb).powi(2) <= 1.0
    };
    for y in span(y0, y1 + 1.0, canvas.height()) {
        for x in span(x0, x1 + 1.0, canvas.width()) {
            let (dx, dy) = (x as f32 + 0.5 - cx, y as f32 + 0.5 - cy);
            if inside(dx, dy, a, b) && !inside(dx, dy, ia, ib) {
                canvas.put_pixel(x, y, BLACK);
            }
        }
    }
}

fn draw_thick_segment(canvas: &mut RgbImage, a: (f32, f32), b: (f32, f32), stroke: f32) {
    let half = stroke / 2.0;
    let (vx, vy) = (b.0 - a.0, b.1 - a.1);
    let len2 = vx * vx + vy * vy;
    let xs = span(a.0.min(b.0) - half, a.0.max(b.0) + half + 1.0, canvas.width());
    let ys = span(a.1.min(b.1) - half, a.1.max(b.1) + half + 1.0, canvas.height());
    for y in ys {
        for x in xs.clone() {
            let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
            let t = if len2 > 0.0 {
                (((px - a.0) * vx + (py - a.1) * vy) / len2).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let (qx, qy) = (a.0 + t * vx - px, a.1 + t * vy - py);
            if qx * qx + qy * qy <= half * half {
                canvas.put_pixel(x, y, BLACK);
            }
        }
    }
}
