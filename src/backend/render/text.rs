// SPDX-License-Identifier: GPL-3.0-only

use cosmic_text::{Attrs, Buffer, Color, Family, FontSystem, Metrics, Shaping, SwashCache};
use tiny_skia::{Paint, Pixmap, Rect, Transform};
use tracing::debug;

use std::{fmt, num::ParseIntError};

pub const DEFAULT_FONT: &str = "Sans";

/// A single line of black text. `(x, y)` is the start of its baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub size: f32,
    pub font: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum OverlayError {
    #[error("expected (X,Y,SIZE):TEXT, got `{0}`")]
    Malformed(String),
    #[error("invalid number in `{value}`: {source}")]
    Number {
        value: String,
        source: ParseIntError,
    },
}

impl TextOverlay {
    /// Parses the `(X,Y,SIZE):TEXT` form of `platsch_overlay_text`.
    pub fn parse(value: &str) -> Result<TextOverlay, OverlayError> {
        let malformed = || OverlayError::Malformed(value.to_string());
        let (position, text) = value
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.split_once("):"))
            .ok_or_else(malformed)?;

        let mut numbers = position.split(',').map(|n| {
            n.trim().parse::<u32>().map_err(|source| OverlayError::Number {
                value: value.to_string(),
                source,
            })
        });
        let (Some(x), Some(y), Some(size), None) =
            (numbers.next(), numbers.next(), numbers.next(), numbers.next())
        else {
            return Err(malformed());
        };

        Ok(TextOverlay {
            text: text.to_string(),
            x: x? as i32,
            y: y? as i32,
            size: size? as f32,
            font: DEFAULT_FONT.to_string(),
        })
    }

    fn family(&self) -> Family<'_> {
        match self.font.to_lowercase().as_str() {
            "sans" | "sans-serif" => Family::SansSerif,
            "serif" => Family::Serif,
            "mono" | "monospace" => Family::Monospace,
            _ => Family::Name(&self.font),
        }
    }
}

impl fmt::Display for TextOverlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "`{}` at {},{} ({} {})",
            self.text, self.x, self.y, self.font, self.size
        )
    }
}

/// Shapes and rasterizes text with the system fonts.
pub struct TextRenderer {
    fonts: FontSystem,
    cache: SwashCache,
}

impl fmt::Debug for TextRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextRenderer")
            .field("faces", &self.fonts.db().len())
            .finish_non_exhaustive()
    }
}

impl Default for TextRenderer {
    fn default() -> Self {
        TextRenderer::new()
    }
}

impl TextRenderer {
    pub fn new() -> TextRenderer {
        let fonts = FontSystem::new();
        debug!("Loaded {} font faces", fonts.db().len());
        TextRenderer {
            fonts,
            cache: SwashCache::new(),
        }
    }

    pub fn has_fonts(&self) -> bool {
        self.fonts.db().len() > 0
    }

    /// Draws `overlay` onto `pixmap`, returns whether anything was drawn.
    pub fn draw(&mut self, pixmap: &mut Pixmap, overlay: &TextOverlay) -> bool {
        if overlay.text.is_empty() || overlay.size <= 0. {
            return false;
        }

        let metrics = Metrics::new(overlay.size, overlay.size * 1.2);
        let mut buffer = Buffer::new(&mut self.fonts, metrics);
        buffer.set_size(&mut self.fonts, None, None);
        buffer.set_text(
            &mut self.fonts,
            &overlay.text,
            Attrs::new().family(overlay.family()),
            Shaping::Advanced,
        );
        buffer.shape_until_scroll(&mut self.fonts, false);

        let Some(baseline) = buffer.layout_runs().next().map(|run| run.line_y) else {
            return false;
        };
        let (dx, dy) = (overlay.x as f32, overlay.y as f32 - baseline);

        let mut paint = Paint {
            anti_alias: false,
            ..Default::default()
        };
        let mut drawn = false;
        buffer.draw(
            &mut self.fonts,
            &mut self.cache,
            Color::rgb(0, 0, 0),
            |x, y, w, h, color| {
                if color.a() == 0 {
                    return;
                }
                let Some(rect) = Rect::from_xywh(dx + x as f32, dy + y as f32, w as f32, h as f32)
                else {
                    return;
                };
                paint.set_color_rgba8(color.r(), color.g(), color.b(), color.a());
                pixmap.fill_rect(rect, &paint, Transform::identity(), None);
                drawn = true;
            },
        );
        drawn
    }
}
