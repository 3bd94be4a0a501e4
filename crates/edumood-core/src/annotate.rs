//! Face overlays: a box around each classified face with its label above it.

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;
use thiserror::Error;

const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: u32 = 2;
const LABEL_SCALE: f32 = 22.0;
/// Gap between the label baseline and the top edge of the box.
const LABEL_OFFSET: i32 = 10;

#[derive(Error, Debug)]
pub enum AnnotateError {
    #[error("failed to read font {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid font file: {0}")]
    InvalidFont(String),
}

/// Draws face boxes and, when a font is loaded, their labels.
#[derive(Default, Debug)]
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// Annotator that draws boxes only.
    pub fn boxes_only() -> Self {
        Self::default()
    }

    /// Load a TrueType/OpenType font for label text.
    pub fn with_font_file(path: &Path) -> Result<Self, AnnotateError> {
        let bytes = std::fs::read(path).map_err(|source| AnnotateError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| AnnotateError::InvalidFont(format!("{}: {e}", path.display())))?;
        Ok(Self { font: Some(font) })
    }

    /// Use the font at `path` if it loads; fall back to boxes only.
    pub fn with_optional_font(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            tracing::info!("no label font configured; drawing face boxes only");
            return Self::boxes_only();
        };
        match Self::with_font_file(path) {
            Ok(annotator) => {
                tracing::info!(path = %path.display(), "label font loaded");
                annotator
            }
            Err(e) => {
                tracing::warn!(error = %e, "label font unavailable; drawing face boxes only");
                Self::boxes_only()
            }
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw one face overlay. `rect` is `(x, y, width, height)` in pixels.
    pub fn draw(&self, image: &mut RgbImage, rect: (u32, u32, u32, u32), label: &str) {
        let (x, y, w, h) = rect;
        if w == 0 || h == 0 {
            return;
        }

        for inset in 0..BOX_THICKNESS {
            if w <= 2 * inset || h <= 2 * inset {
                break;
            }
            let r = Rect::at((x + inset) as i32, (y + inset) as i32)
                .of_size(w - 2 * inset, h - 2 * inset);
            draw_hollow_rect_mut(image, r, OVERLAY_COLOR);
        }

        if let Some(font) = &self.font {
            if !label.is_empty() {
                let top = y as i32 - LABEL_OFFSET - LABEL_SCALE as i32;
                draw_text_mut(
                    image,
                    OVERLAY_COLOR,
                    x as i32,
                    top,
                    PxScale::from(LABEL_SCALE),
                    font,
                    label,
                );
            }
        }
    }
}
