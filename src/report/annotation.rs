use std::{fs, path::{Path, PathBuf}};

use chrono::{DateTime, Local};
use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect as PixelRect};

use crate::{DetectedMatch, Rect, error::{ForensicsError, Result}};

pub const MATCH_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const LINE_WIDTH: u32 = 2;
pub const DEFAULT_OUTPUT_EXTENSION: &str = "jpg";

pub fn output_file_name(timestamp: &DateTime<Local>, extension: &str) -> String {
    format!(
        "cloning_analysis_{}.{}",
        timestamp.format("%Y-%m-%d_%H-%M-%S"),
        extension.trim_start_matches('.')
    )
}

pub struct AnnotationRenderer {
    color: Rgb<u8>,
    line_width: u32,
}

impl AnnotationRenderer {
    pub fn new() -> Self {
        Self {
            color: MATCH_COLOR,
            line_width: LINE_WIDTH,
        }
    }

    /// Copy of `original` with each match outlined. The outline is drawn
    /// inside the match rectangle.
    pub fn render(&self, original: &RgbImage, matches: &[DetectedMatch]) -> RgbImage {
        let mut annotated = original.clone();

        for m in matches {
            self.draw_outline(&mut annotated, &m.region);
        }

        annotated
    }

    fn draw_outline(&self, image: &mut RgbImage, region: &Rect) {
        for inset in 0..self.line_width {
            let (width, height) = (
                region.width.saturating_sub(2 * inset),
                region.height.saturating_sub(2 * inset),
            );
            if width == 0 || height == 0 {
                break;
            }

            let rect = PixelRect::at((region.x + inset) as i32, (region.y + inset) as i32)
                .of_size(width, height);
            draw_hollow_rect_mut(image, rect, self.color);
        }
    }

    /// Writes `image` to `dir` under a timestamped name; the format follows
    /// `extension`.
    pub fn persist(
        &self,
        image: &RgbImage,
        dir: &Path,
        extension: &str,
        timestamp: &DateTime<Local>,
    ) -> Result<PathBuf> {
        let path = dir.join(output_file_name(timestamp, extension));
        let persist_error = |reason: String| ForensicsError::Persist {
            path: path.display().to_string(),
            reason,
        };

        fs::create_dir_all(dir).map_err(|e| persist_error(e.to_string()))?;
        image.save(&path).map_err(|e| persist_error(e.to_string()))?;

        Ok(path)
    }
}

impl Default for AnnotationRenderer {
    fn default() -> Self {
        Self::new()
    }
}
