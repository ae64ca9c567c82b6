use std::{fs, path::Path};

use image::{DynamicImage, GrayImage, Luma, RgbImage, imageops::{self, FilterType}};

use crate::{Rect, error::{ForensicsError, Result}};

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub const DEFAULT_MAX_DIMENSION: u32 = 1200;
pub const DEFAULT_DOWNSCALE_RATIO: f64 = 0.6;

/// Bounds the working resolution: images whose larger side exceeds
/// `max_dimension` are shrunk so that side becomes `max_dimension * ratio`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizePolicy {
    pub max_dimension: u32,
    pub ratio: f64,
}

impl Default for ResizePolicy {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            ratio: DEFAULT_DOWNSCALE_RATIO,
        }
    }
}

impl ResizePolicy {
    /// `ratio` must lie in (0, 1] and `max_dimension` must be positive.
    pub fn new(max_dimension: u32, ratio: f64) -> Result<Self> {
        if max_dimension == 0 {
            return Err(ForensicsError::InvalidParameter(
                "Maximum working dimension must be positive".into()
            ));
        }
        if !ratio.is_finite() || ratio <= 0.0 || ratio > 1.0 {
            return Err(ForensicsError::InvalidParameter(format!(
                "Downscale ratio must lie in (0, 1], got {}",
                ratio
            )));
        }

        Ok(Self { max_dimension, ratio })
    }

    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let larger = width.max(height);
        if larger <= self.max_dimension {
            return (width, height);
        }

        let target = ((self.max_dimension as f64 * self.ratio).round() as u32).max(1);
        let scale = |side: u32| -> u32 {
            if side == larger {
                target
            } else {
                ((side as f64 * target as f64 / larger as f64).round() as u32).max(1)
            }
        };

        (scale(width), scale(height))
    }
}

pub fn is_supported_extension<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Rescales `region` from an image of size `from` to one of size `to`.
/// The result is clamped to the `to` bounds.
pub fn scale_rect(region: &Rect, from: (u32, u32), to: (u32, u32)) -> Rect {
    if from == to {
        return *region;
    }

    let axis = |start: u32, len: u32, from: u32, to: u32| -> (u32, u32) {
        let scale = to as f64 / from as f64;
        let start = ((start as f64 * scale).round() as u32).min(to);
        let len = ((len as f64 * scale).round() as u32).min(to - start);
        (start, len)
    };

    let (x, width) = axis(region.x, region.width, from.0, to.0);
    let (y, height) = axis(region.y, region.height, from.1, to.1);
    Rect::new(x, y, width, height)
}

/// ITU-R BT.601 luminance, rounded to the nearest level.
pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in image.enumerate_pixels() {
        let lum =
            0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64;
        gray.put_pixel(x, y, Luma([lum.round().clamp(0.0, 255.0) as u8]));
    }

    gray
}

/// Decoded image at working resolution, with its grayscale derivation.
///
/// Every coordinate handed out by the analysis pipeline refers to this
/// resolution, not to the pixels of the source file. Use
/// [`WorkingImage::to_original`] to map a rectangle back.
#[derive(Debug, Clone)]
pub struct WorkingImage {
    rgb: RgbImage,
    gray: GrayImage,
    original_dimensions: (u32, u32),
}

impl WorkingImage {
    pub fn open<P: AsRef<Path>>(path: P, policy: ResizePolicy) -> Result<Self> {
        let path = path.as_ref();
        if !is_supported_extension(path) {
            return Err(ForensicsError::UnsupportedFormat(format!(
                "{} (expected one of: {})",
                path.display(),
                SUPPORTED_EXTENSIONS.join(", ")
            )));
        }

        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes, policy)
    }

    pub fn from_bytes(bytes: &[u8], policy: ResizePolicy) -> Result<Self> {
        let decoded = image::load_from_memory(bytes)?;
        Ok(Self::from_dynamic(decoded, policy))
    }

    pub fn from_dynamic(image: DynamicImage, policy: ResizePolicy) -> Self {
        Self::from_rgb(image.to_rgb8(), policy)
    }

    pub fn from_rgb(rgb: RgbImage, policy: ResizePolicy) -> Self {
        let original_dimensions = rgb.dimensions();
        let (width, height) = policy.target_dimensions(original_dimensions.0, original_dimensions.1);

        let rgb = if (width, height) == original_dimensions {
            rgb
        } else {
            imageops::resize(&rgb, width, height, FilterType::Triangle)
        };
        let gray = rgb_to_gray(&rgb);
        debug_assert_eq!(rgb.dimensions(), gray.dimensions());

        Self {
            rgb,
            gray,
            original_dimensions,
        }
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.gray.dimensions()
    }

    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    pub fn height(&self) -> u32 {
        self.gray.height()
    }

    pub fn original_dimensions(&self) -> (u32, u32) {
        self.original_dimensions
    }

    pub fn was_downscaled(&self) -> bool {
        self.dimensions() != self.original_dimensions
    }

    /// Working width over original width; 1.0 when no resize happened.
    pub fn scale(&self) -> f64 {
        self.width() as f64 / self.original_dimensions.0 as f64
    }

    pub fn validate(&self, region: &Rect) -> Result<()> {
        if region.fits_within(self.width(), self.height()) {
            Ok(())
        } else {
            Err(ForensicsError::InvalidRegion {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                image_width: self.width(),
                image_height: self.height(),
            })
        }
    }

    pub fn template(&self, region: &Rect) -> Result<GrayImage> {
        self.validate(region)?;
        if region.is_empty() {
            return Err(ForensicsError::InvalidParameter(
                "Template region must have a non-zero area".into()
            ));
        }

        Ok(imageops::crop_imm(&self.gray, region.x, region.y, region.width, region.height).to_image())
    }

    pub fn to_original(&self, region: &Rect) -> Rect {
        scale_rect(region, self.dimensions(), self.original_dimensions)
    }
}
