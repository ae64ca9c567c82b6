use crate::{Rect, error::{ForensicsError, Result}, image_utils::WorkingImage};

/// Source of the suspect region.
///
/// An interactive implementation blocks until the user finishes (or cancels)
/// the pick. Returning [`Rect::NONE`], or any zero-area rectangle, means the
/// selection was aborted.
pub trait RegionSelector {
    fn select_region(&mut self, image: &WorkingImage) -> Result<Rect>;
}

/// Supplies a preset rectangle, for headless runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedRegion {
    region: Rect,
}

impl FixedRegion {
    pub fn new(region: Rect) -> Self {
        Self { region }
    }

    pub fn cancelled() -> Self {
        Self { region: Rect::NONE }
    }
}

impl RegionSelector for FixedRegion {
    fn select_region(&mut self, _image: &WorkingImage) -> Result<Rect> {
        Ok(self.region)
    }
}

/// `Ok(None)` for an aborted pick, the region itself when it fits the image.
pub fn validate_selection(region: Rect, image_width: u32, image_height: u32) -> Result<Option<Rect>> {
    if region.is_empty() {
        return Ok(None);
    }

    if !region.fits_within(image_width, image_height) {
        return Err(ForensicsError::InvalidRegion {
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
            image_width,
            image_height,
        });
    }

    Ok(Some(region))
}
