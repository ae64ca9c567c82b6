use serde::Serialize;

use crate::{Rect, error::{ForensicsError, Result}};

pub const DEFAULT_EXPANSION_RATIO: f64 = 1.2;

/// Area around the selection where a high score is the selection matching
/// itself rather than a clone.
///
/// The selection is grown by `ratio` on each axis. The extra pixels are split
/// evenly around it, the odd pixel going to the right/bottom side. Each side
/// is then clipped to the image on its own, so a selection against an edge
/// keeps its full margin on the opposite side and none on the clipped one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExclusionZone {
    bounds: Rect,
}

impl ExclusionZone {
    pub fn around(selection: Rect, image_width: u32, image_height: u32, ratio: f64) -> Result<Self> {
        if !ratio.is_finite() || ratio < 1.0 {
            return Err(ForensicsError::InvalidParameter(format!(
                "Expansion ratio must be a finite value >= 1.0, got {}",
                ratio
            )));
        }

        if selection.is_empty() || !selection.fits_within(image_width, image_height) {
            return Err(ForensicsError::InvalidRegion {
                x: selection.x,
                y: selection.y,
                width: selection.width,
                height: selection.height,
                image_width,
                image_height,
            });
        }

        let (x, width) = expand_axis(selection.x, selection.width, image_width, ratio);
        let (y, height) = expand_axis(selection.y, selection.height, image_height, ratio);

        Ok(Self { bounds: Rect::new(x, y, width, height) })
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// True when `region` lies entirely inside the zone.
    pub fn contains(&self, region: &Rect) -> bool {
        self.bounds.contains_rect(region)
    }
}

fn expand_axis(start: u32, len: u32, bound: u32, ratio: f64) -> (u32, u32) {
    // The epsilon keeps products like 35 * 1.2 from flooring to 41.
    let expanded = ((len as f64 * ratio) + 1e-9).floor() as u64;
    let extra = expanded.saturating_sub(len as u64);
    let before = extra / 2;
    let after = extra - before;

    let lo = (start as u64).saturating_sub(before);
    let hi = (start as u64 + len as u64 + after).min(bound as u64);

    (lo as u32, (hi - lo) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(selection: Rect, width: u32, height: u32) -> Rect {
        ExclusionZone::around(selection, width, height, DEFAULT_EXPANSION_RATIO)
            .unwrap()
            .bounds()
    }

    #[test]
    fn test_interior_selection_expands_symmetrically() {
        assert_eq!(zone(Rect::new(100, 100, 50, 50), 800, 800), Rect::new(95, 95, 60, 60));
    }

    #[test]
    fn test_odd_extra_goes_to_far_side() {
        // 45 * 1.2 = 54: four pixels before, five after
        let bounds = zone(Rect::new(100, 200, 45, 45), 800, 800);
        assert_eq!(bounds, Rect::new(96, 196, 54, 54));
        assert_eq!(bounds.right(), 150);
    }

    #[test]
    fn test_top_left_corner_clips_near_side_only() {
        let bounds = zone(Rect::new(0, 0, 50, 50), 800, 800);
        assert_eq!(bounds, Rect::new(0, 0, 55, 55));
    }

    #[test]
    fn test_bottom_right_corner_clips_near_side_only() {
        let bounds = zone(Rect::new(750, 750, 50, 50), 800, 800);
        assert_eq!(bounds, Rect::new(745, 745, 55, 55));
    }

    #[test]
    fn test_selection_two_pixels_from_edge_loses_partial_margin() {
        let bounds = zone(Rect::new(2, 100, 50, 50), 800, 800);
        assert_eq!(bounds, Rect::new(0, 95, 57, 60));
    }

    #[test]
    fn test_whole_image_selection_is_whole_image_zone() {
        assert_eq!(zone(Rect::new(0, 0, 64, 48), 64, 48), Rect::new(0, 0, 64, 48));
    }

    #[test]
    fn test_tiny_selection_has_no_margin() {
        assert_eq!(zone(Rect::new(10, 10, 4, 4), 100, 100), Rect::new(10, 10, 4, 4));
    }

    #[test]
    fn test_zone_always_contains_selection() {
        let (width, height) = (97u32, 61u32);
        for y in (0..height).step_by(7) {
            for x in (0..width).step_by(5) {
                for (w, h) in [(1, 1), (3, 17), (20, 9), (33, 33)] {
                    if x + w > width || y + h > height {
                        continue;
                    }
                    let selection = Rect::new(x, y, w, h);
                    let zone = ExclusionZone::around(selection, width, height, 1.2).unwrap();
                    assert!(zone.contains(&selection), "{:?} not in {:?}", selection, zone);
                    assert!(zone.bounds().fits_within(width, height));
                }
            }
        }
    }

    #[test]
    fn test_ratio_below_one_is_rejected() {
        let err = ExclusionZone::around(Rect::new(0, 0, 10, 10), 100, 100, 0.9).unwrap_err();
        assert!(matches!(err, ForensicsError::InvalidParameter(_)));
    }

    #[test]
    fn test_out_of_bounds_selection_is_rejected() {
        let err = ExclusionZone::around(Rect::new(95, 0, 10, 10), 100, 100, 1.2).unwrap_err();
        assert!(matches!(err, ForensicsError::InvalidRegion { .. }));
    }
}
