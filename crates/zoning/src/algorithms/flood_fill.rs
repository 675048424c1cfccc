//! Seeded 4-connected flood fill for the magic-wand tool.
//!
//! Boundary mode grows until it meets pixels close to a boundary color;
//! tolerance mode grows over pixels within a fixed range of the seed color.
//! Only boundary mode rejects selections that cover most of the image.

use std::collections::VecDeque;

use image::{Rgb, RgbImage};
use tracing::debug;

use crate::{
    algorithms::morphology::neighbors4,
    cancel::CancelToken,
    error::{Result, ZoneError},
    types::{BinaryMask, PixelBox},
};

/// Fraction of the image above which a boundary-mode fill is treated as a leak.
pub const MAX_SELECTION_RATIO: f64 = 0.8;

const CANCEL_CHECK_INTERVAL: usize = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    Selected,
    /// The seed pixel itself matched the boundary color.
    SeedOnBoundary,
    /// The fill covered more than [`MAX_SELECTION_RATIO`] of the image.
    TooLarge,
}

/// Result of a flood fill. Rejected outcomes carry an all-off mask and
/// `PixelBox::EMPTY`.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub mask: BinaryMask,
    pub bbox: PixelBox,
    pub outcome: SelectionOutcome,
}

impl Selection {
    fn empty(width: u32, height: u32, outcome: SelectionOutcome) -> Self {
        Self {
            mask: BinaryMask::new(width, height),
            bbox: PixelBox::EMPTY,
            outcome,
        }
    }

    pub fn is_selected(&self) -> bool {
        self.outcome == SelectionOutcome::Selected
    }

    pub fn is_too_large(&self) -> bool {
        self.outcome == SelectionOutcome::TooLarge
    }
}

/// Boundary-mode selection with no cancellation.
pub fn select_boundary(
    image: &RgbImage,
    x: i64,
    y: i64,
    boundary_color: [u8; 3],
    tolerance: u8,
) -> Result<Selection> {
    select_boundary_with_cancel(image, x, y, boundary_color, tolerance, &CancelToken::new())
}

/// A pixel is boundary when its RGB distance to `boundary_color` is at most
/// `tolerance * sqrt(3)`. Boundary pixels stop the fill and are never selected.
pub fn select_boundary_with_cancel(
    image: &RgbImage,
    x: i64,
    y: i64,
    boundary_color: [u8; 3],
    tolerance: u8,
    cancel: &CancelToken,
) -> Result<Selection> {
    let (seed_x, seed_y) = validate_seed(image, x, y)?;
    let (width, height) = image.dimensions();
    let limit = 3 * (tolerance as u32).pow(2);
    let is_boundary = |p: &Rgb<u8>| distance_sq(p.0, boundary_color) <= limit;

    if is_boundary(image.get_pixel(seed_x, seed_y)) {
        debug!(seed_x, seed_y, "seed lies on boundary color");
        return Ok(Selection::empty(width, height, SelectionOutcome::SeedOnBoundary));
    }

    let (mask, bbox, selected) = fill(image, seed_x, seed_y, |p| !is_boundary(p), cancel)?;

    let total = width as u64 * height as u64;
    if selected as f64 > total as f64 * MAX_SELECTION_RATIO {
        debug!(selected, total, "boundary fill leaked across the image");
        return Ok(Selection::empty(width, height, SelectionOutcome::TooLarge));
    }

    Ok(Selection { mask, bbox, outcome: SelectionOutcome::Selected })
}

/// Tolerance-mode selection with no cancellation.
pub fn select_tolerance(image: &RgbImage, x: i64, y: i64, tolerance: u8) -> Result<Selection> {
    select_tolerance_with_cancel(image, x, y, tolerance, &CancelToken::new())
}

/// Every channel must lie in `[seed - tolerance, seed + tolerance]`, with the
/// range fixed at the seed color for the whole fill. No size guard applies.
pub fn select_tolerance_with_cancel(
    image: &RgbImage,
    x: i64,
    y: i64,
    tolerance: u8,
    cancel: &CancelToken,
) -> Result<Selection> {
    let (seed_x, seed_y) = validate_seed(image, x, y)?;
    let seed = image.get_pixel(seed_x, seed_y).0;
    let within = |p: &Rgb<u8>| {
        p.0.iter()
            .zip(seed)
            .all(|(&channel, reference)| channel.abs_diff(reference) <= tolerance)
    };

    let (mask, bbox, _) = fill(image, seed_x, seed_y, within, cancel)?;
    Ok(Selection { mask, bbox, outcome: SelectionOutcome::Selected })
}

fn validate_seed(image: &RgbImage, x: i64, y: i64) -> Result<(u32, u32)> {
    let (width, height) = image.dimensions();
    if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
        return Err(ZoneError::SeedOutOfBounds { x, y, width, height });
    }
    Ok((x as u32, y as u32))
}

/// Breadth-first fill from an included seed. The bounding box grows as pixels
/// are dequeued. Returns the mask, its bbox and the selected pixel count.
fn fill(
    image: &RgbImage,
    seed_x: u32,
    seed_y: u32,
    include: impl Fn(&Rgb<u8>) -> bool,
    cancel: &CancelToken,
) -> Result<(BinaryMask, PixelBox, usize)> {
    let (width, height) = image.dimensions();
    let mut mask = BinaryMask::new(width, height);
    let mut visited = vec![false; width as usize * height as usize];
    let index = |x: u32, y: u32| (y * width + x) as usize;

    let mut queue = VecDeque::from([(seed_x, seed_y)]);
    visited[index(seed_x, seed_y)] = true;

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (seed_x, seed_y, seed_x, seed_y);
    let mut selected = 0usize;

    while let Some((x, y)) = queue.pop_front() {
        mask.set(x, y, true);
        selected += 1;
        if selected % CANCEL_CHECK_INTERVAL == 0 {
            cancel.check()?;
        }

        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);

        for (nx, ny) in neighbors4(x, y, width, height) {
            let i = index(nx, ny);
            if visited[i] {
                continue;
            }
            visited[i] = true;
            if include(image.get_pixel(nx, ny)) {
                queue.push_back((nx, ny));
            }
        }
    }

    let bbox = PixelBox::from_extent(min_x, min_y, max_x, max_y);
    Ok((mask, bbox, selected))
}

fn distance_sq(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter()
        .zip(b)
        .map(|(&a, b)| (a as i32 - b as i32).pow(2) as u32)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAY: Rgb<u8> = Rgb([152, 152, 152]);
    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    /// 10x10 gray image with a 4x4 white block spanning (2,2)-(5,5).
    fn gray_with_white_block() -> RgbImage {
        RgbImage::from_fn(10, 10, |x, y| {
            if (2..=5).contains(&x) && (2..=5).contains(&y) { WHITE } else { GRAY }
        })
    }

    fn is_single_4_component(mask: &BinaryMask) -> bool {
        let Some((sx, sy)) = (0..mask.height())
            .flat_map(|y| (0..mask.width()).map(move |x| (x, y)))
            .find(|&(x, y)| mask.get(x, y))
        else {
            return false;
        };
        let mut seen = BinaryMask::new(mask.width(), mask.height());
        let mut queue = VecDeque::from([(sx, sy)]);
        seen.set(sx, sy, true);
        let mut reached = 0;
        while let Some((x, y)) = queue.pop_front() {
            reached += 1;
            for (nx, ny) in neighbors4(x, y, mask.width(), mask.height()) {
                if mask.get(nx, ny) && !seen.get(nx, ny) {
                    seen.set(nx, ny, true);
                    queue.push_back((nx, ny));
                }
            }
        }
        reached == mask.count()
    }

    #[test]
    fn boundary_fill_covers_enclosed_block() {
        let image = gray_with_white_block();
        let selection = select_boundary(&image, 3, 3, [152, 152, 152], 15).unwrap();

        assert!(selection.is_selected());
        assert_eq!(selection.bbox, PixelBox { x: 2, y: 2, width: 4, height: 4 });
        assert_eq!(selection.mask.count(), 16);
        for y in 0..10 {
            for x in 0..10 {
                let inside = (2..=5).contains(&x) && (2..=5).contains(&y);
                assert_eq!(selection.mask.get(x, y), inside, "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn seed_on_boundary_returns_empty_sentinel() {
        let image = gray_with_white_block();
        let selection = select_boundary(&image, 0, 0, [152, 152, 152], 15).unwrap();

        assert_eq!(selection.outcome, SelectionOutcome::SeedOnBoundary);
        assert!(!selection.is_too_large());
        assert!(selection.bbox.is_empty());
        assert!(selection.mask.is_empty());
    }

    #[test]
    fn oversized_boundary_fill_is_rejected() {
        // Thin gray frame around a white interior: the fill takes > 80% of pixels.
        let image = RgbImage::from_fn(20, 20, |x, y| {
            if x == 0 || y == 0 || x == 19 || y == 19 { GRAY } else { WHITE }
        });
        for (x, y) in [(1, 1), (10, 10), (18, 5)] {
            let selection = select_boundary(&image, x, y, [152, 152, 152], 15).unwrap();
            assert!(selection.is_too_large());
            assert!(selection.mask.is_empty());
            assert!(selection.bbox.is_empty());
        }
    }

    #[test]
    fn boundary_pixels_never_selected_and_selection_is_connected() {
        // Two white rooms separated by a gray wall with a near-gray doorway jamb.
        let image = RgbImage::from_fn(30, 12, |x, y| {
            if y == 0 || y == 11 || x == 0 || x == 29 || x == 14 {
                GRAY
            } else if x == 13 && y == 5 {
                Rgb([160, 145, 150])
            } else if x < 14 {
                WHITE
            } else {
                Rgb([200, 220, 240])
            }
        });
        let selection = select_boundary(&image, 3, 3, [152, 152, 152], 15).unwrap();

        assert!(selection.mask.get(3, 3));
        assert!(is_single_4_component(&selection.mask));
        for (x, y, pixel) in image.enumerate_pixels() {
            if distance_sq(pixel.0, [152, 152, 152]) <= 3 * 15 * 15 {
                assert!(!selection.mask.get(x, y));
            }
        }
        assert!(!selection.mask.get(20, 5));
        assert_eq!(selection.bbox, PixelBox { x: 1, y: 1, width: 13, height: 10 });
    }

    #[test]
    fn out_of_bounds_seed_is_rejected_in_both_modes() {
        let image = gray_with_white_block();
        assert!(matches!(
            select_boundary(&image, 10, 3, [152, 152, 152], 15),
            Err(ZoneError::SeedOutOfBounds { x: 10, y: 3, .. })
        ));
        assert!(matches!(
            select_tolerance(&image, -1, 0, 32),
            Err(ZoneError::SeedOutOfBounds { .. })
        ));
    }

    #[test]
    fn tolerance_fill_uses_fixed_seed_range() {
        // A gradient where each step is within tolerance of its neighbour but
        // drifts beyond the seed's range.
        let image = RgbImage::from_fn(10, 1, |x, _| {
            let v = 100 + 10 * x as u8;
            Rgb([v, v, v])
        });
        let selection = select_tolerance(&image, 0, 0, 25).unwrap();
        assert_eq!(selection.bbox, PixelBox { x: 0, y: 0, width: 3, height: 1 });
        assert_eq!(selection.mask.count(), 3);
    }

    #[test]
    fn tolerance_mode_has_no_size_guard() {
        // Asymmetry with boundary mode is intentional: a fill over the whole
        // image is still returned.
        let image = RgbImage::from_pixel(10, 10, WHITE);
        let selection = select_tolerance(&image, 5, 5, 0).unwrap();
        assert!(selection.is_selected());
        assert_eq!(selection.mask.count(), 100);
        assert_eq!(selection.bbox, PixelBox { x: 0, y: 0, width: 10, height: 10 });
    }
}
