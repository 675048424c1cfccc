use std::collections::VecDeque;

use imageproc::{distance_transform::Norm, morphology};

use crate::types::BinaryMask;

/// Morphological cleanup of a binary mask.
///
/// A close with two iterations merges small gaps, an open with one iteration
/// removes speckle, then enclosed background is optionally filled. The kernel
/// is a square of side `kernel_size` (Chebyshev radius `kernel_size / 2`).
#[derive(Debug, Clone)]
pub struct MaskCleaner {
    pub kernel_size: u32,
    pub close_iterations: u32,
    pub open_iterations: u32,
    pub fill_holes: bool,
}

impl Default for MaskCleaner {
    fn default() -> Self {
        Self {
            kernel_size: 3,
            close_iterations: 2,
            open_iterations: 1,
            fill_holes: true,
        }
    }
}

impl MaskCleaner {
    pub fn new(kernel_size: u32, fill_holes: bool) -> Self {
        Self { kernel_size, fill_holes, ..Self::default() }
    }

    /// Return a cleaned copy of `mask`; the input is left untouched.
    pub fn clean(&self, mask: &BinaryMask) -> BinaryMask {
        if mask.is_empty() {
            return mask.clone();
        }

        let radius = self.kernel_size / 2;
        let mut image = mask.as_image().clone();
        // Repeating a square dilation n times equals one dilation with n times the radius.
        if let Some(k) = scaled_radius(radius, self.close_iterations) {
            image = morphology::close(&image, Norm::LInf, k);
        }
        if let Some(k) = scaled_radius(radius, self.open_iterations) {
            image = morphology::open(&image, Norm::LInf, k);
        }

        let cleaned = BinaryMask::from_image(image);
        if self.fill_holes { fill_holes(&cleaned) } else { cleaned }
    }
}

fn scaled_radius(radius: u32, iterations: u32) -> Option<u8> {
    let scaled = radius.saturating_mul(iterations);
    (scaled > 0).then(|| scaled.min(u8::MAX as u32) as u8)
}

/// Clean with the default iteration counts.
pub fn clean(mask: &BinaryMask, kernel_size: u32, fill_holes: bool) -> BinaryMask {
    MaskCleaner::new(kernel_size, fill_holes).clean(mask)
}

/// Flip every background pixel that cannot reach the image border through
/// 4-connected background to foreground.
pub fn fill_holes(mask: &BinaryMask) -> BinaryMask {
    let (width, height) = (mask.width(), mask.height());
    let mut outside = vec![false; width as usize * height as usize];
    let mut queue = VecDeque::new();
    let index = |x: u32, y: u32| (y * width + x) as usize;

    let border = (0..width)
        .flat_map(|x| [(x, 0), (x, height - 1)])
        .chain((0..height).flat_map(|y| [(0, y), (width - 1, y)]));
    for (x, y) in border {
        if !mask.get(x, y) && !outside[index(x, y)] {
            outside[index(x, y)] = true;
            queue.push_back((x, y));
        }
    }

    while let Some((x, y)) = queue.pop_front() {
        for (nx, ny) in neighbors4(x, y, width, height) {
            let i = index(nx, ny);
            if !outside[i] && !mask.get(nx, ny) {
                outside[i] = true;
                queue.push_back((nx, ny));
            }
        }
    }

    BinaryMask::from_fn(width, height, |x, y| mask.get(x, y) || !outside[index(x, y)])
}

pub(crate) fn neighbors4(x: u32, y: u32, width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    let left = x.checked_sub(1).map(|nx| (nx, y));
    let right = (x + 1 < width).then(|| (x + 1, y));
    let up = y.checked_sub(1).map(|ny| (x, ny));
    let down = (y + 1 < height).then(|| (x, y + 1));
    [left, right, up, down].into_iter().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_mask() -> BinaryMask {
        // 5x5 square outline with a 3x3 hole, inside a 9x9 canvas
        BinaryMask::from_fn(9, 9, |x, y| {
            let inside = (2..=6).contains(&x) && (2..=6).contains(&y);
            let hole = (3..=5).contains(&x) && (3..=5).contains(&y);
            inside && !hole
        })
    }

    #[test]
    fn fill_holes_closes_enclosed_background() {
        let filled = fill_holes(&ring_mask());
        assert_eq!(filled.count(), 25);
        assert!(filled.get(4, 4));
        assert!(!filled.get(0, 0));
    }

    #[test]
    fn fill_holes_keeps_background_open_to_border() {
        let open_ring = BinaryMask::from_fn(9, 9, |x, y| {
            let inside = (2..=6).contains(&x) && (2..=6).contains(&y);
            let hole = (3..=5).contains(&x) && (3..=5).contains(&y);
            let notch = x == 4 && y == 2;
            inside && !hole && !notch
        });
        assert_eq!(fill_holes(&open_ring), open_ring);
    }

    #[test]
    fn degenerate_masks_pass_through() {
        let empty = BinaryMask::new(6, 6);
        assert_eq!(clean(&empty, 3, true), empty);

        let full = BinaryMask::from_fn(6, 6, |_, _| true);
        assert_eq!(clean(&full, 3, true), full);
    }

    #[test]
    fn open_removes_isolated_speckle() {
        let mask = BinaryMask::from_fn(40, 40, |x, y| {
            let block = (5..25).contains(&x) && (5..25).contains(&y);
            block || (x == 35 && y == 35)
        });
        let cleaned = clean(&mask, 3, false);
        assert!(!cleaned.get(35, 35));
        assert!(cleaned.get(15, 15));
        assert!(cleaned.get(5, 5));
    }

    #[test]
    fn close_bridges_single_pixel_gap() {
        let mask = BinaryMask::from_fn(40, 20, |x, y| (5..15).contains(&y) && (5..35).contains(&x) && x != 14);
        let cleaned = clean(&mask, 3, false);
        assert!(cleaned.get(14, 10));
        assert!(!cleaned.get(1, 1));
    }

    #[test]
    fn clean_does_not_mutate_input() {
        let mask = ring_mask();
        let before = mask.clone();
        let _ = clean(&mask, 3, true);
        assert_eq!(mask, before);
    }
}
