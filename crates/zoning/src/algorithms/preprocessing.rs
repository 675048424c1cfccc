use image::{Rgb, Rgb32FImage, RgbImage};
use crate::{
    algorithms::segmentation::{lab8_to_rgb, rgb_to_lab8},
    error::Result,
    traits::ImagePreprocessor,
};

/// Gaussian blur preprocessor for noise reduction ahead of clustering.
///
/// The kernel spans three sigmas and is normalized to unit sum, so flat
/// regions keep their color; image borders are clamped.
#[derive(Debug, Clone)]
pub struct GaussianDenoisePreprocessor {
    pub sigma: f32,
}

impl Default for GaussianDenoisePreprocessor {
    fn default() -> Self {
        Self { sigma: 1.0 }
    }
}

impl GaussianDenoisePreprocessor {
    fn kernel(&self) -> Vec<f32> {
        let radius = (3.0 * self.sigma).ceil().max(1.0) as i32;
        let weights: Vec<f32> = (-radius..=radius)
            .map(|i| (-(i * i) as f32 / (2.0 * self.sigma * self.sigma)).exp())
            .collect();
        let total: f32 = weights.iter().sum();
        weights.into_iter().map(|w| w / total).collect()
    }
}

impl ImagePreprocessor for GaussianDenoisePreprocessor {
    fn preprocess(&self, image: &RgbImage) -> Result<RgbImage> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(image.clone());
        }
        // filter in f32 so the two passes round once instead of truncating twice
        let float = Rgb32FImage::from_fn(image.width(), image.height(), |x, y| {
            Rgb(image.get_pixel(x, y).0.map(f32::from))
        });
        let blurred = imageproc::filter::separable_filter_equal(&float, &self.kernel());
        Ok(RgbImage::from_fn(image.width(), image.height(), |x, y| {
            Rgb(blurred.get_pixel(x, y).0.map(|c| c.round().clamp(0.0, 255.0) as u8))
        }))
    }
}

/// Contrast-limited adaptive histogram equalization of the CIELAB lightness
/// channel; chroma is left as is.
///
/// The image is split into a `grid x grid` layout of tiles. Each tile's
/// lightness histogram is clipped at `clip_limit` times the uniform bin height,
/// the excess is spread over all bins, and per-pixel mappings are bilinearly
/// interpolated between the four nearest tile centers.
#[derive(Debug, Clone)]
pub struct ContrastEnhancePreprocessor {
    pub clip_limit: f32,
    pub grid: u32,
}

impl Default for ContrastEnhancePreprocessor {
    fn default() -> Self {
        Self { clip_limit: 2.0, grid: 8 }
    }
}

impl ImagePreprocessor for ContrastEnhancePreprocessor {
    fn preprocess(&self, image: &RgbImage) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(image.clone());
        }

        let lab: Vec<[f32; 3]> = image.pixels().map(|p| rgb_to_lab8(p.0)).collect();
        let lightness: Vec<u8> = lab.iter().map(|p| p[0].round().clamp(0.0, 255.0) as u8).collect();
        let equalized = clahe(&lightness, width, height, self.grid.max(1), self.clip_limit);

        Ok(RgbImage::from_fn(width, height, |x, y| {
            let i = (y * width + x) as usize;
            let [_, a, b] = lab[i];
            Rgb(lab8_to_rgb([equalized[i], a, b]))
        }))
    }
}

fn clahe(values: &[u8], width: u32, height: u32, grid: u32, clip_limit: f32) -> Vec<f32> {
    let (w, h) = (width as usize, height as usize);
    let tile_w = w.div_ceil(grid as usize).max(1);
    let tile_h = h.div_ceil(grid as usize).max(1);
    let tiles_x = w.div_ceil(tile_w);
    let tiles_y = h.div_ceil(tile_h);

    let mut luts: Vec<[f32; 256]> = Vec::with_capacity(tiles_x * tiles_y);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let (x0, y0) = (tx * tile_w, ty * tile_h);
            let (x1, y1) = ((x0 + tile_w).min(w), (y0 + tile_h).min(h));

            let mut histogram = [0u32; 256];
            for y in y0..y1 {
                for &v in &values[y * w + x0..y * w + x1] {
                    histogram[v as usize] += 1;
                }
            }
            let count = ((x1 - x0) * (y1 - y0)) as u32;
            luts.push(clipped_lut(histogram, count, clip_limit));
        }
    }

    let mut output = Vec::with_capacity(values.len());
    for y in 0..h {
        let (ty0, ty1, wy) = neighbours(y, tile_h, tiles_y);
        for x in 0..w {
            let (tx0, tx1, wx) = neighbours(x, tile_w, tiles_x);
            let v = values[y * w + x] as usize;
            let top = luts[ty0 * tiles_x + tx0][v] * (1.0 - wx) + luts[ty0 * tiles_x + tx1][v] * wx;
            let bottom = luts[ty1 * tiles_x + tx0][v] * (1.0 - wx) + luts[ty1 * tiles_x + tx1][v] * wx;
            output.push(top * (1.0 - wy) + bottom * wy);
        }
    }
    output
}

/// Clip the histogram, spread the excess evenly, and return the scaled CDF.
fn clipped_lut(mut histogram: [u32; 256], count: u32, clip_limit: f32) -> [f32; 256] {
    let mut lut = [0.0f32; 256];
    if count == 0 {
        return lut;
    }

    let threshold = ((clip_limit * count as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in histogram.iter_mut() {
        if *bin > threshold {
            excess += *bin - threshold;
            *bin = threshold;
        }
    }
    let (share, remainder) = (excess / 256, excess % 256);
    for (i, bin) in histogram.iter_mut().enumerate() {
        *bin += share + u32::from((i as u32) < remainder);
    }

    let mut cumulative = 0u32;
    for (entry, bin) in lut.iter_mut().zip(histogram) {
        cumulative += bin;
        *entry = cumulative as f32 * 255.0 / count as f32;
    }
    lut
}

/// The two tile indices whose centers bracket `pos`, and the weight of the second.
fn neighbours(pos: usize, tile: usize, tiles: usize) -> (usize, usize, f32) {
    let t = (pos as f32 + 0.5) / tile as f32 - 0.5;
    if t <= 0.0 {
        return (0, 0, 0.0);
    }
    let first = (t.floor() as usize).min(tiles - 1);
    let second = (first + 1).min(tiles - 1);
    (first, second, t - first as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_image_is_unchanged_by_blur() {
        let image = RgbImage::from_pixel(8, 8, Rgb([40, 90, 200]));
        let blurred = GaussianDenoisePreprocessor { sigma: 1.5 }.preprocess(&image).unwrap();
        assert_eq!(blurred.dimensions(), (8, 8));
        for pixel in blurred.pixels() {
            for (channel, expected) in pixel.0.iter().zip([40u8, 90, 200]) {
                assert!(channel.abs_diff(expected) <= 1);
            }
        }
    }

    #[test]
    fn blur_kernel_sums_to_one() {
        for sigma in [0.5, 1.0, 1.5, 4.0] {
            let kernel = GaussianDenoisePreprocessor { sigma }.kernel();
            assert_eq!(kernel.len() % 2, 1);
            assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn blur_keeps_border_colors() {
        // left half red, right half blue: the outer columns stay pure
        let image = RgbImage::from_fn(30, 6, |x, _| if x < 15 { Rgb([220, 30, 30]) } else { Rgb([30, 40, 210]) });
        let blurred = GaussianDenoisePreprocessor::default().preprocess(&image).unwrap();
        for y in 0..6 {
            assert!(blurred.get_pixel(0, y).0[0].abs_diff(220) <= 1);
            assert!(blurred.get_pixel(29, y).0[2].abs_diff(210) <= 1);
        }
        // the seam is softened
        let seam = blurred.get_pixel(14, 3).0;
        assert!(seam[0] < 220 && seam[2] > 30);
    }

    #[test]
    fn contrast_stretches_a_dim_gradient() {
        let image = RgbImage::from_fn(64, 64, |x, _| {
            let v = 100 + (x / 8) as u8 * 4;
            Rgb([v, v, v])
        });
        let enhanced = ContrastEnhancePreprocessor::default().preprocess(&image).unwrap();
        assert_eq!(enhanced.dimensions(), (64, 64));

        let spread = |img: &RgbImage| {
            let values: Vec<u8> = img.pixels().map(|p| p.0[1]).collect();
            values.iter().max().unwrap() - values.iter().min().unwrap()
        };
        assert!(spread(&enhanced) > spread(&image));
        // gray stays gray
        for pixel in enhanced.pixels() {
            let [r, g, b] = pixel.0;
            assert!(r.abs_diff(g) <= 2 && g.abs_diff(b) <= 2, "{:?}", pixel);
        }
    }

    #[test]
    fn contrast_keeps_flat_regions_distinct() {
        let image = RgbImage::from_fn(40, 40, |x, _| if x < 20 { Rgb([250, 240, 200]) } else { Rgb([200, 230, 250]) });
        let enhanced = ContrastEnhancePreprocessor::default().preprocess(&image).unwrap();
        let left = enhanced.get_pixel(2, 20).0;
        let right = enhanced.get_pixel(37, 20).0;
        assert_ne!(left, right);
        assert!(left[2] < left[0], "left stays warm: {:?}", left);
        assert!(right[0] < right[2], "right stays cool: {:?}", right);
    }

    #[test]
    fn flat_image_is_nearly_unchanged_by_contrast() {
        let image = RgbImage::from_pixel(16, 16, Rgb([255, 255, 255]));
        let enhanced = ContrastEnhancePreprocessor::default().preprocess(&image).unwrap();
        for pixel in enhanced.pixels() {
            assert!(pixel.0.iter().all(|&c| c >= 253), "{:?}", pixel);
        }
    }
}
