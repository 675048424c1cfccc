//! Perceptual color clustering of a whole image into a label map.
//!
//! Pixels are converted to CIELAB (scaled to the 8-bit range: `L * 255 / 100`,
//! `a + 128`, `b + 128`) and clustered with Lloyd's k-means, seeded with
//! k-means++. Several restarts run and the most compact result wins.

use image::RgbImage;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use tracing::debug;

use crate::{
    cancel::CancelToken,
    error::{Result, ZoneError},
    types::LabelMap,
};

type Lab = [f32; 3];

/// k-means color segmenter.
#[derive(Debug, Clone)]
pub struct ColorSegmenter {
    pub k: usize,
    /// Independent k-means++ restarts; the most compact labelling is kept.
    pub attempts: usize,
    pub max_iterations: usize,
    /// Stop once no center moves further than this between iterations.
    pub epsilon: f32,
    pub seed: Option<u64>,
}

impl ColorSegmenter {
    pub const MIN_CLUSTERS: usize = 2;
    pub const MAX_CLUSTERS: usize = 256;

    pub fn new(k: usize) -> Self {
        Self {
            k,
            attempts: 10,
            max_iterations: 100,
            epsilon: 0.2,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn segment(&self, image: &RgbImage) -> Result<LabelMap> {
        self.segment_with_cancel(image, &CancelToken::new())
    }

    pub fn segment_with_cancel(&self, image: &RgbImage, cancel: &CancelToken) -> Result<LabelMap> {
        if !(Self::MIN_CLUSTERS..=Self::MAX_CLUSTERS).contains(&self.k) {
            return Err(ZoneError::InvalidSettings(format!(
                "cluster count must be in [{}, {}], got {}",
                Self::MIN_CLUSTERS,
                Self::MAX_CLUSTERS,
                self.k
            )));
        }

        let pixels: Vec<Lab> = image.pixels().map(|p| rgb_to_lab8(p.0)).collect();
        // Never ask for more centers than there are samples.
        let k = self.k.min(pixels.len());
        let mut rng = StdRng::seed_from_u64(self.seed.unwrap_or_else(rand::random));

        let mut best: Option<(f64, Vec<u16>)> = None;
        for attempt in 0..self.attempts.max(1) {
            cancel.check()?;
            let (compactness, labels) = self.run_attempt(&pixels, k, &mut rng, cancel)?;
            debug!(attempt, compactness, "k-means attempt finished");
            if best.as_ref().is_none_or(|(score, _)| compactness < *score) {
                best = Some((compactness, labels));
            }
        }

        let labels = best.map(|(_, labels)| labels).unwrap_or_default();
        debug!(k = self.k, pixels = pixels.len(), "color segmentation complete");
        Ok(LabelMap::new(image.width(), image.height(), self.k, labels))
    }

    fn run_attempt(
        &self,
        pixels: &[Lab],
        k: usize,
        rng: &mut StdRng,
        cancel: &CancelToken,
    ) -> Result<(f64, Vec<u16>)> {
        let mut centers = kmeans_plus_plus(pixels, k, rng);
        let mut labels = vec![0u16; pixels.len()];

        for _ in 0..self.max_iterations {
            cancel.check()?;
            assign_labels(pixels, &centers, &mut labels);
            let updated = update_centers(pixels, &labels, &centers);
            let max_shift = centers
                .iter()
                .zip(&updated)
                .map(|(old, new)| distance_sq(old, new))
                .fold(0.0f32, f32::max)
                .sqrt();
            centers = updated;
            if max_shift <= self.epsilon {
                break;
            }
        }

        assign_labels(pixels, &centers, &mut labels);
        let compactness = pixels
            .iter()
            .zip(&labels)
            .map(|(p, &label)| distance_sq(p, &centers[label as usize]) as f64)
            .sum();
        Ok((compactness, labels))
    }
}

/// Convenience wrapper: cluster `image` into `k` color groups.
pub fn segment(image: &RgbImage, k: usize) -> Result<LabelMap> {
    ColorSegmenter::new(k).segment(image)
}

/// k-means++ initialisation: each further center is drawn with probability
/// proportional to the squared distance to the nearest chosen center.
fn kmeans_plus_plus(pixels: &[Lab], k: usize, rng: &mut StdRng) -> Vec<Lab> {
    let mut centers = Vec::with_capacity(k);
    centers.push(pixels[rng.random_range(0..pixels.len())]);

    let mut nearest: Vec<f32> = pixels.par_iter().map(|p| distance_sq(p, &centers[0])).collect();

    while centers.len() < k {
        let total: f64 = nearest.iter().map(|&d| d as f64).sum();
        let chosen = if total <= 0.0 {
            // Every sample already coincides with a center.
            rng.random_range(0..pixels.len())
        } else {
            let threshold = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            nearest
                .iter()
                .position(|&d| {
                    cumulative += d as f64;
                    cumulative >= threshold
                })
                .unwrap_or(pixels.len() - 1)
        };

        let center = pixels[chosen];
        centers.push(center);
        nearest
            .par_iter_mut()
            .zip(pixels.par_iter())
            .for_each(|(d, p)| *d = d.min(distance_sq(p, &center)));
    }

    centers
}

fn assign_labels(pixels: &[Lab], centers: &[Lab], labels: &mut [u16]) {
    labels
        .par_iter_mut()
        .zip(pixels.par_iter())
        .for_each(|(label, p)| *label = nearest_center(p, centers));
}

fn nearest_center(p: &Lab, centers: &[Lab]) -> u16 {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, c) in centers.iter().enumerate() {
        let d = distance_sq(p, c);
        if d < best_distance {
            best_distance = d;
            best = i;
        }
    }
    best as u16
}

/// Mean of each cluster; a cluster that lost all members keeps its previous center.
fn update_centers(pixels: &[Lab], labels: &[u16], previous: &[Lab]) -> Vec<Lab> {
    let mut sums = vec![[0.0f64; 3]; previous.len()];
    let mut counts = vec![0usize; previous.len()];
    for (p, &label) in pixels.iter().zip(labels) {
        let sum = &mut sums[label as usize];
        sum[0] += p[0] as f64;
        sum[1] += p[1] as f64;
        sum[2] += p[2] as f64;
        counts[label as usize] += 1;
    }

    sums.iter()
        .zip(&counts)
        .zip(previous)
        .map(|((sum, &count), old)| {
            if count == 0 {
                *old
            } else {
                let n = count as f64;
                [(sum[0] / n) as f32, (sum[1] / n) as f32, (sum[2] / n) as f32]
            }
        })
        .collect()
}

#[inline]
fn distance_sq(a: &Lab, b: &Lab) -> f32 {
    let dl = a[0] - b[0];
    let da = a[1] - b[1];
    let db = a[2] - b[2];
    dl * dl + da * da + db * db
}

/// sRGB to CIELAB (D65), scaled to the 8-bit Lab range.
pub fn rgb_to_lab8(rgb: [u8; 3]) -> [f32; 3] {
    let r = srgb_to_linear(rgb[0] as f32 / 255.0);
    let g = srgb_to_linear(rgb[1] as f32 / 255.0);
    let b = srgb_to_linear(rgb[2] as f32 / 255.0);

    let x = (r * 0.412_456_4 + g * 0.357_576_1 + b * 0.180_437_5) / 0.950_47;
    let y = r * 0.212_672_9 + g * 0.715_152_2 + b * 0.072_175;
    let z = (r * 0.019_333_9 + g * 0.119_192 + b * 0.950_304_1) / 1.088_83;

    let fx = lab_f(x);
    let fy = lab_f(y);
    let fz = lab_f(z);

    let l = 116.0 * fy - 16.0;
    let a = 500.0 * (fx - fy);
    let b = 200.0 * (fy - fz);
    [l * 255.0 / 100.0, a + 128.0, b + 128.0]
}

/// Inverse of [`rgb_to_lab8`], clamped to the sRGB gamut.
pub fn lab8_to_rgb(lab: [f32; 3]) -> [u8; 3] {
    let l = lab[0] * 100.0 / 255.0;
    let fy = (l + 16.0) / 116.0;
    let fx = fy + (lab[1] - 128.0) / 500.0;
    let fz = fy - (lab[2] - 128.0) / 200.0;

    let x = lab_f_inv(fx) * 0.950_47;
    let y = lab_f_inv(fy);
    let z = lab_f_inv(fz) * 1.088_83;

    let r = x * 3.240_454_2 - y * 1.537_138_5 - z * 0.498_531_4;
    let g = -x * 0.969_266 + y * 1.876_010_8 + z * 0.041_556;
    let b = x * 0.055_643_4 - y * 0.204_025_9 + z * 1.057_225_2;
    [to_u8(linear_to_srgb(r)), to_u8(linear_to_srgb(g)), to_u8(linear_to_srgb(b))]
}

fn lab_f_inv(t: f32) -> f32 {
    let delta: f32 = 6.0 / 29.0;
    if t > delta {
        t * t * t
    } else {
        3.0 * delta * delta * (t - 4.0 / 29.0)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn to_u8(c: f32) -> u8 {
    (c.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn lab_f(t: f32) -> f32 {
    let delta: f32 = 6.0 / 29.0;
    if t > delta.powi(3) {
        t.cbrt()
    } else {
        t / (3.0 * delta * delta) + 4.0 / 29.0
    }
}

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}
