pub mod geojson;

use std::path::Path;

use base64::{Engine, engine::general_purpose::STANDARD};
use image::{DynamicImage, Rgb, RgbImage};

use crate::error::{Result, ZoneError};

/// Decode an encoded image (PNG, JPEG, TIFF). Transparent pixels are
/// composited over white.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(ZoneError::Decode("empty image payload".to_string()));
    }
    Ok(flatten(image::load_from_memory(bytes)?))
}

/// Decode a base64 payload, with or without a `data:<mime>;base64,` prefix.
pub fn decode_base64_image(payload: &str) -> Result<RgbImage> {
    let data = match payload.split_once(',') {
        Some((header, data)) if header.starts_with("data:") => data,
        _ => payload,
    };
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| ZoneError::Decode(format!("invalid base64: {}", e)))?;
    decode_image(&bytes)
}

pub fn open_image(path: impl AsRef<Path>) -> Result<RgbImage> {
    Ok(flatten(image::open(path)?))
}

fn flatten(image: DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let over_white = |c: u8| ((c as u32 * a as u32 + 255 * (255 - a as u32) + 127) / 255) as u8;
        Rgb([over_white(r), over_white(g), over_white(b)])
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;

    fn png_bytes(image: DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn transparent_pixels_become_white() {
        let mut rgba = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        rgba.put_pixel(1, 0, Rgba([10, 20, 30, 255]));
        let decoded = decode_image(&png_bytes(DynamicImage::ImageRgba8(rgba))).unwrap();
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(decoded.get_pixel(1, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn base64_with_data_url_prefix() {
        let rgb = RgbImage::from_pixel(3, 2, Rgb([1, 2, 3]));
        let encoded = STANDARD.encode(png_bytes(DynamicImage::ImageRgb8(rgb.clone())));

        assert_eq!(decode_base64_image(&encoded).unwrap(), rgb);
        let with_prefix = format!("data:image/png;base64,{}", encoded);
        assert_eq!(decode_base64_image(&with_prefix).unwrap(), rgb);
    }

    #[test]
    fn malformed_payloads_fail() {
        assert!(matches!(decode_base64_image("!!not base64!!"), Err(ZoneError::Decode(_))));
        assert!(matches!(decode_image(&[]), Err(ZoneError::Decode(_))));
        assert!(matches!(decode_image(b"not an image"), Err(ZoneError::ImageLoad(_))));
    }
}
