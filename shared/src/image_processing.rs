use image::{imageops::FilterType, DynamicImage, ImageFormat};
use std::io::Cursor;

/// Avatars are shrunk to fit inside this square.
pub const AVATAR_MAX_PX: u32 = 500;

/// Only JPEG and PNG uploads are accepted.
pub fn detect_format(image_bytes: &[u8]) -> Result<ImageFormat, String> {
    match image::guess_format(image_bytes) {
        Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png)) => Ok(format),
        Ok(other) => Err(format!("Unsupported image format: {:?}", other)),
        Err(e) => Err(format!("Unrecognised image data: {}", e)),
    }
}

/// Dimensions that fit inside `max` x `max`, keeping the aspect ratio and
/// never enlarging.
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let scale = f64::from(max) / f64::from(width.max(height));
    let scaled = |v: u32| ((f64::from(v) * scale).round() as u32).max(1);
    (scaled(width), scaled(height))
}

/// Decode, shrink to fit the avatar box and re-encode as JPEG.
/// Returns (width, height, jpeg_bytes).
pub fn prepare_avatar(image_bytes: &[u8]) -> Result<(u32, u32, Vec<u8>), String> {
    let format = detect_format(image_bytes)?;
    let img = image::load_from_memory_with_format(image_bytes, format)
        .map_err(|e| format!("Failed to load image: {}", e))?;

    let (width, height) = fit_within(img.width(), img.height(), AVATAR_MAX_PX);
    let img = if (width, height) == (img.width(), img.height()) {
        img
    } else {
        img.resize_exact(width, height, FilterType::Lanczos3)
    };

    // JPEG has no alpha channel
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Cursor::new(Vec::new());
    rgb.write_to(&mut buf, ImageFormat::Jpeg)
        .map_err(|e| format!("Failed to encode JPEG: {}", e))?;

    Ok((width, height, buf.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 128]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(1000, 400, 500), (500, 200));
        assert_eq!(fit_within(300, 900, 500), (167, 500));
        assert_eq!(fit_within(120, 80, 500), (120, 80));
        assert_eq!(fit_within(5000, 2, 500), (500, 1));
    }

    #[test]
    fn test_large_png_is_shrunk_to_jpeg() {
        let (width, height, jpeg) = prepare_avatar(&png(1000, 400)).unwrap();
        assert_eq!((width, height), (500, 200));
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (500, 200));
    }

    #[test]
    fn test_small_image_is_not_enlarged() {
        let (width, height, _) = prepare_avatar(&png(64, 48)).unwrap();
        assert_eq!((width, height), (64, 48));
    }

    #[test]
    fn test_rejects_non_images() {
        assert!(prepare_avatar(b"definitely not an image").is_err());
    }
}
