use crate::error::PipelineError;
use image::{imageops::FilterType, DynamicImage, GenericImageView, GrayImage};
use imageproc::filter::gaussian_blur_f32;

/// Decode raw bytes into a pixel grid
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::InvalidImage("empty payload".to_string()));
    }

    let image = image::load_from_memory(bytes)
        .map_err(|e| PipelineError::InvalidImage(format!("Failed to decode image: {}", e)))?;

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PipelineError::InvalidImage(format!(
            "image has no pixels ({}x{})",
            width, height
        )));
    }

    Ok(image)
}

/// Downscale so that neither side exceeds its cap, preserving aspect ratio.
/// Images already inside the cap are returned untouched; nothing is upscaled.
pub fn cap_size(image: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    if width <= max_width && height <= max_height {
        return image;
    }

    let scale = (max_width as f32 / width as f32).min(max_height as f32 / height as f32);
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, max_width);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, max_height);

    tracing::debug!(
        "Downscaling page {}x{} -> {}x{} (scale {:.3})",
        width,
        height,
        new_width,
        new_height,
        scale
    );

    image.resize_exact(new_width, new_height, FilterType::Lanczos3)
}

/// Single-channel intensity, optionally smoothed to suppress scanner noise.
/// A non-positive sigma disables smoothing.
pub fn intensity(image: &DynamicImage, smoothing_sigma: f32) -> GrayImage {
    let gray = image.to_luma8();
    if smoothing_sigma > 0.0 {
        gaussian_blur_f32(&gray, smoothing_sigma)
    } else {
        gray
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Luma, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidImage(_)));
    }

    #[test]
    fn test_decode_rejects_empty_buffer() {
        assert!(matches!(decode(&[]), Err(PipelineError::InvalidImage(_))));
    }

    #[test]
    fn test_decode_reads_png() {
        let img = RgbImage::from_pixel(40, 30, Rgb([200, 10, 10]));
        let decoded = decode(&png_bytes(&img)).unwrap();
        assert_eq!(decoded.dimensions(), (40, 30));
    }

    #[test]
    fn test_cap_size_preserves_aspect_ratio() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(4000, 1000));
        let resized = cap_size(img, 2000, 2000);
        assert_eq!(resized.dimensions(), (2000, 500));
    }

    #[test]
    fn test_cap_size_uses_tighter_axis() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(1000, 3000));
        let resized = cap_size(img, 2000, 1500);
        assert_eq!(resized.dimensions(), (500, 1500));
    }

    #[test]
    fn test_cap_size_never_upscales() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(300, 200));
        let resized = cap_size(img, 2000, 2000);
        assert_eq!(resized.dimensions(), (300, 200));
    }

    #[test]
    fn test_intensity_without_smoothing_is_plain_luma() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(10, 10, |x, _| {
            Luma([if x < 5 { 0 } else { 255 }])
        }));
        let gray = intensity(&img, 0.0);
        assert_eq!(gray.get_pixel(4, 5).0[0], 0);
        assert_eq!(gray.get_pixel(5, 5).0[0], 255);
    }

    #[test]
    fn test_intensity_smoothing_softens_edges() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(20, 20, |x, _| {
            Luma([if x < 10 { 0 } else { 255 }])
        }));
        let gray = intensity(&img, 1.0);
        let edge = gray.get_pixel(10, 10).0[0];
        assert!(edge > 0 && edge < 255, "edge pixel should be blended, got {}", edge);
    }
}
