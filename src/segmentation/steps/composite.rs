use crate::error::PipelineError;
use crate::segmentation::block::TextBlock;
use image::{imageops, ImageFormat, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Axis along which blocks are concatenated
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CompositeAxis {
    /// Stack blocks top to bottom; widths are normalised
    #[default]
    Vertical,
    /// Place blocks left to right; heights are normalised
    Horizontal,
}

impl CompositeAxis {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "vertical" | "v" => Some(Self::Vertical),
            "horizontal" | "h" => Some(Self::Horizontal),
            _ => None,
        }
    }
}

/// Blocks concatenated in sequence order into one raster
#[derive(Debug, Clone)]
pub struct CompositeImage {
    pub image: RgbImage,
    pub block_count: usize,
}

impl CompositeImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, PipelineError> {
        encode_png(&self.image)
    }
}

/// Concatenate blocks along `axis`, padding each to the widest (vertical) or
/// tallest (horizontal) block with `background`. Block pixels are copied
/// unscaled; `gap` background pixels separate consecutive blocks.
pub fn compose(
    blocks: &[TextBlock],
    axis: CompositeAxis,
    gap: u32,
    background: Rgb<u8>,
) -> Result<CompositeImage, PipelineError> {
    if blocks.is_empty() {
        return Err(PipelineError::NoBlocksDetected);
    }

    let gaps = gap * (blocks.len() as u32 - 1);
    let (width, height) = match axis {
        CompositeAxis::Vertical => (
            blocks.iter().map(|b| b.image.width()).max().unwrap_or(0),
            blocks.iter().map(|b| b.image.height()).sum::<u32>() + gaps,
        ),
        CompositeAxis::Horizontal => (
            blocks.iter().map(|b| b.image.width()).sum::<u32>() + gaps,
            blocks.iter().map(|b| b.image.height()).max().unwrap_or(0),
        ),
    };

    let mut canvas = RgbImage::from_pixel(width, height, background);
    let mut offset = 0u32;
    for block in blocks {
        let (x, y) = match axis {
            CompositeAxis::Vertical => (0, offset),
            CompositeAxis::Horizontal => (offset, 0),
        };
        imageops::replace(&mut canvas, &block.image, x as i64, y as i64);
        offset += gap
            + match axis {
                CompositeAxis::Vertical => block.image.height(),
                CompositeAxis::Horizontal => block.image.width(),
            };
    }

    tracing::debug!(
        "Composited {} blocks into {}x{} ({:?})",
        blocks.len(),
        width,
        height,
        axis
    );

    Ok(CompositeImage {
        image: canvas,
        block_count: blocks.len(),
    })
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| PipelineError::Internal(format!("Failed to encode PNG: {}", e)))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::block::BoundingBox;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

    fn block(w: u32, h: u32, shade: u8) -> TextBlock {
        TextBlock {
            bbox: BoundingBox::new(0, 0, w, h),
            image: RgbImage::from_pixel(w, h, Rgb([shade, shade, shade])),
            stamp_ratio: 0.0,
        }
    }

    #[test]
    fn test_empty_sequence_is_reported() {
        let err = compose(&[], CompositeAxis::Vertical, 0, WHITE).unwrap_err();
        assert!(matches!(err, PipelineError::NoBlocksDetected));
    }

    #[test]
    fn test_vertical_dimensions() {
        let blocks = vec![block(120, 30, 10), block(200, 40, 20), block(90, 25, 30)];
        let composite = compose(&blocks, CompositeAxis::Vertical, 0, WHITE).unwrap();
        assert_eq!(composite.width(), 200);
        assert_eq!(composite.height(), 95);
        assert_eq!(composite.block_count, 3);
    }

    #[test]
    fn test_horizontal_dimensions_with_gap() {
        let blocks = vec![block(120, 30, 10), block(200, 40, 20), block(90, 25, 30)];
        let composite = compose(&blocks, CompositeAxis::Horizontal, 4, WHITE).unwrap();
        assert_eq!(composite.width(), 410 + 8);
        assert_eq!(composite.height(), 40);
    }

    #[test]
    fn test_block_pixels_copied_in_order_and_padding_is_background() {
        let blocks = vec![block(50, 10, 10), block(80, 20, 20)];
        let composite = compose(&blocks, CompositeAxis::Vertical, 0, WHITE).unwrap();
        let img = &composite.image;

        // First block then its right padding
        assert_eq!(*img.get_pixel(0, 0), Rgb([10, 10, 10]));
        assert_eq!(*img.get_pixel(49, 9), Rgb([10, 10, 10]));
        assert_eq!(*img.get_pixel(50, 5), WHITE);
        // Second block starts right below the first
        assert_eq!(*img.get_pixel(0, 10), Rgb([20, 20, 20]));
        assert_eq!(*img.get_pixel(79, 29), Rgb([20, 20, 20]));
    }

    #[test]
    fn test_png_encoding_decodes_back() {
        let blocks = vec![block(30, 10, 0)];
        let composite = compose(&blocks, CompositeAxis::Vertical, 0, WHITE).unwrap();
        let bytes = composite.encode_png().unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.to_rgb8(), composite.image);
    }
}
