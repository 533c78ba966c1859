use crate::config::SegmentationConfig;
use crate::segmentation::block::{BoundingBox, TextBlock};
use image::{imageops, GenericImageView, Rgb, RgbImage};
use serde::Serialize;

/// Colour band used to recognise official ink stamps.
///
/// Hue is in degrees `[0, 360)`; saturation and value are in `[0, 1]`.
/// A range whose start exceeds its end wraps through 0, so red is `(340, 20)`.
#[derive(Debug, Clone, Serialize)]
pub struct StampColor {
    pub hue_ranges: Vec<(f32, f32)>,
    pub min_saturation: f32,
    pub min_value: f32,
    /// Blocks whose stamp-coloured share exceeds this are dropped
    pub max_ratio: f32,
}

impl StampColor {
    pub fn red() -> Self {
        Self {
            hue_ranges: vec![(340.0, 20.0)],
            min_saturation: 0.35,
            min_value: 0.25,
            max_ratio: 0.2,
        }
    }

    fn matches(&self, pixel: &Rgb<u8>) -> bool {
        let (hue, saturation, value) = rgb_to_hsv(pixel);
        if saturation < self.min_saturation || value < self.min_value {
            return false;
        }
        self.hue_ranges.iter().any(|&(start, end)| {
            if start <= end {
                (start..=end).contains(&hue)
            } else {
                hue >= start || hue <= end
            }
        })
    }
}

/// Why a candidate was dropped
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    TooSmall,
    TooLarge,
    AspectRatio,
    Stamp(f32),
}

/// Apply the rejection rules in order and crop the survivors.
///
/// Surviving boxes are grown by the configured margin (clamped to the page)
/// before cropping so ascenders and descenders are not clipped.
pub fn filter_blocks(
    candidates: Vec<BoundingBox>,
    page: &RgbImage,
    config: &SegmentationConfig,
) -> Vec<TextBlock> {
    let (page_width, page_height) = page.dimensions();
    let candidate_count = candidates.len();
    let mut rejected = [0usize; 4];

    let blocks: Vec<TextBlock> = candidates
        .into_iter()
        .filter_map(|bbox| match evaluate(&bbox, page, config) {
            Ok(stamp_ratio) => {
                let bbox = bbox.expand(config.block_margin, page_width, page_height);
                debug_assert!(bbox.within(page_width, page_height));
                let image = imageops::crop_imm(page, bbox.x, bbox.y, bbox.w, bbox.h).to_image();
                Some(TextBlock {
                    bbox,
                    image,
                    stamp_ratio,
                })
            }
            Err(reason) => {
                let slot = match reason {
                    Rejection::TooSmall => 0,
                    Rejection::TooLarge => 1,
                    Rejection::AspectRatio => 2,
                    Rejection::Stamp(ratio) => {
                        tracing::debug!("Rejected stamp block {:?} (ratio {:.2})", bbox, ratio);
                        3
                    }
                };
                rejected[slot] += 1;
                None
            }
        })
        .collect();

    tracing::debug!(
        "Block filter kept {}/{} (small: {}, large: {}, aspect: {}, stamp: {})",
        blocks.len(),
        candidate_count,
        rejected[0],
        rejected[1],
        rejected[2],
        rejected[3]
    );

    blocks
}

/// Returns the stamp-colour ratio of an accepted box, or why it was rejected
pub fn evaluate(
    bbox: &BoundingBox,
    page: &RgbImage,
    config: &SegmentationConfig,
) -> Result<f32, Rejection> {
    let (page_width, page_height) = page.dimensions();

    if bbox.w <= config.min_block_width || bbox.h <= config.min_block_height {
        return Err(Rejection::TooSmall);
    }

    if bbox.h as f32 >= config.max_height_fraction * page_height as f32
        || bbox.w as f32 >= config.max_width_fraction * page_width as f32
    {
        return Err(Rejection::TooLarge);
    }

    if let Some((min_ratio, max_ratio)) = config.aspect_ratio_range {
        let ratio = bbox.aspect_ratio();
        if ratio < min_ratio || ratio > max_ratio {
            return Err(Rejection::AspectRatio);
        }
    }

    match &config.stamp {
        Some(stamp) => {
            let ratio = stamp_ratio(page, bbox, stamp);
            if ratio > stamp.max_ratio {
                Err(Rejection::Stamp(ratio))
            } else {
                Ok(ratio)
            }
        }
        None => Ok(0.0),
    }
}

/// Fraction of pixels inside `bbox` that fall in the stamp colour band
pub fn stamp_ratio(page: &RgbImage, bbox: &BoundingBox, stamp: &StampColor) -> f32 {
    let area = bbox.area();
    if area == 0 {
        return 0.0;
    }

    let region = imageops::crop_imm(page, bbox.x, bbox.y, bbox.w, bbox.h);
    let hits = region
        .pixels()
        .filter(|(_, _, pixel)| stamp.matches(pixel))
        .count();

    hits as f32 / area as f32
}

/// Hue in degrees, saturation and value in `[0, 1]`
fn rgb_to_hsv(pixel: &Rgb<u8>) -> (f32, f32, f32) {
    let [r, g, b] = pixel.0.map(|c| c as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    (hue, saturation, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
    const RED: Rgb<u8> = Rgb([210, 30, 40]);

    fn page() -> RgbImage {
        RgbImage::from_pixel(1000, 1000, WHITE)
    }

    #[test]
    fn test_hsv_of_primaries() {
        let (h, s, v) = rgb_to_hsv(&Rgb([255, 0, 0]));
        assert_eq!((h, s, v), (0.0, 1.0, 1.0));
        let (h, _, _) = rgb_to_hsv(&Rgb([0, 255, 0]));
        assert!((h - 120.0).abs() < 1e-3);
        let (h, _, _) = rgb_to_hsv(&Rgb([0, 0, 255]));
        assert!((h - 240.0).abs() < 1e-3);
        let (_, s, _) = rgb_to_hsv(&Rgb([128, 128, 128]));
        assert_eq!(s, 0.0);
    }

    #[test]
    fn test_red_band_wraps_through_zero() {
        let stamp = StampColor::red();
        assert!(stamp.matches(&Rgb([255, 0, 0])));
        assert!(stamp.matches(&Rgb([220, 20, 60])));
        assert!(!stamp.matches(&Rgb([0, 0, 200])));
        assert!(!stamp.matches(&BLACK));
        assert!(!stamp.matches(&WHITE));
    }

    #[test]
    fn test_size_rules() {
        let config = SegmentationConfig::default();
        let page = page();
        let ok = BoundingBox::new(10, 10, 200, 30);
        assert!(evaluate(&ok, &page, &config).is_ok());

        let narrow = BoundingBox::new(10, 10, config.min_block_width, 30);
        assert_eq!(evaluate(&narrow, &page, &config), Err(Rejection::TooSmall));

        let short = BoundingBox::new(10, 10, 200, config.min_block_height);
        assert_eq!(evaluate(&short, &page, &config), Err(Rejection::TooSmall));

        let tall = BoundingBox::new(10, 10, 200, 600);
        assert_eq!(evaluate(&tall, &page, &config), Err(Rejection::TooLarge));

        let full_width = BoundingBox::new(0, 10, 960, 30);
        assert_eq!(evaluate(&full_width, &page, &config), Err(Rejection::TooLarge));
    }

    #[test]
    fn test_aspect_rule_only_when_configured() {
        let mut config = SegmentationConfig::default();
        let page = page();
        let squarish = BoundingBox::new(10, 10, 120, 110);
        assert!(evaluate(&squarish, &page, &config).is_ok());

        config.aspect_ratio_range = Some((2.0, 100.0));
        assert_eq!(
            evaluate(&squarish, &page, &config),
            Err(Rejection::AspectRatio)
        );
    }

    #[test]
    fn test_stamp_block_is_rejected() {
        let config = SegmentationConfig::default();
        let mut page = page();
        // 40% of the block area is stamp red
        draw_filled_rect_mut(&mut page, Rect::at(100, 100).of_size(80, 100), RED);

        let bbox = BoundingBox::new(100, 100, 200, 100);
        match evaluate(&bbox, &page, &config) {
            Err(Rejection::Stamp(ratio)) => assert!((ratio - 0.4).abs() < 1e-3),
            other => panic!("expected stamp rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_stamp_rule_disabled() {
        let mut config = SegmentationConfig::default();
        config.stamp = None;
        let mut page = page();
        draw_filled_rect_mut(&mut page, Rect::at(100, 100).of_size(200, 100), RED);

        let bbox = BoundingBox::new(100, 100, 200, 100);
        assert_eq!(evaluate(&bbox, &page, &config), Ok(0.0));
    }

    #[test]
    fn test_survivors_are_expanded_and_cropped() {
        let config = SegmentationConfig::default();
        let mut page = page();
        draw_filled_rect_mut(&mut page, Rect::at(0, 50).of_size(200, 30), BLACK);

        let blocks = filter_blocks(
            vec![BoundingBox::new(0, 50, 200, 30), BoundingBox::new(500, 500, 10, 10)],
            &page,
            &config,
        );

        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        let margin = config.block_margin;
        assert_eq!(
            block.bbox,
            BoundingBox::new(0, 50 - margin, 200 + margin, 30 + 2 * margin)
        );
        assert_eq!(block.image.dimensions(), (block.bbox.w, block.bbox.h));
        assert_eq!(*block.image.get_pixel(0, margin), BLACK);
        assert_eq!(*block.image.get_pixel(0, 0), WHITE);
    }
}
