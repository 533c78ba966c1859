use crate::segmentation::block::BoundingBox;
use image::{imageops, GrayImage};
use imageproc::contours::{find_contours, BorderType};

/// Bounding rectangles of the outermost connected components of a mask.
///
/// Holes, and components nested inside holes, are skipped. The boxes come
/// back in contour-tracing order; no filtering or sorting happens here.
pub fn external_boxes(mask: &GrayImage) -> Vec<BoundingBox> {
    // Border tracing needs background all round, or components touching the
    // image edge come back as holes
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    imageops::replace(&mut padded, mask, 1, 1);

    find_contours::<u32>(&padded)
        .into_iter()
        .filter(|contour| {
            matches!(contour.border_type, BorderType::Outer) && contour.parent.is_none()
        })
        .filter_map(|contour| {
            let first = contour.points.first()?;
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
            for p in &contour.points {
                min_x = min_x.min(p.x);
                min_y = min_y.min(p.y);
                max_x = max_x.max(p.x);
                max_y = max_y.max(p.y);
            }
            Some(BoundingBox::from_corners(
                min_x.saturating_sub(1),
                min_y.saturating_sub(1),
                max_x.saturating_sub(1),
                max_y.saturating_sub(1),
            ))
        })
        .collect()
}
