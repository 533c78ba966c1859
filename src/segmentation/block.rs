use image::RgbImage;
use serde::Serialize;

/// Axis-aligned box in page-pixel coordinates.
///
/// `x + w` and `y + h` are exclusive edges, so a box that satisfies
/// [`BoundingBox::within`] never reaches past the last pixel column or row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Smallest box covering the inclusive corner points.
    pub fn from_corners(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Self {
        Self {
            x: min_x,
            y: min_y,
            w: max_x - min_x + 1,
            h: max_y - min_y + 1,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.w as f32 / self.h as f32
    }

    /// True when the box is non-empty and fits inside a page of the given size.
    pub fn within(&self, page_width: u32, page_height: u32) -> bool {
        self.w > 0 && self.h > 0 && self.right() <= page_width && self.bottom() <= page_height
    }

    /// Grow the box by `margin` on every side, clamped to the page.
    pub fn expand(&self, margin: u32, page_width: u32, page_height: u32) -> Self {
        let x = self.x.saturating_sub(margin);
        let y = self.y.saturating_sub(margin);
        let right = (self.right() + margin).min(page_width);
        let bottom = (self.bottom() + margin).min(page_height);
        Self {
            x,
            y,
            w: right.saturating_sub(x),
            h: bottom.saturating_sub(y),
        }
    }
}

/// A block that survived filtering, with the pixels it covers.
#[derive(Debug, Clone)]
pub struct TextBlock {
    pub bbox: BoundingBox,
    /// Crop of the working page, margin included
    pub image: RgbImage,
    /// Fraction of stamp-coloured pixels in the unexpanded box
    pub stamp_ratio: f32,
}
