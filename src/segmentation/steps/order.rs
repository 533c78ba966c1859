use crate::segmentation::block::{BoundingBox, TextBlock};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Horizontal reading direction used to break ties between blocks that start
/// on the same row. Rows are always read top to bottom.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReadingDirection {
    /// Top-to-bottom, left-to-right
    #[default]
    Ltr,
    /// Top-to-bottom, right-to-left
    Rtl,
}

impl ReadingDirection {
    /// Parse from a request field
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ltr" | "left-to-right" => Some(Self::Ltr),
            "rtl" | "right-to-left" => Some(Self::Rtl),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ltr => "ltr",
            Self::Rtl => "rtl",
        }
    }

    /// Total order over boxes: `y` ascending, then `x` in reading direction.
    /// Size breaks any remaining tie so identical input always sorts the same.
    pub fn compare(&self, a: &BoundingBox, b: &BoundingBox) -> Ordering {
        let horizontal = match self {
            Self::Ltr => a.x.cmp(&b.x),
            Self::Rtl => b.x.cmp(&a.x),
        };
        a.y.cmp(&b.y)
            .then(horizontal)
            .then(a.h.cmp(&b.h))
            .then(a.w.cmp(&b.w))
    }
}

pub fn sort_blocks(blocks: &mut [TextBlock], direction: ReadingDirection) {
    blocks.sort_by(|a, b| direction.compare(&a.bbox, &b.bbox));
}
