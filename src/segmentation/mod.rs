//! Classical layout segmentation for scanned pages
//!
//! Decodes a page, binarizes it with a local mean threshold, fuses glyphs
//! into line-level regions with a wide rectangular dilation, and turns the
//! resulting connected components into filtered, reading-ordered text blocks.
//! Blocks can optionally be stacked into a single composite image.

pub mod block;
pub mod pipeline;
pub mod steps;

pub use block::{BoundingBox, TextBlock};
pub use pipeline::{OutputMode, SegmentOptions, Segmentation, Segmenter, StepTiming};
pub use steps::composite::{CompositeAxis, CompositeImage};
pub use steps::filter::StampColor;
pub use steps::order::ReadingDirection;
