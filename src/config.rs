use crate::segmentation::{CompositeAxis, ReadingDirection, StampColor};
use crate::Args;
use serde::Serialize;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    /// How long an untouched session (open or finalized) is kept
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    pub segmentation: SegmentationConfig,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let defaults = SegmentationConfig::default();
        let segmentation = SegmentationConfig {
            max_width: args.max_image_width,
            max_height: args.max_image_height,
            smoothing_sigma: args.smoothing_sigma,
            threshold_window: args.threshold_window,
            threshold_offset: args.threshold_offset,
            kernel_width: args.kernel_width,
            kernel_height: args.kernel_height,
            dilate_iterations: args.dilate_iterations,
            min_block_width: args.min_block_width,
            min_block_height: args.min_block_height,
            stamp: if args.no_stamp_filter {
                None
            } else {
                Some(StampColor {
                    max_ratio: args.stamp_threshold,
                    ..StampColor::red()
                })
            },
            reading_direction: args.reading_direction,
            composite_axis: args.composite_axis,
            ..defaults
        };

        Self {
            host: args.host,
            port: args.port,
            max_file_size: args.max_file_size,
            session_ttl: Duration::from_secs(args.session_ttl_secs),
            sweep_interval: Duration::from_secs(args.sweep_interval_secs.max(1)),
            segmentation,
        }
    }
}

/// Every tuning knob of the segmentation pipeline.
///
/// The dilation kernel is the most script-sensitive setting: wide connected
/// scripts want a wider kernel than scripts of separate upright glyphs, and
/// a kernel that is too tall merges neighbouring rows.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentationConfig {
    /// Pages wider than this are downscaled, preserving aspect ratio
    pub max_width: u32,
    /// Pages taller than this are downscaled, preserving aspect ratio
    pub max_height: u32,
    /// Gaussian sigma applied before thresholding; `0` disables smoothing
    pub smoothing_sigma: f32,
    /// Side of the square neighbourhood for the local mean (odd)
    pub threshold_window: u32,
    /// Subtracted from the local mean; higher values keep only darker ink
    pub threshold_offset: f32,
    pub kernel_width: u32,
    pub kernel_height: u32,
    pub dilate_iterations: u32,
    /// Blocks must be strictly wider than this
    pub min_block_width: u32,
    /// Blocks must be strictly taller than this
    pub min_block_height: u32,
    /// Blocks at least this share of the page height are whole-page merges
    pub max_height_fraction: f32,
    /// Blocks at least this share of the page width are whole-page merges
    pub max_width_fraction: f32,
    /// Accepted `w / h` range, if any
    pub aspect_ratio_range: Option<(f32, f32)>,
    /// Stamp colour rejection, if enabled
    pub stamp: Option<StampColor>,
    /// Pixels added around surviving blocks before cropping
    pub block_margin: u32,
    pub reading_direction: ReadingDirection,
    pub composite_axis: CompositeAxis,
    /// Background pixels between consecutive blocks in a composite
    pub composite_gap: u32,
    /// Fill used for composite padding
    pub background: [u8; 3],
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            max_width: 2000,
            max_height: 2000,
            smoothing_sigma: 0.8,
            threshold_window: 15,
            threshold_offset: 10.0,
            kernel_width: 25,
            kernel_height: 5,
            dilate_iterations: 1,
            min_block_width: 80,
            min_block_height: 20,
            max_height_fraction: 0.6,
            max_width_fraction: 0.95,
            aspect_ratio_range: None,
            stamp: Some(StampColor::red()),
            block_margin: 5,
            reading_direction: ReadingDirection::Ltr,
            composite_axis: CompositeAxis::Vertical,
            composite_gap: 0,
            background: [255, 255, 255],
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.max_width > 0 && self.max_height > 0,
            "resize cap must be positive"
        );
        anyhow::ensure!(
            self.threshold_window >= 3 && self.threshold_window % 2 == 1,
            "threshold window must be an odd number >= 3, got {}",
            self.threshold_window
        );
        anyhow::ensure!(
            self.kernel_width > 0 && self.kernel_height > 0,
            "dilation kernel must be at least 1x1"
        );
        anyhow::ensure!(
            self.max_height_fraction > 0.0 && self.max_height_fraction <= 1.0,
            "max height fraction must be in (0, 1]"
        );
        anyhow::ensure!(
            self.max_width_fraction > 0.0 && self.max_width_fraction <= 1.0,
            "max width fraction must be in (0, 1]"
        );
        if let Some((lo, hi)) = self.aspect_ratio_range {
            anyhow::ensure!(lo > 0.0 && lo <= hi, "aspect ratio range is empty");
        }
        if let Some(stamp) = &self.stamp {
            anyhow::ensure!(
                (0.0..=1.0).contains(&stamp.max_ratio),
                "stamp threshold must be in [0, 1]"
            );
        }
        Ok(())
    }
}
