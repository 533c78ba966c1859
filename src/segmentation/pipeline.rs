use crate::config::SegmentationConfig;
use crate::error::PipelineError;
use image::{DynamicImage, GenericImageView, Rgb};
use serde::Serialize;
use std::time::Instant;

use super::block::TextBlock;
use super::steps;
use super::steps::composite::{CompositeAxis, CompositeImage};
use super::steps::order::ReadingDirection;

/// What a segmentation request returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Every ordered block, individually encoded
    #[default]
    Blocks,
    /// One image of all blocks concatenated
    Composite,
}

impl OutputMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "blocks" => Some(Self::Blocks),
            "composite" => Some(Self::Composite),
            _ => None,
        }
    }
}

/// Per-request choices; unset fields fall back to the configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentOptions {
    pub direction: Option<ReadingDirection>,
    pub output: OutputMode,
    pub axis: Option<CompositeAxis>,
}

/// Timing information for a single segmentation stage
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Ordered blocks of one page
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Width of the working page the block coordinates refer to
    pub page_width: u32,
    pub page_height: u32,
    pub direction: ReadingDirection,
    pub blocks: Vec<TextBlock>,
    pub total_time_ms: u64,
    pub steps: Vec<StepTiming>,
}

impl Segmentation {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Runs the segmentation stages in order.
///
/// Holds only immutable configuration, so one instance can serve any number
/// of concurrent requests.
pub struct Segmenter {
    config: SegmentationConfig,
}

impl Segmenter {
    pub fn new(config: SegmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    /// Decode `bytes` and segment the page
    pub fn segment(
        &self,
        bytes: &[u8],
        direction: Option<ReadingDirection>,
    ) -> Result<Segmentation, PipelineError> {
        let start = Instant::now();
        let mut timings = Vec::new();

        let image = self.run_step("decode", &mut timings, || steps::decode::decode(bytes))?;
        let mut segmentation = self.segment_image(image, direction)?;

        timings.append(&mut segmentation.steps);
        segmentation.steps = timings;
        segmentation.total_time_ms = start.elapsed().as_millis() as u64;
        Ok(segmentation)
    }

    /// Segment an already decoded page
    pub fn segment_image(
        &self,
        image: DynamicImage,
        direction: Option<ReadingDirection>,
    ) -> Result<Segmentation, PipelineError> {
        let start = Instant::now();
        let config = &self.config;
        let direction = direction.unwrap_or(config.reading_direction);
        let mut timings = Vec::new();

        let image = self.run_step("resize", &mut timings, || {
            Ok(steps::decode::cap_size(image, config.max_width, config.max_height))
        })?;
        let (page_width, page_height) = image.dimensions();

        let gray = self.run_step("grayscale", &mut timings, || {
            Ok(steps::decode::intensity(&image, config.smoothing_sigma))
        })?;
        let color = image.into_rgb8();

        let mask = self.run_step("binarize", &mut timings, || {
            Ok(steps::binarize::adaptive_mean_threshold(
                &gray,
                config.threshold_window,
                config.threshold_offset,
            ))
        })?;

        let merged = self.run_step("dilate", &mut timings, || {
            Ok(steps::dilate::dilate_rect(
                &mask,
                config.kernel_width,
                config.kernel_height,
                config.dilate_iterations,
            ))
        })?;

        let candidates = self.run_step("contours", &mut timings, || {
            Ok(steps::contours::external_boxes(&merged))
        })?;
        let candidate_count = candidates.len();

        let mut blocks = self.run_step("filter", &mut timings, || {
            Ok(steps::filter::filter_blocks(candidates, &color, config))
        })?;

        self.run_step("order", &mut timings, || {
            steps::order::sort_blocks(&mut blocks, direction);
            Ok(())
        })?;

        tracing::debug!(
            "Segmented {}x{} page: {} candidates, {} blocks ({})",
            page_width,
            page_height,
            candidate_count,
            blocks.len(),
            direction.as_str()
        );

        Ok(Segmentation {
            page_width,
            page_height,
            direction,
            blocks,
            total_time_ms: start.elapsed().as_millis() as u64,
            steps: timings,
        })
    }

    /// Concatenate the ordered blocks of a segmentation into one image
    pub fn composite(
        &self,
        segmentation: &Segmentation,
        axis: Option<CompositeAxis>,
    ) -> Result<CompositeImage, PipelineError> {
        steps::composite::compose(
            &segmentation.blocks,
            axis.unwrap_or(self.config.composite_axis),
            self.config.composite_gap,
            Rgb(self.config.background),
        )
    }

    fn run_step<T, F>(
        &self,
        name: &str,
        timings: &mut Vec<StepTiming>,
        step_fn: F,
    ) -> Result<T, PipelineError>
    where
        F: FnOnce() -> Result<T, PipelineError>,
    {
        let step_start = Instant::now();
        let result = step_fn()?;
        timings.push(StepTiming {
            name: name.to_string(),
            time_ms: step_start.elapsed().as_millis() as u64,
        });
        Ok(result)
    }
}
