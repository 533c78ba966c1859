//! Individual segmentation stages

pub mod binarize;
pub mod composite;
pub mod contours;
pub mod decode;
pub mod dilate;
pub mod filter;
pub mod order;
