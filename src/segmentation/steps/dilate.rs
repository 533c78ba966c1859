use super::binarize::{BACKGROUND, FOREGROUND};
use image::{GrayImage, Luma};

/// Binary dilation with a `kernel_width` x `kernel_height` rectangle
/// anchored at its centre, applied `iterations` times.
///
/// A wide, short kernel joins glyphs on the same row into one component
/// without bridging the gap to the next row. The rectangle is separable, so
/// each pass is a horizontal run followed by a vertical run.
pub fn dilate_rect(
    mask: &GrayImage,
    kernel_width: u32,
    kernel_height: u32,
    iterations: u32,
) -> GrayImage {
    let mut out = mask.clone();
    for _ in 0..iterations {
        out = dilate_rows(&out, kernel_width);
        out = dilate_columns(&out, kernel_height);
    }
    out
}

/// Extent of the kernel before and after its anchor
fn reach(kernel: u32) -> (u32, u32) {
    let before = kernel / 2;
    (before, kernel.saturating_sub(1) - before)
}

fn dilate_rows(mask: &GrayImage, kernel_width: u32) -> GrayImage {
    if kernel_width <= 1 {
        return mask.clone();
    }
    let (width, height) = mask.dimensions();
    let (before, after) = reach(kernel_width);
    let mut out = GrayImage::new(width, height);
    let mut prefix = vec![0u32; width as usize + 1];

    for y in 0..height {
        for x in 0..width {
            let ink = (mask.get_pixel(x, y).0[0] != BACKGROUND) as u32;
            prefix[x as usize + 1] = prefix[x as usize] + ink;
        }
        for x in 0..width {
            let lo = x.saturating_sub(before) as usize;
            let hi = (x + after).min(width - 1) as usize + 1;
            if prefix[hi] > prefix[lo] {
                out.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
    }

    out
}

fn dilate_columns(mask: &GrayImage, kernel_height: u32) -> GrayImage {
    if kernel_height <= 1 {
        return mask.clone();
    }
    let (width, height) = mask.dimensions();
    let (before, after) = reach(kernel_height);
    let mut out = GrayImage::new(width, height);
    let mut prefix = vec![0u32; height as usize + 1];

    for x in 0..width {
        for y in 0..height {
            let ink = (mask.get_pixel(x, y).0[0] != BACKGROUND) as u32;
            prefix[y as usize + 1] = prefix[y as usize] + ink;
        }
        for y in 0..height {
            let lo = y.saturating_sub(before) as usize;
            let hi = (y + after).min(height - 1) as usize + 1;
            if prefix[hi] > prefix[lo] {
                out.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
    }

    out
}
