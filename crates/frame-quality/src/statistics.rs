//! Whole-frame luminance statistics

use camera_capture::VideoFrame;

/// Luminance statistics for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LuminanceStats {
    /// Mean Rec. 709 luminance
    pub mean: f32,
    /// Sample variance of luminance
    pub variance: f32,
    /// Fraction of near-black pixels
    pub blank_fraction: f32,
}

impl LuminanceStats {
    /// Compute statistics in a single pass over the frame
    pub fn compute(frame: &VideoFrame, blank_channel_max: u8) -> Self {
        let n = frame.pixel_count();
        if n == 0 {
            return Self::default();
        }

        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for y in frame.luminance() {
            let y = y as f64;
            sum += y;
            sum_sq += y * y;
        }

        let blank = frame
            .data
            .chunks_exact(3)
            .filter(|p| p.iter().all(|&c| c < blank_channel_max))
            .count();

        let mean = sum / n as f64;
        let variance = if n > 1 {
            ((sum_sq - n as f64 * mean * mean) / (n - 1) as f64).max(0.0)
        } else {
            0.0
        };

        Self {
            mean: mean as f32,
            variance: variance as f32,
            blank_fraction: blank as f32 / n as f32,
        }
    }
}
