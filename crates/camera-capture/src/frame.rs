//! Camera frames delivered to the capture session

use image::{GrayImage, ImageBuffer, Luma};

/// Rec. 709 luma weights
const LUMA_R: f32 = 0.2126;
const LUMA_G: f32 = 0.7152;
const LUMA_B: f32 = 0.0722;

/// One packed RGB8 frame from the camera track
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Row-major RGB triples, `width * height * 3` bytes
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Time since the stream started (nanoseconds)
    pub timestamp_ns: u64,
    /// Delivery order within the stream
    pub sequence: u32,
}

impl VideoFrame {
    /// Wrap a packed RGB buffer
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Create a frame where every pixel has the same colour
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(data, width, height, 0, 0)
    }

    /// Number of pixels in the frame
    pub fn pixel_count(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// Whether the buffer length agrees with the declared dimensions
    pub fn is_well_formed(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.pixel_count() * 3
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Overwrite pixel at (x, y); out of range writes are ignored
    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data[idx..idx + 3].copy_from_slice(&rgb);
    }

    /// Per-pixel luminance (Rec. 709), unrounded
    pub fn luminance(&self) -> impl Iterator<Item = f32> + '_ {
        self.data.chunks_exact(3).map(|pixel| {
            pixel[0] as f32 * LUMA_R + pixel[1] as f32 * LUMA_G + pixel[2] as f32 * LUMA_B
        })
    }

    /// Rounded 8-bit luminance plane
    pub fn to_grayscale(&self) -> Vec<u8> {
        self.luminance()
            .map(|y| y.round().clamp(0.0, 255.0) as u8)
            .collect()
    }

    /// Grayscale copy as an `image` buffer
    pub fn to_gray_image(&self) -> Option<GrayImage> {
        ImageBuffer::<Luma<u8>, _>::from_raw(self.width, self.height, self.to_grayscale())
    }
}
