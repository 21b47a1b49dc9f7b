//! Localized bright spot search inside the face guide
//!
//! Glare from a screen or a lamp reflected off glasses or a printed photo shows
//! up as a compact saturated blob. The search thresholds the grayscale frame,
//! keeps only pixels inside the guide's inner circle, traces outer contours and
//! accepts a blob only when its size and shape fall inside tuned bounds.

use camera_capture::{GuideGeometry, VideoFrame};
use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType, Contour};
use serde::{Deserialize, Serialize};

use crate::QualityConfig;

/// A bright region that passed every bound
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrightSpot {
    pub center_x: f32,
    pub center_y: f32,
    pub area: f32,
    pub radius: f32,
    pub circularity: f32,
}

/// Find the first qualifying bright spot, if any
pub fn find_bright_spot(
    frame: &VideoFrame,
    guide: &GuideGeometry,
    config: &QualityConfig,
) -> Option<BrightSpot> {
    let gray = frame.to_gray_image()?;
    let mask = threshold_in_guide(&gray, guide, config.spot_luma_cutoff);

    find_contours::<i32>(&mask)
        .iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .filter_map(measure_region)
        .find(|spot| accepts(spot, guide, config))
}

/// Binary image: 255 where luminance exceeds the cutoff inside the inner circle
fn threshold_in_guide(gray: &GrayImage, guide: &GuideGeometry, cutoff: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let bright = gray.get_pixel(x, y)[0] > cutoff;
        if bright && guide.within_inner(x as f32, y as f32) {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

fn measure_region(contour: &Contour<i32>) -> Option<BrightSpot> {
    let points = &contour.points;
    if points.len() < 3 {
        return None;
    }

    let n = points.len();
    let mut twice_area = 0.0f32;
    let mut perimeter = 0.0f32;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        twice_area += (a.x * b.y - b.x * a.y) as f32;
        perimeter += (((b.x - a.x).pow(2) + (b.y - a.y).pow(2)) as f32).sqrt();
    }
    let area = twice_area.abs() / 2.0;
    if perimeter <= 0.0 {
        return None;
    }

    let center_x = points.iter().map(|p| p.x as f32).sum::<f32>() / n as f32;
    let center_y = points.iter().map(|p| p.y as f32).sum::<f32>() / n as f32;
    let radius = points
        .iter()
        .map(|p| ((p.x as f32 - center_x).powi(2) + (p.y as f32 - center_y).powi(2)).sqrt())
        .fold(0.0f32, f32::max);

    let circularity = 4.0 * std::f32::consts::PI * area / (perimeter * perimeter);

    Some(BrightSpot {
        center_x,
        center_y,
        area,
        radius,
        circularity,
    })
}

fn accepts(spot: &BrightSpot, guide: &GuideGeometry, config: &QualityConfig) -> bool {
    (config.spot_min_area..=config.spot_max_area).contains(&spot.area)
        && (config.spot_min_radius..=config.spot_max_radius).contains(&spot.radius)
        && (config.spot_min_circularity..=config.spot_max_circularity).contains(&spot.circularity)
        && guide.within_inner(spot.center_x, spot.center_y)
}
