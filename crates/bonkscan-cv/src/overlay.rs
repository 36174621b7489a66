//! Debug overlay drawing for detection results

use crate::bbox::Roi;
use crate::detection::AggregatedDetection;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const REGION_COLOR: Rgb<u8> = Rgb([200, 200, 200]);
const BAR_HEIGHT: u32 = 4;

/// Color used for a detection of the given confidence
pub fn confidence_color(confidence: f64) -> Rgb<u8> {
    if confidence >= 0.85 {
        Rgb([0, 220, 0])
    } else if confidence >= 0.72 {
        Rgb([240, 200, 0])
    } else {
        Rgb([230, 30, 30])
    }
}

/// Copy of `image` with scan regions outlined and every positioned detection boxed.
///
/// A bar above each box spans the box width scaled by confidence.
pub fn render_overlay(image: &RgbImage, regions: &[Roi], detections: &[AggregatedDetection]) -> RgbImage {
    let mut output = image.clone();

    for region in regions {
        if let Some(rect) = to_rect(region) {
            draw_hollow_rect_mut(&mut output, rect, REGION_COLOR);
        }
    }

    for detection in detections {
        let Some(position) = &detection.detection.position else {
            continue;
        };
        let Some(rect) = to_rect(position) else {
            continue;
        };

        let color = confidence_color(detection.confidence());
        draw_hollow_rect_mut(&mut output, rect, color);

        let bar_width = ((position.width as f64 * detection.confidence()).round() as u32).max(1);
        let bar_y = position.y.saturating_sub(BAR_HEIGHT + 1);
        draw_filled_rect_mut(
            &mut output,
            Rect::at(position.x as i32, bar_y as i32).of_size(bar_width, BAR_HEIGHT),
            color,
        );
    }

    output
}

fn to_rect(roi: &Roi) -> Option<Rect> {
    if roi.is_empty() {
        return None;
    }
    Some(Rect::at(roi.x as i32, roi.y as i32).of_size(roi.width, roi.height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{Detection, MatchMethod};
    use bonkscan_core::{CatalogEntity, Rarity};
    use std::sync::Arc;

    #[test]
    fn test_overlay_draws_box_in_confidence_color() {
        let image = RgbImage::new(100, 100);
        let entity = Arc::new(CatalogEntity::new("oats", "Oats", Rarity::Common, "oats.png"));
        let detection = AggregatedDetection {
            detection: Detection::new(entity, 0.9, MatchMethod::TemplateMatch).at(Roi::new(20, 30, 40, 40)),
            count: 1,
        };

        let output = render_overlay(&image, &[Roi::new(0, 0, 100, 100)], &[detection]);

        assert_eq!(output.dimensions(), image.dimensions());
        assert_eq!(*output.get_pixel(20, 50), Rgb([0, 220, 0]));
        assert_eq!(*output.get_pixel(0, 0), REGION_COLOR);
        assert_eq!(*output.get_pixel(50, 50), Rgb([0, 0, 0]));
        assert_eq!(*output.get_pixel(20, 25), Rgb([0, 220, 0]));
    }

    #[test]
    fn test_confidence_colors() {
        assert_eq!(confidence_color(0.99), Rgb([0, 220, 0]));
        assert_eq!(confidence_color(0.75), Rgb([240, 200, 0]));
        assert_eq!(confidence_color(0.5), Rgb([230, 30, 30]));
    }
}
