//! Non-maximum suppression and duplicate aggregation

use crate::detection::{AggregatedDetection, Detection};
use std::collections::HashMap;
use tracing::debug;

/// Default overlap above which the weaker of two detections is dropped
pub const DEFAULT_IOU_THRESHOLD: f64 = 0.3;

/// Greedy non-maximum suppression.
///
/// Detections are ordered by confidence with a stable sort, so equal scores keep
/// their input order and the result is reproducible for a given input. A
/// detection without a position never suppresses and is never suppressed.
pub fn nms(detections: Vec<Detection>, iou_threshold: f64) -> Vec<Detection> {
    let before = detections.len();

    let mut sorted = detections;
    sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::with_capacity(sorted.len());
    for detection in sorted {
        let suppressed = detection.position.as_ref().is_some_and(|position| {
            keep.iter()
                .filter_map(|kept| kept.position.as_ref())
                .any(|kept| kept.overlaps(position, iou_threshold))
        });

        if !suppressed {
            keep.push(detection);
        }
    }

    debug!(before, after = keep.len(), iou_threshold, "non-maximum suppression");
    keep
}

/// Merge detections of the same entity into counted entries.
///
/// Counts add up (a detection without a stack count counts once), confidence is
/// the group maximum and the position is the first member's. Output is sorted by
/// entity name.
pub fn aggregate(detections: Vec<Detection>) -> Vec<AggregatedDetection> {
    let mut groups: Vec<AggregatedDetection> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for detection in detections {
        let count = detection.count.unwrap_or(1).max(1);

        match index.get(detection.entity_id()) {
            Some(&i) => {
                let group = &mut groups[i];
                group.count += count;
                if detection.confidence > group.detection.confidence {
                    group.detection.confidence = detection.confidence;
                }
            }
            None => {
                index.insert(detection.entity_id().to_string(), groups.len());
                let mut detection = detection;
                detection.count = None;
                groups.push(AggregatedDetection { detection, count });
            }
        }
    }

    groups.sort_by(|a, b| {
        a.entity()
            .name
            .cmp(&b.entity().name)
            .then_with(|| a.entity().id.cmp(&b.entity().id))
    });
    groups
}
