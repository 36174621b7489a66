//! Human-readable summary of a detection run

use bonkscan_core::{EntityKind, Rarity};
use bonkscan_cv::AggregatedDetection;
use std::collections::BTreeMap;

/// Totals shown after the JSON output
#[derive(Debug, Default, PartialEq)]
pub struct Summary {
    pub entities: usize,
    pub icons: u32,
    pub by_rarity: BTreeMap<Rarity, u32>,
    pub weapons: u32,
    pub avg_confidence: f64,
}

pub fn summarize(detections: &[AggregatedDetection]) -> Summary {
    let mut summary = Summary {
        entities: detections.len(),
        ..Default::default()
    };

    let mut confidence_sum = 0.0;
    for detection in detections {
        summary.icons += detection.count;
        *summary.by_rarity.entry(detection.entity().rarity).or_insert(0) += detection.count;
        if detection.entity().kind == EntityKind::Weapon {
            summary.weapons += detection.count;
        }
        confidence_sum += detection.confidence();
    }

    if !detections.is_empty() {
        summary.avg_confidence = confidence_sum / detections.len() as f64;
    }
    summary
}

pub fn print_summary(detections: &[AggregatedDetection]) {
    let summary = summarize(detections);

    eprintln!("Detection completed:");
    eprintln!("  - Distinct entities: {}", summary.entities);
    eprintln!("  - Icons (with stacks): {}", summary.icons);
    for (rarity, count) in &summary.by_rarity {
        eprintln!("  - {}: {}", rarity, count);
    }
    eprintln!("  - Weapons: {}", summary.weapons);
    eprintln!("  - Avg confidence: {:.3}", summary.avg_confidence);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bonkscan_core::CatalogEntity;
    use bonkscan_cv::{Detection, MatchMethod};
    use std::sync::Arc;

    fn aggregated(entity: CatalogEntity, confidence: f64, count: u32) -> AggregatedDetection {
        AggregatedDetection {
            detection: Detection::new(Arc::new(entity), confidence, MatchMethod::TemplateMatch),
            count,
        }
    }

    #[test]
    fn test_summary_totals() {
        let detections = vec![
            aggregated(CatalogEntity::new("oats", "Oats", Rarity::Common, "a.png"), 0.9, 3),
            aggregated(
                CatalogEntity::new("katana", "Katana", Rarity::Rare, "b.png").with_kind(EntityKind::Weapon),
                0.7,
                1,
            ),
        ];

        let summary = summarize(&detections);
        assert_eq!(summary.entities, 2);
        assert_eq!(summary.icons, 4);
        assert_eq!(summary.weapons, 1);
        assert_eq!(summary.by_rarity.get(&Rarity::Common), Some(&3));
        assert!((summary.avg_confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(summarize(&[]), Summary::default());
    }
}
