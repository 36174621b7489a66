//! Confidence adjustments applied after deduplication
//!
//! Two passes run in order: a contextual boost from catalog priors and
//! co-occurring items, then a cross-check of the icon's border color against its
//! catalog rarity. Every adjustment is clamped to `[0, MAX_CONFIDENCE]`.

use super::Detection;
use crate::utils::ImageUtils;
use bonkscan_core::Rarity;
use image::RgbImage;
use tracing::debug;

/// Items that are usually picked together with items whose names contain the
/// listed keywords.
pub const SYNERGIES: &[(&str, &[&str])] = &[
    ("Gym Sauce", &["Power", "Damage"]),
    ("Oats", &["Health", "Regen"]),
    ("Battery", &["Lightning", "Thunder"]),
    ("Clover", &["Luck"]),
    ("Ice Crystal", &["Frost", "Ice"]),
    ("Beefy Ring", &["Health", "Armor"]),
    ("Forbidden Juice", &["Crit"]),
];

pub const SYNERGY_BONUS: f64 = 0.03;

/// Width of the border band sampled for the rarity frame color
pub const BORDER_WIDTH: u32 = 3;

/// Reference frame colors and how far a sample may stray from them.
pub const RARITY_COLORS: &[(Rarity, [f64; 3], f64)] = &[
    (Rarity::Common, [158.0, 158.0, 158.0], 40.0),
    (Rarity::Uncommon, [76.0, 175.0, 80.0], 50.0),
    (Rarity::Rare, [33.0, 150.0, 243.0], 50.0),
    (Rarity::Epic, [156.0, 39.0, 176.0], 50.0),
    (Rarity::Legendary, [255.0, 152.0, 0.0], 50.0),
];

pub const RARITY_MATCH_FACTOR: f64 = 1.05;
pub const RARITY_MISMATCH_FACTOR: f64 = 0.85;

/// Prior adjustment for an entity's rarity
pub fn rarity_prior(rarity: Rarity) -> f64 {
    match rarity {
        Rarity::Common => 0.03,
        Rarity::Uncommon => 0.02,
        Rarity::Legendary => -0.02,
        Rarity::Rare | Rarity::Epic => 0.0,
    }
}

/// Apply the rarity prior and at most one synergy bonus to every detection.
///
/// Synergies are evaluated against the set as it was before any adjustment.
pub fn apply_context_boost(detections: &mut [Detection]) {
    let names: Vec<(String, String)> = detections
        .iter()
        .map(|d| (d.entity.id.clone(), d.entity.name.to_lowercase()))
        .collect();

    for detection in detections.iter_mut() {
        let mut delta = rarity_prior(detection.entity.rarity);

        let synergy = SYNERGIES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&detection.entity.name));
        if let Some((_, keywords)) = synergy {
            let paired = names.iter().any(|(id, other)| {
                *id != detection.entity.id
                    && keywords.iter().any(|k| other.contains(&k.to_lowercase()))
            });
            if paired {
                delta += SYNERGY_BONUS;
            }
        }

        if delta != 0.0 {
            debug!(id = %detection.entity.id, delta, "context boost");
            detection.set_confidence(detection.confidence + delta);
        }
    }
}

/// Rarity whose frame color is closest to `rgb`, if within its tolerance.
pub fn match_rarity_color(rgb: [f64; 3]) -> Option<Rarity> {
    RARITY_COLORS
        .iter()
        .map(|(rarity, reference, tolerance)| {
            let distance = rgb
                .iter()
                .zip(reference)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            (*rarity, distance, *tolerance)
        })
        .filter(|(_, distance, tolerance)| distance <= tolerance)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(rarity, _, _)| rarity)
}

/// Rarity suggested by the frame around a detection
pub fn border_rarity(image: &RgbImage, detection: &Detection) -> Option<Rarity> {
    let position = detection.position.as_ref()?;
    let mean = ImageUtils::border_mean(image, position, BORDER_WIDTH)?;
    match_rarity_color(mean)
}

/// Scale confidence by whether the frame color agrees with the catalog rarity.
pub fn validate_border_rarity(image: &RgbImage, detections: &mut [Detection]) {
    for detection in detections.iter_mut() {
        let Some(observed) = border_rarity(image, detection) else {
            continue;
        };

        let factor = if observed == detection.entity.rarity {
            RARITY_MATCH_FACTOR
        } else {
            RARITY_MISMATCH_FACTOR
        };
        debug!(id = %detection.entity.id, %observed, expected = %detection.entity.rarity, factor, "border rarity");
        detection.set_confidence(detection.confidence * factor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::Roi;
    use crate::detection::{MAX_CONFIDENCE, MatchMethod};
    use bonkscan_core::CatalogEntity;
    use image::Rgb;
    use std::sync::Arc;

    fn det(id: &str, name: &str, rarity: Rarity, confidence: f64) -> Detection {
        let entity = Arc::new(CatalogEntity::new(id, name, rarity, format!("{id}.png")));
        Detection::new(entity, confidence, MatchMethod::TemplateMatch)
    }

    #[test]
    fn test_rarity_priors() {
        let mut detections = vec![
            det("a", "A", Rarity::Common, 0.80),
            det("b", "B", Rarity::Uncommon, 0.80),
            det("c", "C", Rarity::Rare, 0.80),
            det("d", "D", Rarity::Legendary, 0.80),
        ];
        apply_context_boost(&mut detections);

        let got: Vec<f64> = detections.iter().map(|d| d.confidence).collect();
        let want = [0.83, 0.82, 0.80, 0.78];
        for (g, w) in got.iter().zip(want) {
            assert!((g - w).abs() < 1e-9, "{g} != {w}");
        }
    }

    #[test]
    fn test_synergy_applies_once() {
        let mut detections = vec![
            det("clover", "Clover", Rarity::Rare, 0.70),
            det("luck-tome", "Luck Tome", Rarity::Rare, 0.70),
            det("lucky-coin", "Lucky Coin", Rarity::Rare, 0.70),
        ];
        apply_context_boost(&mut detections);
        assert!((detections[0].confidence - 0.73).abs() < 1e-9);
        assert!((detections[1].confidence - 0.70).abs() < 1e-9);
    }

    #[test]
    fn test_synergy_ignores_self() {
        let mut detections = vec![det("ice", "Ice Crystal", Rarity::Rare, 0.70)];
        apply_context_boost(&mut detections);
        assert!((detections[0].confidence - 0.70).abs() < 1e-9);
    }

    #[test]
    fn test_match_rarity_color() {
        assert_eq!(match_rarity_color([150.0, 150.0, 160.0]), Some(Rarity::Common));
        assert_eq!(match_rarity_color([250.0, 150.0, 10.0]), Some(Rarity::Legendary));
        assert_eq!(match_rarity_color([0.0, 0.0, 0.0]), None);
    }

    fn framed(frame: [u8; 3]) -> RgbImage {
        RgbImage::from_fn(60, 60, |x, y| {
            let inside = (13..47).contains(&x) && (13..47).contains(&y);
            if inside { Rgb([0, 0, 0]) } else { Rgb(frame) }
        })
    }

    #[test]
    fn test_border_validation_rewards_and_penalizes() {
        let image = framed([33, 150, 243]);
        let roi = Roi::new(10, 10, 40, 40);
        let mut detections = vec![
            det("rare", "Rare", Rarity::Rare, 0.80).at(roi.clone()),
            det("epic", "Epic", Rarity::Epic, 0.80).at(roi),
            det("unplaced", "Unplaced", Rarity::Epic, 0.80),
        ];
        validate_border_rarity(&image, &mut detections);

        assert!((detections[0].confidence - 0.84).abs() < 1e-9);
        assert!((detections[1].confidence - 0.68).abs() < 1e-9);
        assert!((detections[2].confidence - 0.80).abs() < 1e-9);
    }

    #[test]
    fn test_adjustments_stay_bounded() {
        let image = framed([158, 158, 158]);
        let mut detections = vec![
            det("oats", "Oats", Rarity::Common, 0.99).at(Roi::new(10, 10, 40, 40)),
            det("regen", "Regen Ring", Rarity::Legendary, 0.01).at(Roi::new(10, 10, 40, 40)),
        ];
        for _ in 0..5 {
            apply_context_boost(&mut detections);
            validate_border_rarity(&image, &mut detections);
        }
        for d in &detections {
            assert!((0.0..=MAX_CONFIDENCE).contains(&d.confidence));
        }
    }
}
