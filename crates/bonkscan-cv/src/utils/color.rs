//! Coarse dominant-color classification used to prune match candidates.
//!
//! The bucket of a screenshot window can differ from its template's bucket under
//! lighting variation. The scanner compensates only through the `Mixed` bucket
//! and a fixed-size fallback subset, so this is an approximation, not a filter
//! that is guaranteed to keep the right template.

use super::image::ChannelStats;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorBucket {
    Black,
    White,
    Gray,
    Red,
    Orange,
    Yellow,
    Green,
    Cyan,
    Lime,
    Blue,
    Purple,
    Magenta,
    Brown,
    Mixed,
}

impl ColorBucket {
    pub const ALL: [ColorBucket; 14] = [
        ColorBucket::Black,
        ColorBucket::White,
        ColorBucket::Gray,
        ColorBucket::Red,
        ColorBucket::Orange,
        ColorBucket::Yellow,
        ColorBucket::Green,
        ColorBucket::Cyan,
        ColorBucket::Lime,
        ColorBucket::Blue,
        ColorBucket::Purple,
        ColorBucket::Magenta,
        ColorBucket::Brown,
        ColorBucket::Mixed,
    ];

    /// Channel averages closer than this are treated as unsaturated.
    const SATURATION_SPREAD: f64 = 30.0;
    /// Average per-channel deviation above which a block has no single color.
    const MIXED_STD_DEV: f64 = 70.0;

    pub fn from_stats(stats: &ChannelStats) -> Self {
        if stats.mean_std_dev() > Self::MIXED_STD_DEV {
            return ColorBucket::Mixed;
        }

        let [r, g, b] = stats.mean;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);

        if max - min < Self::SATURATION_SPREAD {
            let brightness = (r + g + b) / 3.0;
            return if brightness > 200.0 {
                ColorBucket::White
            } else if brightness < 50.0 {
                ColorBucket::Black
            } else {
                ColorBucket::Gray
            };
        }

        if r >= g && r >= b {
            if g >= r * 0.85 {
                ColorBucket::Yellow
            } else if b >= r * 0.75 {
                ColorBucket::Magenta
            } else if g >= r * 0.55 {
                if max < 150.0 { ColorBucket::Brown } else { ColorBucket::Orange }
            } else if max < 110.0 {
                ColorBucket::Brown
            } else {
                ColorBucket::Red
            }
        } else if g >= b {
            if b >= g * 0.85 {
                ColorBucket::Cyan
            } else if r >= g * 0.7 {
                ColorBucket::Lime
            } else {
                ColorBucket::Green
            }
        } else if g >= b * 0.85 {
            ColorBucket::Cyan
        } else if r >= b * 0.6 {
            ColorBucket::Purple
        } else {
            ColorBucket::Blue
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColorBucket::Black => "black",
            ColorBucket::White => "white",
            ColorBucket::Gray => "gray",
            ColorBucket::Red => "red",
            ColorBucket::Orange => "orange",
            ColorBucket::Yellow => "yellow",
            ColorBucket::Green => "green",
            ColorBucket::Cyan => "cyan",
            ColorBucket::Lime => "lime",
            ColorBucket::Blue => "blue",
            ColorBucket::Purple => "purple",
            ColorBucket::Magenta => "magenta",
            ColorBucket::Brown => "brown",
            ColorBucket::Mixed => "mixed",
        }
    }
}

impl fmt::Display for ColorBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
