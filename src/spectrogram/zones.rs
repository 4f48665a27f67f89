//! Perceptual frequency zones overlaid on spectrograms

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrubError};

/// Tolerance when matching zone edges, in Hz
const EDGE_TOLERANCE_HZ: f32 = 1e-3;

/// A labelled frequency band, `[low_hz, high_hz)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyZone {
    pub low_hz: f32,
    /// `None` extends the zone to Nyquist
    pub high_hz: Option<f32>,
    pub label: String,
    /// RGBA; alpha scales the overlay opacity
    pub color: [u8; 4],
}

impl FrequencyZone {
    pub fn new(low_hz: f32, high_hz: Option<f32>, label: &str, color: [u8; 4]) -> Self {
        Self {
            low_hz,
            high_hz,
            label: label.to_string(),
            color,
        }
    }

    /// Upper edge with `None` resolved to `nyquist`
    pub fn upper(&self, nyquist: f32) -> f32 {
        self.high_hz.unwrap_or(nyquist)
    }
}

/// Rumble / Body / Presence / Air
pub fn default_zones() -> Vec<FrequencyZone> {
    vec![
        FrequencyZone::new(0.0, Some(100.0), "Rumble", [214, 69, 65, 255]),
        FrequencyZone::new(100.0, Some(1000.0), "Body", [242, 169, 59, 255]),
        FrequencyZone::new(1000.0, Some(4000.0), "Presence", [76, 175, 80, 255]),
        FrequencyZone::new(4000.0, None, "Air", [66, 133, 244, 255]),
    ]
}

/// Drop zones that start at or above Nyquist
///
/// Lets one zone list serve low sample rates, e.g. "Air" disappears for
/// 8 kHz telephone audio.
pub fn visible_zones(zones: &[FrequencyZone], nyquist: f32) -> Vec<FrequencyZone> {
    zones
        .iter()
        .filter(|z| z.low_hz + EDGE_TOLERANCE_HZ < nyquist)
        .cloned()
        .collect()
}

/// Check that `zones` partition `[0, nyquist]` without gaps or overlaps
///
/// Order in the slice does not matter; zones are compared sorted by `low_hz`.
/// Only the topmost zone may leave `high_hz` open, and it (or an explicit
/// upper edge at or above Nyquist) must cover Nyquist.
pub fn validate_zones(zones: &[FrequencyZone], nyquist: f32) -> Result<()> {
    if zones.is_empty() {
        return Err(ScrubError::Config("at least one frequency zone is required".to_string()));
    }

    let mut sorted: Vec<&FrequencyZone> = zones.iter().collect();
    sorted.sort_by(|a, b| a.low_hz.total_cmp(&b.low_hz));

    if sorted[0].low_hz.abs() > EDGE_TOLERANCE_HZ {
        return Err(ScrubError::Config(format!(
            "frequency zones must start at 0 Hz, first zone '{}' starts at {} Hz",
            sorted[0].label, sorted[0].low_hz
        )));
    }

    let last = sorted.len() - 1;
    for (i, zone) in sorted.iter().enumerate() {
        if zone.high_hz.is_none() && i != last {
            return Err(ScrubError::Config(format!(
                "only the highest zone may extend to Nyquist, '{}' does not start highest",
                zone.label
            )));
        }

        let upper = zone.upper(nyquist);
        if upper <= zone.low_hz {
            return Err(ScrubError::Config(format!(
                "zone '{}' is empty ({} - {} Hz)",
                zone.label, zone.low_hz, upper
            )));
        }

        if let Some(next) = sorted.get(i + 1) {
            if (next.low_hz - upper).abs() > EDGE_TOLERANCE_HZ {
                return Err(ScrubError::Config(format!(
                    "zones '{}' and '{}' leave a gap or overlap at {} Hz",
                    zone.label, next.label, upper
                )));
            }
        } else if upper + EDGE_TOLERANCE_HZ < nyquist {
            return Err(ScrubError::Config(format!(
                "zone '{}' ends at {} Hz, below Nyquist ({} Hz)",
                zone.label, upper, nyquist
            )));
        }
    }

    Ok(())
}
