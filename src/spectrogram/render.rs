//! Spectrogram rasterization with zone overlays and a legend strip

use std::path::Path;

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, Rgb, RgbImage};

use super::analyzer::SpectrogramFrame;
use super::font::{draw_text, GLYPH_HEIGHT};
use super::zones::{validate_zones, FrequencyZone};
use crate::error::{Result, ScrubError};

const LEGEND_PADDING: u32 = 6;
const LEGEND_ROW_HEIGHT: u32 = 14;
const SWATCH_SIZE: u32 = 10;
const LEGEND_BACKGROUND: Rgb<u8> = Rgb([24, 24, 24]);
const LEGEND_TEXT: Rgb<u8> = Rgb([230, 230, 230]);

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// Plot width in pixels
    pub width: u32,
    /// Plot height in pixels, legend strip excluded
    pub height: u32,
    /// Overlay opacity for a zone with alpha 255
    pub zone_alpha: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 900,
            height: 400,
            zone_alpha: 0.22,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegendEntry {
    pub label: String,
    pub color: [u8; 4],
    pub low_hz: f32,
    pub high_hz: f32,
}

impl LegendEntry {
    /// Text drawn next to the swatch, e.g. "Body 100-1000 Hz"
    pub fn caption(&self) -> String {
        format!("{} {:.0}-{:.0} Hz", self.label, self.low_hz, self.high_hz)
    }
}

/// Rendered spectrogram plus the legend describing its overlays
#[derive(Debug, Clone)]
pub struct VisualArtifact {
    pub image: RgbImage,
    pub legend: Vec<LegendEntry>,
}

impl VisualArtifact {
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        PngEncoder::new(&mut bytes)
            .write_image(
                self.image.as_raw(),
                self.image.width(),
                self.image.height(),
                ColorType::Rgb8,
            )
            .map_err(|e| ScrubError::Render(format!("PNG encoding failed: {}", e)))?;
        Ok(bytes)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_png()?)?;
        Ok(())
    }
}

/// Height of the legend strip for `n` entries
pub fn legend_height(n: usize) -> u32 {
    if n == 0 {
        0
    } else {
        2 * LEGEND_PADDING + n as u32 * LEGEND_ROW_HEIGHT
    }
}

/// Map a dB value onto the greyscale ramp: floor black, ceiling white
fn db_to_grey(db: f32, floor: f32, ceiling: f32) -> u8 {
    let t = ((db - floor) / (ceiling - floor)).clamp(0.0, 1.0);
    (t * 255.0).round() as u8
}

fn blend(base: Rgb<u8>, overlay: [u8; 4], alpha: f32) -> Rgb<u8> {
    let a = (alpha * overlay[3] as f32 / 255.0).clamp(0.0, 1.0);
    let mix = |b: u8, o: u8| (b as f32 * (1.0 - a) + o as f32 * a).round() as u8;
    Rgb([
        mix(base[0], overlay[0]),
        mix(base[1], overlay[1]),
        mix(base[2], overlay[2]),
    ])
}

/// Render a spectrogram frame with zone bands and a legend
///
/// Low frequencies at the bottom, time left to right. Deterministic for a
/// given frame, zone list and options.
pub fn render(
    frame: &SpectrogramFrame,
    zones: &[FrequencyZone],
    options: &RenderOptions,
) -> Result<VisualArtifact> {
    if options.width == 0 || options.height == 0 {
        return Err(ScrubError::Render(format!(
            "image size {}x{} is empty",
            options.width, options.height
        )));
    }
    if frame.n_frames == 0 || frame.n_bins == 0 {
        return Err(ScrubError::Render("spectrogram has no data".to_string()));
    }

    let nyquist = frame.nyquist();
    validate_zones(zones, nyquist)?;

    let mut sorted: Vec<&FrequencyZone> = zones.iter().collect();
    sorted.sort_by(|a, b| a.low_hz.total_cmp(&b.low_hz));

    let (width, height) = (options.width, options.height);
    let mut image = RgbImage::from_pixel(width, height + legend_height(sorted.len()), LEGEND_BACKGROUND);

    for y in 0..height {
        // Row centre in [0, 1), bottom row lowest
        let frac = (height - 1 - y) as f32 / height as f32 + 0.5 / height as f32;
        // Bin k sits at k * nyquist / (n_bins - 1); pick the one nearest row_hz
        let row_hz = frac * nyquist;
        let bin = ((frac * (frame.n_bins - 1) as f32).round() as usize).min(frame.n_bins - 1);
        let zone = sorted
            .iter()
            .find(|z| row_hz >= z.low_hz && row_hz < z.upper(nyquist));

        for x in 0..width {
            let t = ((x as u64 * frame.n_frames as u64) / width as u64) as usize;
            let grey = db_to_grey(frame.value(t, bin), frame.db_floor, frame.db_ceiling);
            let mut pixel = Rgb([grey, grey, grey]);
            if let Some(zone) = zone {
                pixel = blend(pixel, zone.color, options.zone_alpha);
            }
            image.put_pixel(x, y, pixel);
        }
    }

    let legend: Vec<LegendEntry> = sorted
        .iter()
        .map(|z| LegendEntry {
            label: z.label.clone(),
            color: z.color,
            low_hz: z.low_hz,
            high_hz: z.upper(nyquist).min(nyquist),
        })
        .collect();

    for (i, entry) in legend.iter().enumerate() {
        let row_y = height + LEGEND_PADDING + i as u32 * LEGEND_ROW_HEIGHT;
        let swatch = Rgb([entry.color[0], entry.color[1], entry.color[2]]);
        for dy in 0..SWATCH_SIZE {
            for dx in 0..SWATCH_SIZE {
                let px = LEGEND_PADDING + dx;
                if px < width {
                    image.put_pixel(px, row_y + dy, swatch);
                }
            }
        }
        let text_y = row_y + (SWATCH_SIZE.saturating_sub(GLYPH_HEIGHT)) / 2;
        draw_text(
            &mut image,
            2 * LEGEND_PADDING + SWATCH_SIZE,
            text_y,
            &entry.caption(),
            LEGEND_TEXT,
        );
    }

    log::debug!(
        "Rendered {}x{} spectrogram ({} frames, {} zones)",
        image.width(),
        image.height(),
        frame.n_frames,
        legend.len()
    );

    Ok(VisualArtifact { image, legend })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrogram::zones::default_zones;

    fn ramp_frame() -> SpectrogramFrame {
        // Level rises with frequency: bottom dark, top bright
        let (n_frames, n_bins) = (10, 65);
        let power_db = (0..n_frames)
            .flat_map(|_| (0..n_bins).map(|f| -80.0 + 80.0 * f as f32 / (n_bins - 1) as f32))
            .collect();
        SpectrogramFrame {
            power_db,
            n_frames,
            n_bins,
            sample_rate: 44100,
            window: 128,
            hop: 64,
            db_floor: -80.0,
            db_ceiling: 0.0,
        }
    }

    fn opts(zone_alpha: f32) -> RenderOptions {
        RenderOptions {
            width: 120,
            height: 80,
            zone_alpha,
        }
    }

    #[test]
    fn test_greyscale_ramp_is_monotonic() {
        assert_eq!(db_to_grey(-80.0, -80.0, 0.0), 0);
        assert_eq!(db_to_grey(0.0, -80.0, 0.0), 255);
        let mut last = 0;
        for i in 0..=80 {
            let g = db_to_grey(-80.0 + i as f32, -80.0, 0.0);
            assert!(g >= last);
            last = g;
        }
    }

    #[test]
    fn test_dimensions_and_legend() {
        let zones = default_zones();
        let artifact = render(&ramp_frame(), &zones, &opts(0.22)).unwrap();
        assert_eq!(artifact.image.width(), 120);
        assert_eq!(artifact.image.height(), 80 + legend_height(4));

        let labels: Vec<&str> = artifact.legend.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Rumble", "Body", "Presence", "Air"]);
        assert_eq!(artifact.legend[3].high_hz, 22050.0);
        assert_eq!(artifact.legend[1].caption(), "Body 100-1000 Hz");
    }

    #[test]
    fn test_low_frequencies_at_bottom() {
        let artifact = render(&ramp_frame(), &default_zones(), &opts(0.0)).unwrap();
        let top = artifact.image.get_pixel(60, 0)[0];
        let bottom = artifact.image.get_pixel(60, 79)[0];
        assert!(top > 240, "top {}", top);
        assert!(bottom < 20, "bottom {}", bottom);
    }

    #[test]
    fn test_zone_band_tints_plot() {
        // With every zone red, plot pixels gain a red cast
        let zones: Vec<FrequencyZone> = default_zones()
            .into_iter()
            .map(|mut z| {
                z.color = [255, 0, 0, 255];
                z
            })
            .collect();
        let artifact = render(&ramp_frame(), &zones, &opts(0.5)).unwrap();
        let p = artifact.image.get_pixel(10, 40);
        assert!(p[0] > p[1]);
        assert_eq!(p[1], p[2]);
    }

    #[test]
    fn test_rows_use_nearest_bin() {
        // Bins at 0, nyquist/2 and nyquist; only the middle one is loud.
        // Rows between nyquist/4 and 3*nyquist/4 are nearest to it.
        let power_db = (0..4).flat_map(|_| [-80.0, 0.0, -80.0]).collect();
        let frame = SpectrogramFrame {
            power_db,
            n_frames: 4,
            n_bins: 3,
            sample_rate: 8000,
            window: 4,
            hop: 2,
            db_floor: -80.0,
            db_ceiling: 0.0,
        };
        let zones = vec![FrequencyZone::new(0.0, None, "All", [0, 0, 0, 0])];
        let options = RenderOptions {
            width: 4,
            height: 8,
            zone_alpha: 0.0,
        };
        let artifact = render(&frame, &zones, &options).unwrap();

        let column: Vec<u8> = (0..8).map(|y| artifact.image.get_pixel(0, y)[0]).collect();
        assert_eq!(column, vec![0, 0, 255, 255, 255, 255, 0, 0]);
    }

    #[test]
    fn test_render_is_deterministic() {
        let a = render(&ramp_frame(), &default_zones(), &opts(0.22)).unwrap();
        let b = render(&ramp_frame(), &default_zones(), &opts(0.22)).unwrap();
        assert_eq!(a.image.as_raw(), b.image.as_raw());
        assert_eq!(a.legend, b.legend);
    }

    #[test]
    fn test_bad_zones_rejected() {
        let zones = vec![FrequencyZone::new(0.0, Some(500.0), "Low", [0; 4])];
        assert!(matches!(
            render(&ramp_frame(), &zones, &opts(0.2)),
            Err(ScrubError::Config(_))
        ));
    }

    #[test]
    fn test_png_round_trip() {
        let artifact = render(&ramp_frame(), &default_zones(), &opts(0.22)).unwrap();
        let png = artifact.to_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");

        let decoded = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), artifact.image.dimensions());
        assert_eq!(decoded.as_raw(), artifact.image.as_raw());
    }
}
