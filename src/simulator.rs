//! Deterministic stand-in for scanner hardware.
//!
//! Every capture is a pure function of `(base seed, capture counter, finger,
//! quality level)`. Two simulators built with the same seed replay the same
//! sequence of captures byte for byte, which is what lets a simulated live
//! capture match a simulated enrollment.

use crate::provider::ProviderAvailability;
use crate::template::{FingerprintImage, FingerprintTemplate, ScanRequest, ScanResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::f64::consts::TAU;
use std::time::Duration;
use tracing::debug;

pub const SIMULATED_TEMPLATE_LEN: usize = 256;
pub const SIMULATED_WIDTH: u32 = 300;
pub const SIMULATED_HEIGHT: u32 = 400;
pub const SIMULATED_DPI: u32 = 500;
/// Minutiae reported for a perfect-quality simulated capture.
pub const MAX_SIMULATED_MINUTIAE: u32 = 50;

#[derive(Debug, Clone)]
pub struct Simulator {
    base_seed: u64,
    counter: u64,
}

impl Simulator {
    pub const PROVIDER_ID: &'static str = "simulator";

    pub fn new(seed: u64) -> Self {
        Self { base_seed: seed, counter: 0 }
    }

    pub fn seed(&self) -> u64 {
        self.base_seed
    }

    /// Number of captures taken so far.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn detect(&self) -> ProviderAvailability {
        ProviderAvailability::Available {
            provider_id: Self::PROVIDER_ID.to_string(),
            detail: format!("deterministic simulator (seed {})", self.base_seed),
        }
    }

    /// Produces a capture. Infallible.
    pub fn capture(&mut self, request: &ScanRequest) -> ScanResult {
        let seed = derive_seed(self.base_seed, self.counter, request);
        self.counter = self.counter.wrapping_add(1);

        let mut rng = StdRng::from_seed(seed);

        let level = request.quality_level;
        let spread_draw = (rng.random::<f64>() + rng.random::<f64>() + rng.random::<f64>()) / 3.0;
        let quality_score =
            (level.mean_quality() + level.quality_spread() * (2.0 * spread_draw - 1.0)).clamp(0.0, 1.0);
        let minutiae_count = (f64::from(MAX_SIMULATED_MINUTIAE) * quality_score).round() as u32;
        let capture_duration = Duration::from_millis(rng.random_range(1200..=3500));

        let template = expand_template(&seed);
        let image = render_image(&mut rng, request, quality_score);

        debug!(
            "Simulated capture #{} of {} ({}): quality {:.3}, {} minutiae",
            self.counter, request.finger_position, level, quality_score, minutiae_count
        );

        ScanResult {
            provider_id: Self::PROVIDER_ID.to_string(),
            finger_position: request.finger_position,
            quality_score,
            minutiae_count,
            image_dpi: SIMULATED_DPI,
            image_dimensions: (SIMULATED_WIDTH, SIMULATED_HEIGHT),
            capture_duration,
            live_finger_detected: true,
            template: FingerprintTemplate::simulated(template, quality_score, minutiae_count),
            secondary_quality_metric: None,
            image: Some(image),
        }
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(0)
    }
}

fn derive_seed(base_seed: u64, counter: u64, request: &ScanRequest) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"ridgeprint/simulator/v1");
    hasher.update(base_seed.to_le_bytes());
    hasher.update(counter.to_le_bytes());
    hasher.update([request.finger_position.nist_code(), request.quality_level as u8]);
    hasher.finalize().into()
}

fn expand_template(seed: &[u8; 32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(SIMULATED_TEMPLATE_LEN);
    let mut block: u32 = 0;
    while out.len() < SIMULATED_TEMPLATE_LEN {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(block.to_le_bytes());
        out.extend_from_slice(&hasher.finalize());
        block = block.wrapping_add(1);
    }
    out.truncate(SIMULATED_TEMPLATE_LEN);
    out
}

/// Concentric ridge pattern whose centre shifts per finger, with noise that
/// grows as quality drops.
fn render_image(rng: &mut StdRng, request: &ScanRequest, quality: f64) -> FingerprintImage {
    let width = SIMULATED_WIDTH;
    let height = SIMULATED_HEIGHT;
    let offset = f64::from(request.finger_position.nist_code()) * 10.0 - 55.0;
    let centre_x = f64::from(width) / 2.0 + offset;
    let centre_y = f64::from(height) / 2.0 + rng.random_range(-20.0..20.0);
    let period = rng.random_range(7.0..10.0);
    let noise = (1.0 - quality) * 120.0;

    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let dx = f64::from(x) - centre_x;
            let dy = (f64::from(y) - centre_y) * 0.8;
            let ridge = ((dx * dx + dy * dy).sqrt() * TAU / period).sin();
            let jitter = (rng.random::<f64>() - 0.5) * noise;
            let value = 128.0 + 100.0 * ridge + jitter;
            pixels.push(value.clamp(0.0, 255.0) as u8);
        }
    }

    FingerprintImage { width, height, dpi: SIMULATED_DPI, pixels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{FingerPosition, QualityLevel};

    #[test]
    fn counter_advances_per_capture() {
        let mut sim = Simulator::new(3);
        let request = ScanRequest::new(FingerPosition::LeftRing, QualityLevel::Low);
        let first = sim.capture(&request);
        let second = sim.capture(&request);
        assert_eq!(sim.counter(), 2);
        assert_ne!(first.template.data, second.template.data);
    }

    #[test]
    fn template_has_fixed_length() {
        let seed = [7u8; 32];
        assert_eq!(expand_template(&seed).len(), SIMULATED_TEMPLATE_LEN);
        assert_eq!(expand_template(&seed), expand_template(&seed));
    }

    #[test]
    fn image_matches_reported_dimensions() {
        let mut sim = Simulator::new(0);
        let scan = sim.capture(&ScanRequest::new(FingerPosition::RightIndex, QualityLevel::Medium));
        let image = match scan.image {
            Some(image) => image,
            None => panic!("simulator must render an image"),
        };
        assert_eq!((image.width, image.height), scan.image_dimensions);
        assert_eq!(image.pixels.len(), (SIMULATED_WIDTH * SIMULATED_HEIGHT) as usize);
    }
}
