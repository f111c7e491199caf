//! Pairwise template scoring.
//!
//! The comparator is chosen from what both sides carry:
//! 1. NBIS minutiae on both sides and a usable tool chain: bozorth3 fused
//!    with a secondary score (`nbis_weight * nbis + base_weight * base`).
//! 2. Native templates from the same vendor with a bound SDK: the SDK score
//!    scaled by the vendor's documented maximum.
//! 3. Anything else: [`structural_similarity`], which never fails.
//!
//! Pairs are put in a canonical order first, so `score(a, b) == score(b, a)`.

use crate::config::{EngineConfig, FusionConfig};
use crate::nbis::MinutiaeToolchain;
use crate::template::{clamp_unit, FingerprintTemplate, MinutiaPoint};
use crate::vendor::{SdkRegistry, VendorKind};
use crate::watchdog::{run_bounded, BoundedCallError, CallTracker};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const BYTE_WEIGHT: f64 = 0.6;
const QUALITY_WEIGHT: f64 = 0.2;
const MINUTIAE_WEIGHT: f64 = 0.2;

/// Comparator that produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FusionPath {
    NbisFused,
    VendorNative(VendorKind),
    Simulation,
}

impl fmt::Display for FusionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FusionPath::NbisFused => f.write_str("nbis_fused"),
            FusionPath::VendorNative(kind) => write!(f, "vendor_native:{kind}"),
            FusionPath::Simulation => f.write_str("simulation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionComponents {
    /// Vendor or simulation comparator score in [0,1].
    pub base_score: f64,
    /// Normalized bozorth3 score, present on the fused path only.
    pub nbis_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionScore {
    /// Final score in [0,1].
    pub confidence: f64,
    /// Comparator output before normalization (bozorth3 or vendor scale).
    pub raw_score: f64,
    pub path: FusionPath,
    pub components: FusionComponents,
}

pub struct MatchEngine {
    config: FusionConfig,
    sdks: SdkRegistry,
    toolchain: Option<Arc<dyn MinutiaeToolchain>>,
    timeout: Duration,
    /// Timed-out compare calls per vendor; a stalled vendor is scored by simulation.
    compare_calls: HashMap<VendorKind, CallTracker>,
}

fn compare_trackers() -> HashMap<VendorKind, CallTracker> {
    VendorKind::ALL.into_iter().map(|vendor| (vendor, CallTracker::new())).collect()
}

impl MatchEngine {
    /// An engine with neither SDKs nor NBIS: every pair takes the simulation path.
    pub fn new(config: FusionConfig) -> Self {
        Self {
            config,
            sdks: SdkRegistry::new(),
            toolchain: None,
            timeout: Duration::from_secs(30),
            compare_calls: compare_trackers(),
        }
    }

    pub fn from_config(
        config: &EngineConfig,
        sdks: SdkRegistry,
        toolchain: Option<Arc<dyn MinutiaeToolchain>>,
    ) -> Self {
        let toolchain = if config.nbis.enabled { toolchain } else { None };
        Self {
            config: config.fusion.clone(),
            sdks,
            toolchain,
            timeout: config.capture_timeout,
            compare_calls: compare_trackers(),
        }
    }

    pub fn with_sdks(mut self, sdks: SdkRegistry) -> Self {
        self.sdks = sdks;
        self
    }

    pub fn with_toolchain(mut self, toolchain: Arc<dyn MinutiaeToolchain>) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    /// Upper bound for a single vendor compare call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn nbis_available(&self) -> bool {
        self.toolchain.as_ref().is_some_and(|t| t.available())
    }

    pub fn score(&self, a: &FingerprintTemplate, b: &FingerprintTemplate) -> f64 {
        self.score_detailed(a, b).confidence
    }

    pub fn fuse(&self, nbis_score: f64, base_score: f64) -> f64 {
        clamp_unit(self.config.nbis_weight * nbis_score + self.config.base_weight * base_score)
    }

    pub fn score_detailed(&self, a: &FingerprintTemplate, b: &FingerprintTemplate) -> FusionScore {
        let (a, b) = canonical_pair(a, b);

        if let Some(fused) = self.nbis_fused(a, b) {
            return fused;
        }

        if let Some((vendor, raw, normalized)) = self.vendor_native(a, b) {
            return FusionScore {
                confidence: normalized,
                raw_score: f64::from(raw),
                path: FusionPath::VendorNative(vendor),
                components: FusionComponents { base_score: normalized, nbis_score: None },
            };
        }

        let similarity = structural_similarity(a, b);
        FusionScore {
            confidence: similarity,
            raw_score: similarity,
            path: FusionPath::Simulation,
            components: FusionComponents { base_score: similarity, nbis_score: None },
        }
    }

    fn nbis_fused(&self, a: &FingerprintTemplate, b: &FingerprintTemplate) -> Option<FusionScore> {
        if !(a.has_minutiae() && b.has_minutiae()) {
            return None;
        }
        let toolchain = self.toolchain.as_ref().filter(|t| t.available())?;

        let raw = match toolchain.match_score(&a.minutiae, &b.minutiae) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Minutiae matching failed, degrading comparison: {e}");
                return None;
            }
        };

        let nbis_score = self.config.normalize_bozorth(raw);
        let base_score = match self.vendor_native(a, b) {
            Some((_, _, normalized)) => normalized,
            None => structural_similarity(a, b),
        };
        Some(FusionScore {
            confidence: self.fuse(nbis_score, base_score),
            raw_score: f64::from(raw),
            path: FusionPath::NbisFused,
            components: FusionComponents { base_score, nbis_score: Some(nbis_score) },
        })
    }

    /// Raw and normalized SDK score when both sides come from the same vendor
    /// and that vendor's SDK is bound.
    fn vendor_native(&self, a: &FingerprintTemplate, b: &FingerprintTemplate) -> Option<(VendorKind, u32, f64)> {
        let vendor = a.vendor()?;
        if b.vendor() != Some(vendor) || a.data.is_empty() || b.data.is_empty() {
            return None;
        }
        let sdk = self.sdks.get(vendor)?;
        let calls = self.compare_calls.get(&vendor)?;

        let (probe, gallery) = (a.data.clone(), b.data.clone());
        match run_bounded(vendor.as_str(), self.timeout, calls, move || sdk.compare(&probe, &gallery)) {
            Ok(Ok(raw)) => Some((vendor, raw, vendor.normalize_score(raw))),
            Ok(Err(e)) => {
                warn!("{vendor} compare failed, using simulation comparator: {e}");
                None
            }
            Err(BoundedCallError::TimedOut) => {
                warn!("{vendor} compare exceeded {:?}, using simulation comparator", self.timeout);
                None
            }
            Err(BoundedCallError::Aborted) => {
                warn!("{vendor} compare aborted, using simulation comparator");
                None
            }
            Err(BoundedCallError::Stalled) => {
                debug!("{vendor} SDK still running a timed-out compare, using simulation comparator");
                None
            }
        }
    }
}

impl fmt::Debug for MatchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchEngine")
            .field("config", &self.config)
            .field("sdks", &self.sdks)
            .field("nbis_available", &self.nbis_available())
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn canonical_key(t: &FingerprintTemplate) -> (&[u8], &[MinutiaPoint], u64, u32) {
    (t.data.as_slice(), t.minutiae.as_slice(), t.quality_score.to_bits(), t.minutiae_count)
}

fn canonical_pair<'t>(
    a: &'t FingerprintTemplate,
    b: &'t FingerprintTemplate,
) -> (&'t FingerprintTemplate, &'t FingerprintTemplate) {
    if canonical_key(a) <= canonical_key(b) {
        (a, b)
    } else {
        (b, a)
    }
}

/// Generic comparator over template bytes, quality and minutiae count.
///
/// Byte agreement is rescaled so that unrelated random bytes (about half the
/// bits equal) score near 0 and identical bytes score 1.
pub fn structural_similarity(a: &FingerprintTemplate, b: &FingerprintTemplate) -> f64 {
    let bytes = byte_similarity(&a.data, &b.data);
    let quality = 1.0 - (clamp_unit(a.quality_score) - clamp_unit(b.quality_score)).abs();
    let most = a.minutiae_count.max(b.minutiae_count).max(1);
    let minutiae = 1.0 - f64::from(a.minutiae_count.abs_diff(b.minutiae_count)) / f64::from(most);

    let score = BYTE_WEIGHT * bytes + QUALITY_WEIGHT * quality + MINUTIAE_WEIGHT * minutiae;
    debug!("structural similarity: bytes {bytes:.3}, quality {quality:.3}, minutiae {minutiae:.3}");
    clamp_unit(score)
}

fn byte_similarity(a: &[u8], b: &[u8]) -> f64 {
    let len = a.len().max(b.len());
    if len == 0 {
        return 0.0;
    }
    let equal_bits: u64 = a.iter().zip(b).map(|(x, y)| u64::from(8 - (x ^ y).count_ones())).sum();
    let fraction = equal_bits as f64 / (len as f64 * 8.0);
    (2.0 * fraction - 1.0).max(0.0)
}
