use crate::error::RidgeprintError;
use crate::template::QualityLevel;
use crate::vendor::VendorKind;
use std::path::PathBuf;
use std::time::Duration;

/// Default confidence a candidate must reach to be reported as a match.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.75;

/// What a capture request does when the device already has one in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPolicy {
    /// Wait for the in-flight capture to release the device.
    #[default]
    Block,
    /// Fail immediately with `DeviceBusy`.
    Reject,
}

/// Weights and normalization constants for score fusion.
///
/// The defaults are empirical example values without a published derivation.
/// Replace them with figures calibrated on real data before relying on the
/// scores operationally.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionConfig {
    /// Weight of the normalized bozorth3 score in the fused confidence.
    pub nbis_weight: f64,
    /// Weight of the vendor or simulation comparator in the fused confidence.
    pub base_weight: f64,
    /// bozorth3 score treated as a certain match.
    pub bozorth_max_score: f64,
    /// Number of NFIQ classes (1 best .. n worst).
    pub nfiq_levels: u8,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self { nbis_weight: 0.7, base_weight: 0.3, bozorth_max_score: 400.0, nfiq_levels: 5 }
    }
}

impl FusionConfig {
    /// Maps an NFIQ class to [0,1], 1.0 being the best class.
    pub fn normalize_nfiq(&self, class: u8) -> f64 {
        let levels = f64::from(self.nfiq_levels.max(1));
        let class = f64::from(class.clamp(1, self.nfiq_levels.max(1)));
        (levels + 1.0 - class) / levels
    }

    pub fn normalize_bozorth(&self, raw: u32) -> f64 {
        if self.bozorth_max_score <= 0.0 {
            return 0.0;
        }
        (f64::from(raw) / self.bozorth_max_score).clamp(0.0, 1.0)
    }
}

/// Location and invocation limits of the NBIS tool chain.
#[derive(Debug, Clone, PartialEq)]
pub struct NbisConfig {
    /// When false the NBIS adapter is never selected and fusion skips rule 1.
    pub enabled: bool,
    /// Directory holding the executables. Falls back to `$NBIS_HOME/bin`, then `PATH`.
    pub tool_dir: Option<PathBuf>,
    pub mindtct: String,
    pub bozorth3: String,
    pub nfiq: String,
    /// Upper bound for a single tool invocation.
    pub timeout: Duration,
}

impl Default for NbisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tool_dir: None,
            mindtct: "mindtct".to_string(),
            bozorth3: "bozorth3".to_string(),
            nfiq: "nfiq".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Configuration for the scanner device, matcher and sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Vendor families tried, in order, when selecting a capture provider.
    pub vendor_preference: Vec<VendorKind>,
    /// Upper bound for a vendor SDK call.
    pub capture_timeout: Duration,
    pub busy_policy: BusyPolicy,
    /// Captures below this quality score fail with `InsufficientQuality`.
    pub min_capture_quality: f64,
    pub match_threshold: f64,
    /// Quality level requested for every finger of a ten-finger session.
    pub session_quality: QualityLevel,
    /// Scoring threads used by identification.
    pub workers: usize,
    /// Base seed of the simulator provider.
    pub simulator_seed: u64,
    /// Look for attached scanners (USB listing, driver paths) during detection.
    pub probe_hardware: bool,
    pub probe_cache_ttl: Duration,
    pub nbis: NbisConfig,
    pub fusion: FusionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vendor_preference: VendorKind::ALL.to_vec(),
            capture_timeout: Duration::from_secs(30),
            busy_policy: BusyPolicy::default(),
            min_capture_quality: 0.30,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            session_quality: QualityLevel::High,
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            simulator_seed: 0,
            probe_hardware: true,
            probe_cache_ttl: Duration::from_secs(60),
            nbis: NbisConfig::default(),
            fusion: FusionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Checks the invariants the engine relies on.
    ///
    /// # Errors
    /// Returns `RidgeprintError::Misconfiguration` naming the first offending field.
    pub fn validate(&self) -> Result<(), RidgeprintError> {
        if self.workers == 0 {
            return Err(RidgeprintError::Misconfiguration(
                "Worker count must be greater than 0".to_string(),
            ));
        }
        if self.capture_timeout.is_zero() {
            return Err(RidgeprintError::Misconfiguration(
                "Capture timeout must be greater than 0".to_string(),
            ));
        }
        if self.nbis.timeout.is_zero() {
            return Err(RidgeprintError::Misconfiguration(
                "NBIS tool timeout must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.match_threshold) {
            return Err(RidgeprintError::Misconfiguration(format!(
                "Match threshold {} is outside [0, 1]",
                self.match_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.min_capture_quality) {
            return Err(RidgeprintError::Misconfiguration(format!(
                "Minimum capture quality {} is outside [0, 1]",
                self.min_capture_quality
            )));
        }
        let fusion = &self.fusion;
        if fusion.nbis_weight < 0.0
            || fusion.base_weight < 0.0
            || (fusion.nbis_weight + fusion.base_weight - 1.0).abs() > 1e-9
        {
            return Err(RidgeprintError::Misconfiguration(format!(
                "Fusion weights must be non-negative and sum to 1 (got {} + {})",
                fusion.nbis_weight, fusion.base_weight
            )));
        }
        if fusion.bozorth_max_score <= 0.0 {
            return Err(RidgeprintError::Misconfiguration(
                "bozorth3 maximum score must be positive".to_string(),
            ));
        }
        if fusion.nfiq_levels == 0 {
            return Err(RidgeprintError::Misconfiguration(
                "NFIQ level count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
