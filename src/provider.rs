//! Capability providers: the ways a capture can be obtained.
//!
//! [`Provider::capture`] is the one place where hardware absence is turned
//! into a simulated capture. Vendor adapters report `HardwareUnavailable`
//! and never fall back on their own.

use crate::config::EngineConfig;
use crate::error::RidgeprintError;
use crate::hardware::HardwareProbe;
use crate::nbis::{MinutiaeToolchain, NbisAdapter};
use crate::simulator::Simulator;
use crate::template::{ScanRequest, ScanResult};
use crate::vendor::{SdkRegistry, VendorAdapter, VendorKind};
use crate::watchdog::CallTracker;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of probing a provider. Probing never fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderAvailability {
    Available { provider_id: String, detail: String },
    Unavailable { provider_id: String, reason: String },
}

impl ProviderAvailability {
    pub fn is_available(&self) -> bool {
        matches!(self, ProviderAvailability::Available { .. })
    }

    pub fn provider_id(&self) -> &str {
        match self {
            ProviderAvailability::Available { provider_id, .. }
            | ProviderAvailability::Unavailable { provider_id, .. } => provider_id,
        }
    }
}

impl fmt::Display for ProviderAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderAvailability::Available { provider_id, detail } => {
                write!(f, "{provider_id}: available ({detail})")
            }
            ProviderAvailability::Unavailable { provider_id, reason } => {
                write!(f, "{provider_id}: unavailable ({reason})")
            }
        }
    }
}

#[derive(Debug)]
pub enum Provider {
    Vendor(VendorAdapter),
    Nbis(NbisAdapter),
    Simulator(Simulator),
}

impl Provider {
    pub fn id(&self) -> String {
        match self {
            Provider::Vendor(adapter) => adapter.kind().to_string(),
            Provider::Nbis(adapter) => format!("nbis+{}", adapter.source().id()),
            Provider::Simulator(_) => Simulator::PROVIDER_ID.to_string(),
        }
    }

    pub fn detect(&mut self) -> ProviderAvailability {
        match self {
            Provider::Vendor(adapter) => adapter.detect(),
            Provider::Nbis(adapter) => adapter.detect(),
            Provider::Simulator(sim) => sim.detect(),
        }
    }

    /// Captures one finger.
    ///
    /// # Errors
    /// Only capture-level failures surface (`CaptureTimeout`,
    /// `LiveFingerNotDetected`). `HardwareUnavailable` from a vendor adapter is
    /// answered with a capture from that adapter's simulator.
    pub fn capture(&mut self, request: &ScanRequest) -> Result<ScanResult, RidgeprintError> {
        match self {
            Provider::Simulator(sim) => Ok(sim.capture(request)),
            Provider::Nbis(adapter) => adapter.capture(request),
            Provider::Vendor(adapter) => match adapter.capture(request) {
                Err(RidgeprintError::HardwareUnavailable(reason)) => {
                    warn!(
                        "{} capture unavailable ({reason}), falling back to simulator for {}",
                        adapter.kind(),
                        request.finger_position
                    );
                    Ok(adapter.fallback_mut().capture(request))
                }
                other => other,
            },
        }
    }

    pub fn close(&mut self) {
        match self {
            Provider::Vendor(adapter) => adapter.close(),
            Provider::Nbis(adapter) => adapter.source_mut().close(),
            Provider::Simulator(_) => {}
        }
    }

    pub fn is_simulated(&self) -> bool {
        match self {
            Provider::Simulator(_) => true,
            Provider::Nbis(adapter) => adapter.source().is_simulated(),
            Provider::Vendor(_) => false,
        }
    }
}

/// Builds the active provider from configuration and the bound capabilities.
pub struct ProviderSelector {
    vendor_preference: Vec<VendorKind>,
    capture_timeout: Duration,
    simulator_seed: u64,
    nbis_enabled: bool,
    sdks: SdkRegistry,
    toolchain: Option<Arc<dyn MinutiaeToolchain>>,
    probe: HardwareProbe,
    /// Outlives the adapters so a re-selection sees SDK calls still stuck from before.
    sdk_calls: HashMap<VendorKind, CallTracker>,
}

impl ProviderSelector {
    pub fn new(config: &EngineConfig, sdks: SdkRegistry, toolchain: Option<Arc<dyn MinutiaeToolchain>>) -> Self {
        Self {
            vendor_preference: config.vendor_preference.clone(),
            capture_timeout: config.capture_timeout,
            simulator_seed: config.simulator_seed,
            nbis_enabled: config.nbis.enabled,
            sdks,
            toolchain,
            probe: HardwareProbe::new(config.probe_hardware, config.probe_cache_ttl),
            sdk_calls: VendorKind::ALL.into_iter().map(|vendor| (vendor, CallTracker::new())).collect(),
        }
    }

    pub fn sdks(&self) -> &SdkRegistry {
        &self.sdks
    }

    pub fn toolchain(&self) -> Option<&Arc<dyn MinutiaeToolchain>> {
        self.toolchain.as_ref()
    }

    pub fn probe(&self) -> &HardwareProbe {
        &self.probe
    }

    /// First vendor in preference order whose SDK opens, else the simulator.
    /// Wrapped by the NBIS adapter when its tool chain is complete.
    pub fn select(&self) -> Provider {
        let attached = self.probe.detect_all();
        let mut chosen = None;

        for &vendor in &self.vendor_preference {
            let mut adapter = VendorAdapter::new(
                vendor,
                self.sdks.get(vendor),
                self.capture_timeout,
                Simulator::new(self.simulator_seed),
            );
            if let Some(calls) = self.sdk_calls.get(&vendor) {
                adapter = adapter.with_call_tracker(calls.clone());
            }
            match adapter.detect() {
                ProviderAvailability::Available { provider_id, detail } => {
                    info!("Selected {provider_id} capture provider: {detail}");
                    chosen = Some(Provider::Vendor(adapter));
                    break;
                }
                ProviderAvailability::Unavailable { provider_id, reason } => {
                    match attached.iter().find(|hw| hw.vendor == Some(vendor)) {
                        Some(hw) => warn!("{provider_id} hardware present ({}) but unusable: {reason}", hw.evidence),
                        None => debug!("{provider_id} unavailable: {reason}"),
                    }
                }
            }
        }

        let base = chosen.unwrap_or_else(|| {
            info!("No vendor scanner available, using simulator (seed {})", self.simulator_seed);
            Provider::Simulator(Simulator::new(self.simulator_seed))
        });

        match &self.toolchain {
            Some(toolchain) if self.nbis_enabled && toolchain.available() => {
                info!("NBIS tool chain available, enriching {} captures", base.id());
                Provider::Nbis(NbisAdapter::new(Arc::clone(toolchain), base))
            }
            _ => base,
        }
    }
}

impl fmt::Debug for ProviderSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSelector")
            .field("vendor_preference", &self.vendor_preference)
            .field("capture_timeout", &self.capture_timeout)
            .field("simulator_seed", &self.simulator_seed)
            .field("nbis_enabled", &self.nbis_enabled)
            .field("nbis_available", &self.toolchain.as_ref().map(|t| t.available()))
            .field("sdks", &self.sdks)
            .field("probe", &self.probe)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{FingerPosition, QualityLevel};

    fn offline_config() -> EngineConfig {
        let mut config = EngineConfig { probe_hardware: false, ..EngineConfig::default() };
        config.nbis.enabled = false;
        config
    }

    #[test]
    fn falls_back_to_simulator_without_sdks() {
        let selector = ProviderSelector::new(&offline_config(), SdkRegistry::new(), None);
        let mut provider = selector.select();
        assert!(provider.is_simulated());
        assert_eq!(provider.id(), "simulator");
        assert!(provider.detect().is_available());
    }

    #[test]
    fn vendor_without_device_falls_back_on_capture() {
        let mut provider = Provider::Vendor(VendorAdapter::new(
            VendorKind::Futronic,
            None,
            Duration::from_secs(1),
            Simulator::new(9),
        ));
        let request = ScanRequest::new(FingerPosition::LeftThumb, QualityLevel::Medium);
        let scan = match provider.capture(&request) {
            Ok(scan) => scan,
            Err(e) => panic!("fallback capture failed: {e}"),
        };
        assert_eq!(scan.provider_id, "simulator");
        assert!(!scan.template.data.is_empty());
    }

    #[test]
    fn availability_display() {
        let unavailable = ProviderAvailability::Unavailable {
            provider_id: "suprema".to_string(),
            reason: "no SDK bound for Suprema".to_string(),
        };
        assert_eq!(unavailable.provider_id(), "suprema");
        assert_eq!(unavailable.to_string(), "suprema: unavailable (no SDK bound for Suprema)");
    }
}
