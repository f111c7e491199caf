//! Vendor scanner families and the adapter that drives their SDKs.
//!
//! The SDKs themselves are opaque: an integration implements [`VendorSdk`]
//! and registers it in an [`SdkRegistry`]. Without a registered SDK a vendor
//! adapter is simply unavailable and captures fall back to the simulator.

use crate::error::RidgeprintError;
use crate::provider::ProviderAvailability;
use crate::simulator::Simulator;
use crate::template::{FingerprintImage, FingerprintTemplate, ScanRequest, ScanResult};
use crate::watchdog::{run_bounded, BoundedCallError, CallTracker};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Supported scanner vendor families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VendorKind {
    DigitalPersona,
    Suprema,
    SecuGen,
    Futronic,
    HidGlobal,
}

impl VendorKind {
    pub const ALL: [VendorKind; 5] = [
        VendorKind::DigitalPersona,
        VendorKind::Suprema,
        VendorKind::SecuGen,
        VendorKind::Futronic,
        VendorKind::HidGlobal,
    ];

    pub fn profile(self) -> &'static VendorProfile {
        &VENDOR_PROFILES[&self]
    }

    /// Scales a raw SDK similarity score to [0,1] by the vendor's documented maximum.
    pub fn normalize_score(self, raw: u32) -> f64 {
        (f64::from(raw) / self.profile().max_score).clamp(0.0, 1.0)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VendorKind::DigitalPersona => "digitalpersona",
            VendorKind::Suprema => "suprema",
            VendorKind::SecuGen => "secugen",
            VendorKind::Futronic => "futronic",
            VendorKind::HidGlobal => "hid",
        }
    }
}

impl fmt::Display for VendorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of a vendor family.
#[derive(Debug)]
pub struct VendorProfile {
    pub kind: VendorKind,
    pub display_name: &'static str,
    pub models: &'static [&'static str],
    /// Lower-case substrings identifying the vendor in a USB device listing.
    pub usb_keywords: &'static [&'static str],
    /// Install locations of the vendor's driver or runtime.
    pub driver_paths: &'static [&'static str],
    /// Upper bound of the SDK's similarity score.
    pub max_score: f64,
}

lazy_static! {
    static ref VENDOR_PROFILES: HashMap<VendorKind, VendorProfile> = {
        let mut map = HashMap::new();
        map.insert(
            VendorKind::DigitalPersona,
            VendorProfile {
                kind: VendorKind::DigitalPersona,
                display_name: "Digital Persona",
                models: &["U.are.U 4500"],
                usb_keywords: &["digitalpersona", "digital persona"],
                driver_paths: &[
                    "C:\\Program Files\\DigitalPersona",
                    "C:\\Program Files (x86)\\DigitalPersona",
                    "/opt/DigitalPersona",
                ],
                max_score: 100.0,
            },
        );
        map.insert(
            VendorKind::Suprema,
            VendorProfile {
                kind: VendorKind::Suprema,
                display_name: "Suprema",
                models: &["BioMini Plus 2"],
                usb_keywords: &["suprema", "biomini"],
                driver_paths: &["C:\\Program Files\\Suprema", "/opt/suprema"],
                max_score: 400.0,
            },
        );
        map.insert(
            VendorKind::SecuGen,
            VendorProfile {
                kind: VendorKind::SecuGen,
                display_name: "SecuGen",
                models: &["Hamster Pro 20"],
                usb_keywords: &["secugen", "hamster"],
                driver_paths: &["C:\\Program Files\\SecuGen", "/opt/secugen"],
                max_score: 199.0,
            },
        );
        map.insert(
            VendorKind::Futronic,
            VendorProfile {
                kind: VendorKind::Futronic,
                display_name: "Futronic",
                models: &["FS88H"],
                usb_keywords: &["futronic"],
                driver_paths: &["C:\\Program Files\\Futronic", "/opt/futronic"],
                max_score: 100.0,
            },
        );
        map.insert(
            VendorKind::HidGlobal,
            VendorProfile {
                kind: VendorKind::HidGlobal,
                display_name: "HID DigitalPersona",
                models: &["DigitalPersona 4500"],
                usb_keywords: &["hid global"],
                driver_paths: &["C:\\Program Files\\HID Global"],
                max_score: 100.0,
            },
        );
        map
    };
}

/// Failures reported by an SDK integration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdkError {
    #[error("SDK not installed")]
    NotInstalled,
    #[error("device not found")]
    DeviceNotFound,
    #[error("I/O error: {0}")]
    Io(String),
    #[error("no live finger detected")]
    NoLiveFinger,
}

impl From<SdkError> for RidgeprintError {
    fn from(error: SdkError) -> Self {
        match error {
            SdkError::NoLiveFinger => RidgeprintError::LiveFingerNotDetected,
            other => RidgeprintError::HardwareUnavailable(other.to_string()),
        }
    }
}

/// Device details reported when an SDK opens a scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model: String,
    pub serial: Option<String>,
    pub firmware: Option<String>,
}

/// Raw capture as handed back by an SDK.
#[derive(Debug, Clone, PartialEq)]
pub struct SdkCapture {
    pub template: Vec<u8>,
    /// 0-100 as reported by the SDK.
    pub quality: u8,
    pub minutiae_count: u32,
    pub live_finger: bool,
    pub dpi: u32,
    pub width: u32,
    pub height: u32,
    pub image: Option<Vec<u8>>,
}

/// Capability exposed by a vendor SDK integration.
///
/// Implementations must be callable from any thread; calls are wrapped in a
/// bounded wait by the adapter.
pub trait VendorSdk: Send + Sync {
    fn vendor(&self) -> VendorKind;

    fn open(&self) -> Result<DeviceInfo, SdkError>;

    fn capture(&self, request: &ScanRequest) -> Result<SdkCapture, SdkError>;

    /// Raw similarity between two native templates, on the vendor's scale.
    fn compare(&self, probe: &[u8], gallery: &[u8]) -> Result<u32, SdkError>;

    fn close(&self) {}
}

/// SDK integrations available to this process, keyed by vendor.
#[derive(Clone, Default)]
pub struct SdkRegistry {
    sdks: HashMap<VendorKind, Arc<dyn VendorSdk>>,
}

impl SdkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `sdk` under its own vendor, replacing any previous one.
    pub fn register(&mut self, sdk: Arc<dyn VendorSdk>) {
        let vendor = sdk.vendor();
        debug!("Registering SDK for {vendor}");
        self.sdks.insert(vendor, sdk);
    }

    pub fn with(mut self, sdk: Arc<dyn VendorSdk>) -> Self {
        self.register(sdk);
        self
    }

    pub fn get(&self, vendor: VendorKind) -> Option<Arc<dyn VendorSdk>> {
        self.sdks.get(&vendor).map(Arc::clone)
    }

    pub fn is_empty(&self) -> bool {
        self.sdks.is_empty()
    }
}

impl fmt::Debug for SdkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut vendors: Vec<_> = self.sdks.keys().collect();
        vendors.sort();
        f.debug_struct("SdkRegistry").field("vendors", &vendors).finish()
    }
}

/// Capability provider backed by one vendor's SDK.
///
/// Holds the simulator it falls back to when the hardware path is unusable.
/// An SDK call that overran the timeout leaves the SDK unusable until it
/// returns; captures in that window are served by the simulator.
pub struct VendorAdapter {
    kind: VendorKind,
    sdk: Option<Arc<dyn VendorSdk>>,
    timeout: Duration,
    device: Option<DeviceInfo>,
    fallback: Simulator,
    calls: CallTracker,
}

impl VendorAdapter {
    pub fn new(kind: VendorKind, sdk: Option<Arc<dyn VendorSdk>>, timeout: Duration, fallback: Simulator) -> Self {
        Self { kind, sdk, timeout, device: None, fallback, calls: CallTracker::new() }
    }

    /// Shares the stall tracking of an earlier adapter for the same SDK.
    pub(crate) fn with_call_tracker(mut self, calls: CallTracker) -> Self {
        self.calls = calls;
        self
    }

    pub fn kind(&self) -> VendorKind {
        self.kind
    }

    pub fn device(&self) -> Option<&DeviceInfo> {
        self.device.as_ref()
    }

    /// True while a timed-out SDK call is still running.
    pub fn sdk_stalled(&self) -> bool {
        self.calls.is_stalled()
    }

    pub(crate) fn fallback_mut(&mut self) -> &mut Simulator {
        &mut self.fallback
    }

    /// Opens the SDK device. Never fails: problems are reported as unavailability.
    pub fn detect(&mut self) -> ProviderAvailability {
        let provider_id = self.kind.to_string();
        let Some(sdk) = self.sdk.clone() else {
            return ProviderAvailability::Unavailable {
                provider_id,
                reason: format!("no SDK bound for {}", self.kind.profile().display_name),
            };
        };

        match run_bounded(self.kind.as_str(), self.timeout, &self.calls, move || sdk.open()) {
            Ok(Ok(info)) => {
                info!("{} scanner opened: {}", self.kind.profile().display_name, info.model);
                let detail = info.model.clone();
                self.device = Some(info);
                ProviderAvailability::Available { provider_id, detail }
            }
            Ok(Err(e)) => {
                debug!("{} SDK open failed: {e}", self.kind);
                ProviderAvailability::Unavailable { provider_id, reason: e.to_string() }
            }
            Err(BoundedCallError::TimedOut) => ProviderAvailability::Unavailable {
                provider_id,
                reason: format!("SDK open timed out after {:?}", self.timeout),
            },
            Err(BoundedCallError::Aborted) => ProviderAvailability::Unavailable {
                provider_id,
                reason: "SDK open aborted".to_string(),
            },
            Err(BoundedCallError::Stalled) => ProviderAvailability::Unavailable {
                provider_id,
                reason: "an earlier SDK call is still running".to_string(),
            },
        }
    }

    /// Captures through the SDK.
    ///
    /// Hardware-level problems come back as `HardwareUnavailable`; the
    /// fallback to the simulator is applied by `Provider::capture`.
    pub fn capture(&mut self, request: &ScanRequest) -> Result<ScanResult, RidgeprintError> {
        let Some(sdk) = self.sdk.clone() else {
            return Err(RidgeprintError::HardwareUnavailable(format!("no SDK bound for {}", self.kind)));
        };
        if self.device.is_none() {
            return Err(RidgeprintError::HardwareUnavailable(format!("{} device not opened", self.kind)));
        }

        let started = Instant::now();
        let owned_request = *request;
        let raw = match run_bounded(self.kind.as_str(), self.timeout, &self.calls, move || sdk.capture(&owned_request)) {
            Ok(result) => result?,
            Err(BoundedCallError::TimedOut) => return Err(RidgeprintError::CaptureTimeout(self.timeout)),
            Err(BoundedCallError::Aborted) => {
                return Err(RidgeprintError::HardwareUnavailable(format!("{} SDK call aborted", self.kind)))
            }
            Err(BoundedCallError::Stalled) => {
                return Err(RidgeprintError::HardwareUnavailable(format!(
                    "{} SDK still busy with a timed-out capture",
                    self.kind
                )))
            }
        };

        if raw.template.is_empty() {
            warn!("{} SDK returned an empty template", self.kind);
            return Err(RidgeprintError::HardwareUnavailable("SDK returned an empty template".to_string()));
        }

        let quality = f64::from(raw.quality.min(100)) / 100.0;
        let image = raw.image.and_then(|pixels| {
            let expected = u64::from(raw.width) * u64::from(raw.height);
            (expected > 0 && pixels.len() as u64 == expected).then_some(FingerprintImage {
                width: raw.width,
                height: raw.height,
                dpi: raw.dpi,
                pixels,
            })
        });

        Ok(ScanResult {
            provider_id: self.kind.to_string(),
            finger_position: request.finger_position,
            quality_score: quality,
            minutiae_count: raw.minutiae_count,
            image_dpi: raw.dpi,
            image_dimensions: (raw.width, raw.height),
            capture_duration: started.elapsed(),
            live_finger_detected: raw.live_finger,
            template: FingerprintTemplate::vendor_native(self.kind, raw.template, quality, raw.minutiae_count),
            secondary_quality_metric: None,
            image,
        })
    }

    pub fn close(&mut self) {
        if self.device.take().is_some() {
            if let Some(sdk) = &self.sdk {
                debug!("Closing {} SDK", self.kind);
                sdk.close();
            }
        }
    }
}

impl fmt::Debug for VendorAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VendorAdapter")
            .field("kind", &self.kind)
            .field("sdk_bound", &self.sdk.is_some())
            .field("device", &self.device)
            .field("timeout", &self.timeout)
            .field("sdk_stalled", &self.sdk_stalled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_vendor_has_a_profile() {
        for vendor in VendorKind::ALL {
            let profile = vendor.profile();
            assert_eq!(profile.kind, vendor);
            assert!(profile.max_score > 0.0);
            assert!(!profile.usb_keywords.is_empty());
        }
    }

    #[test]
    fn normalizes_by_documented_maximum() {
        assert_eq!(VendorKind::Suprema.normalize_score(200), 0.5);
        assert_eq!(VendorKind::DigitalPersona.normalize_score(100), 1.0);
        assert_eq!(VendorKind::DigitalPersona.normalize_score(250), 1.0);
    }

    #[test]
    fn sdk_errors_map_to_taxonomy() {
        assert!(matches!(RidgeprintError::from(SdkError::NoLiveFinger), RidgeprintError::LiveFingerNotDetected));
        assert!(matches!(
            RidgeprintError::from(SdkError::DeviceNotFound),
            RidgeprintError::HardwareUnavailable(_)
        ));
    }

    #[test]
    fn adapter_without_sdk_is_unavailable() {
        let mut adapter = VendorAdapter::new(VendorKind::SecuGen, None, Duration::from_secs(1), Simulator::new(0));
        assert!(!adapter.detect().is_available());
        let request = ScanRequest::new(crate::FingerPosition::RightThumb, crate::QualityLevel::High);
        assert!(matches!(adapter.capture(&request), Err(RidgeprintError::HardwareUnavailable(_))));
    }
}
