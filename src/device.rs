//! The scanner device: one active provider, a state readable at any time,
//! and at most one capture in flight.

use crate::config::{BusyPolicy, EngineConfig};
use crate::error::RidgeprintError;
use crate::nbis::MinutiaeToolchain;
use crate::provider::{Provider, ProviderSelector};
use crate::template::{ScanRequest, ScanResult};
use crate::vendor::SdkRegistry;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeviceState {
    Disconnected = 0,
    Detecting = 1,
    Ready = 2,
    Scanning = 3,
    /// The last capture failed. Returns to `Ready` when the next capture
    /// starts or on [`ScannerDevice::reset`].
    Error = 4,
}

impl DeviceState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => DeviceState::Detecting,
            2 => DeviceState::Ready,
            3 => DeviceState::Scanning,
            4 => DeviceState::Error,
            _ => DeviceState::Disconnected,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeviceState::Disconnected => "disconnected",
            DeviceState::Detecting => "detecting",
            DeviceState::Ready => "ready",
            DeviceState::Scanning => "scanning",
            DeviceState::Error => "error",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub state: DeviceState,
    pub provider_id: String,
    pub captures: u64,
    pub failures: u64,
    /// Most recent capture failure, kept after the device recovers.
    pub last_failure: Option<RidgeprintError>,
}

pub struct ScannerDevice {
    provider: Mutex<Option<Provider>>,
    state: AtomicU8,
    provider_id: RwLock<String>,
    selector: ProviderSelector,
    policy: BusyPolicy,
    min_capture_quality: f64,
    captures: AtomicU64,
    failures: AtomicU64,
    last_failure: Mutex<Option<RidgeprintError>>,
}

impl ScannerDevice {
    /// Validates `config`, runs provider selection and leaves the device ready.
    ///
    /// # Errors
    /// Returns `Misconfiguration` if the configuration is invalid. Missing
    /// hardware is not an error: the device then runs on the simulator.
    pub fn open(
        config: &EngineConfig,
        sdks: SdkRegistry,
        toolchain: Option<Arc<dyn MinutiaeToolchain>>,
    ) -> Result<Self, RidgeprintError> {
        config.validate()?;
        let device = Self {
            provider: Mutex::new(None),
            state: AtomicU8::new(DeviceState::Disconnected as u8),
            provider_id: RwLock::new(String::new()),
            selector: ProviderSelector::new(config, sdks, toolchain),
            policy: config.busy_policy,
            min_capture_quality: config.min_capture_quality,
            captures: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_failure: Mutex::new(None),
        };
        let mut slot = device.lock_provider();
        device.install(&mut slot);
        drop(slot);
        Ok(device)
    }

    /// Current state. Never waits on an in-flight capture.
    pub fn state(&self) -> DeviceState {
        DeviceState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            state: self.state(),
            provider_id: self.provider_id(),
            captures: self.captures.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            last_failure: self.last_failure.lock().unwrap_or_else(PoisonError::into_inner).clone(),
        }
    }

    pub fn provider_id(&self) -> String {
        self.provider_id.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn busy_policy(&self) -> BusyPolicy {
        self.policy
    }

    /// Captures one finger through the active provider.
    ///
    /// # Errors
    /// - `DeviceBusy` under [`BusyPolicy::Reject`] while another capture is in flight
    /// - `DeviceNotReady` after [`close`](Self::close)
    /// - `CaptureTimeout`, `LiveFingerNotDetected` or `InsufficientQuality`
    ///   when the capture itself fails; the device is then in the error state
    pub fn capture(&self, request: &ScanRequest) -> Result<ScanResult, RidgeprintError> {
        let mut slot = match self.policy {
            BusyPolicy::Block => self.lock_provider(),
            BusyPolicy::Reject => match self.provider.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    debug!("Rejecting {} capture, device busy", request.finger_position);
                    return Err(RidgeprintError::DeviceBusy);
                }
            },
        };

        let Some(provider) = slot.as_mut() else {
            return Err(RidgeprintError::DeviceNotReady("device is closed".to_string()));
        };

        self.reset();
        self.set_state(DeviceState::Scanning);
        let result = provider.capture(request).and_then(|scan| self.accept(scan));

        match &result {
            Ok(scan) => {
                self.captures.fetch_add(1, Ordering::Relaxed);
                self.set_state(DeviceState::Ready);
                info!(
                    "Captured {} via {}: quality {:.3} ({}), {} minutiae",
                    scan.finger_position,
                    scan.provider_id,
                    scan.quality_score,
                    scan.quality_rating(),
                    scan.minutiae_count
                );
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                *self.last_failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(e.clone());
                self.set_state(DeviceState::Error);
                warn!("Capture of {} failed: {e}", request.finger_position);
            }
        }
        result
    }

    /// Moves an errored device back to ready. Captures do this on their own
    /// before scanning.
    pub fn reset(&self) {
        if self
            .state
            .compare_exchange(DeviceState::Error as u8, DeviceState::Ready as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!("Device error state cleared");
        }
    }

    /// Closes the current provider and runs provider selection again.
    /// Waits for an in-flight capture to finish.
    pub fn redetect(&self) {
        self.selector.probe().invalidate();
        let mut slot = self.lock_provider();
        if let Some(mut previous) = slot.take() {
            previous.close();
        }
        self.install(&mut slot);
    }

    /// Releases the provider. Later captures fail with `DeviceNotReady`.
    pub fn close(&self) {
        let mut slot = self.lock_provider();
        Self::release(&mut slot);
        self.set_state(DeviceState::Disconnected);
        self.provider_id.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn install(&self, slot: &mut Option<Provider>) {
        self.set_state(DeviceState::Detecting);
        let provider = self.selector.select();
        let id = provider.id();
        info!("Scanner device ready with provider {id}");
        *self.provider_id.write().unwrap_or_else(PoisonError::into_inner) = id;
        *slot = Some(provider);
        self.set_state(DeviceState::Ready);
    }

    fn release(slot: &mut Option<Provider>) {
        if let Some(mut provider) = slot.take() {
            debug!("Closing provider {}", provider.id());
            provider.close();
        }
    }

    fn accept(&self, scan: ScanResult) -> Result<ScanResult, RidgeprintError> {
        if !scan.live_finger_detected {
            return Err(RidgeprintError::LiveFingerNotDetected);
        }
        if scan.quality_score < self.min_capture_quality {
            return Err(RidgeprintError::InsufficientQuality(scan.quality_score));
        }
        Ok(scan)
    }

    fn lock_provider(&self) -> MutexGuard<'_, Option<Provider>> {
        self.provider.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: DeviceState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Drop for ScannerDevice {
    fn drop(&mut self) {
        let slot = self.provider.get_mut().unwrap_or_else(PoisonError::into_inner);
        Self::release(slot);
    }
}

impl fmt::Debug for ScannerDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScannerDevice")
            .field("status", &self.status())
            .field("policy", &self.policy)
            .field("min_capture_quality", &self.min_capture_quality)
            .field("selector", &self.selector)
            .finish()
    }
}
