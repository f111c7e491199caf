//! Best-effort discovery of attached fingerprint scanners.
//!
//! Purely informational: finding hardware does not make a vendor usable
//! without a bound SDK, and failing to probe is never an error.

use crate::tool::{resolve_executable, run_tool};
use crate::vendor::VendorKind;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;
use ttl_cache::TtlCache;

/// Generic keywords that flag a scanner of unknown make in a USB listing.
const GENERIC_KEYWORDS: &[&str] = &["fingerprint", "biometric"];
const GENERIC_DRIVER_PATHS: &[&str] = &["/usr/lib/libfprint", "/usr/local/lib/libfprint"];
const LISTING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedHardware {
    /// `None` when the device looks like a scanner but no known vendor matched.
    pub vendor: Option<VendorKind>,
    pub evidence: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ProbeKey {
    Attached,
}

pub struct HardwareProbe {
    enabled: bool,
    ttl: Duration,
    cache: Mutex<TtlCache<ProbeKey, Vec<DetectedHardware>>>,
}

impl HardwareProbe {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self { enabled, ttl, cache: Mutex::new(TtlCache::new(1)) }
    }

    pub fn disabled() -> Self {
        Self::new(false, Duration::ZERO)
    }

    /// All scanners visible to the host, served from cache within the TTL.
    pub fn detect_all(&self) -> Vec<DetectedHardware> {
        if !self.enabled {
            return Vec::new();
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = cache.get(&ProbeKey::Attached) {
            return cached.clone();
        }

        let mut found = match usb_listing() {
            Some(listing) => match_usb_listing(&listing),
            None => Vec::new(),
        };
        found.extend(match_driver_paths(|path| Path::new(path).exists()));
        debug!("Hardware probe found {} candidate device(s)", found.len());

        if !self.ttl.is_zero() {
            cache.insert(ProbeKey::Attached, found.clone(), self.ttl);
        }
        found
    }

    /// Drops the cached probe so the next call re-scans the host.
    pub fn invalidate(&self) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.remove(&ProbeKey::Attached);
    }
}

impl std::fmt::Debug for HardwareProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareProbe").field("enabled", &self.enabled).field("ttl", &self.ttl).finish()
    }
}

/// Matches vendor and generic scanner keywords against a device listing.
pub fn match_usb_listing(listing: &str) -> Vec<DetectedHardware> {
    let mut found = Vec::new();
    for line in listing.lines() {
        let lower = line.to_ascii_lowercase();
        let vendor = VendorKind::ALL
            .into_iter()
            .find(|v| v.profile().usb_keywords.iter().any(|k| lower.contains(k)));
        if vendor.is_some() || GENERIC_KEYWORDS.iter().any(|k| lower.contains(k)) {
            found.push(DetectedHardware { vendor, evidence: format!("usb: {}", line.trim()) });
        }
    }
    found
}

fn match_driver_paths<F: Fn(&str) -> bool>(exists: F) -> Vec<DetectedHardware> {
    let mut found = Vec::new();
    for vendor in VendorKind::ALL {
        if let Some(path) = vendor.profile().driver_paths.iter().find(|p| exists(p)) {
            found.push(DetectedHardware { vendor: Some(vendor), evidence: format!("driver: {path}") });
        }
    }
    if let Some(path) = GENERIC_DRIVER_PATHS.iter().find(|p| exists(p)) {
        found.push(DetectedHardware { vendor: None, evidence: format!("driver: {path}") });
    }
    found
}

#[cfg(windows)]
fn usb_listing() -> Option<String> {
    let powershell = resolve_executable("powershell", None)?;
    let script = "Get-PnpDevice | Where-Object {$_.FriendlyName -like '*fingerprint*' -or \
                  $_.FriendlyName -like '*biometric*'} | Select-Object FriendlyName, Status";
    let output = run_tool(&powershell, ["-NoProfile", "-Command", script], LISTING_TIMEOUT).ok()?;
    output.status.success().then_some(output.stdout)
}

#[cfg(not(windows))]
fn usb_listing() -> Option<String> {
    let lsusb = resolve_executable("lsusb", None)?;
    match run_tool(&lsusb, std::iter::empty::<&str>(), LISTING_TIMEOUT) {
        Ok(output) if output.status.success() => Some(output.stdout),
        Ok(output) => {
            debug!("lsusb exited with {}: {}", output.status, output.stderr.trim());
            None
        }
        Err(e) => {
            debug!("lsusb unavailable: {e}");
            None
        }
    }
}
