use std::time::Duration;
use thiserror::Error;

/// Error handling for capture, matching and corpus access.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RidgeprintError {
    /// No usable scanner hardware or SDK.
    ///
    /// Always recoverable: the capture path falls back to the simulator and
    /// this variant never reaches the caller of a capture.
    #[error("Hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// A capture was requested while another one is in flight on the same device.
    #[error("Device busy: a capture is already in flight")]
    DeviceBusy,

    /// The device is closed or has not finished detection.
    #[error("Device not ready: {0}")]
    DeviceNotReady(String),

    /// The capture step did not complete within the configured bound.
    #[error("Capture timed out after {0:?}")]
    CaptureTimeout(Duration),

    /// The sensor reported no live finger on the platen.
    #[error("Live finger not detected")]
    LiveFingerNotDetected,

    /// The capture quality fell below the configured minimum.
    #[error("Insufficient capture quality: {0:.2}")]
    InsufficientQuality(f64),

    /// An external minutiae tool failed or produced unparsable output.
    ///
    /// Only degrades the comparison path it occurred in.
    #[error("Extraction failure: {0}")]
    ExtractionFailure(String),

    /// The corpus supplier could not produce a snapshot.
    #[error("Corpus unavailable: {0}")]
    CorpusUnavailable(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),
}

impl RidgeprintError {
    /// Capture-level failures: recorded as `scan_failed` inside a session and
    /// returned to the caller of a single scan.
    pub fn is_capture_failure(&self) -> bool {
        matches!(
            self,
            RidgeprintError::CaptureTimeout(_)
                | RidgeprintError::LiveFingerNotDetected
                | RidgeprintError::InsufficientQuality(_)
                | RidgeprintError::DeviceBusy
                | RidgeprintError::DeviceNotReady(_)
        )
    }

    /// Whether repeating the same request can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RidgeprintError::CaptureTimeout(_)
                | RidgeprintError::LiveFingerNotDetected
                | RidgeprintError::InsufficientQuality(_)
                | RidgeprintError::DeviceBusy
        )
    }
}
