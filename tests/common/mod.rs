#![allow(dead_code)]

use ridgeprint::{
    DeviceInfo, EngineConfig, FingerPosition, FingerprintImage, MinutiaPoint, MinutiaeToolchain, RidgeprintError,
    ScanRequest, SdkCapture, SdkError, VendorKind, VendorSdk,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Configuration that never touches the host: no hardware probe, no NBIS lookup.
pub fn offline_config() -> EngineConfig {
    let mut config = EngineConfig { probe_hardware: false, workers: 2, ..EngineConfig::default() };
    config.nbis.enabled = false;
    config
}

/// Same bytes for the same finger on every capture.
pub fn finger_template(finger: FingerPosition) -> Vec<u8> {
    vec![finger.nist_code(); 64]
}

/// In-memory vendor SDK with scripted behaviour.
pub struct ScriptedSdk {
    pub vendor: VendorKind,
    pub open_result: Result<DeviceInfo, SdkError>,
    pub failures: HashMap<FingerPosition, SdkError>,
    pub capture_delay: Duration,
    pub quality: u8,
    pub live_finger: bool,
    pub empty_template: bool,
    pub match_score: u32,
    pub mismatch_score: u32,
    pub on_capture: Option<Box<dyn Fn(usize) + Send + Sync>>,
    pub compare_delay: Duration,
    captures: AtomicUsize,
    compares: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedSdk {
    pub fn new(vendor: VendorKind) -> Self {
        Self {
            vendor,
            open_result: Ok(DeviceInfo {
                model: format!("{} test scanner", vendor),
                serial: Some("SN-0001".to_string()),
                firmware: None,
            }),
            failures: HashMap::new(),
            capture_delay: Duration::ZERO,
            quality: 90,
            live_finger: true,
            empty_template: false,
            match_score: vendor.profile().max_score as u32,
            mismatch_score: 0,
            on_capture: None,
            compare_delay: Duration::ZERO,
            captures: AtomicUsize::new(0),
            compares: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn failing_open(mut self, error: SdkError) -> Self {
        self.open_result = Err(error);
        self
    }

    pub fn failing_on(mut self, finger: FingerPosition, error: SdkError) -> Self {
        self.failures.insert(finger, error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = delay;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_scores(mut self, match_score: u32, mismatch_score: u32) -> Self {
        self.match_score = match_score;
        self.mismatch_score = mismatch_score;
        self
    }

    pub fn on_capture(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.on_capture = Some(Box::new(hook));
        self
    }

    pub fn with_compare_delay(mut self, delay: Duration) -> Self {
        self.compare_delay = delay;
        self
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn compares(&self) -> usize {
        self.compares.load(Ordering::SeqCst)
    }

    /// Highest number of SDK captures observed running at the same time.
    pub fn max_concurrent_captures(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl VendorSdk for ScriptedSdk {
    fn vendor(&self) -> VendorKind {
        self.vendor
    }

    fn open(&self) -> Result<DeviceInfo, SdkError> {
        self.open_result.clone()
    }

    fn capture(&self, request: &ScanRequest) -> Result<SdkCapture, SdkError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.capture_delay.is_zero() {
            thread::sleep(self.capture_delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let count = self.captures.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(hook) = &self.on_capture {
            hook(count);
        }
        if let Some(error) = self.failures.get(&request.finger_position) {
            return Err(error.clone());
        }
        Ok(SdkCapture {
            template: if self.empty_template { Vec::new() } else { finger_template(request.finger_position) },
            quality: self.quality,
            minutiae_count: 40,
            live_finger: self.live_finger,
            dpi: 500,
            width: 4,
            height: 2,
            image: Some(vec![128; 8]),
        })
    }

    fn compare(&self, probe: &[u8], gallery: &[u8]) -> Result<u32, SdkError> {
        self.compares.fetch_add(1, Ordering::SeqCst);
        if !self.compare_delay.is_zero() {
            thread::sleep(self.compare_delay);
        }
        Ok(if probe == gallery { self.match_score } else { self.mismatch_score })
    }
}

/// Minutiae tool chain returning fixed answers.
pub struct FixedToolchain {
    pub available: bool,
    pub minutiae: Result<Vec<MinutiaPoint>, RidgeprintError>,
    pub score: Result<u32, RidgeprintError>,
    pub nfiq: Result<u8, RidgeprintError>,
    matches: AtomicUsize,
}

impl FixedToolchain {
    pub fn new(score: u32) -> Self {
        Self {
            available: true,
            minutiae: Ok(sample_minutiae()),
            score: Ok(score),
            nfiq: Ok(2),
            matches: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self { available: false, ..Self::new(0) }
    }

    pub fn failing_match() -> Self {
        Self { score: Err(RidgeprintError::ExtractionFailure("bozorth3 crashed".to_string())), ..Self::new(0) }
    }

    pub fn failing_extraction() -> Self {
        Self {
            minutiae: Err(RidgeprintError::ExtractionFailure("mindtct crashed".to_string())),
            ..Self::new(0)
        }
    }

    pub fn match_calls(&self) -> usize {
        self.matches.load(Ordering::SeqCst)
    }
}

impl MinutiaeToolchain for FixedToolchain {
    fn available(&self) -> bool {
        self.available
    }

    fn extract(&self, _image: &FingerprintImage) -> Result<Vec<MinutiaPoint>, RidgeprintError> {
        self.minutiae.clone()
    }

    fn match_score(&self, _probe: &[MinutiaPoint], _gallery: &[MinutiaPoint]) -> Result<u32, RidgeprintError> {
        self.matches.fetch_add(1, Ordering::SeqCst);
        self.score.clone()
    }

    fn assess_quality(&self, _image: &FingerprintImage) -> Result<u8, RidgeprintError> {
        self.nfiq.clone()
    }
}

pub fn sample_minutiae() -> Vec<MinutiaPoint> {
    vec![
        MinutiaPoint { x: 10, y: 20, theta: 90, quality: 60 },
        MinutiaPoint { x: 35, y: 80, theta: 180, quality: 45 },
        MinutiaPoint { x: 120, y: 200, theta: 270, quality: 70 },
    ]
}
