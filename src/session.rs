//! Single-scan and ten-finger workflows on top of one scanner device.

use crate::config::EngineConfig;
use crate::criminal_matcher::CriminalMatcher;
use crate::db::{CorpusFilter, CorpusSource, CriminalRecord};
use crate::device::{DeviceState, DeviceStatus, ScannerDevice};
use crate::error::RidgeprintError;
use crate::fusion::MatchEngine;
use crate::nbis::{MinutiaeToolchain, NbisToolchain};
use crate::output::MatchOutcome;
use crate::template::{FingerPosition, ScanRequest, ScanResult};
use crate::vendor::{SdkRegistry, VendorSdk};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Position of a ten-finger session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    AwaitingFinger(FingerPosition),
    Capturing(FingerPosition),
    Matching(FingerPosition),
    OutcomeRecorded(FingerPosition),
    Complete,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Complete | SessionState::Aborted)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::AwaitingFinger(finger) => write!(f, "awaiting_finger({finger})"),
            SessionState::Capturing(finger) => write!(f, "capturing({finger})"),
            SessionState::Matching(finger) => write!(f, "matching({finger})"),
            SessionState::OutcomeRecorded(finger) => write!(f, "outcome_recorded({finger})"),
            SessionState::Complete => f.write_str("complete"),
            SessionState::Aborted => f.write_str("aborted"),
        }
    }
}

/// One finger of a session. Exactly one of `scan` and `failure` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerAttempt {
    pub request: ScanRequest,
    pub scan: Option<ScanResult>,
    pub failure: Option<RidgeprintError>,
    pub outcome: MatchOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    /// Attempts in capture order.
    pub attempts: Vec<FingerAttempt>,
    pub final_state: SessionState,
    pub any_match: bool,
    pub transitions: Vec<SessionState>,
}

impl SessionReport {
    pub fn matches(&self) -> impl Iterator<Item = &FingerAttempt> {
        self.attempts.iter().filter(|a| a.outcome.is_match())
    }

    pub fn failed_fingers(&self) -> Vec<FingerPosition> {
        self.attempts.iter().filter(|a| a.failure.is_some()).map(|a| a.request.finger_position).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.final_state == SessionState::Complete
    }
}

/// Owns the scanner device and the matcher, and drives capture workflows.
pub struct SessionController {
    device: ScannerDevice,
    matcher: CriminalMatcher,
    config: EngineConfig,
}

impl SessionController {
    /// Controller with no vendor SDKs bound and the NBIS tools looked up on the host.
    ///
    /// # Errors
    /// Returns `Misconfiguration` for an invalid configuration.
    pub fn new(config: EngineConfig) -> Result<Self, RidgeprintError> {
        Self::builder(config).build()
    }

    pub fn builder(config: EngineConfig) -> SessionControllerBuilder {
        SessionControllerBuilder { config, sdks: SdkRegistry::new(), toolchain: None }
    }

    pub fn device(&self) -> &ScannerDevice {
        &self.device
    }

    pub fn matcher(&self) -> &CriminalMatcher {
        &self.matcher
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn device_status(&self) -> DeviceState {
        self.device.state()
    }

    pub fn device_details(&self) -> DeviceStatus {
        self.device.status()
    }

    /// # Errors
    /// Capture-level failures are returned as-is; the caller decides whether to retry.
    pub fn capture(&self, request: &ScanRequest) -> Result<ScanResult, RidgeprintError> {
        self.device.capture(request)
    }

    pub fn identify(&self, scan: &ScanResult, corpus: &[CriminalRecord], threshold: f64) -> MatchOutcome {
        self.matcher.identify(scan, corpus, threshold)
    }

    /// Captures one finger and identifies it.
    ///
    /// # Errors
    /// Returns the capture failure, if any.
    pub fn scan_and_identify(
        &self,
        request: &ScanRequest,
        corpus: &[CriminalRecord],
        threshold: f64,
    ) -> Result<(ScanResult, MatchOutcome), RidgeprintError> {
        let scan = self.capture(request)?;
        let outcome = self.identify(&scan, corpus, threshold);
        Ok((scan, outcome))
    }

    /// Captures and identifies all ten fingers in ANSI/NIST order.
    pub fn run_ten_finger_session(&self, corpus: &[CriminalRecord], threshold: f64) -> SessionReport {
        self.run_ten_finger_session_with_cancel(corpus, threshold, None)
    }

    /// Like [`run_ten_finger_session`](Self::run_ten_finger_session), checking
    /// `cancel` before each finger. A capture already in flight always completes.
    pub fn run_ten_finger_session_with_cancel(
        &self,
        corpus: &[CriminalRecord],
        threshold: f64,
        cancel: Option<Arc<AtomicBool>>,
    ) -> SessionReport {
        let mut transitions = vec![SessionState::Idle];
        let mut attempts = Vec::with_capacity(FingerPosition::CAPTURE_ORDER.len());
        let mut final_state = SessionState::Complete;

        info!("Starting ten-finger session against {} record(s)", corpus.len());
        for finger in FingerPosition::CAPTURE_ORDER {
            if cancel.as_ref().is_some_and(|c| c.load(Ordering::Relaxed)) {
                info!("Ten-finger session cancelled before {finger}");
                final_state = SessionState::Aborted;
                break;
            }
            transitions.push(SessionState::AwaitingFinger(finger));

            let request = ScanRequest::new(finger, self.config.session_quality);
            transitions.push(SessionState::Capturing(finger));
            let attempt = match self.device.capture(&request) {
                Ok(scan) => {
                    transitions.push(SessionState::Matching(finger));
                    let outcome = self.matcher.identify(&scan, corpus, threshold);
                    FingerAttempt { request, scan: Some(scan), failure: None, outcome }
                }
                Err(e) => {
                    warn!("Recording {finger} as scan_failed: {e}");
                    FingerAttempt { request, scan: None, failure: Some(e), outcome: MatchOutcome::scan_failed() }
                }
            };
            transitions.push(SessionState::OutcomeRecorded(finger));
            attempts.push(attempt);
        }
        transitions.push(final_state);

        let any_match = attempts.iter().any(|a| a.outcome.is_match());
        info!("Ten-finger session {final_state}: {} finger(s) attempted, match: {any_match}", attempts.len());
        SessionReport { attempts, final_state, any_match, transitions }
    }

    /// Runs a session over one snapshot of the active records of `source`.
    ///
    /// # Errors
    /// `CorpusUnavailable` from the source, before any capture is attempted.
    pub fn run_ten_finger_session_from<S>(
        &self,
        source: &S,
        threshold: f64,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Result<SessionReport, RidgeprintError>
    where
        S: CorpusSource + ?Sized,
    {
        let corpus = source.snapshot_filtered(&CorpusFilter { active_only: true, finger: None })?;
        Ok(self.run_ten_finger_session_with_cancel(&corpus, threshold, cancel))
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController").field("device", &self.device).field("matcher", &self.matcher).finish()
    }
}

pub struct SessionControllerBuilder {
    config: EngineConfig,
    sdks: SdkRegistry,
    toolchain: Option<Arc<dyn MinutiaeToolchain>>,
}

impl SessionControllerBuilder {
    pub fn with_sdk(mut self, sdk: Arc<dyn VendorSdk>) -> Self {
        self.sdks.register(sdk);
        self
    }

    pub fn with_sdks(mut self, sdks: SdkRegistry) -> Self {
        self.sdks = sdks;
        self
    }

    /// Replaces the NBIS executables with another minutiae tool chain.
    pub fn with_toolchain(mut self, toolchain: Arc<dyn MinutiaeToolchain>) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    /// # Errors
    /// Returns `Misconfiguration` for an invalid configuration.
    pub fn build(self) -> Result<SessionController, RidgeprintError> {
        let Self { config, sdks, toolchain } = self;
        config.validate()?;

        let toolchain = match toolchain {
            Some(toolchain) => Some(toolchain),
            None if config.nbis.enabled => {
                Some(Arc::new(NbisToolchain::from_config(&config.nbis)) as Arc<dyn MinutiaeToolchain>)
            }
            None => None,
        };

        let device = ScannerDevice::open(&config, sdks.clone(), toolchain.clone())?;
        let engine = MatchEngine::from_config(&config, sdks, toolchain);
        let matcher = CriminalMatcher::new(engine, config.workers)?;
        Ok(SessionController { device, matcher, config })
    }
}
