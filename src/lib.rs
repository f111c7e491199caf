#![forbid(unsafe_code)]

//! Fingerprint capture and criminal-corpus identification.
//!
//! A [`SessionController`] owns one [`ScannerDevice`] and one
//! [`CriminalMatcher`]. Captures go through whichever capability provider the
//! device selected at open time: a vendor SDK, optionally enriched by the NBIS
//! tool chain, or the deterministic [`Simulator`] when no hardware is usable.
//!
//! ```no_run
//! use ridgeprint::{EngineConfig, FingerPosition, QualityLevel, ScanRequest, SessionController};
//!
//! # fn main() -> Result<(), ridgeprint::RidgeprintError> {
//! let controller = SessionController::new(EngineConfig::default())?;
//! let scan = controller.capture(&ScanRequest::new(FingerPosition::RightThumb, QualityLevel::High))?;
//! let outcome = controller.identify(&scan, &[], 0.75);
//! print!("{scan}{outcome}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod criminal_matcher;
pub mod db;
pub mod device;
pub mod error;
pub mod fusion;
pub mod hardware;
pub mod nbis;
pub mod output;
pub mod parallel;
pub mod provider;
pub mod session;
pub mod simulator;
pub mod template;
pub mod vendor;

mod display;
mod tool;
mod watchdog;

// Re-exports
pub use config::{BusyPolicy, EngineConfig, FusionConfig, NbisConfig, DEFAULT_MATCH_THRESHOLD};
pub use criminal_matcher::{effective_threshold, CriminalMatcher};
pub use db::{CaseMetadata, CorpusFilter, CorpusFn, CorpusSource, CriminalId, CriminalRecord};
pub use device::{DeviceState, DeviceStatus, ScannerDevice};
pub use error::RidgeprintError;
pub use fusion::{structural_similarity, FusionComponents, FusionPath, FusionScore, MatchEngine};
pub use hardware::{DetectedHardware, HardwareProbe};
pub use nbis::{MinutiaeToolchain, NbisAdapter, NbisToolchain};
pub use output::{
    MatchCandidateScore, MatchGrade, MatchOutcome, MatchStatus, VerificationLevel, PARTIAL_MATCH_FLOOR,
};
pub use parallel::ScoringPool;
pub use provider::{Provider, ProviderAvailability, ProviderSelector};
pub use session::{FingerAttempt, SessionController, SessionControllerBuilder, SessionReport, SessionState};
pub use simulator::Simulator;
pub use template::{
    CaptureOrigin, FingerPosition, FingerprintImage, FingerprintTemplate, Hand, MinutiaPoint, QualityLevel,
    QualityRating, ScanRequest, ScanResult, TemplateKind,
};
pub use vendor::{DeviceInfo, SdkCapture, SdkError, SdkRegistry, VendorAdapter, VendorKind, VendorProfile, VendorSdk};
