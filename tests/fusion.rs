mod common;

use common::{sample_minutiae, FixedToolchain, ScriptedSdk};
use ridgeprint::{
    structural_similarity, FingerPosition, FingerprintTemplate, FusionConfig, FusionPath, MatchEngine, QualityLevel,
    ScanRequest, SdkRegistry, Simulator, VendorKind,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn simulated_templates(seed: u64) -> Vec<FingerprintTemplate> {
    let mut sim = Simulator::new(seed);
    FingerPosition::CAPTURE_ORDER
        .iter()
        .map(|finger| sim.capture(&ScanRequest::new(*finger, QualityLevel::Medium)).to_template())
        .collect()
}

fn mixed_templates() -> Vec<FingerprintTemplate> {
    let mut templates = simulated_templates(3);
    templates.push(FingerprintTemplate::vendor_native(VendorKind::Suprema, vec![1, 2, 3, 4], 0.9, 40));
    templates.push(FingerprintTemplate::vendor_native(VendorKind::Suprema, vec![4, 3, 2, 1], 0.7, 35));
    templates.push(FingerprintTemplate::vendor_native(VendorKind::SecuGen, vec![1, 2, 3, 4], 0.9, 40));
    templates.push(FingerprintTemplate::simulated(Vec::new(), 0.0, 0));
    templates.push(simulated_templates(4)[0].clone().with_minutiae(sample_minutiae()));
    templates.push(simulated_templates(5)[0].clone().with_minutiae(sample_minutiae()));
    templates
}

/// Compare returns the first probe byte, so the raw result depends on argument order.
struct OrderSensitiveSdk;

impl ridgeprint::VendorSdk for OrderSensitiveSdk {
    fn vendor(&self) -> VendorKind {
        VendorKind::Suprema
    }

    fn open(&self) -> Result<ridgeprint::DeviceInfo, ridgeprint::SdkError> {
        Err(ridgeprint::SdkError::DeviceNotFound)
    }

    fn capture(&self, _request: &ScanRequest) -> Result<ridgeprint::SdkCapture, ridgeprint::SdkError> {
        Err(ridgeprint::SdkError::DeviceNotFound)
    }

    fn compare(&self, probe: &[u8], _gallery: &[u8]) -> Result<u32, ridgeprint::SdkError> {
        Ok(u32::from(probe.first().copied().unwrap_or(0)) * 50)
    }
}

#[test]
fn test_score_is_symmetric_on_every_path() {
    let engine = MatchEngine::new(FusionConfig::default())
        .with_sdks(SdkRegistry::new().with(Arc::new(OrderSensitiveSdk)))
        .with_toolchain(Arc::new(FixedToolchain::new(120)));
    let templates = mixed_templates();
    for a in &templates {
        for b in &templates {
            let ab = engine.score(a, b);
            let ba = engine.score(b, a);
            assert_eq!(ab, ba, "score not symmetric for {:?} / {:?}", a.kind, b.kind);
        }
    }
}

#[test]
fn test_score_bounds() {
    let engine = MatchEngine::new(FusionConfig::default())
        .with_sdks(SdkRegistry::new().with(Arc::new(ScriptedSdk::new(VendorKind::Suprema).with_scores(1000, 0))))
        .with_toolchain(Arc::new(FixedToolchain::new(5000)));
    let templates = mixed_templates();
    for a in &templates {
        for b in &templates {
            let score = engine.score(a, b);
            assert!((0.0..=1.0).contains(&score), "score {score} out of range");
        }
    }
}

#[test]
fn test_fusion_exactness() {
    let engine = MatchEngine::new(FusionConfig::default()).with_toolchain(Arc::new(FixedToolchain::new(200)));
    let a = simulated_templates(10)[0].clone().with_minutiae(sample_minutiae());
    let b = simulated_templates(11)[0].clone().with_minutiae(sample_minutiae());

    let n = 200.0 / 400.0;
    let base = structural_similarity(&a, &b);
    let detailed = engine.score_detailed(&a, &b);

    assert_eq!(detailed.path, FusionPath::NbisFused);
    assert_eq!(detailed.raw_score, 200.0);
    assert_eq!(detailed.components.nbis_score, Some(n));
    assert!((detailed.components.base_score - base).abs() < 1e-12);
    assert!((detailed.confidence - (0.7 * n + 0.3 * base)).abs() < 1e-9);
}

#[test]
fn test_fused_base_uses_vendor_comparator() {
    let sdk = ScriptedSdk::new(VendorKind::DigitalPersona).with_scores(80, 10);
    let engine = MatchEngine::new(FusionConfig::default())
        .with_sdks(SdkRegistry::new().with(Arc::new(sdk)))
        .with_toolchain(Arc::new(FixedToolchain::new(400)));
    let a = FingerprintTemplate::vendor_native(VendorKind::DigitalPersona, vec![7; 16], 0.9, 30)
        .with_minutiae(sample_minutiae());
    let b = a.clone();

    let detailed = engine.score_detailed(&a, &b);
    assert_eq!(detailed.path, FusionPath::NbisFused);
    assert!((detailed.components.base_score - 0.8).abs() < 1e-12);
    assert!((detailed.confidence - (0.7 * 1.0 + 0.3 * 0.8)).abs() < 1e-9);
}

#[test]
fn test_vendor_native_normalized_by_documented_maximum() {
    let sdk = ScriptedSdk::new(VendorKind::Suprema).with_scores(200, 20);
    let engine = MatchEngine::new(FusionConfig::default()).with_sdks(SdkRegistry::new().with(Arc::new(sdk)));
    let a = FingerprintTemplate::vendor_native(VendorKind::Suprema, vec![1; 32], 0.9, 40);
    let b = FingerprintTemplate::vendor_native(VendorKind::Suprema, vec![1; 32], 0.8, 38);
    let c = FingerprintTemplate::vendor_native(VendorKind::Suprema, vec![2; 32], 0.8, 38);

    let same = engine.score_detailed(&a, &b);
    assert_eq!(same.path, FusionPath::VendorNative(VendorKind::Suprema));
    assert_eq!(same.raw_score, 200.0);
    assert_eq!(same.confidence, 0.5);
    assert_eq!(engine.score(&a, &c), 20.0 / 400.0);
}

#[test]
fn test_timed_out_compare_is_not_reissued_until_it_returns() {
    let sdk = Arc::new(ScriptedSdk::new(VendorKind::Suprema).with_compare_delay(Duration::from_millis(300)));
    let engine = MatchEngine::new(FusionConfig::default())
        .with_sdks(SdkRegistry::new().with(sdk.clone()))
        .with_timeout(Duration::from_millis(30));
    let a = FingerprintTemplate::vendor_native(VendorKind::Suprema, vec![1; 32], 0.9, 40);
    let b = FingerprintTemplate::vendor_native(VendorKind::Suprema, vec![1; 32], 0.8, 38);

    assert_eq!(engine.score_detailed(&a, &b).path, FusionPath::Simulation);
    assert_eq!(engine.score_detailed(&a, &b).path, FusionPath::Simulation);
    assert_eq!(sdk.compares(), 1);

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut path = FusionPath::Simulation;
    while Instant::now() < deadline {
        thread::sleep(Duration::from_millis(400));
        path = engine.score_detailed(&a, &b).path;
        if path != FusionPath::Simulation {
            break;
        }
    }
    assert_eq!(path, FusionPath::VendorNative(VendorKind::Suprema));
}

#[test]
fn test_different_vendors_use_simulation_comparator() {
    let engine = MatchEngine::new(FusionConfig::default())
        .with_sdks(SdkRegistry::new().with(Arc::new(ScriptedSdk::new(VendorKind::Suprema))));
    let a = FingerprintTemplate::vendor_native(VendorKind::Suprema, vec![1; 32], 0.9, 40);
    let b = FingerprintTemplate::vendor_native(VendorKind::Futronic, vec![1; 32], 0.9, 40);
    let detailed = engine.score_detailed(&a, &b);
    assert_eq!(detailed.path, FusionPath::Simulation);
    assert_eq!(detailed.confidence, structural_similarity(&a, &b));
}

#[test]
fn test_unbound_vendor_uses_simulation_comparator() {
    let engine = MatchEngine::new(FusionConfig::default());
    let a = FingerprintTemplate::vendor_native(VendorKind::SecuGen, vec![3; 32], 0.9, 40);
    assert_eq!(engine.score_detailed(&a, &a).path, FusionPath::Simulation);
}

#[test]
fn test_nbis_failure_degrades_to_simulation() {
    let toolchain = Arc::new(FixedToolchain::failing_match());
    let engine = MatchEngine::new(FusionConfig::default()).with_toolchain(toolchain.clone());
    let a = simulated_templates(20)[0].clone().with_minutiae(sample_minutiae());
    let b = simulated_templates(21)[0].clone().with_minutiae(sample_minutiae());

    let detailed = engine.score_detailed(&a, &b);
    assert_eq!(toolchain.match_calls(), 1);
    assert_eq!(detailed.path, FusionPath::Simulation);
    assert_eq!(detailed.components.nbis_score, None);
    assert_eq!(detailed.confidence, structural_similarity(&a, &b));
}

#[test]
fn test_unavailable_nbis_is_skipped() {
    let toolchain = Arc::new(FixedToolchain::unavailable());
    let engine = MatchEngine::new(FusionConfig::default()).with_toolchain(toolchain.clone());
    let a = simulated_templates(30)[0].clone().with_minutiae(sample_minutiae());
    assert_eq!(engine.score_detailed(&a, &a).path, FusionPath::Simulation);
    assert_eq!(toolchain.match_calls(), 0);
}

#[test]
fn test_simulation_separates_same_and_different_fingers() {
    let engine = MatchEngine::new(FusionConfig::default());
    let enrolled = simulated_templates(100);
    let replayed = simulated_templates(100);
    let strangers = simulated_templates(200);

    for (a, b) in enrolled.iter().zip(&replayed) {
        assert!(engine.score(a, b) > 0.99);
    }
    for (a, b) in enrolled.iter().zip(&strangers) {
        assert!(engine.score(a, b) < 0.6);
    }
    for (i, a) in enrolled.iter().enumerate() {
        for b in enrolled.iter().skip(i + 1) {
            assert!(engine.score(a, b) < 0.6);
        }
    }
}

#[test]
fn test_empty_template_scores_low() {
    let engine = MatchEngine::new(FusionConfig::default());
    let empty = FingerprintTemplate::simulated(Vec::new(), 0.0, 0);
    let full = simulated_templates(1)[0].clone();
    let score = engine.score(&empty, &full);
    assert!(score < 0.5, "empty template scored {score}");
}
