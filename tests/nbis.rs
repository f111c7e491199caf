mod common;

use common::{offline_config, sample_minutiae, FixedToolchain};
use ridgeprint::nbis::{format_xyt, parse_bozorth_score, parse_nfiq_class, parse_xyt};
use ridgeprint::{
    FingerPosition, FusionPath, MinutiaPoint, MinutiaeToolchain, NbisAdapter, NbisConfig, NbisToolchain, Provider,
    QualityLevel, RidgeprintError, ScanRequest, SessionController, Simulator, TemplateKind,
};
use std::path::PathBuf;
use std::sync::Arc;

fn request() -> ScanRequest {
    ScanRequest::new(FingerPosition::RightMiddle, QualityLevel::High)
}

#[test]
fn test_parse_mindtct_output() {
    let xyt = "100 200 45 80\n 101 150 300 12 \n\n";
    match parse_xyt(xyt) {
        Ok(points) => {
            assert_eq!(points.len(), 2);
            assert_eq!(points[0], MinutiaPoint { x: 100, y: 200, theta: 45, quality: 80 });
            assert_eq!(points[1], MinutiaPoint { x: 101, y: 150, theta: 300, quality: 12 });
        }
        Err(e) => panic!("Failed to parse xyt: {e}"),
    }
    assert_eq!(parse_xyt("").ok(), Some(Vec::new()));
    assert!(matches!(parse_xyt("1 2"), Err(RidgeprintError::ExtractionFailure(_))));
}

#[test]
fn test_format_xyt_lines() {
    assert_eq!(format_xyt(&sample_minutiae()), "10 20 90 60\n35 80 180 45\n120 200 270 70\n");
}

#[test]
fn test_parse_tool_scores() {
    assert_eq!(parse_bozorth_score("87\n").ok(), Some(87));
    assert!(parse_bozorth_score("").is_err());
    assert_eq!(parse_nfiq_class("5").ok(), Some(5));
    assert!(parse_nfiq_class("7").is_err());
}

#[test]
fn test_missing_tools_make_chain_unavailable() {
    let config = NbisConfig { tool_dir: Some(PathBuf::from("/nonexistent/nbis/bin")), ..NbisConfig::default() };
    let chain = NbisToolchain::from_config(&config);
    assert!(!chain.available());
    assert_eq!(chain.missing_tools(), ["mindtct", "bozorth3", "nfiq"]);
    assert!(matches!(chain.match_score(&sample_minutiae(), &sample_minutiae()), Err(RidgeprintError::ExtractionFailure(_))));
}

#[test]
fn test_adapter_enriches_capture() {
    let mut adapter = NbisAdapter::new(Arc::new(FixedToolchain::new(100)), Provider::Simulator(Simulator::new(1)));
    assert!(adapter.detect().is_available());
    let scan = match adapter.capture(&request()) {
        Ok(scan) => scan,
        Err(e) => panic!("NBIS capture failed: {e}"),
    };
    assert_eq!(scan.template_kind(), TemplateKind::NbisMinutiae);
    assert_eq!(scan.provider_id, "nbis+simulator");
    assert_eq!(scan.secondary_quality_metric, Some(2));
    assert_eq!(scan.minutiae_count, 3);
    assert_eq!(scan.template.minutiae, sample_minutiae());
    assert!(!scan.template.data.is_empty());
}

#[test]
fn test_extraction_failure_keeps_plain_capture() {
    let mut adapter =
        NbisAdapter::new(Arc::new(FixedToolchain::failing_extraction()), Provider::Simulator(Simulator::new(1)));
    let plain = Simulator::new(1).capture(&request());
    let scan = match adapter.capture(&request()) {
        Ok(scan) => scan,
        Err(e) => panic!("Extraction failure must not fail the capture: {e}"),
    };
    assert_eq!(scan.template_kind(), TemplateKind::Simulated);
    assert_eq!(scan.provider_id, "simulator");
    assert_eq!(scan.template, plain.template);
    assert_eq!(scan.secondary_quality_metric, Some(2));
}

#[test]
fn test_unavailable_chain_is_not_selected() {
    let mut config = offline_config();
    config.nbis.enabled = true;
    let controller = match SessionController::builder(config).with_toolchain(Arc::new(FixedToolchain::unavailable())).build() {
        Ok(controller) => controller,
        Err(e) => panic!("Failed to build controller: {e}"),
    };
    assert_eq!(controller.device().provider_id(), "simulator");
}

#[test]
fn test_available_chain_fuses_device_captures() {
    let mut config = offline_config();
    config.nbis.enabled = true;
    let controller = match SessionController::builder(config).with_toolchain(Arc::new(FixedToolchain::new(320))).build() {
        Ok(controller) => controller,
        Err(e) => panic!("Failed to build controller: {e}"),
    };
    assert_eq!(controller.device().provider_id(), "nbis+simulator");

    let first = controller.capture(&request());
    let second = controller.capture(&request());
    let (first, second) = match (first, second) {
        (Ok(a), Ok(b)) => (a, b),
        (a, b) => panic!("captures failed: {a:?} {b:?}"),
    };
    let score = controller.matcher().engine().score_detailed(&first.template, &second.template);
    assert_eq!(score.path, FusionPath::NbisFused);
    assert_eq!(score.components.nbis_score, Some(0.8));
}

#[cfg(unix)]
#[test]
fn test_external_tools_contract() {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(e) => panic!("Failed to create temp dir: {e}"),
    };
    let scripts = [
        ("mindtct", "#!/bin/sh\nprintf '10 20 90 60\\n35 80 180 45\\n' > \"$2.xyt\"\n"),
        ("bozorth3", "#!/bin/sh\necho 123\n"),
        ("nfiq", "#!/bin/sh\necho 3\n"),
    ];
    for (name, body) in scripts {
        let path = dir.path().join(name);
        if let Err(e) = fs::write(&path, body) {
            panic!("Failed to write {name}: {e}");
        }
        if let Err(e) = fs::set_permissions(&path, fs::Permissions::from_mode(0o755)) {
            panic!("Failed to chmod {name}: {e}");
        }
    }

    let config = NbisConfig { tool_dir: Some(dir.path().to_path_buf()), ..NbisConfig::default() };
    let chain = NbisToolchain::from_config(&config);
    assert!(chain.available());

    let image = match Simulator::new(0).capture(&request()).image {
        Some(image) => image,
        None => panic!("simulated capture must carry an image"),
    };
    match chain.extract(&image) {
        Ok(points) => assert_eq!(points, sample_minutiae()[..2].to_vec()),
        Err(e) => panic!("mindtct failed: {e}"),
    }
    assert_eq!(chain.match_score(&sample_minutiae(), &sample_minutiae()).ok(), Some(123));
    assert_eq!(chain.assess_quality(&image).ok(), Some(3));
}
