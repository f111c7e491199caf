//! Value types produced by a capture and consumed by the matchers.

use crate::error::RidgeprintError;
use crate::vendor::VendorKind;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One of the ten standard finger positions.
///
/// Declaration order follows the ANSI/NIST finger codes (1 = right thumb,
/// 10 = left little), which is also the fixed ten-finger capture order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FingerPosition {
    RightThumb,
    RightIndex,
    RightMiddle,
    RightRing,
    RightLittle,
    LeftThumb,
    LeftIndex,
    LeftMiddle,
    LeftRing,
    LeftLittle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hand {
    Right,
    Left,
}

impl FingerPosition {
    /// Right hand thumb to little, then left hand thumb to little.
    pub const CAPTURE_ORDER: [FingerPosition; 10] = [
        FingerPosition::RightThumb,
        FingerPosition::RightIndex,
        FingerPosition::RightMiddle,
        FingerPosition::RightRing,
        FingerPosition::RightLittle,
        FingerPosition::LeftThumb,
        FingerPosition::LeftIndex,
        FingerPosition::LeftMiddle,
        FingerPosition::LeftRing,
        FingerPosition::LeftLittle,
    ];

    /// ANSI/NIST-ITL finger position code.
    pub fn nist_code(self) -> u8 {
        match self {
            FingerPosition::RightThumb => 1,
            FingerPosition::RightIndex => 2,
            FingerPosition::RightMiddle => 3,
            FingerPosition::RightRing => 4,
            FingerPosition::RightLittle => 5,
            FingerPosition::LeftThumb => 6,
            FingerPosition::LeftIndex => 7,
            FingerPosition::LeftMiddle => 8,
            FingerPosition::LeftRing => 9,
            FingerPosition::LeftLittle => 10,
        }
    }

    pub fn from_nist_code(code: u8) -> Option<Self> {
        Self::CAPTURE_ORDER.iter().copied().find(|f| f.nist_code() == code)
    }

    pub fn hand(self) -> Hand {
        if self.nist_code() <= 5 {
            Hand::Right
        } else {
            Hand::Left
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FingerPosition::RightThumb => "right_thumb",
            FingerPosition::RightIndex => "right_index",
            FingerPosition::RightMiddle => "right_middle",
            FingerPosition::RightRing => "right_ring",
            FingerPosition::RightLittle => "right_little",
            FingerPosition::LeftThumb => "left_thumb",
            FingerPosition::LeftIndex => "left_index",
            FingerPosition::LeftMiddle => "left_middle",
            FingerPosition::LeftRing => "left_ring",
            FingerPosition::LeftLittle => "left_little",
        }
    }
}

impl fmt::Display for FingerPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for FingerPosition {
    type Err = RidgeprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        let normalized = normalized.replace("pinky", "little");
        Self::CAPTURE_ORDER
            .iter()
            .copied()
            .find(|f| f.as_str() == normalized)
            .ok_or_else(|| RidgeprintError::Parse(format!("Unknown finger position: {s}")))
    }
}

/// Requested capture quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QualityLevel {
    Low,
    Medium,
    High,
}

impl QualityLevel {
    /// Centre of the simulated quality distribution.
    pub fn mean_quality(self) -> f64 {
        match self {
            QualityLevel::Low => 0.55,
            QualityLevel::Medium => 0.72,
            QualityLevel::High => 0.88,
        }
    }

    /// Half-width of the simulated quality distribution.
    pub fn quality_spread(self) -> f64 {
        match self {
            QualityLevel::Low => 0.15,
            QualityLevel::Medium => 0.10,
            QualityLevel::High => 0.08,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QualityLevel::Low => "low",
            QualityLevel::Medium => "medium",
            QualityLevel::High => "high",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityLevel {
    type Err = RidgeprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "poor" => Ok(QualityLevel::Low),
            "medium" | "fair" | "good" => Ok(QualityLevel::Medium),
            "high" | "excellent" => Ok(QualityLevel::High),
            other => Err(RidgeprintError::Parse(format!("Unknown quality level: {other}"))),
        }
    }
}

/// A single capture attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanRequest {
    pub finger_position: FingerPosition,
    pub quality_level: QualityLevel,
}

impl ScanRequest {
    pub fn new(finger_position: FingerPosition, quality_level: QualityLevel) -> Self {
        Self { finger_position, quality_level }
    }
}

/// A ridge ending or bifurcation as reported by a minutiae extractor.
///
/// `theta` is in degrees, `quality` on the extractor's 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MinutiaPoint {
    pub x: u32,
    pub y: u32,
    pub theta: u32,
    pub quality: u32,
}

/// Which comparator family understands a template's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKind {
    VendorNative,
    NbisMinutiae,
    Simulated,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TemplateKind::VendorNative => "vendor_native",
            TemplateKind::NbisMinutiae => "nbis_minutiae",
            TemplateKind::Simulated => "simulated",
        })
    }
}

/// Where the template bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureOrigin {
    Vendor(VendorKind),
    Simulator,
}

impl fmt::Display for CaptureOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureOrigin::Vendor(kind) => write!(f, "{kind}"),
            CaptureOrigin::Simulator => f.write_str("simulator"),
        }
    }
}

/// Template data shared by fresh scans and enrolled corpus entries.
///
/// `data` holds the origin's native bytes (vendor template or simulated
/// bytes). `minutiae` is only populated for `TemplateKind::NbisMinutiae`.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintTemplate {
    pub kind: TemplateKind,
    pub origin: CaptureOrigin,
    pub data: Vec<u8>,
    pub minutiae: Vec<MinutiaPoint>,
    pub quality_score: f64,
    pub minutiae_count: u32,
}

impl FingerprintTemplate {
    pub fn simulated(data: Vec<u8>, quality_score: f64, minutiae_count: u32) -> Self {
        Self {
            kind: TemplateKind::Simulated,
            origin: CaptureOrigin::Simulator,
            data,
            minutiae: Vec::new(),
            quality_score: clamp_unit(quality_score),
            minutiae_count,
        }
    }

    pub fn vendor_native(
        vendor: VendorKind,
        data: Vec<u8>,
        quality_score: f64,
        minutiae_count: u32,
    ) -> Self {
        Self {
            kind: TemplateKind::VendorNative,
            origin: CaptureOrigin::Vendor(vendor),
            data,
            minutiae: Vec::new(),
            quality_score: clamp_unit(quality_score),
            minutiae_count,
        }
    }

    /// Attaches extracted minutiae, turning this into an NBIS template while
    /// keeping the origin's bytes for the secondary comparator.
    pub fn with_minutiae(mut self, minutiae: Vec<MinutiaPoint>) -> Self {
        if minutiae.is_empty() {
            return self;
        }
        self.minutiae_count = u32::try_from(minutiae.len()).unwrap_or(u32::MAX);
        self.minutiae = minutiae;
        self.kind = TemplateKind::NbisMinutiae;
        self
    }

    pub fn has_minutiae(&self) -> bool {
        self.kind == TemplateKind::NbisMinutiae && !self.minutiae.is_empty()
    }

    pub fn vendor(&self) -> Option<VendorKind> {
        match self.origin {
            CaptureOrigin::Vendor(kind) => Some(kind),
            CaptureOrigin::Simulator => None,
        }
    }

    /// A template with neither bytes nor minutiae cannot be compared.
    pub fn is_usable(&self) -> bool {
        !self.data.is_empty() || !self.minutiae.is_empty()
    }
}

/// 8-bit grayscale capture, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintImage {
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
    pub pixels: Vec<u8>,
}

impl FingerprintImage {
    /// Binary PGM (netpbm P5) encoding, the format handed to external tools.
    pub fn to_pgm(&self) -> Vec<u8> {
        let header = format!("P5\n{} {}\n255\n", self.width, self.height);
        let mut out = Vec::with_capacity(header.len() + self.pixels.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.pixels);
        out
    }
}

/// Coarse quality bucket used for operator feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityRating {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityRating {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 0.8 => QualityRating::Excellent,
            s if s >= 0.7 => QualityRating::Good,
            s if s >= 0.6 => QualityRating::Fair,
            _ => QualityRating::Poor,
        }
    }

    pub fn suitable_for_matching(self) -> bool {
        self >= QualityRating::Fair
    }
}

impl fmt::Display for QualityRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QualityRating::Poor => "Poor",
            QualityRating::Fair => "Fair",
            QualityRating::Good => "Good",
            QualityRating::Excellent => "Excellent",
        })
    }
}

/// Output of one successful capture. Owned by the caller that requested it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub provider_id: String,
    pub finger_position: FingerPosition,
    pub quality_score: f64,
    pub minutiae_count: u32,
    pub image_dpi: u32,
    pub image_dimensions: (u32, u32),
    pub capture_duration: Duration,
    pub live_finger_detected: bool,
    pub template: FingerprintTemplate,
    /// NFIQ class (1 best .. 5 worst) when the NBIS quality tool ran.
    pub secondary_quality_metric: Option<u8>,
    pub image: Option<FingerprintImage>,
}

impl ScanResult {
    pub fn template_kind(&self) -> TemplateKind {
        self.template.kind
    }

    pub fn quality_rating(&self) -> QualityRating {
        QualityRating::from_score(self.quality_score)
    }

    /// The stored form handed to the registration collaborator.
    pub fn to_template(&self) -> FingerprintTemplate {
        self.template.clone()
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finger_codes_follow_capture_order() {
        for (i, finger) in FingerPosition::CAPTURE_ORDER.iter().enumerate() {
            assert_eq!(usize::from(finger.nist_code()), i + 1);
            assert_eq!(FingerPosition::from_nist_code(finger.nist_code()), Some(*finger));
        }
        assert_eq!(FingerPosition::from_nist_code(0), None);
        assert_eq!(FingerPosition::from_nist_code(11), None);
    }

    #[test]
    fn parses_finger_names() {
        assert_eq!("right_thumb".parse::<FingerPosition>().ok(), Some(FingerPosition::RightThumb));
        assert_eq!("Left Pinky".parse::<FingerPosition>().ok(), Some(FingerPosition::LeftLittle));
        assert!("third_thumb".parse::<FingerPosition>().is_err());
    }

    #[test]
    fn quality_rating_boundaries() {
        assert_eq!(QualityRating::from_score(0.95), QualityRating::Excellent);
        assert_eq!(QualityRating::from_score(0.7), QualityRating::Good);
        assert_eq!(QualityRating::from_score(0.6), QualityRating::Fair);
        assert_eq!(QualityRating::from_score(0.59), QualityRating::Poor);
        assert!(!QualityRating::Poor.suitable_for_matching());
        assert!(QualityRating::Fair.suitable_for_matching());
    }

    #[test]
    fn empty_minutiae_keep_template_kind() {
        let template = FingerprintTemplate::simulated(vec![1, 2, 3], 0.9, 30);
        let same = template.clone().with_minutiae(Vec::new());
        assert_eq!(same.kind, TemplateKind::Simulated);
        assert_eq!(same.minutiae_count, 30);

        let point = MinutiaPoint { x: 1, y: 2, theta: 90, quality: 60 };
        let nbis = template.with_minutiae(vec![point]);
        assert_eq!(nbis.kind, TemplateKind::NbisMinutiae);
        assert_eq!(nbis.minutiae_count, 1);
        assert_eq!(nbis.origin, CaptureOrigin::Simulator);
    }

    #[test]
    fn pgm_header() {
        let image = FingerprintImage { width: 2, height: 1, dpi: 500, pixels: vec![0, 255] };
        assert_eq!(image.to_pgm(), b"P5\n2 1\n255\n\x00\xff".to_vec());
    }
}
