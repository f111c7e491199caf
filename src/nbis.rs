//! NIST Biometric Image Software (NBIS) integration.
//!
//! Three executables are consumed as a capability:
//! - `mindtct <image> <outroot>` writes `<outroot>.xyt`, one `x y theta quality` minutia per line
//! - `bozorth3 <probe.xyt> <gallery.xyt>` prints an integer match score
//! - `nfiq <image>` prints a quality class from 1 (best) to 5 (worst)
//!
//! Every invocation runs inside its own temporary directory, removed when the
//! call returns on any path.

use crate::config::NbisConfig;
use crate::error::RidgeprintError;
use crate::provider::{Provider, ProviderAvailability};
use crate::template::{FingerprintImage, MinutiaPoint, ScanRequest, ScanResult};
use crate::tool::{resolve_executable, run_tool, ToolOutput};
use nom::character::complete::{multispace0, space0, space1, u32 as decimal};
use nom::combinator::{all_consuming, map, opt};
use nom::sequence::{preceded, terminated};
use nom::{IResult, Parser};
use std::env;
use std::fmt;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Environment variable naming the NBIS install prefix (tools under `bin/`).
pub const NBIS_HOME_ENV: &str = "NBIS_HOME";

/// Minutiae extraction, matching and quality assessment.
pub trait MinutiaeToolchain: Send + Sync {
    /// True only when every tool the chain needs is present.
    fn available(&self) -> bool;

    fn extract(&self, image: &FingerprintImage) -> Result<Vec<MinutiaPoint>, RidgeprintError>;

    /// Raw bozorth3-scale similarity.
    fn match_score(&self, probe: &[MinutiaPoint], gallery: &[MinutiaPoint]) -> Result<u32, RidgeprintError>;

    /// NFIQ class, 1 best.
    fn assess_quality(&self, image: &FingerprintImage) -> Result<u8, RidgeprintError>;
}

#[derive(Debug, Clone)]
struct ToolPaths {
    mindtct: PathBuf,
    bozorth3: PathBuf,
    nfiq: PathBuf,
}

/// The external NBIS executables.
#[derive(Debug, Clone)]
pub struct NbisToolchain {
    tools: Option<ToolPaths>,
    missing: Vec<String>,
    timeout: Duration,
}

impl NbisToolchain {
    /// Resolves the three executables. Missing tools leave the chain unavailable.
    pub fn from_config(config: &NbisConfig) -> Self {
        let dir = config
            .tool_dir
            .clone()
            .or_else(|| env::var_os(NBIS_HOME_ENV).map(|home| PathBuf::from(home).join("bin")));

        let lookup = |name: &str| resolve_executable(name, dir.as_deref());
        let (mindtct, bozorth3, nfiq) = (lookup(&config.mindtct), lookup(&config.bozorth3), lookup(&config.nfiq));

        let mut missing = Vec::new();
        for (name, path) in
            [(&config.mindtct, &mindtct), (&config.bozorth3, &bozorth3), (&config.nfiq, &nfiq)]
        {
            if path.is_none() {
                missing.push(name.clone());
            }
        }

        let tools = match (mindtct, bozorth3, nfiq) {
            (Some(mindtct), Some(bozorth3), Some(nfiq)) => Some(ToolPaths { mindtct, bozorth3, nfiq }),
            _ => {
                debug!("NBIS tool chain unavailable, missing: {}", missing.join(", "));
                None
            }
        };

        Self { tools, missing, timeout: config.timeout }
    }

    pub fn missing_tools(&self) -> &[String] {
        &self.missing
    }

    fn tools(&self) -> Result<&ToolPaths, RidgeprintError> {
        self.tools.as_ref().ok_or_else(|| {
            RidgeprintError::ExtractionFailure(format!("NBIS tools missing: {}", self.missing.join(", ")))
        })
    }

    fn run(&self, program: &Path, args: &[&Path]) -> Result<ToolOutput, RidgeprintError> {
        let name = program.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let output = run_tool(program, args.iter().map(|p| p.as_os_str()), self.timeout)
            .map_err(|e| RidgeprintError::ExtractionFailure(format!("{name} {e}")))?;
        if !output.status.success() {
            return Err(RidgeprintError::ExtractionFailure(format!(
                "{name} exited with {}: {}",
                output.status,
                output.stderr.trim()
            )));
        }
        Ok(output)
    }
}

fn scratch_dir() -> Result<TempDir, RidgeprintError> {
    tempfile::Builder::new()
        .prefix("ridgeprint-nbis-")
        .tempdir()
        .map_err(|e| RidgeprintError::ExtractionFailure(format!("cannot create scratch directory: {e}")))
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), RidgeprintError> {
    fs::write(path, contents)
        .map_err(|e| RidgeprintError::ExtractionFailure(format!("cannot write {}: {e}", path.display())))
}

impl MinutiaeToolchain for NbisToolchain {
    fn available(&self) -> bool {
        self.tools.is_some()
    }

    fn extract(&self, image: &FingerprintImage) -> Result<Vec<MinutiaPoint>, RidgeprintError> {
        let tools = self.tools()?;
        let scratch = scratch_dir()?;
        let image_path = scratch.path().join("capture.pgm");
        let out_root = scratch.path().join("capture");
        write_file(&image_path, &image.to_pgm())?;

        self.run(&tools.mindtct, &[&image_path, &out_root])?;

        let xyt_path = out_root.with_extension("xyt");
        let xyt = fs::read_to_string(&xyt_path)
            .map_err(|e| RidgeprintError::ExtractionFailure(format!("mindtct produced no minutiae file: {e}")))?;
        parse_xyt(&xyt)
    }

    fn match_score(&self, probe: &[MinutiaPoint], gallery: &[MinutiaPoint]) -> Result<u32, RidgeprintError> {
        let tools = self.tools()?;
        let scratch = scratch_dir()?;
        let probe_path = scratch.path().join("probe.xyt");
        let gallery_path = scratch.path().join("gallery.xyt");
        write_file(&probe_path, format_xyt(probe).as_bytes())?;
        write_file(&gallery_path, format_xyt(gallery).as_bytes())?;

        let output = self.run(&tools.bozorth3, &[&probe_path, &gallery_path])?;
        parse_bozorth_score(&output.stdout)
    }

    fn assess_quality(&self, image: &FingerprintImage) -> Result<u8, RidgeprintError> {
        let tools = self.tools()?;
        let scratch = scratch_dir()?;
        let image_path = scratch.path().join("capture.pgm");
        write_file(&image_path, &image.to_pgm())?;

        let output = self.run(&tools.nfiq, &[&image_path])?;
        parse_nfiq_class(&output.stdout)
    }
}

fn xyt_line(input: &str) -> IResult<&str, MinutiaPoint> {
    map(
        (
            preceded(space0, decimal),
            preceded(space1, decimal),
            preceded(space1, decimal),
            opt(preceded(space1, decimal)),
        ),
        |(x, y, theta, quality)| MinutiaPoint { x, y, theta: theta % 360, quality: quality.unwrap_or(0) },
    )
    .parse(input)
}

/// Parses mindtct `.xyt` output. Blank lines are ignored.
pub fn parse_xyt(input: &str) -> Result<Vec<MinutiaPoint>, RidgeprintError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            all_consuming(terminated(xyt_line, space0))
                .parse(line)
                .map(|(_, point)| point)
                .map_err(|e| RidgeprintError::ExtractionFailure(format!("bad xyt line {}: {e}", number + 1)))
        })
        .collect()
}

pub fn format_xyt(points: &[MinutiaPoint]) -> String {
    let mut out = String::with_capacity(points.len() * 16);
    for p in points {
        let _ = writeln!(out, "{} {} {} {}", p.x, p.y, p.theta, p.quality);
    }
    out
}

fn leading_integer(input: &str) -> IResult<&str, u32> {
    preceded(multispace0, decimal).parse(input)
}

/// First integer printed by bozorth3.
pub fn parse_bozorth_score(stdout: &str) -> Result<u32, RidgeprintError> {
    leading_integer(stdout)
        .map(|(_, score)| score)
        .map_err(|e| RidgeprintError::ExtractionFailure(format!("unparsable bozorth3 output: {e}")))
}

/// First integer printed by nfiq, which must be a class between 1 and 5.
pub fn parse_nfiq_class(stdout: &str) -> Result<u8, RidgeprintError> {
    let (_, class) = leading_integer(stdout)
        .map_err(|e| RidgeprintError::ExtractionFailure(format!("unparsable nfiq output: {e}")))?;
    match u8::try_from(class) {
        Ok(class @ 1..=5) => Ok(class),
        _ => Err(RidgeprintError::ExtractionFailure(format!("nfiq class {class} out of range"))),
    }
}

/// Capability provider that enriches another provider's captures with NBIS
/// minutiae and an NFIQ class.
pub struct NbisAdapter {
    toolchain: Arc<dyn MinutiaeToolchain>,
    source: Box<Provider>,
}

impl NbisAdapter {
    pub fn new(toolchain: Arc<dyn MinutiaeToolchain>, source: Provider) -> Self {
        Self { toolchain, source: Box::new(source) }
    }

    pub fn source(&self) -> &Provider {
        &self.source
    }

    pub(crate) fn source_mut(&mut self) -> &mut Provider {
        &mut self.source
    }

    pub fn available(&self) -> bool {
        self.toolchain.available()
    }

    pub fn detect(&mut self) -> ProviderAvailability {
        if !self.toolchain.available() {
            return ProviderAvailability::Unavailable {
                provider_id: "nbis".to_string(),
                reason: "NBIS tool chain incomplete".to_string(),
            };
        }
        match self.source.detect() {
            ProviderAvailability::Available { provider_id, detail } => ProviderAvailability::Available {
                provider_id: format!("nbis+{provider_id}"),
                detail: format!("{detail}, NBIS minutiae"),
            },
            unavailable => unavailable,
        }
    }

    pub fn capture(&mut self, request: &ScanRequest) -> Result<ScanResult, RidgeprintError> {
        let scan = self.source.capture(request)?;
        Ok(self.enrich(scan))
    }

    /// Adds minutiae and quality class; any tool failure leaves the scan as captured.
    fn enrich(&self, mut scan: ScanResult) -> ScanResult {
        if !self.toolchain.available() {
            return scan;
        }
        let Some(image) = scan.image.as_ref() else {
            debug!("No image in {} capture, skipping minutiae extraction", scan.provider_id);
            return scan;
        };

        let quality = self.toolchain.assess_quality(image);
        let minutiae = self.toolchain.extract(image);

        match quality {
            Ok(class) => scan.secondary_quality_metric = Some(class),
            Err(e) => warn!("NFIQ assessment failed, keeping capture quality only: {e}"),
        }

        match minutiae {
            Ok(points) if !points.is_empty() => {
                debug!("Extracted {} minutiae from {}", points.len(), scan.finger_position);
                scan.template = scan.template.with_minutiae(points);
                scan.minutiae_count = scan.template.minutiae_count;
                scan.provider_id = format!("nbis+{}", scan.provider_id);
            }
            Ok(_) => warn!("mindtct found no minutiae in {} capture", scan.finger_position),
            Err(e) => warn!("Minutiae extraction failed, keeping native template: {e}"),
        }
        scan
    }
}

impl fmt::Debug for NbisAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NbisAdapter")
            .field("available", &self.toolchain.available())
            .field("source", &self.source)
            .finish()
    }
}
