use clap::{Parser, Subcommand};
use ridgeprint::{
    CriminalRecord, EngineConfig, FingerPosition, QualityLevel, ScanRequest, SessionController, Simulator,
};
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Simulator seed used by the scanner and by the enrolled suspect
    #[arg(short = 's', long, default_value_t = 2024)]
    seed: u64,

    /// Number of unrelated records in the simulated corpus
    #[arg(short = 'r', long, default_value_t = 200)]
    records: u64,

    /// Enroll a suspect whose prints replay the scanner's simulated captures,
    /// in the order this run captures them
    #[arg(long)]
    enroll_suspect: bool,

    /// Confidence required for a match
    #[arg(short = 't', long, default_value_t = ridgeprint::DEFAULT_MATCH_THRESHOLD)]
    threshold: f64,

    /// Look for NBIS tools (mindtct, bozorth3, nfiq) on the host
    #[arg(long)]
    nbis: bool,

    /// Log file path
    #[arg(short = 'l', long = "log-file")]
    log_file: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture and identify all ten fingers
    Session,
    /// Capture and identify a single finger
    Scan {
        /// Finger position, e.g. right_thumb
        #[arg(short = 'f', long, default_value = "right_thumb")]
        finger: FingerPosition,

        /// Requested quality: low, medium or high
        #[arg(short = 'q', long, default_value = "high")]
        quality: QualityLevel,
    },
}

fn initialize_logging(log_file: Option<String>) {
    let console_writer = std::io::stdout.with_max_level(tracing::Level::INFO);

    let file_appender = if let Some(log_file) = log_file {
        RollingFileAppender::new(Rotation::NEVER, ".", log_file).with_max_level(tracing::Level::INFO)
    } else {
        RollingFileAppender::new(Rotation::NEVER, ".", "ridgeprint.log").with_max_level(tracing::Level::INFO)
    };

    let writer = console_writer.and(file_appender);

    let subscriber = fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(writer).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {e}");
        std::process::exit(1);
    }
}

/// Unrelated records, each enrolled on all ten fingers from its own seed.
/// The suspect replays the scanner's seed over `captured`, the fingers this
/// run will capture in order, so capture counters line up.
fn simulated_corpus(args: &Args, quality: QualityLevel, captured: &[FingerPosition]) -> Vec<CriminalRecord> {
    let mut corpus: Vec<CriminalRecord> = (1..=args.records)
        .map(|id| {
            let mut sim = Simulator::new(args.seed.wrapping_add(id.wrapping_mul(7919)));
            let mut record = CriminalRecord::new(id + 1, format!("Record {id}"));
            for finger in FingerPosition::CAPTURE_ORDER {
                record.enroll(finger, sim.capture(&ScanRequest::new(finger, quality)).to_template());
            }
            record
        })
        .collect();

    if args.enroll_suspect {
        let mut twin = Simulator::new(args.seed);
        let mut suspect = CriminalRecord::new(1, "Enrolled suspect");
        for &finger in captured {
            suspect.enroll(finger, twin.capture(&ScanRequest::new(finger, quality)).to_template());
        }
        corpus.push(suspect);
    }
    corpus
}

fn main() {
    let args = Args::parse();
    initialize_logging(args.log_file.clone());

    let mut config = EngineConfig { simulator_seed: args.seed, match_threshold: args.threshold, ..EngineConfig::default() };
    config.nbis.enabled = args.nbis;
    if let Commands::Scan { quality, .. } = &args.command {
        config.session_quality = *quality;
    }

    let controller = match SessionController::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Failed to create session controller: {e}");
            return;
        }
    };
    info!("Device {} using {}", controller.device_status(), controller.device().provider_id());

    let captured = match &args.command {
        Commands::Session => FingerPosition::CAPTURE_ORDER.to_vec(),
        Commands::Scan { finger, .. } => vec![*finger],
    };
    let corpus = simulated_corpus(&args, controller.config().session_quality, &captured);
    info!("Simulated corpus holds {} record(s)", corpus.len());

    match args.command {
        Commands::Session => {
            let report = controller.run_ten_finger_session(&corpus, args.threshold);
            print!("{report}");
        }
        Commands::Scan { finger, quality } => {
            match controller.scan_and_identify(&ScanRequest::new(finger, quality), &corpus, args.threshold) {
                Ok((scan, outcome)) => print!("{scan}{outcome}"),
                Err(e) => error!("Capture of {finger} failed: {e}"),
            }
        }
    }

    info!("Device status: {:?}", controller.device_details());
}
