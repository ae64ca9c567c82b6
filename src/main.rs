use std::{fs, path::PathBuf, sync::Arc};

use clap::{Parser, ValueEnum};

use clone_forensics::{
    AnalysisOutcome, CloneAnalysisConfig, CloneDetector, Rect,
    analysis::{correlation::CorrelationMethod, match_filter::DuplicatePolicy},
    audit::AuditLog,
    error::{ForensicsError, Result},
    report::{JsonReport, render_exif_text, render_quantization_text},
    selection::FixedRegion,
};

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    Auto,
    Direct,
    Fourier,
}

impl From<Method> for CorrelationMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::Auto => CorrelationMethod::Auto,
            Method::Direct => CorrelationMethod::Direct,
            Method::Fourier => CorrelationMethod::Fourier,
        }
    }
}

#[derive(Parser)]
#[command(name = "clone-forensics")]
#[command(about = "Detect copy-move forgery by template matching a suspect region")]
struct Cli {
    /// Path to a JPEG or PNG image
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// Suspect region as x,y,width,height in working-resolution pixels
    #[arg(short, long, value_parser = parse_region)]
    region: Option<Rect>,

    /// JSON configuration file; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Minimum normalized correlation for a match
    #[arg(short, long)]
    threshold: Option<f64>,

    #[arg(long, value_enum)]
    method: Option<Method>,

    /// Report only the best match of each overlapping cluster
    #[arg(long)]
    suppress_overlapping: bool,

    /// Directory for the annotated image
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Directory for the daily audit log
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// Print EXIF tags
    #[arg(long)]
    exif: bool,

    /// Print JPEG quantization tables
    #[arg(long)]
    quantization: bool,

    /// Print the analysis as JSON
    #[arg(long)]
    json: bool,
}

fn parse_region(s: &str) -> std::result::Result<Rect, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid region '{}': {}", s, e))?;

    match parts.as_slice() {
        &[x, y, width, height] => Ok(Rect::new(x, y, width, height)),
        _ => Err(format!("region '{}' must have four values: x,y,width,height", s)),
    }
}

fn load_config(cli: &Cli) -> Result<CloneAnalysisConfig> {
    let mut config = match &cli.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)
            .map_err(|e| ForensicsError::InvalidParameter(format!("{}: {}", path.display(), e)))?,
        None => CloneAnalysisConfig::default(),
    };

    if let Some(threshold) = cli.threshold {
        config.similarity_threshold = threshold;
    }
    if let Some(method) = cli.method {
        config.method = method.into();
    }
    if cli.suppress_overlapping {
        config.duplicate_policy = DuplicatePolicy::SuppressOverlapping;
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = Some(dir.clone());
    }

    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let log = Arc::new(match &cli.log_dir {
        Some(dir) => AuditLog::open_in(dir)?,
        None => AuditLog::disabled(),
    });

    let mut detector = CloneDetector::new(log).with_config(config);
    if let Err(e) = detector.load(&cli.image_path) {
        println!("Error: {}", e);
        return Ok(());
    }

    if cli.exif {
        match detector.extract_metadata() {
            Ok(metadata) => println!("{}", render_exif_text(&metadata)),
            Err(e) => println!("Failed to extract EXIF data: {}\n", e),
        }
    }

    if cli.quantization {
        match detector.quantization_tables() {
            Ok(tables) => println!("{}", render_quantization_text(&tables)),
            Err(e) => println!("Failed to extract quantization table or image is not a JPEG: {}\n", e),
        }
    }

    if cli.region.is_none() && (cli.exif || cli.quantization) {
        return Ok(());
    }

    let mut selector = cli.region.map(FixedRegion::new).unwrap_or_else(FixedRegion::cancelled);
    let outcome = detector.run(&mut selector);
    println!("{}", outcome.message());

    if let AnalysisOutcome::Completed(result) = &outcome {
        for (i, m) in result.matches.iter().enumerate() {
            println!(
                "  {}. ({}, {}) {}x{} | similarity {:.1}%",
                i + 1,
                m.region.x,
                m.region.y,
                m.region.width,
                m.region.height,
                m.similarity * 100.0
            );
        }
        if let Some(path) = &result.saved_path {
            println!("Annotated image saved to {}", path.display());
        }
        if let Some(reason) = &result.persist_error {
            println!("Annotated image not saved: {}", reason);
        }

        if cli.json {
            match JsonReport::from(result.as_ref()).to_json() {
                Ok(json) => println!("{}", json),
                Err(e) => println!("Error: could not serialize report: {}", e),
            }
        }
    }

    Ok(())
}
