use std::{collections::BTreeMap, path::{Path, PathBuf}, sync::Arc};

use chrono::Local;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::{
    analysis::{correlation::{CorrelationMatcher, CorrelationMethod}, exclusion::{DEFAULT_EXPANSION_RATIO, ExclusionZone}, match_filter::{DEFAULT_SIMILARITY_THRESHOLD, DuplicatePolicy, MatchFilter}},
    audit::AuditLog,
    error::{ForensicsError, Result},
    image_utils::{DEFAULT_DOWNSCALE_RATIO, DEFAULT_MAX_DIMENSION, ResizePolicy, WorkingImage, scale_rect},
    metadata::{exif::ExifExtractor, quantization::{QuantizationReader, QuantizationTables}},
    report::annotation::{AnnotationRenderer, DEFAULT_OUTPUT_EXTENSION},
    selection::{RegionSelector, validate_selection},
};

pub mod error;
pub mod audit;
pub mod image_utils;
pub mod selection;
pub mod analysis;
pub mod metadata;
pub mod report;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloneAnalysisConfig {
    pub similarity_threshold: f64,
    pub expansion_ratio: f64,
    pub max_dimension: u32,
    pub downscale_ratio: f64,
    pub method: CorrelationMethod,
    pub parallel: bool,
    pub duplicate_policy: DuplicatePolicy,
    pub output_dir: Option<PathBuf>,
    pub output_extension: String,
}

impl Default for CloneAnalysisConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            expansion_ratio: DEFAULT_EXPANSION_RATIO,
            max_dimension: DEFAULT_MAX_DIMENSION,
            downscale_ratio: DEFAULT_DOWNSCALE_RATIO,
            method: CorrelationMethod::Auto,
            parallel: true,
            duplicate_policy: DuplicatePolicy::KeepAll,
            output_dir: None,
            output_extension: DEFAULT_OUTPUT_EXTENSION.to_string(),
        }
    }
}

impl CloneAnalysisConfig {
    pub fn resize_policy(&self) -> Result<ResizePolicy> {
        ResizePolicy::new(self.max_dimension, self.downscale_ratio)
    }
}

/// Copy-move analysis of one image at a time.
///
/// Loading a new file replaces the current image. The resize policy is
/// applied at load time, so set the configuration before loading.
pub struct CloneDetector {
    image: Option<WorkingImage>,
    path: Option<PathBuf>,
    config: CloneAnalysisConfig,
    log: Arc<AuditLog>,
}

impl CloneDetector {
    pub fn new(log: Arc<AuditLog>) -> Self {
        Self {
            image: None,
            path: None,
            config: CloneAnalysisConfig::default(),
            log,
        }
    }

    pub fn with_config(mut self, config: CloneAnalysisConfig) -> Self {
        self.config = config;
        self
    }

    pub fn open<P: AsRef<Path>>(path: P, config: CloneAnalysisConfig, log: Arc<AuditLog>) -> Result<Self> {
        let mut detector = Self::new(log).with_config(config);
        detector.load(path)?;
        Ok(detector)
    }

    pub fn from_image(image: DynamicImage, config: CloneAnalysisConfig, log: Arc<AuditLog>) -> Result<Self> {
        let mut detector = Self::new(log).with_config(config);
        detector.image = Some(WorkingImage::from_dynamic(image, detector.config.resize_policy()?));
        Ok(detector)
    }

    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        self.log.info(format!("Selected file: {}", path.display()));

        self.image = None;
        self.path = None;

        match self.config.resize_policy().and_then(|policy| WorkingImage::open(path, policy)) {
            Ok(image) => {
                if image.was_downscaled() {
                    self.log.info(format!(
                        "Image resized from {:?} to {:?} for analysis",
                        image.original_dimensions(),
                        image.dimensions()
                    ));
                }
                self.image = Some(image);
                self.path = Some(path.to_path_buf());
                Ok(())
            }
            Err(e) => {
                self.log.error(format!("Could not load {}: {}", path.display(), e));
                Err(e)
            }
        }
    }

    pub fn image(&self) -> Option<&WorkingImage> {
        self.image.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &CloneAnalysisConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<AuditLog> {
        &self.log
    }

    /// Runs one pass and converts every failure into an outcome; the caller
    /// never sees an `Err`.
    pub fn run(&self, selector: &mut dyn RegionSelector) -> AnalysisOutcome {
        match self.analyze(selector) {
            Ok(result) => AnalysisOutcome::Completed(Box::new(result)),
            Err(ForensicsError::NoSelection) => AnalysisOutcome::NoSelection,
            Err(e) => {
                self.log.error(format!("Error during cloning analysis: {}", e));
                AnalysisOutcome::Failed(e)
            }
        }
    }

    pub fn analyze(&self, selector: &mut dyn RegionSelector) -> Result<AnalysisResult> {
        let image = self.image.as_ref().ok_or_else(|| {
            self.log.warn("No file selected for analysis.");
            ForensicsError::NoImageLoaded
        })?;

        match &self.path {
            Some(path) => self.log.info(format!("Starting cloning analysis on file: {}", path.display())),
            None => self.log.info("Starting cloning analysis on in-memory image"),
        }

        let (width, height) = image.dimensions();
        let picked = selector.select_region(image)?;
        let Some(selection) = validate_selection(picked, width, height)? else {
            self.log.warn("No valid region selected.");
            return Err(ForensicsError::NoSelection);
        };
        self.log.info(format!("Selected region: {:?}", selection));

        let template = image.template(&selection)?;
        let zone = ExclusionZone::around(selection, width, height, self.config.expansion_ratio)?;
        self.log.debug(format!("Exclusion zone: {:?}", zone.bounds()));

        let filter = MatchFilter::new(self.config.similarity_threshold, self.config.duplicate_policy)?;
        let matcher = CorrelationMatcher::new(self.config.method, self.config.parallel);
        let method = matcher.resolve_method(selection.area());
        let scores = matcher.score(image.gray(), &template)?;
        self.log.info(format!("Template matching completed ({:?}).", method));

        let filtered = filter.apply(&scores, &zone, &self.log);
        let verdict = filtered.verdict();
        self.log.info(verdict.message());

        let renderer = AnnotationRenderer::new();
        let annotated = renderer.render(image.rgb(), &filtered.accepted);

        let mut saved_path = None;
        let mut persist_error = None;
        if verdict == Verdict::CloningDetected {
            if let Some(dir) = &self.config.output_dir {
                match renderer.persist(&annotated, dir, &self.config.output_extension, &Local::now()) {
                    Ok(path) => {
                        self.log.info(format!("Cloning analysis image saved to: {}", path.display()));
                        saved_path = Some(path);
                    }
                    Err(e) => {
                        self.log.error(e.to_string());
                        persist_error = Some(e.to_string());
                    }
                }
            }
        }

        Ok(AnalysisResult {
            verdict,
            selection,
            exclusion_zone: zone.bounds(),
            threshold: filter.threshold(),
            matches: filtered.accepted,
            discarded: filtered.discarded,
            suppressed: filtered.suppressed,
            annotated,
            working_dimensions: image.dimensions(),
            original_dimensions: image.original_dimensions(),
            saved_path,
            persist_error,
        })
    }

    pub fn extract_metadata(&self) -> Result<MetadataResult> {
        let path = self.path.as_ref().ok_or_else(|| {
            ForensicsError::MetadataUnavailable("No file path available for metadata extraction".into())
        })?;

        let result = ExifExtractor::extract(path);
        match &result {
            Ok(metadata) => self.log.info(format!("EXIF Data: {} tags extracted", metadata.all_tags.len())),
            Err(e) => self.log.error(e.to_string()),
        }
        result
    }

    pub fn quantization_tables(&self) -> Result<QuantizationTables> {
        let path = self.path.as_ref().ok_or_else(|| {
            ForensicsError::NotApplicable("No file path available for quantization tables".into())
        })?;

        let result = QuantizationReader::read(path);
        match &result {
            Ok(tables) => self.log.info(format!("Quantization Table: {} tables extracted", tables.len())),
            Err(ForensicsError::NotApplicable(reason)) => self.log.info(format!("Quantization Table: {}", reason)),
            Err(e) => self.log.error(e.to_string()),
        }
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    /// "No selection".
    pub const NONE: Rect = Rect { x: 0, y: 0, width: 0, height: 0 };

    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        matches!(self.x.checked_add(self.width), Some(r) if r <= width)
            && matches!(self.y.checked_add(self.height), Some(b) if b <= height)
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.right() && other.x < self.right() && self.y < other.bottom() && other.y < self.bottom()
    }
}

/// A score-surface position; the patch it names has the template's size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub x: u32,
    pub y: u32,
    pub score: f64,
}

impl MatchCandidate {
    pub fn bounds(&self, width: u32, height: u32) -> Rect {
        Rect::new(self.x, self.y, width, height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectedMatch {
    pub region: Rect,
    pub similarity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    CloningDetected,
    NoCloningDetected,
}

impl Verdict {
    pub fn message(&self) -> &'static str {
        match self {
            Verdict::CloningDetected => "Cloning detected!",
            Verdict::NoCloningDetected => "No cloning detected.",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisResult {
    pub verdict: Verdict,
    pub selection: Rect,
    pub exclusion_zone: Rect,
    pub threshold: f64,
    pub matches: Vec<DetectedMatch>,
    pub discarded: usize,
    pub suppressed: usize,
    pub annotated: RgbImage,
    pub working_dimensions: (u32, u32),
    pub original_dimensions: (u32, u32),
    pub saved_path: Option<PathBuf>,
    pub persist_error: Option<String>,
}

impl AnalysisResult {
    pub fn is_cloned(&self) -> bool {
        self.verdict == Verdict::CloningDetected
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.annotated.save(path)?;
        Ok(())
    }

    /// Maps a working-resolution rectangle to source-file pixels.
    pub fn to_original(&self, region: &Rect) -> Rect {
        scale_rect(region, self.working_dimensions, self.original_dimensions)
    }
}

#[derive(Debug)]
pub enum AnalysisOutcome {
    Completed(Box<AnalysisResult>),
    NoSelection,
    Failed(ForensicsError),
}

impl AnalysisOutcome {
    pub fn message(&self) -> String {
        match self {
            AnalysisOutcome::Completed(result) => result.verdict.message().to_string(),
            AnalysisOutcome::NoSelection => "Please select a valid region.".to_string(),
            AnalysisOutcome::Failed(e) => format!("Error: {}", e),
        }
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            AnalysisOutcome::Completed(result) => Some(&**result),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetadataResult {
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub software: Option<String>,
    pub date_time: Option<String>,
    pub gps_coordinates: Option<(f64, f64)>,
    pub all_tags: BTreeMap<String, String>,
    pub suspicious_indicators: Vec<String>,
}
