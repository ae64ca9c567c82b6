use image::{GrayImage, Luma};
use imageproc::{definitions::Image, integral_image::{integral_image, integral_squared_image, sum_image_pixels}};
use ndarray::Array2;
use rayon::{iter::{IndexedParallelIterator, ParallelIterator}, slice::ParallelSliceMut};
use serde::{Deserialize, Serialize};

use crate::{MatchCandidate, analysis::fourier, error::{ForensicsError, Result}};

/// Templates up to this many pixels are scored in the spatial domain when
/// the method is [`CorrelationMethod::Auto`].
pub const AUTO_DIRECT_MAX_TEMPLATE_PIXELS: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMethod {
    #[default]
    Auto,
    Direct,
    Fourier,
}

/// Normalized cross-correlation of a template at every position it fits.
///
/// Indexed `[y, x]`; shape is `(H - h + 1, W - w + 1)`.
#[derive(Debug, Clone)]
pub struct ScoreMap {
    scores: Array2<f64>,
    template_width: u32,
    template_height: u32,
}

impl ScoreMap {
    pub fn scores(&self) -> &Array2<f64> {
        &self.scores
    }

    pub fn width(&self) -> usize {
        self.scores.ncols()
    }

    pub fn height(&self) -> usize {
        self.scores.nrows()
    }

    pub fn template_size(&self) -> (u32, u32) {
        (self.template_width, self.template_height)
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f64> {
        self.scores.get((y as usize, x as usize)).copied()
    }

    pub fn best(&self) -> Option<MatchCandidate> {
        self.scores
            .indexed_iter()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|((y, x), &score)| MatchCandidate { x: x as u32, y: y as u32, score })
    }

    /// Positions scoring at least `threshold`, in row-major order.
    pub fn candidates(&self, threshold: f64) -> Vec<MatchCandidate> {
        self.scores
            .indexed_iter()
            .filter(|(_, score)| **score >= threshold)
            .map(|((y, x), &score)| MatchCandidate { x: x as u32, y: y as u32, score })
            .collect()
    }
}

pub(crate) struct TemplateStats {
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) zero_mean: Vec<f64>,
    energy: f64,
}

impl TemplateStats {
    fn new(template: &GrayImage) -> Self {
        let (width, height) = template.dimensions();
        let n = (width as u128) * (height as u128);

        let (sum, sum_sq) = template.iter().fold((0u128, 0u128), |(s, s2), &v| {
            (s + v as u128, s2 + (v as u128) * (v as u128))
        });
        let mean = sum as f64 / n as f64;

        Self {
            width: width as usize,
            height: height as usize,
            zero_mean: template.iter().map(|&v| v as f64 - mean).collect(),
            energy: centered_energy(n, sum, sum_sq),
        }
    }

    fn coefficient(&self, numerator: f64, window_energy: f64) -> f64 {
        if self.energy == 0.0 || window_energy == 0.0 {
            return -1.0;
        }

        (numerator / (self.energy * window_energy).sqrt()).clamp(-1.0, 1.0)
    }
}

struct WindowStats {
    sums: Image<Luma<u64>>,
    squares: Image<Luma<u64>>,
    width: u32,
    height: u32,
}

impl WindowStats {
    fn new(image: &GrayImage, width: u32, height: u32) -> Self {
        Self {
            sums: integral_image::<_, u64>(image),
            squares: integral_squared_image::<_, u64>(image),
            width,
            height,
        }
    }

    fn energy_at(&self, x: u32, y: u32) -> f64 {
        let (right, bottom) = (x + self.width - 1, y + self.height - 1);
        let sum = sum_image_pixels(&self.sums, x, y, right, bottom)[0] as u128;
        let sum_sq = sum_image_pixels(&self.squares, x, y, right, bottom)[0] as u128;

        centered_energy((self.width as u128) * (self.height as u128), sum, sum_sq)
    }
}

/// `Σ(v - mean)²` from raw sums. Exact in integers, so a flat patch is
/// exactly zero.
fn centered_energy(n: u128, sum: u128, sum_sq: u128) -> f64 {
    let scaled = (n * sum_sq).saturating_sub(sum * sum);
    scaled as f64 / n as f64
}

pub struct CorrelationMatcher {
    method: CorrelationMethod,
    parallel: bool,
}

impl CorrelationMatcher {
    pub fn new(method: CorrelationMethod, parallel: bool) -> Self {
        Self { method, parallel }
    }

    pub fn resolve_method(&self, template_pixels: u64) -> CorrelationMethod {
        match self.method {
            CorrelationMethod::Auto if template_pixels <= AUTO_DIRECT_MAX_TEMPLATE_PIXELS => {
                CorrelationMethod::Direct
            }
            CorrelationMethod::Auto => CorrelationMethod::Fourier,
            method => method,
        }
    }

    pub fn score(&self, image: &GrayImage, template: &GrayImage) -> Result<ScoreMap> {
        let (image_width, image_height) = image.dimensions();
        let (template_width, template_height) = template.dimensions();

        if template_width == 0 || template_height == 0 {
            return Err(ForensicsError::InvalidParameter("Template is empty".into()));
        }
        if template_width > image_width || template_height > image_height {
            return Err(ForensicsError::InvalidParameter(format!(
                "Template {}x{} is larger than image {}x{}",
                template_width, template_height, image_width, image_height
            )));
        }

        let cols = (image_width - template_width + 1) as usize;
        let rows = (image_height - template_height + 1) as usize;
        let stats = TemplateStats::new(template);

        let scores = if stats.energy == 0.0 {
            vec![-1.0; rows * cols]
        } else {
            let numerators = match self.resolve_method(template_width as u64 * template_height as u64) {
                CorrelationMethod::Fourier => fourier::cross_correlate(image, &stats, self.parallel),
                _ => self.direct_numerators(image, &stats, cols, rows),
            };
            let windows = WindowStats::new(image, template_width, template_height);
            self.normalize(numerators, cols, &stats, &windows)
        };

        let scores = Array2::from_shape_vec((rows, cols), scores)
            .map_err(|e| ForensicsError::AnalysisFailed(e.to_string()))?;

        Ok(ScoreMap {
            scores,
            template_width,
            template_height,
        })
    }

    fn direct_numerators(&self, image: &GrayImage, stats: &TemplateStats, cols: usize, rows: usize) -> Vec<f64> {
        let stride = image.width() as usize;
        let pixels = image.as_raw();
        let mut out = vec![0.0; rows * cols];

        let fill = |(y, row): (usize, &mut [f64])| {
            for (x, value) in row.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (ty, weights) in stats.zero_mean.chunks_exact(stats.width).enumerate() {
                    let start = (y + ty) * stride + x;
                    acc += weights
                        .iter()
                        .zip(&pixels[start..start + stats.width])
                        .map(|(w, &p)| w * p as f64)
                        .sum::<f64>();
                }
                *value = acc;
            }
        };

        if self.parallel {
            out.par_chunks_mut(cols).enumerate().for_each(&fill);
        } else {
            out.chunks_mut(cols).enumerate().for_each(&fill);
        }

        out
    }

    fn normalize(&self, mut scores: Vec<f64>, cols: usize, stats: &TemplateStats, windows: &WindowStats) -> Vec<f64> {
        let fill = |(y, row): (usize, &mut [f64])| {
            for (x, value) in row.iter_mut().enumerate() {
                *value = stats.coefficient(*value, windows.energy_at(x as u32, y as u32));
            }
        };

        if self.parallel {
            scores.par_chunks_mut(cols).enumerate().for_each(&fill);
        } else {
            scores.chunks_mut(cols).enumerate().for_each(&fill);
        }

        scores
    }
}
