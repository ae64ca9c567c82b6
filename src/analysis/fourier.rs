//! Frequency-domain cross-correlation numerators.
//!
//! The image and the zero-mean template are zero-padded to the image size and
//! correlated through `IFFT(F(I) * conj(F(T)))`. Padding to the image size is
//! enough because only positions where the template fits are read back, so
//! the circular wrap never reaches them.

use std::sync::Arc;

use image::GrayImage;
use num_complex::Complex;
use rayon::{iter::ParallelIterator, slice::ParallelSliceMut};
use rustfft::{Fft, FftPlanner};

use crate::analysis::correlation::TemplateStats;

const ROWS_PER_BAND: usize = 16;

/// `Σ T'(i, j) · I(x + j, y + i)` for every valid `(x, y)`, row-major.
pub(crate) fn cross_correlate(image: &GrayImage, template: &TemplateStats, parallel: bool) -> Vec<f64> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    let cols = width - template.width + 1;
    let rows = height - template.height + 1;

    // Removing the image mean leaves the numerator unchanged (the template
    // sums to zero) and keeps the spectra small.
    let mean = image.iter().map(|&v| v as f64).sum::<f64>() / (width * height) as f64;
    let signal = image
        .iter()
        .map(|&v| Complex::new(v as f64 - mean, 0.0))
        .collect::<Vec<_>>();

    let mut kernel = vec![Complex::new(0.0, 0.0); width * height];
    for (ty, weights) in template.zero_mean.chunks_exact(template.width).enumerate() {
        for (tx, &w) in weights.iter().enumerate() {
            kernel[ty * width + tx] = Complex::new(w, 0.0);
        }
    }

    let mut planner = FftPlanner::<f64>::new();
    let row_forward = planner.plan_fft_forward(width);
    let col_forward = planner.plan_fft_forward(height);
    let row_inverse = planner.plan_fft_inverse(width);
    let col_inverse = planner.plan_fft_inverse(height);

    let signal = forward_2d(signal, width, height, &row_forward, &col_forward, parallel);
    let kernel = forward_2d(kernel, width, height, &row_forward, &col_forward, parallel);

    // Spectra are stored transposed (width rows of length height).
    let mut product = signal
        .iter()
        .zip(&kernel)
        .map(|(s, k)| s * k.conj())
        .collect::<Vec<_>>();
    process_rows(&mut product, height, &col_inverse, parallel);
    let mut spatial = transpose(&product, width, height);
    process_rows(&mut spatial, width, &row_inverse, parallel);

    let scale = (width * height) as f64;
    let mut out = Vec::with_capacity(rows * cols);
    for y in 0..rows {
        out.extend(spatial[y * width..y * width + cols].iter().map(|c| c.re / scale));
    }

    out
}

/// Row transforms, then column transforms on the transposed buffer.
/// Returns the spectrum in transposed layout.
fn forward_2d(
    mut data: Vec<Complex<f64>>,
    width: usize,
    height: usize,
    row_fft: &Arc<dyn Fft<f64>>,
    col_fft: &Arc<dyn Fft<f64>>,
    parallel: bool,
) -> Vec<Complex<f64>> {
    process_rows(&mut data, width, row_fft, parallel);
    let mut transposed = transpose(&data, height, width);
    process_rows(&mut transposed, height, col_fft, parallel);
    transposed
}

fn process_rows(data: &mut [Complex<f64>], len: usize, fft: &Arc<dyn Fft<f64>>, parallel: bool) {
    if parallel {
        data.par_chunks_mut(len * ROWS_PER_BAND).for_each(|band| fft.process(band));
    } else {
        fft.process(data);
    }
}

fn transpose(src: &[Complex<f64>], rows: usize, cols: usize) -> Vec<Complex<f64>> {
    let mut dst = vec![Complex::new(0.0, 0.0); rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            dst[c * rows + r] = src[r * cols + c];
        }
    }
    dst
}
