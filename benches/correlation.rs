use clone_forensics::analysis::correlation::{CorrelationMatcher, CorrelationMethod};
use criterion::{criterion_group, criterion_main, Criterion};
use image::{GrayImage, Luma, imageops};
use std::hint::black_box;

fn make_image(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        Luma([(((x * 13) ^ (y * 7) ^ (x * y)) & 0xFF) as u8])
    })
}

fn bench_correlation(c: &mut Criterion) {
    let image = make_image(320, 240);

    for size in [12u32, 48] {
        let template = imageops::crop_imm(&image, 120, 100, size, size).to_image();

        for (name, method) in [("direct", CorrelationMethod::Direct), ("fourier", CorrelationMethod::Fourier)] {
            let matcher = CorrelationMatcher::new(method, false);
            c.bench_function(&format!("zncc_{}_{}x{}", name, size, size), |b| {
                b.iter(|| black_box(matcher.score(&image, &template).unwrap()));
            });
        }
    }

    let template = imageops::crop_imm(&image, 120, 100, 48, 48).to_image();
    let parallel = CorrelationMatcher::new(CorrelationMethod::Fourier, true);
    c.bench_function("zncc_fourier_48x48_parallel", |b| {
        b.iter(|| black_box(parallel.score(&image, &template).unwrap()));
    });
}

criterion_group!(benches, bench_correlation);
criterion_main!(benches);
