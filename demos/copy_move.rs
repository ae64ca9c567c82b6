use std::{env, sync::Arc};

use clone_forensics::{
    CloneAnalysisConfig, CloneDetector, Rect, audit::AuditLog, error::Result, selection::FixedRegion,
};
use image::{DynamicImage, Rgb, RgbImage};

/// Textured scene with the block at (100, 100) pasted over (600, 600).
fn forged_scene() -> RgbImage {
    let mut image = RgbImage::from_fn(800, 800, |x, y| {
        let mut v = (x as u64) << 32 | y as u64;
        v = (v ^ (v >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        v = (v ^ (v >> 27)).wrapping_mul(0x94d049bb133111eb);
        let g = (v >> 56) as u8;
        Rgb([g, g.wrapping_add(17), g.wrapping_add(41)])
    });

    for y in 0..50 {
        for x in 0..50 {
            let pixel = *image.get_pixel(100 + x, 100 + y);
            image.put_pixel(600 + x, 600 + y, pixel);
        }
    }
    image
}

fn main() -> Result<()> {
    let log = Arc::new(AuditLog::in_memory());
    let config = CloneAnalysisConfig {
        output_dir: Some("output".into()),
        ..CloneAnalysisConfig::default()
    };

    let mut args = env::args().skip(1);
    let (detector, region) = match args.next() {
        Some(path) => {
            let region = args
                .next()
                .and_then(|r| {
                    let v = r.split(',').filter_map(|p| p.parse().ok()).collect::<Vec<u32>>();
                    (v.len() == 4).then(|| Rect::new(v[0], v[1], v[2], v[3]))
                })
                .unwrap_or(Rect::new(0, 0, 64, 64));
            (CloneDetector::open(path, config, log.clone())?, region)
        }
        None => (
            CloneDetector::from_image(DynamicImage::ImageRgb8(forged_scene()), config, log.clone())?,
            Rect::new(100, 100, 50, 50),
        ),
    };

    let outcome = detector.run(&mut FixedRegion::new(region));
    println!("{}", outcome.message());

    if let Some(result) = outcome.result() {
        println!("Matching regions found: {}", result.matches.len());
        println!("Self-matches discarded: {}", result.discarded);

        for (i, m) in result.matches.iter().take(5).enumerate() {
            println!(
                "  {}, Source: ({}, {}) -> Target ({}, {}) | Similarity: {:.1}%",
                i + 1,
                result.selection.x,
                result.selection.y,
                m.region.x,
                m.region.y,
                m.similarity * 100.0
            );
        }
        if result.matches.len() > 5 {
            println!("  ... and {} more matches", result.matches.len() - 5);
        }

        if let Some(path) = &result.saved_path {
            println!("Annotated image: {}", path.display());
        }
    }

    println!("\nAudit trail:");
    for record in log.records() {
        println!("  {} - {} - {}", record.timestamp.format("%H:%M:%S"), record.level, record.message);
    }

    Ok(())
}
