pub mod annotation;

use serde::Serialize;

use crate::{AnalysisResult, MetadataResult, Rect, Verdict, metadata::quantization::QuantizationTables};

#[derive(Serialize)]
pub struct JsonReport {
    pub verdict: Verdict,
    pub message: String,
    pub working_dimensions: (u32, u32),
    pub original_dimensions: (u32, u32),
    pub selection: Rect,
    pub exclusion_zone: Rect,
    pub threshold: f64,
    pub matches: Vec<MatchSection>,
    pub discarded_self_matches: usize,
    pub suppressed_duplicates: usize,
    pub saved_path: Option<String>,
    pub persist_error: Option<String>,
}

#[derive(Serialize)]
pub struct MatchSection {
    pub region: Rect,
    pub original_region: Rect,
    pub similarity: f64,
}

impl From<&AnalysisResult> for JsonReport {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            verdict: result.verdict,
            message: result.verdict.message().to_string(),
            working_dimensions: result.working_dimensions,
            original_dimensions: result.original_dimensions,
            selection: result.selection,
            exclusion_zone: result.exclusion_zone,
            threshold: result.threshold,
            matches: result
                .matches
                .iter()
                .map(|m| MatchSection {
                    region: m.region,
                    original_region: result.to_original(&m.region),
                    similarity: m.similarity,
                })
                .collect(),
            discarded_self_matches: result.discarded,
            suppressed_duplicates: result.suppressed,
            saved_path: result.saved_path.as_ref().map(|p| p.display().to_string()),
            persist_error: result.persist_error.clone(),
        }
    }
}

impl JsonReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// `tag: value` per line, tags in alphabetical order.
pub fn render_exif_text(metadata: &MetadataResult) -> String {
    let mut text = String::from("EXIF Data extracted successfully.\n\n");

    for (tag, value) in &metadata.all_tags {
        text.push_str(&format!("{}: {}\n", tag, value));
    }

    if !metadata.suspicious_indicators.is_empty() {
        text.push_str("\nIndicators:\n");
        for indicator in &metadata.suspicious_indicators {
            text.push_str(&format!("  - {}\n", indicator));
        }
    }

    text
}

/// Eight coefficients per row, each right-aligned in four columns.
pub fn render_quantization_text(tables: &QuantizationTables) -> String {
    let mut text = String::from("Quantization tables extracted successfully.\n\n");

    for (index, table) in tables {
        text.push_str(&format!("Table {}:\n", index));
        for row in table.chunks(8) {
            let line = row
                .iter()
                .map(|v| format!("{:4}", v))
                .collect::<Vec<_>>()
                .join(" ");
            text.push_str(&line);
            text.push('\n');
        }
        text.push('\n');
    }

    text
}
