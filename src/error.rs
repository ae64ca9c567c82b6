use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForensicsError {
    #[error("Image decoding error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Region {x},{y} {width}x{height} lies outside the {image_width}x{image_height} image")]
    InvalidRegion {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("No valid region selected")]
    NoSelection,

    #[error("Metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("Not applicable: {0}")]
    NotApplicable(String),

    #[error("Could not save annotated image to {path}: {reason}")]
    Persist { path: String, reason: String },

    #[error("No image loaded")]
    NoImageLoaded,
}

pub type Result<T> = std::result::Result<T, ForensicsError>;
