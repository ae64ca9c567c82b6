pub mod exif;
pub mod quantization;
