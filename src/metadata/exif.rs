use std::{collections::BTreeMap, fs::File, io::{BufRead, BufReader, Cursor, Seek}, path::Path};

use crate::{MetadataResult, error::{ForensicsError, Result}};

const EDITING_SOFTWARE: [&str; 5] = ["photoshop", "paint", "gimp", "lightroom", "snapseed"];

pub struct ExifExtractor;

impl ExifExtractor {
    pub fn extract<P: AsRef<Path>>(path: P) -> Result<MetadataResult> {
        let file = File::open(&path)?;
        Self::extract_from_reader(&mut BufReader::new(file))
    }

    pub fn extract_from_bytes(bytes: &[u8]) -> Result<MetadataResult> {
        Self::extract_from_reader(&mut Cursor::new(bytes))
    }

    fn extract_from_reader<R: BufRead + Seek>(reader: &mut R) -> Result<MetadataResult> {
        let exif_reader = exif::Reader::new();

        match exif_reader.read_from_container(reader) {
            Ok(exif_data) => Ok(Self::parse_exif(&exif_data)),
            Err(e) => Err(ForensicsError::MetadataUnavailable(format!(
                "Could not extract EXIF data: {}",
                e
            ))),
        }
    }

    fn parse_exif(exif: &exif::Exif) -> MetadataResult {
        let mut all_tags = BTreeMap::new();
        let mut suspicious_indicators = Vec::new();

        for field in exif.fields() {
            let tag_name = format!("{}", field.tag);
            all_tags.entry(tag_name).or_insert_with(|| Self::field_text(field, exif));
        }

        let primary = |tag: exif::Tag| {
            exif.get_field(tag, exif::In::PRIMARY)
                .map(|f| Self::field_text(f, exif))
        };

        let camera_make = primary(exif::Tag::Make);
        let camera_model = primary(exif::Tag::Model);
        let software = primary(exif::Tag::Software);
        let date_time = primary(exif::Tag::DateTime);
        let datetime_original = primary(exif::Tag::DateTimeOriginal);
        let datetime_digitized = primary(exif::Tag::DateTimeDigitized);

        if let Some(ref sw) = software {
            let sw_lower = sw.to_lowercase();
            if EDITING_SOFTWARE.iter().any(|name| sw_lower.contains(name)) {
                suspicious_indicators.push(format!("Edited with: {}", sw));
            }
        }

        if datetime_original.is_none() && date_time.is_some() {
            suspicious_indicators.push("Original datetime missing (may be stripped)".into());
        }

        if let (Some(orig), Some(digi)) = (&datetime_original, &datetime_digitized) {
            if orig != digi {
                suspicious_indicators.push("Inconsistent date time values".into());
            }
        }

        MetadataResult {
            camera_make,
            camera_model,
            software,
            date_time,
            gps_coordinates: Self::extract_gps(exif),
            all_tags,
            suspicious_indicators,
        }
    }

    fn extract_gps(exif: &exif::Exif) -> Option<(f64, f64)> {
        let lat = exif.get_field(exif::Tag::GPSLatitude, exif::In::PRIMARY)?;
        let lat_ref = exif.get_field(exif::Tag::GPSLatitudeRef, exif::In::PRIMARY)?;
        let lon = exif.get_field(exif::Tag::GPSLongitude, exif::In::PRIMARY)?;
        let lon_ref = exif.get_field(exif::Tag::GPSLongitudeRef, exif::In::PRIMARY)?;

        let lat_val = Self::rational_degrees(&lat.value)?;
        let lon_val = Self::rational_degrees(&lon.value)?;

        let lat_sign = if Self::field_text(lat_ref, exif).starts_with('S') { -1.0 } else { 1.0 };
        let lon_sign = if Self::field_text(lon_ref, exif).starts_with('W') { -1.0 } else { 1.0 };

        Some((lat_val * lat_sign, lon_val * lon_sign))
    }

    /// ASCII fields as plain text; everything else as displayed with its unit.
    fn field_text(field: &exif::Field, exif: &exif::Exif) -> String {
        match &field.value {
            exif::Value::Ascii(parts) => parts
                .iter()
                .map(|part| String::from_utf8_lossy(part).trim_end_matches('\0').trim().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            _ => field.display_value().with_unit(exif).to_string(),
        }
    }

    /// Degrees, minutes, seconds rationals to decimal degrees.
    fn rational_degrees(value: &exif::Value) -> Option<f64> {
        match value {
            exif::Value::Rational(parts) if !parts.is_empty() => {
                let part = |i: usize| parts.get(i).map(|r| r.to_f64()).unwrap_or(0.0);
                Some(part(0) + part(1) / 60.0 + part(2) / 3600.0)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use exif::{Field, In, Rational, Tag, Value, experimental::Writer};
    use image::{ImageFormat, Rgb, RgbImage, codecs::jpeg::JpegEncoder};

    use super::*;

    fn ascii(tag: Tag, text: &str) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![text.as_bytes().to_vec()]),
        }
    }

    fn degrees(tag: Tag, d: u32, m: u32) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Rational(vec![
                Rational { num: d, denom: 1 },
                Rational { num: m, denom: 1 },
                Rational { num: 0, denom: 1 },
            ]),
        }
    }

    /// Small JPEG with an APP1 Exif segment carrying `fields`.
    fn jpeg_with_exif(fields: &[Field]) -> Vec<u8> {
        let mut writer = Writer::new();
        for field in fields {
            writer.push_field(field);
        }
        let mut tiff = Cursor::new(Vec::new());
        writer.write(&mut tiff, false).unwrap();
        let tiff = tiff.into_inner();

        let mut jpeg = Vec::new();
        RgbImage::from_pixel(16, 16, Rgb([90, 120, 150]))
            .write_with_encoder(JpegEncoder::new_with_quality(&mut jpeg, 85))
            .unwrap();

        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&((tiff.len() + 8) as u16).to_be_bytes());
        out.extend_from_slice(b"Exif\0\0");
        out.extend_from_slice(&tiff);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn test_tags_indicators_and_gps_are_extracted() {
        let bytes = jpeg_with_exif(&[
            ascii(Tag::Make, "Canon"),
            ascii(Tag::Model, "EOS 80D"),
            ascii(Tag::Software, "GIMP 2.10"),
            ascii(Tag::DateTime, "2024:03:01 12:00:00"),
            degrees(Tag::GPSLatitude, 35, 30),
            ascii(Tag::GPSLatitudeRef, "S"),
            degrees(Tag::GPSLongitude, 139, 45),
            ascii(Tag::GPSLongitudeRef, "E"),
        ]);

        let metadata = ExifExtractor::extract_from_bytes(&bytes).unwrap();
        assert_eq!(metadata.camera_make.as_deref(), Some("Canon"));
        assert_eq!(metadata.camera_model.as_deref(), Some("EOS 80D"));
        assert_eq!(metadata.software.as_deref(), Some("GIMP 2.10"));
        assert_eq!(metadata.date_time.as_deref(), Some("2024:03:01 12:00:00"));
        assert_eq!(metadata.all_tags.get("Make").map(String::as_str), Some("Canon"));

        assert!(metadata.suspicious_indicators.contains(&"Edited with: GIMP 2.10".to_string()));
        assert!(metadata
            .suspicious_indicators
            .contains(&"Original datetime missing (may be stripped)".to_string()));

        let (lat, lon) = metadata.gps_coordinates.unwrap();
        assert!((lat + 35.5).abs() < 1e-9);
        assert!((lon - 139.75).abs() < 1e-9);
    }

    #[test]
    fn test_mismatched_capture_dates_are_flagged() {
        let bytes = jpeg_with_exif(&[
            ascii(Tag::Make, "Nikon"),
            ascii(Tag::DateTimeOriginal, "2024:03:01 12:00:00"),
            ascii(Tag::DateTimeDigitized, "2024:03:05 08:30:00"),
        ]);

        let metadata = ExifExtractor::extract_from_bytes(&bytes).unwrap();
        assert!(metadata.software.is_none());
        assert!(metadata.gps_coordinates.is_none());
        assert_eq!(metadata.suspicious_indicators, vec!["Inconsistent date time values".to_string()]);
    }

    #[test]
    fn test_png_without_exif_is_unavailable() {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let err = ExifExtractor::extract_from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, ForensicsError::MetadataUnavailable(_)));
    }

    #[test]
    fn test_garbage_is_unavailable_not_a_panic() {
        let err = ExifExtractor::extract_from_bytes(b"\x00\x01\x02").unwrap_err();
        assert!(matches!(err, ForensicsError::MetadataUnavailable(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ExifExtractor::extract("does/not/exist.jpg").unwrap_err();
        assert!(matches!(err, ForensicsError::Io(_)));
    }
}
