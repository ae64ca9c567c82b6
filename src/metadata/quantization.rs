use std::{collections::BTreeMap, fs, path::Path};

use image::ImageFormat;

use crate::error::{ForensicsError, Result};

/// Table index (0-3) to its 64 coefficients in natural row-major order.
pub type QuantizationTables = BTreeMap<u8, Vec<u16>>;

const DQT: u8 = 0xDB;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;

/// Natural-order index of each zig-zag position.
const ZIGZAG: [usize; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

pub struct QuantizationReader;

impl QuantizationReader {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<QuantizationTables> {
        let bytes = fs::read(path)?;
        Self::read_bytes(&bytes)
    }

    pub fn read_bytes(bytes: &[u8]) -> Result<QuantizationTables> {
        match image::guess_format(bytes) {
            Ok(ImageFormat::Jpeg) => Self::parse_markers(bytes),
            Ok(other) => Err(ForensicsError::NotApplicable(format!(
                "Quantization tables are only available for JPEG images, got {:?}",
                other
            ))),
            Err(_) => Err(ForensicsError::NotApplicable(
                "Quantization tables are only available for JPEG images".into()
            )),
        }
    }

    fn parse_markers(bytes: &[u8]) -> Result<QuantizationTables> {
        let mut tables = QuantizationTables::new();
        // skip SOI
        let mut pos = 2;

        while pos < bytes.len() {
            if bytes[pos] != 0xFF {
                return Err(Self::corrupt(format!("expected marker at offset {}", pos)));
            }
            while pos < bytes.len() && bytes[pos] == 0xFF {
                pos += 1;
            }
            let Some(&marker) = bytes.get(pos) else { break };
            pos += 1;

            match marker {
                0x01 | 0xD0..=0xD8 => continue,
                SOS | EOI => break,
                _ => {}
            }

            let length = match bytes.get(pos..pos + 2) {
                Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]) as usize,
                _ => return Err(Self::corrupt(format!("truncated segment length at offset {}", pos))),
            };
            if length < 2 {
                return Err(Self::corrupt(format!("invalid segment length {} at offset {}", length, pos)));
            }
            let segment = bytes
                .get(pos + 2..pos + length)
                .ok_or_else(|| Self::corrupt(format!("truncated segment at offset {}", pos)))?;

            if marker == DQT {
                Self::parse_dqt(segment, &mut tables)?;
            }
            pos += length;
        }

        if tables.is_empty() {
            return Err(Self::corrupt("no quantization tables found".into()));
        }

        Ok(tables)
    }

    fn parse_dqt(mut segment: &[u8], tables: &mut QuantizationTables) -> Result<()> {
        while let Some((&header, rest)) = segment.split_first() {
            let precision = header >> 4;
            let index = header & 0x0F;
            let entry_size = match precision {
                0 => 1,
                1 => 2,
                _ => return Err(Self::corrupt(format!("unknown table precision {}", precision))),
            };

            let raw = rest
                .get(..64 * entry_size)
                .ok_or_else(|| Self::corrupt(format!("table {} is truncated", index)))?;

            let mut natural = vec![0u16; 64];
            for (k, &slot) in ZIGZAG.iter().enumerate() {
                natural[slot] = if entry_size == 1 {
                    raw[k] as u16
                } else {
                    u16::from_be_bytes([raw[2 * k], raw[2 * k + 1]])
                };
            }
            tables.insert(index, natural);

            segment = &rest[64 * entry_size..];
        }

        Ok(())
    }

    fn corrupt(reason: String) -> ForensicsError {
        ForensicsError::MetadataUnavailable(format!("Could not extract quantization tables: {}", reason))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage, codecs::jpeg::JpegEncoder};

    use super::*;

    fn sample() -> RgbImage {
        RgbImage::from_fn(32, 24, |x, y| Rgb([(x * 8) as u8, (y * 10) as u8, ((x ^ y) * 7) as u8]))
    }

    fn encode_jpeg(quality: u8) -> Vec<u8> {
        let mut bytes = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
        sample().write_with_encoder(encoder).unwrap();
        bytes
    }

    fn dqt_segment(entries: &[(u8, Vec<u8>)]) -> Vec<u8> {
        let body = entries
            .iter()
            .flat_map(|(header, values)| std::iter::once(*header).chain(values.iter().copied()))
            .collect::<Vec<_>>();
        let mut out = vec![0xFF, 0xD8, 0xFF, DQT];
        out.extend_from_slice(&((body.len() + 2) as u16).to_be_bytes());
        out.extend(body);
        out.extend_from_slice(&[0xFF, EOI]);
        out
    }

    #[test]
    fn test_jpeg_tables_have_64_entries() {
        let tables = QuantizationReader::read_bytes(&encode_jpeg(75)).unwrap();
        assert!(tables.contains_key(&0));
        for table in tables.values() {
            assert_eq!(table.len(), 64);
            assert!(table.iter().all(|&v| v >= 1));
        }
    }

    #[test]
    fn test_lower_quality_means_coarser_tables() {
        let coarse = QuantizationReader::read_bytes(&encode_jpeg(30)).unwrap();
        let fine = QuantizationReader::read_bytes(&encode_jpeg(95)).unwrap();
        let total = |t: &QuantizationTables| t[&0].iter().map(|&v| v as u32).sum::<u32>();
        assert!(total(&coarse) > total(&fine));
    }

    #[test]
    fn test_png_is_not_applicable() {
        let mut bytes = Vec::new();
        sample().write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        let err = QuantizationReader::read_bytes(&bytes).unwrap_err();
        assert!(matches!(err, ForensicsError::NotApplicable(_)));
    }

    #[test]
    fn test_unknown_bytes_are_not_applicable() {
        let err = QuantizationReader::read_bytes(b"hello").unwrap_err();
        assert!(matches!(err, ForensicsError::NotApplicable(_)));
    }

    #[test]
    fn test_zigzag_is_undone() {
        let zigzag_values = (0..64u8).collect::<Vec<_>>();
        let tables = QuantizationReader::read_bytes(&dqt_segment(&[(0x00, zigzag_values)])).unwrap();
        let table = &tables[&0];
        // zig-zag positions 1 and 2 are natural (0, 1) and (1, 0)
        assert_eq!(table[0], 0);
        assert_eq!(table[1], 1);
        assert_eq!(table[8], 2);
        assert_eq!(table[63], 63);
    }

    #[test]
    fn test_sixteen_bit_tables_and_multiple_tables_per_segment() {
        let wide = (0..64u16).flat_map(|v| (v + 300).to_be_bytes()).collect::<Vec<_>>();
        let narrow = vec![5u8; 64];
        let tables = QuantizationReader::read_bytes(&dqt_segment(&[(0x11, wide), (0x02, narrow)])).unwrap();

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[&1][0], 300);
        assert_eq!(tables[&1][63], 363);
        assert!(tables[&2].iter().all(|&v| v == 5));
    }

    #[test]
    fn test_truncated_table_is_unavailable() {
        let mut bytes = dqt_segment(&[(0x00, vec![1u8; 64])]);
        // shorten the declared payload so the table no longer fits
        bytes[5] -= 10;
        bytes.truncate(bytes.len() - 12);
        let err = QuantizationReader::read_bytes(&bytes).unwrap_err();
        assert!(matches!(err, ForensicsError::MetadataUnavailable(_)));
    }
}
