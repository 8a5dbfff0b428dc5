//! Image decoding from uploaded bytes, with format detection and size limits.

use std::io::Cursor;

use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::config::LimitsConfig;
use crate::error::{CaptionError, CaptionResult};

/// Image decoder with configurable limits.
#[derive(Debug, Clone)]
pub struct ImageDecoder {
    limits: LimitsConfig,
}

/// Result of decoding an image.
pub struct DecodedImage {
    /// The decoded image data
    pub image: DynamicImage,
    /// Format detected from the content
    pub format: ImageFormat,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Size of the encoded input in bytes
    pub file_size: u64,
}

impl ImageDecoder {
    /// Create a new decoder with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Decode an in-memory image.
    ///
    /// The format is sniffed from the content, never from a file name.
    pub fn decode(&self, bytes: &[u8]) -> CaptionResult<DecodedImage> {
        if bytes.is_empty() {
            return Err(CaptionError::ImageDecode {
                message: "Image data is empty".to_string(),
            });
        }

        let file_size = bytes.len() as u64;
        let max_bytes = self.limits.max_file_size_mb.saturating_mul(1024 * 1024);
        if file_size > max_bytes {
            return Err(CaptionError::FileTooLarge {
                size_mb: file_size.div_ceil(1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CaptionError::ImageDecode {
                message: format!("Cannot detect image format: {e}"),
            })?;
        let format = reader.format().ok_or_else(|| CaptionError::ImageDecode {
            message: "Unrecognized image format".to_string(),
        })?;
        let image = reader.decode().map_err(|e| CaptionError::ImageDecode {
            message: e.to_string(),
        })?;

        let (width, height) = image.dimensions();
        if width > self.limits.max_image_dimension || height > self.limits.max_image_dimension {
            return Err(CaptionError::ImageTooLarge {
                width,
                height,
                max_dim: self.limits.max_image_dimension,
            });
        }

        tracing::trace!(
            "Decoded {} image {}x{} ({} bytes)",
            format_to_string(format),
            width,
            height,
            file_size
        );
        Ok(DecodedImage {
            image,
            format,
            width,
            height,
            file_size,
        })
    }
}

/// Convert an ImageFormat to a string representation.
pub fn format_to_string(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Ico => "ico",
        ImageFormat::Pnm => "pnm",
        ImageFormat::Avif => "avif",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::solid_png;

    fn decoder() -> ImageDecoder {
        ImageDecoder::new(LimitsConfig::default())
    }

    #[test]
    fn test_format_to_string() {
        assert_eq!(format_to_string(ImageFormat::Jpeg), "jpeg");
        assert_eq!(format_to_string(ImageFormat::Png), "png");
        assert_eq!(format_to_string(ImageFormat::WebP), "webp");
    }

    #[test]
    fn test_decode_png() {
        let bytes = solid_png(3, 2, [10, 20, 30]).unwrap();
        let decoded = decoder().decode(&bytes).unwrap();
        assert_eq!(decoded.format, ImageFormat::Png);
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(decoded.file_size, bytes.len() as u64);
    }

    #[test]
    fn test_decode_empty_bytes() {
        let err = decoder().decode(&[]).err();
        assert!(matches!(err, Some(CaptionError::ImageDecode { .. })));
    }

    #[test]
    fn test_decode_text_bytes() {
        let err = decoder().decode(b"this is not an image").err();
        assert!(matches!(err, Some(CaptionError::ImageDecode { .. })));
    }

    #[test]
    fn test_decode_truncated_png() {
        let bytes = solid_png(64, 64, [0, 0, 0]).unwrap();
        let err = decoder().decode(&bytes[..bytes.len() / 2]).err();
        assert!(matches!(err, Some(CaptionError::ImageDecode { .. })));
    }

    #[test]
    fn test_decode_rejects_oversized_dimensions() {
        let limits = LimitsConfig {
            max_image_dimension: 8,
            ..LimitsConfig::default()
        };
        let bytes = solid_png(9, 4, [1, 1, 1]).unwrap();
        let err = ImageDecoder::new(limits).decode(&bytes).err();
        assert!(matches!(
            err,
            Some(CaptionError::ImageTooLarge {
                width: 9,
                height: 4,
                max_dim: 8
            })
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_file() {
        let limits = LimitsConfig {
            max_file_size_mb: 1,
            ..LimitsConfig::default()
        };
        let bytes = vec![0u8; 1024 * 1024 + 1];
        let err = ImageDecoder::new(limits).decode(&bytes).err();
        assert!(matches!(
            err,
            Some(CaptionError::FileTooLarge {
                size_mb: 2,
                max_mb: 1
            })
        ));
    }
}
