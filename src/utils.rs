//! Image input helpers shared by the library entry points and the API

use std::io::Cursor;
use std::path::Path;

use image::io::{Limits, Reader};
use image::{DynamicImage, GenericImageView};

use crate::error::{AppError, Result};

/// Largest width or height accepted from an upload.
pub const MAX_IMAGE_SIDE: u32 = 16_384;
/// Upper bound on decoder allocations.
pub const MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;

fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_SIDE);
    limits.max_image_height = Some(MAX_IMAGE_SIDE);
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    limits
}

/// Decode an uploaded image from memory
///
/// Images larger than [`MAX_IMAGE_SIDE`] on either side are rejected by the
/// decoder before any pixel buffer is allocated.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    let mut reader = Reader::new(Cursor::new(bytes)).with_guessed_format()?;
    reader.limits(decode_limits());

    let image = reader.decode()?;
    ensure_not_empty(&image)?;
    Ok(image)
}

/// Read and decode an image file
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
    let path = path.as_ref();
    log::debug!("Loading image: {}", path.display());

    let bytes = std::fs::read(path)?;
    decode_image(&bytes)
}

fn ensure_not_empty(image: &DynamicImage) -> Result<()> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(AppError::EmptyImage);
    }
    Ok(())
}

/// Validate that a file has an allowed extension
#[cfg_attr(not(feature = "api"), allow(dead_code))]
pub(crate) fn validate_file_extension<S: AsRef<str>>(filename: &str, allowed_extensions: &[S]) -> bool {
    if let Some(ext) = Path::new(filename).extension() {
        if let Some(ext_str) = ext.to_str() {
            return allowed_extensions
                .iter()
                .any(|e| e.as_ref().eq_ignore_ascii_case(ext_str));
        }
    }
    false
}

/// Whether the file name guesses as an `image/*` MIME type
#[cfg_attr(not(feature = "api"), allow(dead_code))]
pub(crate) fn is_image_file_name(filename: &str) -> bool {
    mime_guess::from_path(filename)
        .iter()
        .any(|mime| mime.type_() == mime_guess::mime::IMAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb, RgbImage};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([10, 20, 30])));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageOutputFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_image() {
        let img = decode_image(&png_bytes()).unwrap();
        assert_eq!(img.dimensions(), (4, 3));

        assert!(matches!(decode_image(b"not an image"), Err(AppError::Image(_))));
    }

    #[test]
    fn test_decode_rejects_oversized_side() {
        // A narrow strip compresses to almost nothing but would decode huge
        let img = DynamicImage::ImageLuma8(image::GrayImage::new(1, MAX_IMAGE_SIDE + 1));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageOutputFormat::Png).unwrap();

        match decode_image(buf.get_ref()) {
            Err(AppError::Image(image::ImageError::Limits(_))) => {}
            other => panic!("expected a limits error, got {:?}", other.map(|i| i.dimensions())),
        }
    }

    #[test]
    fn test_load_image() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&png_bytes()).unwrap();
        let img = load_image(file.path()).unwrap();
        assert_eq!(img.dimensions(), (4, 3));

        assert!(matches!(
            load_image("/definitely/not/here.png"),
            Err(AppError::Io(_))
        ));
    }

    #[test]
    fn test_validate_file_extension() {
        let allowed = vec!["jpg", "jpeg", "png"];
        assert!(validate_file_extension("test.jpg", &allowed));
        assert!(validate_file_extension("test.JPEG", &allowed));
        assert!(!validate_file_extension("test.txt", &allowed));
        assert!(!validate_file_extension("test", &allowed));
    }

    #[test]
    fn test_is_image_file_name() {
        assert!(is_image_file_name("banana.png"));
        assert!(is_image_file_name("apple.JPG"));
        assert!(!is_image_file_name("notes.txt"));
        assert!(!is_image_file_name("no_extension"));
    }
}
