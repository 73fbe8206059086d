//! Writing rendered frames to image files.

use std::path::Path;

use image::{ImageBuffer, Rgba};

use crate::error::{Result, VolcastError};

fn to_image(data: &[u8], width: u32, height: u32) -> Result<ImageBuffer<Rgba<u8>, Vec<u8>>> {
    let expected = width as usize * height as usize * 4;
    // wgpu uses a top-left origin, so rows are already in image order
    ImageBuffer::from_raw(width, height, data.to_vec()).ok_or(VolcastError::InvalidImageData {
        expected,
        actual: data.len(),
    })
}

/// Saves tightly packed RGBA8 pixels to `path`.
///
/// The format follows the extension: `.png`, or `.jpg` / `.jpeg` with alpha
/// dropped.
pub fn save_image(path: impl AsRef<Path>, data: &[u8], width: u32, height: u32) -> Result<()> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    let img = to_image(data, width, height)?;
    match extension.as_str() {
        "png" => img.save_with_format(path, image::ImageFormat::Png)?,
        "jpg" | "jpeg" => {
            let rgb = image::DynamicImage::ImageRgba8(img).to_rgb8();
            rgb.save_with_format(path, image::ImageFormat::Jpeg)?;
        }
        _ => return Err(VolcastError::UnsupportedFormat(extension)),
    }
    log::info!("saved {width}x{height} frame to {}", path.display());
    Ok(())
}

/// Encodes tightly packed RGBA8 pixels as PNG in memory.
pub fn encode_png(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let img = to_image(data, width, height)?;
    let mut buffer = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buffer, image::ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_png_signature() {
        let png = encode_png(&[255; 2 * 2 * 4], 2, 2).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let result = encode_png(&[0; 7], 2, 2);
        assert!(matches!(
            result,
            Err(VolcastError::InvalidImageData {
                expected: 16,
                actual: 7
            })
        ));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let path = std::env::temp_dir().join("volcast_screenshot_test.tiff");
        let result = save_image(&path, &[0; 4], 1, 1);
        assert!(matches!(result, Err(VolcastError::UnsupportedFormat(ref e)) if e == "tiff"));
    }

    #[test]
    fn test_png_round_trip_through_file() {
        let path = std::env::temp_dir().join(format!("volcast_screenshot_{}.png", std::process::id()));
        let pixels = [10, 20, 30, 255, 40, 50, 60, 128];
        save_image(&path, &pixels, 2, 1).unwrap();
        let loaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(loaded.as_raw().as_slice(), &pixels);
        let _ = std::fs::remove_file(&path);
    }
}
