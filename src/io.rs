use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageError, RgbaImage};
use rfd::FileDialog;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Raster formats the decoder is built with.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

#[derive(Debug)]
pub enum ImageIoError {
    Io(std::io::Error),
    Decode(String),
    Encode(String),
    /// Decoded fine but has no pixels.
    Empty,
}

impl std::fmt::Display for ImageIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageIoError::Io(e) => write!(f, "I/O error: {}", e),
            ImageIoError::Decode(e) => write!(f, "Decode error: {}", e),
            ImageIoError::Encode(e) => write!(f, "Encode error: {}", e),
            ImageIoError::Empty => write!(f, "Image has no pixels"),
        }
    }
}

impl std::error::Error for ImageIoError {}

impl From<std::io::Error> for ImageIoError {
    fn from(e: std::io::Error) -> Self {
        ImageIoError::Io(e)
    }
}

impl From<ImageError> for ImageIoError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::IoError(io) => ImageIoError::Io(io),
            ImageError::Encoding(enc) => ImageIoError::Encode(enc.to_string()),
            other => ImageIoError::Decode(other.to_string()),
        }
    }
}

/// Decode an in-memory image (format sniffed from the bytes) to RGBA.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<RgbaImage, ImageIoError> {
    if bytes.is_empty() {
        return Err(ImageIoError::Decode("no data".to_string()));
    }
    let img = image::load_from_memory(bytes)?.to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(ImageIoError::Empty);
    }
    Ok(img)
}

/// Read and decode an image file to RGBA.
pub fn load_image_sync(path: &Path) -> Result<RgbaImage, ImageIoError> {
    let bytes = std::fs::read(path)?;
    decode_image_bytes(&bytes)
}

/// Write `image` as PNG, creating parent directories as needed.
pub fn encode_and_write(image: &RgbaImage, path: &Path) -> Result<(), ImageIoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    PngEncoder::new(writer).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(())
}

/// Native "open image" dialog.
pub fn pick_image_file(title: &str) -> Option<PathBuf> {
    FileDialog::new()
        .set_title(title)
        .add_filter("Images", IMAGE_EXTENSIONS)
        .add_filter("All Files", &["*"])
        .pick_file()
}

/// Native "save PNG" dialog.
pub fn pick_png_save_path(default_name: &str) -> Option<PathBuf> {
    let path = FileDialog::new()
        .add_filter("PNG", &["png"])
        .set_file_name(default_name)
        .save_file()?;
    if path.extension().is_none() {
        return Some(path.with_extension("png"));
    }
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn png_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.png");
        let img = RgbaImage::from_fn(7, 5, |x, y| Rgba([x as u8 * 30, y as u8 * 40, 9, 200]));
        encode_and_write(&img, &path).unwrap();
        let back = load_image_sync(&path).unwrap();
        assert_eq!(back, img);
    }

    #[test]
    fn garbage_bytes_are_a_decode_error() {
        let err = decode_image_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ImageIoError::Decode(_)), "{}", err);
        assert!(matches!(decode_image_bytes(&[]), Err(ImageIoError::Decode(_))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_image_sync(&dir.path().join("absent.png")).unwrap_err();
        assert!(matches!(err, ImageIoError::Io(_)));
    }
}
