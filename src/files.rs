//! Raw file attachments stored alongside collections.
//!
//! Files live under `<directory>/files/`, created lazily on first write.
//! Image processing itself is an external concern: callers supply an
//! [`ImageTransform`] implementation and the store handles validation,
//! option clamping, and result packaging.

use crate::db::Borealis;
use crate::error::{Result, StoreError};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::fs;
use std::path::PathBuf;

const IMAGE_EXTENSIONS: [&str; 12] = [
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "tiff", "svg", "ico", "heic", "avif", "jfif",
];

/// Options for [`Borealis::read_image`]. Out-of-range values are clamped,
/// not rejected.
#[derive(Debug, Clone)]
pub struct ImageOptions {
    /// Return the processed bytes as a base64 data URI.
    pub return_base64: bool,
    /// Quality multiplier, clamped to 0.1..=1.0.
    pub quality: f32,
    /// Target pixel count; 0 keeps the original size.
    pub pixels: u32,
    pub grayscale: bool,
    /// Mirror horizontally.
    pub mirror: bool,
    /// Flip vertically.
    pub flip: bool,
    pub invert: bool,
    /// Brightness multiplier, clamped to 0.1..=5.0.
    pub brightness: f32,
    /// Contrast multiplier, clamped to 0.1..=5.0.
    pub contrast: f32,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            return_base64: true,
            quality: 1.0,
            pixels: 0,
            grayscale: false,
            mirror: false,
            flip: false,
            invert: false,
            brightness: 1.0,
            contrast: 1.0,
            max_width: None,
            max_height: None,
        }
    }
}

impl ImageOptions {
    /// A copy with every numeric option clamped into its valid range.
    pub fn clamped(&self) -> ImageOptions {
        ImageOptions {
            quality: self.quality.clamp(0.1, 1.0),
            brightness: self.brightness.clamp(0.1, 5.0),
            contrast: self.contrast.clamp(0.1, 5.0),
            max_width: self.max_width.filter(|w| *w > 0),
            max_height: self.max_height.filter(|h| *h > 0),
            ..self.clone()
        }
    }
}

/// Opaque image processing collaborator: buffer in, processed buffer out.
pub trait ImageTransform {
    fn process(&self, bytes: &[u8], extension: &str, options: &ImageOptions) -> Result<Vec<u8>>;
}

/// Processed image bytes, optionally wrapped as a base64 data URI.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    Bytes(Vec<u8>),
    Base64(String),
}

/// Which transformations were requested for an image read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppliedProcessing {
    pub resized: bool,
    pub quality_reduced: bool,
    pub grayscale: bool,
    pub mirrored: bool,
    pub flipped: bool,
    pub inverted: bool,
    pub brightness_adjusted: bool,
    pub contrast_adjusted: bool,
}

#[derive(Debug, Clone)]
pub struct ImageReceipt {
    pub filename: String,
    pub extension: String,
    pub original_size: u64,
    pub data: ImageData,
    pub applied: AppliedProcessing,
}

fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StoreError::Validation("file name required".to_string()));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(StoreError::Validation(
            "invalid file name: avoid path separators".to_string(),
        ));
    }
    Ok(())
}

impl Borealis {
    fn files_dir(&self) -> PathBuf {
        self.config.directory.join("files")
    }

    /// Store raw bytes under `<directory>/files/<name>`.
    pub fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        validate_file_name(name)?;
        let dir = self.files_dir();
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(name), data)?;
        Ok(())
    }

    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        validate_file_name(name)?;
        let path = self.files_dir().join(name);
        if !path.exists() {
            return Err(StoreError::NotFound(format!("file '{}'", name)));
        }
        Ok(fs::read(path)?)
    }

    pub fn delete_file(&self, name: &str) -> Result<()> {
        validate_file_name(name)?;
        let path = self.files_dir().join(name);
        if !path.exists() {
            return Err(StoreError::NotFound(format!("file '{}'", name)));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    /// Names of all stored files; empty when nothing was written yet.
    pub fn list_files(&self) -> Result<Vec<String>> {
        let dir = self.files_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.path().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read a stored image and run it through the supplied transform.
    ///
    /// The extension is checked against an image allow-list and the options
    /// are clamped before the transform runs.
    pub fn read_image(
        &self,
        name: &str,
        options: &ImageOptions,
        transform: &dyn ImageTransform,
    ) -> Result<ImageReceipt> {
        validate_file_name(name)?;
        let path = self.files_dir().join(name);
        if !path.exists() {
            return Err(StoreError::NotFound(format!("file '{}'", name)));
        }

        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(StoreError::Validation(format!(
                "'{}' is not a recognized image file",
                name
            )));
        }

        let bytes = fs::read(&path)?;
        let original_size = bytes.len() as u64;
        let options = options.clamped();
        let processed = transform.process(&bytes, &extension, &options)?;

        let data = if options.return_base64 {
            ImageData::Base64(format!(
                "data:image/{};base64,{}",
                extension,
                BASE64.encode(&processed)
            ))
        } else {
            ImageData::Bytes(processed)
        };

        Ok(ImageReceipt {
            filename: name.to_string(),
            extension,
            original_size,
            data,
            applied: AppliedProcessing {
                resized: options.pixels > 0,
                quality_reduced: options.quality < 1.0,
                grayscale: options.grayscale,
                mirrored: options.mirror,
                flipped: options.flip,
                inverted: options.invert,
                brightness_adjusted: options.brightness != 1.0,
                contrast_adjusted: options.contrast != 1.0,
            },
        })
    }
}
