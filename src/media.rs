//! Storage for uploaded employee pictures.
//!
//! Files live under a media root and are addressed by a storage key such as
//! `pictures/0192f3c4-....png`. Keys are always generated here; the name the
//! client uploaded with only contributes its extension, and only when that
//! extension matches the decoded format.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use image::{ImageFormat, ImageReader};
use uuid::Uuid;

use crate::error::AppError;
use crate::payload::Upload;

pub const PICTURES_DIR: &str = "pictures";
pub const URL_PREFIX: &str = "/media";

/// An upload that decoded as an image, paired with the key it will be stored under.
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    pub key: String,
    pub data: Bytes,
}

const NOT_AN_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

/// Decode the upload to make sure it is an image and assign it a fresh key.
/// Decoding runs on the blocking pool.
pub async fn validate_image(upload: &Upload) -> Result<ValidatedImage, String> {
    if upload.data.is_empty() {
        return Err("The submitted file is empty.".to_string());
    }

    let data = upload.data.clone();
    let format = tokio::task::spawn_blocking(move || decode_format(&data))
        .await
        .map_err(|e| {
            tracing::error!("Image decode task failed: {e}");
            NOT_AN_IMAGE.to_string()
        })??;

    let ext = picture_extension(upload.file_name.as_deref(), format)?;
    Ok(ValidatedImage {
        key: picture_key(&ext),
        data: upload.data.clone(),
    })
}

fn decode_format(data: &[u8]) -> Result<ImageFormat, String> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| format!("Upload a valid image. {e}"))?;
    let format = reader.format().ok_or_else(|| NOT_AN_IMAGE.to_string())?;
    reader.decode().map_err(|_| NOT_AN_IMAGE.to_string())?;
    Ok(format)
}

/// The extension to store under. An uploaded extension is kept only when it
/// names the decoded format; without one the format's own extension is used.
pub fn picture_extension(file_name: Option<&str>, format: ImageFormat) -> Result<String, String> {
    let known = format.extensions_str();
    let uploaded = file_name
        .and_then(|name| Path::new(name).extension())
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());

    match uploaded {
        Some(ext) if known.iter().any(|k| *k == ext) => Ok(ext),
        Some(ext) => Err(format!(
            "File extension \"{ext}\" is not allowed. Allowed extensions are: {}.",
            known.join(", ")
        )),
        None => Ok(known.first().copied().unwrap_or("img").to_string()),
    }
}

/// `pictures/<uuid>.<ext>`.
pub fn picture_key(ext: &str) -> String {
    format!("{PICTURES_DIR}/{}.{ext}", Uuid::now_v7())
}

/// Public URL path for a stored key.
pub fn url_for(key: &str) -> String {
    format!("{URL_PREFIX}/{key}")
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub async fn save(&self, image: &ValidatedImage) -> Result<(), AppError> {
        let path = self.path_for(&image.key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AppError::Internal(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(&path, &image.data)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write {}: {e}", path.display())))?;
        tracing::debug!(key = %image.key, bytes = image.data.len(), "stored picture");
        Ok(())
    }

    /// Best-effort removal; a missing file is not an error.
    pub async fn remove(&self, key: &str) {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!(key, "removed picture"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(key, "Failed to remove picture: {e}"),
        }
    }
}
