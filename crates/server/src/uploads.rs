//! Image upload storage
//!
//! Uploaded files land in the configured directory under a fresh UUID
//! name; the database stores only the public reference path.

use axum::extract::Multipart;
use carta_core::config::UploadConfig;
use carta_core::errors::{AppError, Result};
use std::path::Path;
use uuid::Uuid;

const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "svg"];

/// Store the `file` field of a multipart upload, returning its public reference
pub async fn store_image(config: &UploadConfig, mut multipart: Multipart) -> Result<String> {
    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::Validation {
        message: format!("Malformed upload: {}", e),
        field: Some("file".to_string()),
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(String::from)
            .ok_or_else(|| AppError::Validation {
                message: "Upload is missing a file name".to_string(),
                field: Some("file".to_string()),
            })?;
        let ext = validated_extension(&filename)?;

        let data = field.bytes().await.map_err(|e| AppError::Validation {
            message: format!("Failed to read upload: {}", e),
            field: Some("file".to_string()),
        })?;

        if data.is_empty() {
            return Err(AppError::Validation {
                message: "Uploaded file is empty".to_string(),
                field: Some("file".to_string()),
            });
        }
        if data.len() > config.max_bytes {
            return Err(AppError::PayloadTooLarge {
                size: data.len(),
                limit: config.max_bytes,
            });
        }

        let stored_name = format!("{}.{}", Uuid::new_v4(), ext);
        tokio::fs::create_dir_all(&config.dir).await?;
        tokio::fs::write(Path::new(&config.dir).join(&stored_name), &data).await?;

        tracing::debug!(file = %stored_name, bytes = data.len(), "Stored upload");

        return Ok(format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            stored_name
        ));
    }

    Err(AppError::MissingField {
        field: "file".to_string(),
    })
}

/// Delete a previously stored file; failures are logged, not surfaced
pub async fn remove_stored(config: &UploadConfig, public_ref: &str) {
    let base = format!("{}/", config.base_url.trim_end_matches('/'));
    let Some(name) = public_ref.strip_prefix(&base) else {
        return;
    };
    // Only files we named ourselves, never anything path-like
    if name.contains('/') || name.contains("..") {
        return;
    }

    if let Err(e) = tokio::fs::remove_file(Path::new(&config.dir).join(name)).await {
        tracing::warn!(file = %name, error = %e, "Failed to remove replaced upload");
    }
}

fn validated_extension(filename: &str) -> Result<String> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(AppError::Validation {
            message: format!(
                "Unsupported image type '{}'. Allowed: {}",
                ext,
                ALLOWED_EXTENSIONS.join(", ")
            ),
            field: Some("file".to_string()),
        })
    }
}
