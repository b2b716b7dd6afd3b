use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::api::errors::ApiError;
use crate::db::types::Presence;

pub(crate) fn validate_image_upload(
    filename: &str,
    content_type: &str,
    allowed_extensions: &[String],
) -> Result<(), ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| ApiError::BadRequest("File must have an extension".to_string()))?;

    if !allowed_extensions.iter().any(|allowed| allowed == &extension) {
        return Err(ApiError::BadRequest(format!("File extension '{extension}' is not allowed")));
    }

    let mime = content_type.trim().to_ascii_lowercase();
    if mime_allowed_for_extension(&mime, &extension) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "MIME type '{mime}' does not match extension '.{extension}'"
        )))
    }
}

fn mime_allowed_for_extension(mime: &str, extension: &str) -> bool {
    match extension {
        "jpg" | "jpeg" => matches!(mime, "image/jpeg" | "image/jpg"),
        "png" => mime == "image/png",
        _ => false,
    }
}

/// Accepts a bare base64 payload or a `data:image/...;base64,` URL.
pub(crate) fn decode_image_base64(encoded: &str, max_bytes: u64) -> Result<Vec<u8>, ApiError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| ApiError::BadRequest("image_base64 is not valid base64".to_string()))?;

    if bytes.len() as u64 > max_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "Image exceeds {}MB limit",
            max_bytes / (1024 * 1024)
        )));
    }
    Ok(bytes)
}

pub(crate) fn parse_presence(value: &str) -> Result<Presence, ApiError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "present" | "presente" | "p" => Ok(Presence::Present),
        "absent" | "ausente" | "f" => Ok(Presence::Absent),
        "unknown" | "none" | "" => Ok(Presence::Unknown),
        other => Err(ApiError::BadRequest(format!("Unknown presence value '{other}'"))),
    }
}
