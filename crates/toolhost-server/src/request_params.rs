//! Decodes an inbound call body — JSON or multipart — into a `params`
//! object (§4.5: "Request parsing").

use std::path::PathBuf;

use axum::body::Bytes;
use axum::extract::multipart::Multipart;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::ApiError;

/// The decoded `params` object plus any files spooled to disk while
/// decoding it. Callers must remove `spooled_files` once the call
/// completes, success or failure (§4.5: "temp files are guaranteed to be
/// removed after the call completes, including on failure").
pub struct ParsedParams {
    /// The params object to hand the executor.
    pub value: Value,
    /// Paths written under the uploads directory during parsing.
    pub spooled_files: Vec<PathBuf>,
}

/// Decode a plain JSON body into a params object.
pub fn from_json(body: &Bytes) -> Result<ParsedParams, ApiError> {
    if body.is_empty() {
        return Ok(ParsedParams { value: Value::Object(Map::new()), spooled_files: Vec::new() });
    }
    let value: Value = serde_json::from_slice(body).map_err(|err| ApiError::BadRequest(format!("invalid JSON body: {err}")))?;
    Ok(ParsedParams { value, spooled_files: Vec::new() })
}

/// Decode a multipart body: each file part is spooled under
/// `uploads_root` and its field name becomes a params key holding the
/// spooled path; a non-file part named `params` is parsed as JSON and
/// merged in without overriding file keys.
pub async fn from_multipart(mut multipart: Multipart, uploads_root: &std::path::Path) -> Result<ParsedParams, ApiError> {
    let mut params = Map::new();
    let mut spooled_files = Vec::new();
    let mut extra_params: Option<Value> = None;

    tokio::fs::create_dir_all(uploads_root)
        .await
        .map_err(|err| ApiError::BadRequest(format!("could not prepare uploads directory: {err}")))?;

    while let Some(field) = multipart.next_field().await.map_err(|err| ApiError::BadRequest(format!("malformed multipart body: {err}")))? {
        let Some(field_name) = field.name().map(str::to_string) else { continue };

        if field.file_name().is_some() {
            let extension = field.file_name().and_then(|name| std::path::Path::new(name).extension()).and_then(|ext| ext.to_str());
            let spooled_name = match extension {
                Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
                None => Uuid::new_v4().to_string(),
            };
            let dest = uploads_root.join(spooled_name);
            let bytes = field.bytes().await.map_err(|err| ApiError::BadRequest(format!("failed to read upload: {err}")))?;
            tokio::fs::write(&dest, &bytes).await.map_err(|err| ApiError::BadRequest(format!("failed to spool upload: {err}")))?;

            params.insert(field_name, Value::String(dest.to_string_lossy().into_owned()));
            spooled_files.push(dest);
        } else if field_name == "params" {
            let bytes = field.bytes().await.map_err(|err| ApiError::BadRequest(format!("failed to read params part: {err}")))?;
            let value: Value = serde_json::from_slice(&bytes).map_err(|err| ApiError::BadRequest(format!("invalid params JSON: {err}")))?;
            extra_params = Some(value);
        } else {
            let text = field.text().await.map_err(|err| ApiError::BadRequest(format!("failed to read field '{field_name}': {err}")))?;
            params.insert(field_name, Value::String(text));
        }
    }

    if let Some(Value::Object(extra)) = extra_params {
        for (key, value) in extra {
            params.entry(key).or_insert(value);
        }
    }

    Ok(ParsedParams { value: Value::Object(params), spooled_files })
}

/// Remove every path spooled while parsing a request; failures are
/// ignored since cleanup is best-effort.
pub async fn cleanup_spooled(paths: &[PathBuf]) {
    for path in paths {
        let _ = tokio::fs::remove_file(path).await;
    }
}
