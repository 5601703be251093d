//! Legacy per-call output-ref routes, served at `outputs_url_base`
//! (default `/v1/files`) (§4.5, §4.6 closing paragraph).

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::Response;
use tokio_util::io::ReaderStream;

use crate::error::ApiError;
use crate::state::AppState;

fn output_refs(state: &AppState) -> Result<&std::sync::Arc<toolhost_filestore::OutputRefManager>, ApiError> {
    state.output_refs.as_ref().ok_or(ApiError::WrongHostMode("output references are not available on this host"))
}

pub async fn get(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response, ApiError> {
    let manager = output_refs(&state)?;
    let id = extension_stripped_id(&name);
    let output_ref = manager.get(&id).ok_or_else(|| toolhost_filestore::StoreError::NotFound { id: id.clone() })?;

    let file = tokio::fs::File::open(&output_ref.path)
        .await
        .map_err(|source| toolhost_filestore::StoreError::Io { path: output_ref.path.clone(), source })?;
    let stream = ReaderStream::new(file);

    let mut response = Response::new(Body::from_stream(stream));
    response.headers_mut().insert(CONTENT_TYPE, output_ref.media_type.parse().unwrap_or_else(|_| "application/octet-stream".parse().unwrap()));
    response.headers_mut().insert(CONTENT_LENGTH, output_ref.size.into());
    Ok(response)
}

pub async fn delete(State(state): State<AppState>, Path(name): Path<String>) -> Result<StatusCode, ApiError> {
    let manager = output_refs(&state)?;
    manager.delete(&extension_stripped_id(&name)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `/v1/files/{name}` carries the ref id plus its preserved extension
/// (e.g. `ab12cd34ef56.json`); the manager keys on the bare id.
fn extension_stripped_id(name: &str) -> String {
    std::path::Path::new(name).file_stem().and_then(|stem| stem.to_str()).unwrap_or(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::extension_stripped_id;

    #[test]
    fn strips_extension_to_recover_the_ref_id() {
        assert_eq!(extension_stripped_id("ab12cd34ef56.json"), "ab12cd34ef56");
        assert_eq!(extension_stripped_id("ab12cd34ef56"), "ab12cd34ef56");
    }
}
