//! Content-addressed file-store routes (§4.6).

use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

fn filestore(state: &AppState) -> Result<&std::sync::Arc<toolhost_filestore::FileStore>, ApiError> {
    state.filestore.as_ref().ok_or(ApiError::WrongHostMode("the file store is not available on this host"))
}

fn parse_id(id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::BadRequest(format!("'{id}' is not a valid file id")))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_expired: bool,
}

pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Result<Json<Vec<toolhost_filestore::FileInfo>>, ApiError> {
    let store = filestore(&state)?;
    Ok(Json(store.list(query.include_expired).await?))
}

#[derive(Debug, Deserialize)]
struct JsonImport {
    path: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    ttl: i64,
}

pub async fn import(State(state): State<AppState>, request: Request) -> Result<Json<toolhost_filestore::FileInfo>, ApiError> {
    let store = filestore(&state)?.clone();
    let content_type = request.headers().get(CONTENT_TYPE).and_then(|value| value.to_str().ok()).unwrap_or("").to_string();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &state).await.map_err(|err| ApiError::BadRequest(err.to_string()))?;
        let mut name: Option<String> = None;
        let mut ttl: i64 = 0;
        let mut bytes: Option<axum::body::Bytes> = None;

        while let Some(field) = multipart.next_field().await.map_err(|err| ApiError::BadRequest(err.to_string()))? {
            match field.name().map(str::to_string).as_deref() {
                Some("file") => {
                    name = name.or_else(|| field.file_name().map(str::to_string));
                    bytes = Some(field.bytes().await.map_err(|err| ApiError::BadRequest(err.to_string()))?);
                }
                Some("name") => name = Some(field.text().await.map_err(|err| ApiError::BadRequest(err.to_string()))?),
                Some("ttl") => {
                    let text = field.text().await.map_err(|err| ApiError::BadRequest(err.to_string()))?;
                    ttl = text.parse().map_err(|_| ApiError::BadRequest("ttl must be an integer number of seconds".to_string()))?;
                }
                _ => {}
            }
        }

        let bytes = bytes.ok_or_else(|| ApiError::BadRequest("multipart import requires a 'file' part".to_string()))?;
        let name = name.unwrap_or_else(|| "upload".to_string());
        let info = store.import(name, std::io::Cursor::new(bytes), ttl).await?;
        return Ok(Json(info));
    }

    let body = axum::body::to_bytes(request.into_body(), usize::MAX).await.map_err(|err| ApiError::BadRequest(err.to_string()))?;
    let request: JsonImport = serde_json::from_slice(&body).map_err(|err| ApiError::BadRequest(format!("invalid JSON body: {err}")))?;

    let name = request.name.clone().unwrap_or_else(|| {
        std::path::Path::new(&request.path).file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_else(|| "upload".to_string())
    });
    let file = tokio::fs::File::open(&request.path).await.map_err(|source| toolhost_filestore::StoreError::Io { path: request.path.clone().into(), source })?;
    let info = store.import(name, file, request.ttl).await?;
    Ok(Json(info))
}

pub async fn info(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<toolhost_filestore::FileInfo>, ApiError> {
    let store = filestore(&state)?;
    Ok(Json(store.info(parse_id(&id)?).await?))
}

pub async fn content(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    let store = filestore(&state)?;
    let id = parse_id(&id)?;
    let info = store.info(id).await?;
    let path = store.get_path(id).await?;
    let file = tokio::fs::File::open(&path).await.map_err(|source| toolhost_filestore::StoreError::Io { path, source })?;
    let stream = ReaderStream::new(file);
    let mut response = Response::new(Body::from_stream(stream));
    response.headers_mut().insert(CONTENT_TYPE, "application/octet-stream".parse().unwrap());
    response.headers_mut().insert(CONTENT_LENGTH, info.size.into());
    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ttl: Option<i64>,
}

pub async fn update(State(state): State<AppState>, Path(id): Path<String>, Json(body): Json<UpdateRequest>) -> Result<Json<toolhost_filestore::FileInfo>, ApiError> {
    let store = filestore(&state)?;
    let id = parse_id(&id)?;
    if let Some(name) = &body.name {
        store.rename(id, name).await?;
    }
    if let Some(ttl) = body.ttl {
        store.set_ttl(id, ttl).await?;
    }
    Ok(Json(store.info(id).await?))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    let store = filestore(&state)?;
    store.delete(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
