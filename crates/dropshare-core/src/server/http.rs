use super::AppState;
use super::store::{NewFile, StoreError};
use crate::protocol::ServerEvent;
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use log::{debug, error, warn};
use serde::Serialize;
use std::sync::Arc;
use tokio::fs::File;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadReply {
    file_name: String,
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            StoreError::Io(_) | StoreError::Zip(_) | StoreError::Metadata(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        if status.is_server_error() {
            error!("{}", self);
        }
        json_error(status, self.to_string())
    }
}

/// `Content-Disposition` 中的文件名不能包含引号和换行
fn attachment(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}

pub async fn index() -> &'static str {
    "dropshare\n\
     \n\
     GET  /ws                push channel\n\
     POST /upload            multipart upload (file, uploadedBy, relativePath)\n\
     GET  /download/:id      download one file\n\
     GET  /download_all_zip  download every file as a ZIP\n\
     GET  /get_all_files     list files as JSON\n"
}

/// multipart 上传
pub async fn upload(State(state): State<Arc<AppState>>, mut multipart: Multipart) -> Response {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut uploaded_by = String::new();
    let mut relative_path = String::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Rejected upload: {}", e);
                return json_error(e.status(), e.body_text());
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                match field.bytes().await {
                    Ok(bytes) => file = Some((file_name, content_type, bytes.to_vec())),
                    Err(e) => return json_error(e.status(), e.body_text()),
                }
            }
            Some("uploadedBy") => uploaded_by = field.text().await.unwrap_or_default(),
            Some("relativePath") => relative_path = field.text().await.unwrap_or_default(),
            other => debug!("Ignoring multipart field {:?}", other),
        }
    }

    let Some((file_name, content_type, bytes)) = file else {
        return json_error(StatusCode::BAD_REQUEST, "no file part in request");
    };
    if bytes.len() as u64 > state.settings.max_body_size {
        return json_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("{file_name} exceeds the upload limit"),
        );
    }

    let content_type = if content_type.is_empty() {
        mime_guess::from_path(&file_name)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_default()
    } else {
        content_type
    };

    let new_file = NewFile {
        file_name,
        relative_path,
        uploaded_by,
        timestamp: String::new(),
        content_type,
        bytes,
    };

    match state.store.insert(new_file).await {
        Ok(record) => {
            let reply = UploadReply {
                file_name: record.file_name.clone(),
            };
            state.broadcast(ServerEvent::FileUpdated(record));
            Json(reply).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// 下载单个文件
pub async fn download(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let Some(stored) = state.store.get(&id).await else {
        return StoreError::NotFound(id).into_response();
    };

    match File::open(&stored.blob).await {
        Ok(file) => {
            let content_type = if stored.content_type.is_empty() {
                "application/octet-stream".to_string()
            } else {
                stored.content_type.clone()
            };
            let headers = [
                (header::CONTENT_TYPE, content_type),
                (header::CONTENT_LENGTH, stored.size.to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    attachment(&stored.record.file_name),
                ),
            ];
            let stream = tokio_util::io::ReaderStream::new(file);
            (headers, Body::from_stream(stream)).into_response()
        }
        Err(e) => StoreError::Io(e).into_response(),
    }
}

pub async fn download_all_zip(State(state): State<Arc<AppState>>) -> Response {
    match state.store.zip_all().await {
        Ok(data) => {
            let headers = [
                (header::CONTENT_TYPE, "application/zip".to_string()),
                (header::CONTENT_DISPOSITION, attachment("all_files.zip")),
            ];
            (headers, data).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn get_all_files(State(state): State<Arc<AppState>>) -> Response {
    Json(state.store.list().await).into_response()
}
