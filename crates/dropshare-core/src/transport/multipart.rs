//! multipart 上传：`POST /upload`，字段 `file`、`uploadedBy`、`relativePath`

use crate::upload::{UploadError, UploadRequest, UploadTransport};
use log::debug;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

/// `/upload` 的响应体
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct MultipartTransport {
    client: reqwest::Client,
    upload_url: String,
}

impl MultipartTransport {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            upload_url: format!("{}/upload", base_url.trim_end_matches('/')),
        }
    }

    fn form(request: UploadRequest) -> Result<Form, UploadError> {
        let mut part = Part::bytes(request.bytes).file_name(request.file_name);
        if !request.content_type.is_empty() {
            part = part
                .mime_str(&request.content_type)
                .map_err(|e| UploadError::Transport(e.to_string()))?;
        }

        Ok(Form::new()
            .part("file", part)
            .text("uploadedBy", request.uploaded_by)
            .text("relativePath", request.relative_path))
    }
}

#[async_trait::async_trait]
impl UploadTransport for MultipartTransport {
    async fn send(&self, request: UploadRequest) -> Result<(), UploadError> {
        let relative_path = request.relative_path.clone();
        let form = Self::form(request)?;

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let status = response.status();
        let body: Option<UploadResponse> = response.json().await.ok();

        if status.is_success() {
            let stored = body.and_then(|b| b.file_name).unwrap_or(relative_path);
            debug!("Server stored {}", stored);
            Ok(())
        } else {
            Err(UploadError::Rejected {
                status: status.as_u16(),
                message: body
                    .and_then(|b| b.error)
                    .unwrap_or_else(|| status.to_string()),
            })
        }
    }
}
