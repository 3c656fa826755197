//! HTTP 下载客户端
//!
//! - `GET /get_all_files`: 文件列表
//! - `GET /download/{id}`: 单个文件
//! - `GET /download_all_zip`: 全部文件的 ZIP
//!
//! 逐个下载全部文件时，两次请求之间会等待一段时间。

use crate::model::FileRecord;
use crate::protocol::decode_data_uri;
use crate::render::download_url;
use anyhow::{Context, bail};
use log::{debug, info};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub struct DownloadClient {
    client: reqwest::Client,
    base_url: String,
}

impl DownloadClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// 获取服务器上的全部文件记录
    pub async fn list_files(&self) -> anyhow::Result<Vec<FileRecord>> {
        let url = format!("{}/get_all_files", self.base_url);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// 下载单个文件，返回 (建议文件名, 内容)
    pub async fn fetch(&self, id: &str) -> anyhow::Result<(Option<String>, Vec<u8>)> {
        let url = download_url(&self.base_url, id);
        debug!("GET {}", url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            bail!("download of {} failed: {}", id, response.status());
        }

        let file_name = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename);
        let bytes = response.bytes().await?;
        Ok((file_name, bytes.to_vec()))
    }

    /// 下载单个文件到目录，返回保存路径
    pub async fn download_to(&self, id: &str, dir: &Path) -> anyhow::Result<PathBuf> {
        let (file_name, bytes) = self.fetch(id).await?;
        let name = file_name.unwrap_or_else(|| id.to_string());
        write_file(&safe_join(dir, &name), &bytes).await
    }

    /// 保存一条记录：内容内嵌时直接解码，否则从服务器下载
    pub async fn save_record(&self, record: &FileRecord, dir: &Path) -> anyhow::Result<PathBuf> {
        let target = safe_join(dir, record.display_path());
        if let Some(content) = &record.file_content {
            let (_, bytes) = decode_data_uri(content)
                .with_context(|| format!("invalid embedded content for {}", record.id))?;
            return write_file(&target, &bytes).await;
        }

        let (_, bytes) = self.fetch(&record.id).await?;
        write_file(&target, &bytes).await
    }

    /// 下载全部文件的 ZIP
    pub async fn download_all_zip(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        let url = format!("{}/download_all_zip", self.base_url);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let file_name = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(disposition_filename)
            .unwrap_or_else(|| "all_files.zip".to_string());
        let bytes = response.bytes().await?;
        write_file(&safe_join(dir, &file_name), &bytes).await
    }

    /// 逐个下载全部文件，请求之间间隔 `delay`
    pub async fn download_all_individually(
        &self,
        dir: &Path,
        delay: Duration,
    ) -> anyhow::Result<Vec<PathBuf>> {
        let files = self.list_files().await?;
        info!("Downloading {} files into {:?}", files.len(), dir);

        let mut saved = Vec::with_capacity(files.len());
        for (i, record) in files.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(delay).await;
            }
            saved.push(self.save_record(record, dir).await?);
        }
        Ok(saved)
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, bytes).await?;
    debug!("Saved {} bytes to {:?}", bytes.len(), path);
    Ok(path.to_path_buf())
}

/// 把相对路径拼接到目录下，忽略绝对路径前缀和 `..`
pub fn safe_join(dir: &Path, relative: &str) -> PathBuf {
    let mut path = dir.to_path_buf();
    for component in Path::new(relative).components() {
        if let Component::Normal(part) = component {
            path.push(part);
        }
    }
    if path == dir {
        path.push("download");
    }
    path
}

/// 从 `Content-Disposition` 中取出文件名
pub fn disposition_filename(header: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|param| {
        let value = param.strip_prefix("filename=")?;
        let value = value.trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}
