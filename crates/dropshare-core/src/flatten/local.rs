//! 本地文件系统条目
//!
//! 目录按 [`PAGE_SIZE`] 分页读取，与浏览器目录读取器的批量大小一致。

use super::{DirectoryReader, DropEntry};
use crate::model::FileSource;
use log::debug;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 每次读取目录的最大子项数
pub const PAGE_SIZE: usize = 100;

/// 本地文件句柄
#[derive(Debug, Clone)]
pub struct LocalFile {
    path: PathBuf,
    name: String,
    size: u64,
    content_type: String,
    is_directory: bool,
    relative_path: Option<String>,
}

impl LocalFile {
    /// 打开文件句柄并读取元数据
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = fs::metadata(&path).await?;
        Ok(Self::from_metadata(path, &metadata))
    }

    fn from_metadata(path: PathBuf, metadata: &std::fs::Metadata) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());

        // 未知扩展名与浏览器一致，返回空类型
        let content_type = if metadata.is_dir() {
            String::new()
        } else {
            mime_guess::from_path(&path)
                .first()
                .map(|m| m.to_string())
                .unwrap_or_default()
        };

        Self {
            path,
            name,
            size: metadata.len(),
            content_type,
            is_directory: metadata.is_dir(),
            relative_path: None,
        }
    }

    /// 附加文件夹选择时的相对路径
    #[must_use]
    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = Some(relative_path.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl FileSource for LocalFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn content_type(&self) -> &str {
        &self.content_type
    }

    fn is_directory(&self) -> bool {
        self.is_directory
    }

    fn relative_path(&self) -> Option<&str> {
        self.relative_path.as_deref()
    }

    async fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path).await
    }
}

/// 本地目录的分页读取器
pub struct LocalDirectory {
    path: PathBuf,
    full_path: String,
    entries: Option<fs::ReadDir>,
}

impl LocalDirectory {
    pub fn new(path: PathBuf, full_path: String) -> Self {
        Self {
            path,
            full_path,
            entries: None,
        }
    }
}

#[async_trait::async_trait]
impl DirectoryReader for LocalDirectory {
    async fn read_entries(&mut self) -> io::Result<Vec<DropEntry>> {
        if self.entries.is_none() {
            self.entries = Some(fs::read_dir(&self.path).await?);
        }
        let Some(entries) = self.entries.as_mut() else {
            return Ok(Vec::new());
        };

        let mut page = Vec::new();
        while page.len() < PAGE_SIZE {
            let Some(entry) = entries.next_entry().await? else {
                break;
            };
            let name = entry.file_name().to_string_lossy().to_string();
            let full_path = format!("{}/{}", self.full_path, name);
            // 目录内的符号链接不展开，指向祖先目录时会无限循环
            if entry.file_type().await.is_ok_and(|t| t.is_symlink()) {
                debug!("Skipping symlink {}", full_path);
                page.push(DropEntry::Other { full_path });
                continue;
            }
            page.push(classify(entry.path(), full_path).await);
        }

        Ok(page)
    }
}

/// 把路径转换为拖放根下的条目，`full_path` 为 `/<名称>`
pub async fn entry_from_path(path: impl AsRef<Path>) -> DropEntry {
    let path = path.as_ref().to_path_buf();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());
    classify(path, format!("/{name}")).await
}

async fn classify(path: PathBuf, full_path: String) -> DropEntry {
    match fs::metadata(&path).await {
        Ok(metadata) if metadata.is_dir() => DropEntry::Directory {
            reader: Box::new(LocalDirectory::new(path, full_path.clone())),
            full_path,
        },
        Ok(metadata) if metadata.is_file() => DropEntry::File {
            source: Box::new(LocalFile::from_metadata(path, &metadata)),
            full_path,
        },
        Ok(_) => DropEntry::Other { full_path },
        Err(e) => {
            debug!("Cannot stat {:?}: {}", path, e);
            DropEntry::Other { full_path }
        }
    }
}
