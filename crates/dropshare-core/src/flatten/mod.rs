//! 目录展开
//!
//! 把拖放的条目（文件或嵌套目录）展开为扁平的上传任务列表，
//! 每个任务带有相对于拖放根目录的路径。
//!
//! 目录读取是分页的：必须循环读取直到返回空页。
//! 输出顺序不保证与输入或目录顺序一致。

pub mod local;

pub use local::{LocalDirectory, LocalFile, entry_from_path};

use crate::model::{FileSource, UploadTask};
use log::{debug, warn};

/// 目录子项的分页读取器
#[async_trait::async_trait]
pub trait DirectoryReader: Send {
    /// 读取下一页子项，返回空页表示已读尽
    async fn read_entries(&mut self) -> std::io::Result<Vec<DropEntry>>;
}

/// 拖放条目
///
/// `full_path` 是条目在拖放根下的完整路径，以 `/` 开头。
pub enum DropEntry {
    File {
        full_path: String,
        source: Box<dyn FileSource>,
    },
    Directory {
        full_path: String,
        reader: Box<dyn DirectoryReader>,
    },
    /// 既不是文件也不是目录（失效句柄、无权限等）
    Other { full_path: String },
}

impl DropEntry {
    pub fn full_path(&self) -> &str {
        match self {
            DropEntry::File { full_path, .. }
            | DropEntry::Directory { full_path, .. }
            | DropEntry::Other { full_path } => full_path,
        }
    }
}

impl std::fmt::Debug for DropEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            DropEntry::File { .. } => "File",
            DropEntry::Directory { .. } => "Directory",
            DropEntry::Other { .. } => "Other",
        };
        f.debug_struct("DropEntry")
            .field("kind", &kind)
            .field("full_path", &self.full_path())
            .finish()
    }
}

/// 去掉开头的路径分隔符
pub fn strip_root(full_path: &str) -> &str {
    full_path.trim_start_matches('/')
}

/// 展开拖放条目
///
/// 读取失败的目录和 `Other` 条目被静默丢弃，不计为错误。
pub async fn flatten(entries: Vec<DropEntry>) -> Vec<UploadTask> {
    let mut pending = entries;
    let mut files = Vec::new();

    while let Some(entry) = pending.pop() {
        match entry {
            DropEntry::File { full_path, source } => {
                let relative_path = strip_root(&full_path).to_string();
                files.push(UploadTask::with_relative_path(source, relative_path));
            }
            DropEntry::Directory {
                full_path,
                mut reader,
            } => loop {
                match reader.read_entries().await {
                    Ok(page) if page.is_empty() => break,
                    Ok(page) => {
                        debug!("{}: read {} entries", full_path, page.len());
                        pending.extend(page);
                    }
                    Err(e) => {
                        warn!("Failed to read directory {}: {}", full_path, e);
                        break;
                    }
                }
            },
            DropEntry::Other { full_path } => {
                debug!("Dropping unreadable entry {}", full_path);
            }
        }
    }

    files
}
