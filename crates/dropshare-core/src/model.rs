//! 文件元数据与上传任务
//!
//! `FileRecord` 的 JSON 字段使用 camelCase，与推送通道和 `/get_all_files` 的载荷一致。

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 服务器已知的文件元数据
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub file_name: String,
    /// 包含目录前缀的相对路径，无目录结构时等于 `file_name`
    #[serde(default)]
    pub relative_path: String,
    #[serde(default)]
    pub uploaded_by: String,
    /// ISO-8601 上传时间
    #[serde(default)]
    pub timestamp: String,
    /// 内联模式下的 data URI 内容
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
}

impl FileRecord {
    /// 显示用路径，`relative_path` 为空时回退到文件名
    pub fn display_path(&self) -> &str {
        if self.relative_path.is_empty() {
            &self.file_name
        } else {
            &self.relative_path
        }
    }

    /// 解析 `timestamp`，无法解析时返回 `None`
    pub fn uploaded_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.timestamp).ok()
    }
}

/// 当前时间，格式与浏览器 `toISOString()` 相同
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 可上传的文件句柄
///
/// 句柄由本地文件系统或测试中的内存实现提供，内容只在上传时读取一次。
#[async_trait::async_trait]
pub trait FileSource: Send + Sync {
    /// 文件名（不含目录）
    fn name(&self) -> &str;

    /// 字节数
    fn size(&self) -> u64;

    /// 声明的 MIME 类型，未知时为空字符串
    fn content_type(&self) -> &str;

    /// 句柄本身是否是目录
    fn is_directory(&self) -> bool {
        false
    }

    /// 选择整个文件夹时附带的相对路径
    fn relative_path(&self) -> Option<&str> {
        None
    }

    /// 读取完整内容
    async fn read(&self) -> std::io::Result<Vec<u8>>;
}

/// 单个文件的上传任务，批次处理结束后即丢弃
pub struct UploadTask {
    pub source: Box<dyn FileSource>,
    pub relative_path: String,
    pub size_bytes: u64,
}

impl UploadTask {
    /// 直接选择的文件：优先使用句柄的相对路径，否则使用文件名
    pub fn new(source: Box<dyn FileSource>) -> Self {
        let relative_path = source
            .relative_path()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| source.name())
            .to_string();
        Self::with_relative_path(source, relative_path)
    }

    pub fn with_relative_path(source: Box<dyn FileSource>, relative_path: String) -> Self {
        let size_bytes = source.size();
        Self {
            source,
            relative_path,
            size_bytes,
        }
    }

    pub fn file_name(&self) -> &str {
        self.source.name()
    }
}

impl fmt::Debug for UploadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTask")
            .field("name", &self.source.name())
            .field("relative_path", &self.relative_path)
            .field("size_bytes", &self.size_bytes)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MemFile;
    use super::*;

    #[test]
    fn test_file_record_camel_case() {
        let json = r#"{
            "id": "abc",
            "fileName": "report.txt",
            "relativePath": "docs/report.txt",
            "uploadedBy": "alice",
            "timestamp": "2024-05-01T10:00:00.000Z"
        }"#;

        let record: FileRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.file_name, "report.txt");
        assert_eq!(record.relative_path, "docs/report.txt");
        assert!(record.file_content.is_none());

        let serialized = serde_json::to_string(&record).unwrap();
        assert!(serialized.contains("\"uploadedBy\":\"alice\""));
        assert!(!serialized.contains("fileContent"));
    }

    #[test]
    fn test_display_path_falls_back_to_name() {
        let record: FileRecord =
            serde_json::from_str(r#"{"id":"1","fileName":"a.txt"}"#).unwrap();
        assert_eq!(record.display_path(), "a.txt");
        assert!(record.uploaded_at().is_none());
    }

    #[test]
    fn test_now_timestamp_parses() {
        let ts = now_timestamp();
        assert!(ts.ends_with('Z'), "{ts}");
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }

    #[test]
    fn test_upload_task_relative_path() {
        let task = UploadTask::new(MemFile::new("a.txt", b"hi").boxed());
        assert_eq!(task.relative_path, "a.txt");
        assert_eq!(task.size_bytes, 2);

        let mut file = MemFile::new("b.txt", b"hey");
        file.relative_path = Some("folder/b.txt".to_string());
        let task = UploadTask::new(file.boxed());
        assert_eq!(task.relative_path, "folder/b.txt");
        assert_eq!(task.file_name(), "b.txt");
    }
}
