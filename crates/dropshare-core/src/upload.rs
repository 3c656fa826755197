//! 上传批处理
//!
//! 对一批文件逐个校验并发送，统计成功与跳过的数量：
//! 1. 目录标记（或可选的空 MIME 类型）视为目录，跳过
//! 2. 超过大小上限，跳过
//! 3. 读取内容并通过传输层发送
//! 4. 任何读取或发送失败计为跳过，继续处理下一个文件
//!
//! 文件严格串行处理，上一个文件发送完成后才开始下一个，
//! 同一时间最多只持有一个文件的内容。

use crate::config::{AppSettings, DEFAULT_MAX_FILE_SIZE};
use crate::model::UploadTask;
use crate::notice::Notice;
use log::{debug, info, warn};

/// 上传错误
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("no files selected")]
    EmptyBatch,

    #[error("uploader name is missing")]
    MissingUploader,

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// 发送给传输层的单个文件
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub relative_path: String,
    pub uploaded_by: String,
    pub content_type: String,
    pub timestamp: String,
    pub bytes: Vec<u8>,
}

/// 上传传输层
#[async_trait::async_trait]
pub trait UploadTransport: Send + Sync {
    /// 发送一个文件，返回时发送已完成
    async fn send(&self, request: UploadRequest) -> Result<(), UploadError>;
}

#[async_trait::async_trait]
impl<T: UploadTransport + ?Sized> UploadTransport for Box<T> {
    async fn send(&self, request: UploadRequest) -> Result<(), UploadError> {
        (**self).send(request).await
    }
}

/// 跳过原因
#[derive(Debug)]
pub enum SkipReason {
    DirectoryLike,
    TooLarge { size: u64, limit: u64 },
    Failed(UploadError),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::DirectoryLike => write!(f, "looks like a directory"),
            SkipReason::TooLarge { size, limit } => {
                write!(f, "{size} bytes exceeds the {limit} byte limit")
            }
            SkipReason::Failed(e) => write!(f, "{e}"),
        }
    }
}

/// 批处理结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub uploaded: usize,
    pub skipped: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.uploaded + self.skipped
    }

    pub fn message(&self) -> String {
        format!(
            "{} of {} uploaded, {} skipped",
            self.uploaded,
            self.total(),
            self.skipped
        )
    }

    /// 有跳过时返回汇总错误，否则为 `None`
    pub fn notice(&self) -> Option<Notice> {
        (self.skipped > 0).then(|| Notice::error(self.message()))
    }
}

/// 批处理选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// 单文件大小上限（字节）
    pub max_file_size: u64,
    /// 把 MIME 类型为空的文件视为目录
    pub empty_type_is_directory: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            empty_type_is_directory: false,
        }
    }
}

impl From<&AppSettings> for BatchOptions {
    fn from(settings: &AppSettings) -> Self {
        Self {
            max_file_size: settings.max_file_size,
            empty_type_is_directory: settings.empty_type_is_directory,
        }
    }
}

/// 上传批处理器
pub struct BatchProcessor<T: UploadTransport> {
    transport: T,
    options: BatchOptions,
}

impl<T: UploadTransport> BatchProcessor<T> {
    pub fn new(transport: T, options: BatchOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// 发送前的校验，返回跳过原因
    pub fn classify(&self, task: &UploadTask) -> Option<SkipReason> {
        let source = &task.source;
        if source.is_directory()
            || (self.options.empty_type_is_directory && source.content_type().is_empty())
        {
            return Some(SkipReason::DirectoryLike);
        }
        if task.size_bytes > self.options.max_file_size {
            return Some(SkipReason::TooLarge {
                size: task.size_bytes,
                limit: self.options.max_file_size,
            });
        }
        None
    }

    /// 处理一批文件
    ///
    /// 只有整批被拒绝（空批次、缺少上传者）时返回错误；
    /// 单个文件的失败只计入 `skipped`。批次被消费，调用后选择即被清空。
    pub async fn process_batch(
        &self,
        tasks: Vec<UploadTask>,
        uploaded_by: &str,
    ) -> Result<BatchSummary, UploadError> {
        let uploaded_by = uploaded_by.trim();
        if tasks.is_empty() {
            return Err(UploadError::EmptyBatch);
        }
        if uploaded_by.is_empty() {
            return Err(UploadError::MissingUploader);
        }

        info!("Uploading batch of {} files as {}", tasks.len(), uploaded_by);

        let mut summary = BatchSummary::default();
        for task in tasks {
            match self.upload_one(&task, uploaded_by).await {
                Ok(()) => {
                    debug!("Uploaded {}", task.relative_path);
                    summary.uploaded += 1;
                }
                Err(reason) => {
                    warn!("Skipped {}: {}", task.relative_path, reason);
                    summary.skipped += 1;
                }
            }
        }

        info!("Batch finished: {}", summary.message());
        Ok(summary)
    }

    async fn upload_one(&self, task: &UploadTask, uploaded_by: &str) -> Result<(), SkipReason> {
        if let Some(reason) = self.classify(task) {
            return Err(reason);
        }

        let bytes = task.source.read().await.map_err(|source| {
            SkipReason::Failed(UploadError::Read {
                path: task.relative_path.clone(),
                source,
            })
        })?;

        let request = UploadRequest {
            file_name: task.file_name().to_string(),
            relative_path: task.relative_path.clone(),
            uploaded_by: uploaded_by.to_string(),
            content_type: task.source.content_type().to_string(),
            timestamp: crate::model::now_timestamp(),
            bytes,
        };

        self.transport.send(request).await.map_err(SkipReason::Failed)
    }
}
