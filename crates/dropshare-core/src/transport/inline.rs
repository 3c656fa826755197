//! 内联上传：内容编码为 data URI，每个文件一条 `upload_file` 推送消息
//!
//! 内联上传没有 HTTP 响应，服务器用 `file_updated` 广播或 `error` 回复确认。
//! [`upload_and_confirm`] 在发送的同时读取这些确认，
//! 服务器拒绝的文件从已上传改计为跳过。

use super::push::{PushConnection, PushError, PushSender};
use crate::model::{FileRecord, UploadTask};
use crate::protocol::{ClientEvent, ServerEvent, UploadPayload, encode_data_uri};
use crate::upload::{BatchProcessor, BatchSummary, UploadError, UploadRequest, UploadTransport};
use log::{debug, warn};
use std::time::Duration;
use tokio::time::timeout;

/// 批次发送完后等待每条确认的时间
pub const CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);

pub struct InlineTransport {
    sender: PushSender,
}

impl InlineTransport {
    pub fn new(sender: PushSender) -> Self {
        Self { sender }
    }
}

/// 把上传请求转换为 `upload_file` 载荷
pub fn upload_payload(request: &UploadRequest) -> UploadPayload {
    UploadPayload {
        file_name: request.file_name.clone(),
        file_content: encode_data_uri(&request.content_type, &request.bytes),
        uploaded_by: request.uploaded_by.clone(),
        timestamp: request.timestamp.clone(),
        relative_path: Some(request.relative_path.clone()),
    }
}

#[async_trait::async_trait]
impl UploadTransport for InlineTransport {
    async fn send(&self, request: UploadRequest) -> Result<(), UploadError> {
        let event = ClientEvent::UploadFile(upload_payload(&request));
        self.sender
            .send(&event)
            .await
            .map_err(|e| UploadError::Transport(e.to_string()))
    }
}

/// 内联批次的结果
#[derive(Debug, Default)]
pub struct InlineOutcome {
    /// 扣除服务器拒绝后的汇总
    pub summary: BatchSummary,
    /// 服务器确认保存的文件
    pub confirmed: Vec<FileRecord>,
    /// 服务器返回的错误
    pub rejected: Vec<String>,
}

impl InlineOutcome {
    fn settled(&self) -> usize {
        self.confirmed.len() + self.rejected.len()
    }

    /// 记录一个推送事件，返回连接是否仍然可用
    fn record(
        &mut self,
        event: Option<Result<ServerEvent, PushError>>,
        uploaded_by: &str,
        pending: &mut Vec<String>,
    ) -> bool {
        match event {
            Some(Ok(ServerEvent::FileUpdated(record))) => {
                if record.uploaded_by == uploaded_by {
                    if let Some(pos) = pending.iter().position(|p| *p == record.relative_path) {
                        pending.swap_remove(pos);
                        self.confirmed.push(record);
                    }
                }
                true
            }
            Some(Ok(ServerEvent::Error(message))) => {
                warn!("Server rejected inline upload: {}", message);
                self.rejected.push(message);
                true
            }
            Some(Ok(event)) => {
                debug!("Ignoring {} while uploading", event.name());
                true
            }
            Some(Err(e)) => {
                warn!("Push channel error while uploading: {}", e);
                false
            }
            None => false,
        }
    }
}

/// 通过推送通道上传一批文件，并收集服务器的确认
///
/// 发送期间持续读取连接，服务器的写入不会因为客户端不读取而阻塞。
/// 批次发送完后继续等待尚未确认的文件，单条等待超过 [`CONFIRM_TIMEOUT`] 即停止。
pub async fn upload_and_confirm<T: UploadTransport>(
    conn: &mut PushConnection,
    processor: &BatchProcessor<T>,
    tasks: Vec<UploadTask>,
    uploaded_by: &str,
) -> Result<InlineOutcome, UploadError> {
    let uploaded_by = uploaded_by.trim();
    let mut pending: Vec<String> = tasks.iter().map(|t| t.relative_path.clone()).collect();
    let mut outcome = InlineOutcome::default();
    let mut open = true;

    let batch = processor.process_batch(tasks, uploaded_by);
    tokio::pin!(batch);
    let summary = loop {
        tokio::select! {
            result = &mut batch => break result?,
            event = conn.next_event(), if open => {
                open = outcome.record(event, uploaded_by, &mut pending);
            }
        }
    };

    while open && outcome.settled() < summary.uploaded {
        match timeout(CONFIRM_TIMEOUT, conn.next_event()).await {
            Ok(event) => open = outcome.record(event, uploaded_by, &mut pending),
            Err(_) => {
                warn!(
                    "No confirmation for {} inline uploads",
                    summary.uploaded - outcome.settled()
                );
                break;
            }
        }
    }

    let rejected = outcome.rejected.len().min(summary.uploaded);
    outcome.summary = BatchSummary {
        uploaded: summary.uploaded - rejected,
        skipped: summary.skipped + rejected,
    };
    Ok(outcome)
}
