//! 客户端传输
//!
//! 包含:
//! - 推送通道客户端 (WebSocket)
//! - 内联与 multipart 两种上传方式
//! - HTTP 下载客户端

pub mod download;
pub mod inline;
pub mod multipart;
pub mod push;

pub use download::DownloadClient;
pub use inline::{InlineOutcome, InlineTransport, upload_and_confirm};
pub use multipart::MultipartTransport;
pub use push::{
    PushConnection, PushError, PushSender, PushUpdate, ReconnectPolicy, spawn_push_client,
};

use crate::config::{AppSettings, TransportMode};
use crate::upload::UploadTransport;

/// 按配置创建上传传输层
///
/// 内联模式需要已连接的推送通道写入端。
pub fn upload_transport(settings: &AppSettings, push: Option<PushSender>) -> Box<dyn UploadTransport> {
    match settings.transport {
        TransportMode::Inline => {
            Box::new(InlineTransport::new(push.unwrap_or_else(PushSender::disconnected)))
        }
        TransportMode::Multipart => Box::new(MultipartTransport::new(&settings.server_url)),
    }
}
