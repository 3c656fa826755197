//! Dropshare Core Library
//!
//! 局域网文件共享：客户端把文件或整个目录上传到服务器，
//! 服务器通过推送通道把文件列表的变化实时发给所有连接的客户端。
//!
//! # 模块
//!
//! - **model**: 文件记录与上传任务
//! - **protocol**: 推送通道的事件格式
//! - **flatten**: 把拖放的文件和目录展开为上传任务
//! - **upload**: 批量上传与大小校验
//! - **registry**: 客户端文件列表
//! - **render**: 列表渲染
//! - **session**: 客户端会话状态
//! - **transport**: 推送通道、上传与下载客户端
//! - **server**: HTTP / WebSocket 服务器
//!
//! # 使用示例
//!
//! ## 上传目录
//!
//! ```ignore
//! use dropshare_core::{AppSettings, BatchOptions, BatchProcessor, entry_from_path, flatten};
//!
//! let settings = AppSettings::load();
//! let tasks = flatten(vec![entry_from_path("photos").await]).await;
//!
//! let transport = dropshare_core::transport::upload_transport(&settings, None);
//! let processor = BatchProcessor::new(transport, BatchOptions::from(&settings));
//! let summary = processor.process_batch(tasks, "user-1a2b3c4d").await?;
//! println!("{}", summary.message());
//! ```
//!
//! ## 运行服务器
//!
//! ```ignore
//! use dropshare_core::{FileServer, ServerSettings};
//!
//! let mut server = FileServer::new(ServerSettings::default()).await?;
//! let addr = server.start().await?;
//! ```

pub mod config;
pub mod flatten;
pub mod identity;
pub mod model;
pub mod notice;
pub mod protocol;
pub mod registry;
pub mod render;
pub mod server;
pub mod session;
pub mod transport;
pub mod upload;

// Model re-exports
pub use model::{FileRecord, FileSource, UploadTask};

// Config re-exports
pub use config::{AppSettings, ServerSettings, TransportMode};

// Protocol re-exports
pub use protocol::{ClientEvent, ServerEvent, UploadPayload};

// Flatten re-exports
pub use flatten::{DirectoryReader, DropEntry, LocalDirectory, LocalFile, entry_from_path, flatten};

// Upload re-exports
pub use upload::{BatchOptions, BatchProcessor, BatchSummary, UploadError, UploadTransport};

// Client state re-exports
pub use identity::IdentityStore;
pub use notice::{Notice, NoticeLevel};
pub use registry::{FileRegistry, SyncState};
pub use render::{RenderedItem, Renderer};
pub use session::Session;

// Transport re-exports
pub use transport::{DownloadClient, PushSender, PushUpdate, spawn_push_client};

// Server re-exports
pub use server::{FileServer, FileStore};
