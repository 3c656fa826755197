//! 文件共享服务器
//!
//! # 路由
//!
//! - `GET /ws`: 推送通道
//! - `POST /upload`: multipart 上传
//! - `GET /download/:id`: 下载单个文件
//! - `GET /download_all_zip`: 下载全部文件的 ZIP
//! - `GET /get_all_files`: 文件列表 JSON
//!
//! 新文件和删除通过 broadcast channel 推送给所有连接的客户端。

pub mod http;
pub mod store;
pub mod websocket;

pub use store::{FileStore, NewFile, StoreError, StoredFile};

use crate::config::ServerSettings;
use crate::protocol::ServerEvent;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// multipart 编码在文件内容之外的额外空间
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

/// 服务器共享状态
pub struct AppState {
    pub store: FileStore,
    pub events: broadcast::Sender<ServerEvent>,
    pub settings: ServerSettings,
}

impl AppState {
    pub async fn new(settings: ServerSettings) -> Result<Self, StoreError> {
        let store = FileStore::open(&settings.storage_dir, settings.embed_content).await?;
        let (events, _) = broadcast::channel(64);
        Ok(Self {
            store,
            events,
            settings,
        })
    }

    /// 广播给所有连接的客户端
    pub fn broadcast(&self, event: ServerEvent) {
        // 没有订阅者时发送失败，可以忽略
        let _ = self.events.send(event);
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.settings.max_body_size + MULTIPART_OVERHEAD;

    Router::new()
        .route("/", get(http::index))
        .route("/ws", get(websocket::ws_handler))
        .route("/upload", post(http::upload))
        .route("/download/:id", get(http::download))
        .route("/download_all_zip", get(http::download_all_zip))
        .route("/get_all_files", get(http::get_all_files))
        .layer(DefaultBodyLimit::max(
            usize::try_from(body_limit).unwrap_or(usize::MAX),
        ))
        .with_state(state)
}

/// 文件共享服务器
pub struct FileServer {
    state: Arc<AppState>,
    addr: Option<SocketAddr>,
}

impl FileServer {
    pub async fn new(settings: ServerSettings) -> anyhow::Result<Self> {
        let state = Arc::new(AppState::new(settings).await?);
        Ok(Self { state, addr: None })
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// 实际监听的地址（启动后可用）
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    async fn bind(&self) -> anyhow::Result<(TcpListener, SocketAddr)> {
        let listener = TcpListener::bind(&self.state.settings.bind).await?;
        let addr = listener.local_addr()?;
        Ok((listener, addr))
    }

    /// 在后台启动服务器，返回监听地址
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        let (listener, addr) = self.bind().await?;
        self.addr = Some(addr);
        let app = router(self.state.clone());

        info!("File server listening on {}", addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Server error: {}", e);
            }
        });

        Ok(addr)
    }

    /// 在当前任务中运行，直到收到 Ctrl-C
    pub async fn run(mut self) -> anyhow::Result<()> {
        let (listener, addr) = self.bind().await?;
        self.addr = Some(addr);
        let app = router(self.state.clone());

        info!("File server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Shutting down");
            })
            .await?;
        Ok(())
    }
}
