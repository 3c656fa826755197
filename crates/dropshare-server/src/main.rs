//! Dropshare Server
//!
//! 文件共享服务器，负责：
//! - 接收 multipart 与推送通道上传
//! - 向所有客户端推送文件列表变化
//! - 提供单个文件和 ZIP 下载

use anyhow::Result;
use clap::Parser;
use dropshare_core::{AppSettings, FileServer};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dropshare-server", version, about = "Dropshare - 局域网文件共享服务器")]
struct Args {
    /// 监听地址 (默认读取配置文件)
    #[arg(short, long)]
    bind: Option<String>,
    /// 文件存储目录
    #[arg(short, long)]
    storage: Option<PathBuf>,
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 桥接 log crate（dropshare-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dropshare_core=debug")),
        )
        .try_init();

    let settings = match &args.config {
        Some(path) => AppSettings::load_from(path),
        None => AppSettings::load(),
    };
    let mut server_settings = settings.server;
    if let Some(bind) = args.bind {
        server_settings.bind = bind;
    }
    if let Some(storage) = args.storage {
        server_settings.storage_dir = storage;
    }

    tracing::info!("Dropshare server starting...");
    tracing::info!(
        "Storage: {:?}, upload limit: {} bytes",
        server_settings.storage_dir,
        server_settings.max_body_size
    );

    let server = FileServer::new(server_settings).await?;
    server.run().await
}
