//! Dropshare CLI
//!
//! 命令行客户端，上传、浏览和下载服务器上共享的文件

mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dropshare_core::{AppSettings, IdentityStore, TransportMode};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dropshare", version, about = "Dropshare - 局域网文件共享")]
struct Cli {
    /// 服务器地址 (默认读取配置文件)
    #[arg(long, global = true)]
    server: Option<String>,
    /// 配置文件路径
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 上传文件或目录
    Upload {
        /// 文件或目录路径
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// 上传者 (默认: 本机用户 id)
        #[arg(long)]
        by: Option<String>,
        /// 上传方式: inline 或 multipart
        #[arg(long)]
        mode: Option<TransportMode>,
        /// 单文件大小上限 (字节)
        #[arg(long)]
        max_size: Option<u64>,
    },
    /// 列出共享的文件
    List,
    /// 实时显示文件列表
    Watch,
    /// 删除文件
    Delete {
        /// 文件 id
        id: String,
    },
    /// 下载单个文件
    Download {
        /// 文件 id
        id: String,
        /// 保存目录 (默认: ~/Downloads)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 下载全部文件
    DownloadAll {
        /// 打包为一个 ZIP
        #[arg(long)]
        zip: bool,
        /// 保存目录 (默认: ~/Downloads)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 显示本机用户 id
    Whoami,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = tracing_log::LogTracer::init();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let mut settings = match &cli.config {
        Some(path) => AppSettings::load_from(path),
        None => AppSettings::load(),
    };
    if let Some(server) = cli.server {
        settings.server_url = server;
    }
    let identity = IdentityStore::default();

    match cli.command {
        Commands::Upload {
            paths,
            by,
            mode,
            max_size,
        } => {
            if let Some(mode) = mode {
                settings.transport = mode;
            }
            if let Some(max_size) = max_size {
                settings.max_file_size = max_size;
            }
            let uploaded_by = match by {
                Some(name) => name,
                None => identity.load_or_create()?,
            };

            client::upload(&settings, &paths, &uploaded_by).await?;
        }
        Commands::List => client::list(&settings).await?,
        Commands::Watch => {
            let user_id = identity.load_or_create()?;
            client::watch(&settings, &user_id).await?;
        }
        Commands::Delete { id } => client::delete(&settings, &id).await?,
        Commands::Download { id, output } => {
            let dir = output.unwrap_or_else(|| settings.download_dir.clone());
            client::download(&settings, &id, &dir).await?;
        }
        Commands::DownloadAll { zip, output } => {
            let dir = output.unwrap_or_else(|| settings.download_dir.clone());
            client::download_all(&settings, zip, &dir).await?;
        }
        Commands::Whoami => {
            let user_id = identity.load_or_create()?;
            println!("{user_id}");
            println!("   ({})", identity.path().display());
        }
    }

    Ok(())
}
