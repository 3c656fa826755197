//! 命令实现 - 通过 HTTP 与推送通道访问服务器

use anyhow::{Result, bail};
use dropshare_core::protocol::ClientEvent;
use dropshare_core::render::{format_table, render_list};
use dropshare_core::transport::inline::CONFIRM_TIMEOUT;
use dropshare_core::transport::{
    PushConnection, ReconnectPolicy, upload_and_confirm, upload_transport,
};
use dropshare_core::{
    AppSettings, BatchOptions, BatchProcessor, DownloadClient, FileRegistry, Notice,
    PushUpdate, RenderedItem, Renderer, ServerEvent, Session, TransportMode, entry_from_path,
    flatten, spawn_push_client,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;

/// 打印到终端的渲染器
pub struct TextRenderer;

impl Renderer for TextRenderer {
    fn render(&mut self, items: &[RenderedItem], stale: bool) {
        println!();
        print!("{}", format_table(items, stale));
    }

    fn show_notice(&mut self, notice: Option<&Notice>) {
        if let Some(notice) = notice {
            println!("{notice}");
        }
    }
}

/// 上传文件或目录，汇总通过会话显示
pub async fn upload(settings: &AppSettings, paths: &[PathBuf], uploaded_by: &str) -> Result<()> {
    let mut entries = Vec::with_capacity(paths.len());
    for path in paths {
        entries.push(entry_from_path(path).await);
    }
    let tasks = flatten(entries).await;
    println!("📤 上传 {} 个文件 ({})", tasks.len(), settings.transport);

    let options = BatchOptions::from(settings);
    let summary = match settings.transport {
        TransportMode::Multipart => {
            let processor = BatchProcessor::new(upload_transport(settings, None), options);
            processor.process_batch(tasks, uploaded_by).await?
        }
        TransportMode::Inline => {
            let mut conn = PushConnection::connect(&settings.push_url()).await?;
            let processor =
                BatchProcessor::new(upload_transport(settings, Some(conn.sender())), options);
            let result = upload_and_confirm(&mut conn, &processor, tasks, uploaded_by).await;
            conn.close().await;
            let outcome = result?;
            for record in &outcome.confirmed {
                println!("   ✅ {}", record.display_path());
            }
            for message in &outcome.rejected {
                println!("   ❌ {message}");
            }
            outcome.summary
        }
    };

    let mut session = Session::new(uploaded_by, &settings.server_url, TextRenderer);
    session.record_batch(&Ok(summary));
    if session.error().is_none() {
        println!("✅ {}", summary.message());
    }
    Ok(())
}

/// 打印文件列表
pub async fn list(settings: &AppSettings) -> Result<()> {
    let files = DownloadClient::new(&settings.server_url).list_files().await?;
    let mut registry = FileRegistry::new();
    registry.replace_all(files);
    print!(
        "{}",
        format_table(&render_list(&registry, &settings.server_url), false)
    );
    Ok(())
}

/// 持续显示文件列表，直到 Ctrl-C
pub async fn watch(settings: &AppSettings, user_id: &str) -> Result<()> {
    let url = settings.push_url();
    println!("👀 监听 {url} (Ctrl-C 退出)");

    let (_sender, mut updates, handle) = spawn_push_client(url.clone(), ReconnectPolicy::default());
    let mut session = Session::new(user_id, &settings.server_url, TextRenderer);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(PushUpdate::Connected) => println!("🔗 已连接"),
                Some(PushUpdate::Event(event)) => session.handle_event(&event),
                Some(PushUpdate::Disconnected(reason)) => session.connection_lost(&reason),
                None => break,
            },
            _ = &mut ctrl_c => break,
        }
    }

    handle.abort();
    Ok(())
}

/// 请求删除文件，等待服务器广播或错误
pub async fn delete(settings: &AppSettings, id: &str) -> Result<()> {
    let mut conn = PushConnection::connect(&settings.push_url()).await?;
    conn.send(&ClientEvent::DeleteFile(id.to_string())).await?;

    let result = loop {
        match timeout(CONFIRM_TIMEOUT, conn.next_event()).await {
            Ok(Some(Ok(ServerEvent::FileDeleted(deleted)))) if deleted == id => break Ok(()),
            Ok(Some(Ok(ServerEvent::Error(message)))) => break Err(anyhow::anyhow!(message)),
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(e))) => break Err(e.into()),
            Ok(None) => break Err(anyhow::anyhow!("push channel closed")),
            Err(_) => break Err(anyhow::anyhow!("no response from server")),
        }
    };

    conn.close().await;
    result?;
    println!("🗑️  已删除 {id}");
    Ok(())
}

pub async fn download(settings: &AppSettings, id: &str, dir: &Path) -> Result<()> {
    let path = DownloadClient::new(&settings.server_url)
        .download_to(id, dir)
        .await?;
    println!("📥 已保存到 {}", path.display());
    Ok(())
}

pub async fn download_all(settings: &AppSettings, zip: bool, dir: &Path) -> Result<()> {
    let client = DownloadClient::new(&settings.server_url);
    if zip {
        let path = client.download_all_zip(dir).await?;
        println!("📦 已保存到 {}", path.display());
        return Ok(());
    }

    let delay = Duration::from_millis(settings.download_delay_ms);
    let saved = client.download_all_individually(dir, delay).await?;
    if saved.is_empty() {
        bail!("no files shared yet");
    }
    for path in &saved {
        println!("📥 {}", path.display());
    }
    println!("   共 {} 个文件", saved.len());
    Ok(())
}
