//! 集成测试 - 客户端与服务器端到端
//!
//! 每个测试在 127.0.0.1 的随机端口上启动服务器，存储目录为临时目录。

use dropshare_core::config::ServerSettings;
use dropshare_core::protocol::{ClientEvent, UploadPayload, encode_data_uri};
use dropshare_core::transport::{
    InlineTransport, MultipartTransport, PushConnection, ReconnectPolicy, upload_and_confirm,
};
use dropshare_core::{
    BatchOptions, BatchProcessor, DownloadClient, FileRecord, FileRegistry, FileServer,
    PushUpdate, RenderedItem, Renderer, ServerEvent, Session, SyncState, entry_from_path, flatten,
    spawn_push_client,
};
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

struct TestServer {
    base_url: String,
    push_url: String,
    _storage: TempDir,
}

async fn start_server(max_body_size: u64) -> TestServer {
    start_server_with(max_body_size, false).await
}

async fn start_server_with(max_body_size: u64, embed_content: bool) -> TestServer {
    let storage = tempfile::tempdir().unwrap();
    let mut server = FileServer::new(ServerSettings {
        bind: "127.0.0.1:0".to_string(),
        storage_dir: storage.path().to_path_buf(),
        max_body_size,
        embed_content,
    })
    .await
    .unwrap();
    let addr = server.start().await.unwrap();

    TestServer {
        base_url: format!("http://{addr}"),
        push_url: format!("ws://{addr}/ws"),
        _storage: storage,
    }
}

/// 连接推送通道并读掉初始的文件列表
async fn connect(server: &TestServer) -> (PushConnection, Vec<FileRecord>) {
    let mut conn = PushConnection::connect(&server.push_url).await.unwrap();
    match next_event(&mut conn).await {
        ServerEvent::FilesList(files) => (conn, files),
        other => panic!("expected files_list, got {other:?}"),
    }
}

async fn next_event(conn: &mut PushConnection) -> ServerEvent {
    timeout(WAIT, conn.next_event())
        .await
        .expect("timed out waiting for push event")
        .expect("push channel closed")
        .expect("push channel error")
}

async fn expect_quiet(conn: &mut PushConnection) {
    assert!(
        timeout(QUIET, conn.next_event()).await.is_err(),
        "unexpected push event"
    );
}

fn write_file(path: &Path, data: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, data).unwrap();
}

async fn upload_paths(
    server: &TestServer,
    paths: &[&Path],
    options: BatchOptions,
    uploaded_by: &str,
) -> dropshare_core::BatchSummary {
    let mut entries = Vec::new();
    for path in paths {
        entries.push(entry_from_path(path).await);
    }
    let tasks = flatten(entries).await;
    let processor = BatchProcessor::new(MultipartTransport::new(&server.base_url), options);
    processor.process_batch(tasks, uploaded_by).await.unwrap()
}

/// 测试 multipart 上传、推送通知与下载的完整流程
#[tokio::test]
async fn test_multipart_upload_end_to_end() {
    let server = start_server(4096).await;
    let (mut conn, initial) = connect(&server).await;
    assert!(initial.is_empty());

    let dir = tempfile::tempdir().unwrap();
    let data: Vec<u8> = (0..1024u32).map(|i| (i % 251) as u8).collect();
    let path = dir.path().join("report.txt");
    write_file(&path, &data);

    let summary = upload_paths(&server, &[path.as_path()], BatchOptions::default(), "alice").await;
    assert_eq!(summary.uploaded, 1);
    assert_eq!(summary.skipped, 0);
    assert!(summary.notice().is_none());

    let event = next_event(&mut conn).await;
    let mut registry = FileRegistry::new();
    registry.replace_all(initial);
    assert!(registry.apply(&event));

    let record = match event {
        ServerEvent::FileUpdated(record) => record,
        other => panic!("expected file_updated, got {other:?}"),
    };
    assert_eq!(record.file_name, "report.txt");
    assert_eq!(record.relative_path, "report.txt");
    assert_eq!(record.uploaded_by, "alice");
    assert!(record.uploaded_at().is_some());
    assert_eq!(registry.get(&record.id), Some(&record));

    let client = DownloadClient::new(&server.base_url);
    let (file_name, bytes) = client.fetch(&record.id).await.unwrap();
    assert_eq!(file_name.as_deref(), Some("report.txt"));
    assert_eq!(bytes, data);

    let listed = client.list_files().await.unwrap();
    assert_eq!(listed, vec![record]);
}

/// 测试超过大小上限的文件在客户端被跳过，服务器不会收到请求
#[tokio::test]
async fn test_oversized_file_is_skipped() {
    let server = start_server(4096).await;
    let (mut conn, _) = connect(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.bin");
    write_file(&path, &[7u8; 2048]);

    let options = BatchOptions {
        max_file_size: 1024,
        empty_type_is_directory: false,
    };
    let summary = upload_paths(&server, &[path.as_path()], options, "alice").await;
    assert_eq!(summary.message(), "0 of 1 uploaded, 1 skipped");
    assert!(summary.notice().is_some());

    expect_quiet(&mut conn).await;
    let listed = DownloadClient::new(&server.base_url)
        .list_files()
        .await
        .unwrap();
    assert!(listed.is_empty());
}

/// 测试服务器拒绝超过请求体上限的 multipart 上传
#[tokio::test]
async fn test_server_rejects_oversized_body() {
    let server = start_server(1024).await;
    let (mut conn, _) = connect(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.bin");
    write_file(&path, &[7u8; 2048]);

    // 客户端上限高于服务器上限
    let summary = upload_paths(&server, &[path.as_path()], BatchOptions::default(), "alice").await;
    assert_eq!(summary.uploaded, 0);
    assert_eq!(summary.skipped, 1);
    expect_quiet(&mut conn).await;
}

/// 测试通过推送通道内联上传整个目录
#[tokio::test]
async fn test_inline_directory_upload() {
    let server = start_server(4096).await;
    let (mut conn, _) = connect(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("docs");
    write_file(&root.join("a.txt"), b"alpha");
    write_file(&root.join("sub").join("b.txt"), b"beta");

    let tasks = flatten(vec![entry_from_path(&root).await]).await;
    assert_eq!(tasks.len(), 2);

    let processor = BatchProcessor::new(
        InlineTransport::new(conn.sender()),
        BatchOptions::default(),
    );
    let summary = processor.process_batch(tasks, "bob").await.unwrap();
    assert_eq!(summary.uploaded, 2);

    let mut paths = Vec::new();
    for _ in 0..2 {
        match next_event(&mut conn).await {
            ServerEvent::FileUpdated(record) => {
                assert_eq!(record.uploaded_by, "bob");
                paths.push(record.relative_path);
            }
            other => panic!("expected file_updated, got {other:?}"),
        }
    }
    paths.sort();
    assert_eq!(paths, vec!["docs/a.txt", "docs/sub/b.txt"]);

    let client = DownloadClient::new(&server.base_url);
    let listed = client.list_files().await.unwrap();
    let a = listed.iter().find(|r| r.relative_path == "docs/a.txt").unwrap();
    let (_, bytes) = client.fetch(&a.id).await.unwrap();
    assert_eq!(bytes, b"alpha");
}

const LARGE_FILE: usize = 2 * 1024 * 1024;
const LARGE_BATCH: usize = 10;

/// 测试服务器嵌入内容时，大批量内联上传不会因为双方互相等待写入而卡住
#[tokio::test]
async fn test_inline_batch_with_embedded_content() {
    let server = start_server_with(4 * 1024 * 1024, true).await;
    let (mut conn, _) = connect(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("bulk");
    let data = vec![b'x'; LARGE_FILE];
    for i in 0..LARGE_BATCH {
        write_file(&root.join(format!("part-{i}.bin")), &data);
    }
    let tasks = flatten(vec![entry_from_path(&root).await]).await;
    assert_eq!(tasks.len(), LARGE_BATCH);

    let processor = BatchProcessor::new(
        InlineTransport::new(conn.sender()),
        BatchOptions::default(),
    );
    let outcome = timeout(
        Duration::from_secs(60),
        upload_and_confirm(&mut conn, &processor, tasks, "carol"),
    )
    .await
    .expect("inline batch stalled")
    .unwrap();

    assert_eq!(outcome.summary.message(), "10 of 10 uploaded, 0 skipped");
    assert!(outcome.rejected.is_empty());
    assert_eq!(outcome.confirmed.len(), LARGE_BATCH);
    assert!(outcome.confirmed.iter().all(|r| r.file_content.is_some()));
}

/// 测试客户端只发送不读取时，服务器仍然继续处理它的上传
#[tokio::test]
async fn test_unread_client_does_not_stall_uploads() {
    let server = start_server_with(4 * 1024 * 1024, true).await;
    let conn = PushConnection::connect(&server.push_url).await.unwrap();

    let content = encode_data_uri("application/octet-stream", &vec![b'y'; LARGE_FILE]);
    let sends = async {
        for i in 0..LARGE_BATCH {
            let event = ClientEvent::UploadFile(UploadPayload {
                file_name: format!("part-{i}.bin"),
                file_content: content.clone(),
                uploaded_by: "dave".to_string(),
                timestamp: "2024-01-01T00:00:00.000Z".to_string(),
                relative_path: None,
            });
            conn.send(&event).await.unwrap();
        }
    };
    timeout(Duration::from_secs(60), sends)
        .await
        .expect("server stopped reading");

    let client = DownloadClient::new(&server.base_url);
    let stored = timeout(Duration::from_secs(30), async {
        loop {
            let files = client.list_files().await.unwrap();
            if files.len() == LARGE_BATCH {
                break files;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    })
    .await
    .expect("uploads were not stored");
    assert!(stored.iter().all(|r| r.uploaded_by == "dave"));

    conn.close().await;
}

/// 测试服务器拒绝的内联上传计为跳过
#[tokio::test]
async fn test_inline_rejection_counts_as_skipped() {
    let server = start_server(4096).await;
    let (mut conn, _) = connect(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("mixed");
    write_file(&root.join("small.txt"), b"fits");
    // 客户端上限默认更大，由服务器拒绝
    write_file(&root.join("large.bin"), &[0u8; 5000]);
    let tasks = flatten(vec![entry_from_path(&root).await]).await;

    let processor = BatchProcessor::new(
        InlineTransport::new(conn.sender()),
        BatchOptions::default(),
    );
    let outcome = upload_and_confirm(&mut conn, &processor, tasks, "erin")
        .await
        .unwrap();

    assert_eq!(outcome.summary.message(), "1 of 2 uploaded, 1 skipped");
    assert!(outcome.summary.notice().is_some());
    assert_eq!(outcome.confirmed.len(), 1);
    assert_eq!(outcome.confirmed[0].relative_path, "mixed/small.txt");
    assert_eq!(outcome.rejected, vec!["large.bin exceeds the upload limit"]);
}

/// 测试删除广播给所有客户端，而错误只发给发起者
#[tokio::test]
async fn test_delete_flow() {
    let server = start_server(4096).await;
    let (mut alice, _) = connect(&server).await;
    let (mut bob, _) = connect(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.md");
    write_file(&path, b"# notes");
    upload_paths(&server, &[path.as_path()], BatchOptions::default(), "alice").await;

    let id = match next_event(&mut alice).await {
        ServerEvent::FileUpdated(record) => record.id,
        other => panic!("expected file_updated, got {other:?}"),
    };
    assert!(matches!(next_event(&mut bob).await, ServerEvent::FileUpdated(_)));

    alice.send(&ClientEvent::DeleteFile(id.clone())).await.unwrap();
    assert_eq!(next_event(&mut alice).await, ServerEvent::FileDeleted(id.clone()));
    assert_eq!(next_event(&mut bob).await, ServerEvent::FileDeleted(id.clone()));

    alice.send(&ClientEvent::DeleteFile(id.clone())).await.unwrap();
    assert_eq!(
        next_event(&mut alice).await,
        ServerEvent::Error("file not found for deletion".to_string())
    );
    expect_quiet(&mut bob).await;

    let client = DownloadClient::new(&server.base_url);
    assert!(client.fetch(&id).await.is_err());
}

/// 测试 ZIP 下载，重复的相对路径会追加序号
#[tokio::test]
async fn test_download_all_zip() {
    let server = start_server(4096).await;

    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let a1 = first.path().join("a.txt");
    let a2 = second.path().join("a.txt");
    write_file(&a1, b"first");
    write_file(&a2, b"second");
    upload_paths(&server, &[a1.as_path()], BatchOptions::default(), "alice").await;
    upload_paths(&server, &[a2.as_path()], BatchOptions::default(), "bob").await;

    let out = tempfile::tempdir().unwrap();
    let saved = DownloadClient::new(&server.base_url)
        .download_all_zip(out.path())
        .await
        .unwrap();
    assert_eq!(saved, out.path().join("all_files.zip"));

    let file = std::fs::File::open(&saved).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names, vec!["a (1).txt", "a.txt"]);

    let mut contents = Vec::new();
    for name in &names {
        let mut text = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut text).unwrap();
        contents.push(text);
    }
    contents.sort();
    assert_eq!(contents, vec!["first", "second"]);
}

/// 测试逐个下载全部文件并保留目录结构
#[tokio::test]
async fn test_download_all_individually() {
    let server = start_server(4096).await;

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("docs");
    write_file(&root.join("a.txt"), b"alpha");
    let single = dir.path().join("b.txt");
    write_file(&single, b"beta");
    let summary = upload_paths(&server, &[root.as_path(), single.as_path()], BatchOptions::default(), "alice").await;
    assert_eq!(summary.uploaded, 2);

    let out = tempfile::tempdir().unwrap();
    let saved = DownloadClient::new(&server.base_url)
        .download_all_individually(out.path(), Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(std::fs::read(out.path().join("docs").join("a.txt")).unwrap(), b"alpha");
    assert_eq!(std::fs::read(out.path().join("b.txt")).unwrap(), b"beta");
}

#[derive(Default)]
struct CollectingRenderer {
    frames: Vec<Vec<RenderedItem>>,
}

impl Renderer for CollectingRenderer {
    fn render(&mut self, items: &[RenderedItem], _stale: bool) {
        self.frames.push(items.to_vec());
    }
}

/// 测试后台推送客户端驱动会话状态
#[tokio::test]
async fn test_push_client_drives_session() {
    let server = start_server(4096).await;
    let (_sender, mut updates, handle) =
        spawn_push_client(server.push_url.clone(), ReconnectPolicy::default());
    let mut session = Session::new("user-00000001", &server.base_url, CollectingRenderer::default());

    let first = timeout(WAIT, updates.recv()).await.unwrap().unwrap();
    assert_eq!(first, PushUpdate::Connected);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photo.png");
    write_file(&path, b"\x89PNG");

    let mut uploaded = false;
    while session.registry().len() < 1 {
        match timeout(WAIT, updates.recv()).await.unwrap().unwrap() {
            PushUpdate::Event(event) => {
                session.handle_event(&event);
                if !uploaded {
                    assert_eq!(session.registry().state(), SyncState::Synced);
                    upload_paths(&server, &[path.as_path()], BatchOptions::default(), "alice").await;
                    uploaded = true;
                }
            }
            other => panic!("unexpected update {other:?}"),
        }
    }

    let frames = &session.renderer().frames;
    let last = frames.last().unwrap();
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].label, "photo.png");
    assert!(
        last[0]
            .download_url()
            .unwrap()
            .starts_with(&format!("{}/download/", server.base_url))
    );

    drop(updates);
    handle.abort();
}
