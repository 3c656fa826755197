//! 服务器端文件存储
//!
//! 内容以文件 id 为名写入存储目录，元数据写入同名的 `.json` 文件，
//! 并在内存中保存一份索引。打开存储时从元数据重建索引，
//! 缺少元数据的内容文件和缺少内容的元数据会被清除。

use crate::model::{FileRecord, now_timestamp};
use crate::protocol::encode_data_uri;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("file {0} not found")]
    NotFound(String),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// 元数据文件后缀
const META_SUFFIX: &str = ".json";

/// 新文件
#[derive(Debug, Clone)]
pub struct NewFile {
    pub file_name: String,
    pub relative_path: String,
    pub uploaded_by: String,
    /// 为空时使用服务器当前时间
    pub timestamp: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// 已保存的文件
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub record: FileRecord,
    pub content_type: String,
    pub size: u64,
    pub blob: PathBuf,
}

/// 写入磁盘的元数据，不含嵌入内容
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMeta {
    record: FileRecord,
    content_type: String,
    size: u64,
}

pub struct FileStore {
    root: PathBuf,
    embed_content: bool,
    files: RwLock<HashMap<String, StoredFile>>,
}

impl FileStore {
    /// 打开存储目录，不存在时创建，并从已有的元数据重建索引
    pub async fn open(root: impl Into<PathBuf>, embed_content: bool) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        let files = load_index(&root, embed_content).await?;
        info!("File store at {:?} ({} files)", root, files.len());
        Ok(Self {
            root,
            embed_content,
            files: RwLock::new(files),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 保存文件并返回新记录，每次上传都分配新的 id
    pub async fn insert(&self, file: NewFile) -> Result<FileRecord, StoreError> {
        if file.file_name.trim().is_empty() {
            return Err(StoreError::InvalidUpload("missing file name".to_string()));
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let blob = self.root.join(&id);
        fs::write(&blob, &file.bytes).await?;

        let relative_path = if file.relative_path.is_empty() {
            file.file_name.clone()
        } else {
            file.relative_path
        };
        let timestamp = if file.timestamp.is_empty() {
            now_timestamp()
        } else {
            file.timestamp
        };
        let file_content = self
            .embed_content
            .then(|| encode_data_uri(&file.content_type, &file.bytes));

        let record = FileRecord {
            id: id.clone(),
            file_name: file.file_name,
            relative_path,
            uploaded_by: file.uploaded_by,
            timestamp,
            file_content,
        };

        let meta = FileMeta {
            record: FileRecord {
                file_content: None,
                ..record.clone()
            },
            content_type: file.content_type,
            size: file.bytes.len() as u64,
        };
        if let Err(e) = write_meta(&self.root, &meta).await {
            let _ = fs::remove_file(&blob).await;
            return Err(e);
        }

        let stored = StoredFile {
            record: record.clone(),
            content_type: meta.content_type,
            size: meta.size,
            blob,
        };
        self.files.write().await.insert(id, stored);

        info!(
            "Stored {} (id={}, by {})",
            record.relative_path, record.id, record.uploaded_by
        );
        Ok(record)
    }

    pub async fn remove(&self, id: &str) -> Result<FileRecord, StoreError> {
        let stored = self
            .files
            .write()
            .await
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Err(e) = fs::remove_file(meta_path(&self.root, id)).await {
            debug!("Failed to remove metadata for {}: {}", id, e);
        }
        if let Err(e) = fs::remove_file(&stored.blob).await {
            debug!("Failed to remove blob {:?}: {}", stored.blob, e);
        }
        info!("Deleted {} (id={})", stored.record.relative_path, id);
        Ok(stored.record)
    }

    pub async fn get(&self, id: &str) -> Option<StoredFile> {
        self.files.read().await.get(id).cloned()
    }

    /// 全部记录，按上传时间升序
    pub async fn list(&self) -> Vec<FileRecord> {
        let mut records: Vec<FileRecord> = self
            .files
            .read()
            .await
            .values()
            .map(|f| f.record.clone())
            .collect();
        records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }

    /// 读取文件内容
    pub async fn read(&self, id: &str) -> Result<(StoredFile, Vec<u8>), StoreError> {
        let stored = self
            .get(id)
            .await
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let bytes = fs::read(&stored.blob).await?;
        Ok((stored, bytes))
    }

    /// 打包全部文件，条目名为相对路径，重名时追加 ` (n)`
    pub async fn zip_all(&self) -> Result<Vec<u8>, StoreError> {
        let mut files: Vec<StoredFile> = self.files.read().await.values().cloned().collect();
        files.sort_by(|a, b| a.record.timestamp.cmp(&b.record.timestamp));

        let mut buffer = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buffer));
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);

            let mut used = HashSet::new();
            for file in &files {
                let entry_name = unique_entry_name(file.record.display_path(), &mut used);
                zip.start_file(entry_name.as_str(), options)?;

                let contents = fs::read(&file.blob).await?;
                zip.write_all(&contents)?;
            }

            zip.finish()?;
        }

        debug!("Built ZIP of {} files ({} bytes)", files.len(), buffer.len());
        Ok(buffer)
    }
}

fn meta_path(root: &Path, id: &str) -> PathBuf {
    root.join(format!("{id}{META_SUFFIX}"))
}

/// 存储分配的 id：32 位小写十六进制
fn is_file_id(name: &str) -> bool {
    name.len() == 32 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

async fn write_meta(root: &Path, meta: &FileMeta) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(meta)?;
    fs::write(meta_path(root, &meta.record.id), json).await?;
    Ok(())
}

/// 读取一条元数据，内容文件已不存在时返回 `None`
async fn load_meta(
    root: &Path,
    id: &str,
    embed_content: bool,
) -> Result<Option<StoredFile>, StoreError> {
    let blob = root.join(id);
    if !fs::try_exists(&blob).await? {
        return Ok(None);
    }

    let meta: FileMeta = serde_json::from_slice(&fs::read(meta_path(root, id)).await?)?;
    let mut record = meta.record;
    record.id = id.to_string();
    if embed_content {
        let bytes = fs::read(&blob).await?;
        record.file_content = Some(encode_data_uri(&meta.content_type, &bytes));
    }

    Ok(Some(StoredFile {
        record,
        content_type: meta.content_type,
        size: meta.size,
        blob,
    }))
}

/// 扫描存储目录重建索引，清除不成对的文件
///
/// 其他名字的文件不会被改动。
async fn load_index(
    root: &Path,
    embed_content: bool,
) -> Result<HashMap<String, StoredFile>, StoreError> {
    let mut files = HashMap::new();
    let mut blobs = Vec::new();

    let mut dir = fs::read_dir(root).await?;
    while let Some(entry) = dir.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };

        if let Some(id) = name.strip_suffix(META_SUFFIX) {
            if !is_file_id(id) {
                continue;
            }
            match load_meta(root, id, embed_content).await {
                Ok(Some(stored)) => {
                    files.insert(id.to_string(), stored);
                }
                Ok(None) => {
                    warn!("Removing metadata without content: {}", name);
                    let _ = fs::remove_file(entry.path()).await;
                }
                Err(e) => {
                    warn!("Removing unreadable metadata {}: {}", name, e);
                    let _ = fs::remove_file(entry.path()).await;
                }
            }
        } else if is_file_id(&name) {
            blobs.push(name);
        }
    }

    for id in blobs {
        if !files.contains_key(&id) {
            warn!("Removing orphaned blob {}", id);
            let _ = fs::remove_file(root.join(&id)).await;
        }
    }

    Ok(files)
}

fn unique_entry_name(path: &str, used: &mut HashSet<String>) -> String {
    let base = path.trim_start_matches('/').to_string();
    if used.insert(base.clone()) {
        return base;
    }

    let (stem, ext) = match base.rfind('.') {
        Some(dot) if dot > base.rfind('/').map_or(0, |s| s + 1) => base.split_at(dot),
        _ => (base.as_str(), ""),
    };
    let mut n = 1;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn new_file(name: &str, path: &str, data: &[u8]) -> NewFile {
        NewFile {
            file_name: name.to_string(),
            relative_path: path.to_string(),
            uploaded_by: "alice".to_string(),
            timestamp: String::new(),
            content_type: "text/plain".to_string(),
            bytes: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_insert_read_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), false).await.unwrap();

        let record = store.insert(new_file("a.txt", "", b"hello")).await.unwrap();
        assert_eq!(record.relative_path, "a.txt");
        assert!(record.uploaded_at().is_some());
        assert!(record.file_content.is_none());

        let (stored, bytes) = store.read(&record.id).await.unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(stored.size, 5);

        store.remove(&record.id).await.unwrap();
        assert!(store.get(&record.id).await.is_none());
        assert!(!stored.blob.exists());
        assert!(matches!(
            store.remove(&record.id).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reupload_gets_new_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), false).await.unwrap();

        let first = store.insert(new_file("a.txt", "x/a.txt", b"1")).await.unwrap();
        let second = store.insert(new_file("a.txt", "x/a.txt", b"2")).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(store.list().await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), false).await.unwrap();
        let result = store.insert(new_file(" ", "", b"1")).await;
        assert!(matches!(result, Err(StoreError::InvalidUpload(_))));
    }

    #[tokio::test]
    async fn test_embed_content() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path(), true).await.unwrap();
        let record = store.insert(new_file("a.txt", "", b"hi")).await.unwrap();
        assert_eq!(
            record.file_content.as_deref(),
            Some("data:text/plain;base64,aGk=")
        );
    }

    #[tokio::test]
    async fn test_zip_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("blobs"), false)
            .await
            .unwrap();
        store.insert(new_file("a.txt", "docs/a.txt", b"one")).await.unwrap();
        store.insert(new_file("a.txt", "docs/a.txt", b"two")).await.unwrap();
        store.insert(new_file("b.bin", "", b"three")).await.unwrap();

        let data = store.zip_all().await.unwrap();
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data)).unwrap();
        assert_eq!(archive.len(), 3);

        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["b.bin", "docs/a (1).txt", "docs/a.txt"]);

        let mut contents = String::new();
        archive
            .by_name("b.bin")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "three");
    }

    #[tokio::test]
    async fn test_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (kept, removed) = {
            let store = FileStore::open(dir.path(), false).await.unwrap();
            let kept = store.insert(new_file("a.txt", "docs/a.txt", b"keep")).await.unwrap();
            let removed = store.insert(new_file("b.txt", "", b"gone")).await.unwrap();
            store.remove(&removed.id).await.unwrap();
            (kept, removed)
        };

        let store = FileStore::open(dir.path(), true).await.unwrap();
        let listed = store.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, kept.id);
        assert_eq!(listed[0].relative_path, "docs/a.txt");
        assert_eq!(listed[0].timestamp, kept.timestamp);
        assert_eq!(
            listed[0].file_content.as_deref(),
            Some("data:text/plain;base64,a2VlcA==")
        );
        assert!(store.get(&removed.id).await.is_none());

        let (stored, bytes) = store.read(&kept.id).await.unwrap();
        assert_eq!(bytes, b"keep");
        assert_eq!(stored.content_type, "text/plain");
    }

    #[tokio::test]
    async fn test_unpaired_files_are_removed_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let kept = {
            let store = FileStore::open(dir.path(), false).await.unwrap();
            store.insert(new_file("a.txt", "", b"one")).await.unwrap()
        };

        let orphan_blob = dir.path().join("0123456789abcdef0123456789abcdef");
        std::fs::write(&orphan_blob, b"left behind").unwrap();
        let orphan_meta = dir.path().join("fedcba9876543210fedcba9876543210.json");
        std::fs::write(&orphan_meta, b"{}").unwrap();
        let unrelated = dir.path().join("notes.txt");
        std::fs::write(&unrelated, b"not ours").unwrap();

        let store = FileStore::open(dir.path(), false).await.unwrap();
        let ids: Vec<String> = store.list().await.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![kept.id]);
        assert!(!orphan_blob.exists());
        assert!(!orphan_meta.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn test_is_file_id() {
        assert!(is_file_id(&uuid::Uuid::new_v4().simple().to_string()));
        assert!(!is_file_id("notes.txt"));
        assert!(!is_file_id("0123456789ABCDEF0123456789ABCDEF"));
    }

    #[test]
    fn test_unique_entry_name() {
        let mut used = HashSet::new();
        assert_eq!(unique_entry_name("/a.txt", &mut used), "a.txt");
        assert_eq!(unique_entry_name("a.txt", &mut used), "a (1).txt");
        assert_eq!(unique_entry_name("a.txt", &mut used), "a (2).txt");
        assert_eq!(unique_entry_name("v1.0/README", &mut used), "v1.0/README");
        assert_eq!(unique_entry_name("v1.0/README", &mut used), "v1.0/README (1)");
    }
}
