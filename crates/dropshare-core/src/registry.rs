//! 客户端文件注册表
//!
//! 保存服务器已知文件的最终一致视图，只由推送事件修改：
//!
//! - `files_list` 快照整体替换内容（不做差异比较），状态进入 `Synced`
//! - `file_updated` 按 id 新增或覆盖
//! - `file_deleted` 按 id 删除，id 不存在时不做任何事
//!
//! 断线后保留最后的状态并标记为过期，重连后的快照会清除过期标记。

use crate::model::FileRecord;
use crate::protocol::ServerEvent;
use std::cmp::Ordering;
use std::collections::HashMap;

/// 同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Uninitialized,
    Synced,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRegistry {
    files: HashMap<String, FileRecord>,
    state: SyncState,
    stale: bool,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// 断线后、重连快照到达前为 `true`
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&FileRecord> {
        self.files.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    /// 用快照整体替换
    pub fn replace_all(&mut self, files: Vec<FileRecord>) {
        self.files = files.into_iter().map(|f| (f.id.clone(), f)).collect();
        self.state = SyncState::Synced;
        self.stale = false;
    }

    pub fn upsert(&mut self, record: FileRecord) {
        self.files.insert(record.id.clone(), record);
    }

    pub fn remove(&mut self, id: &str) -> Option<FileRecord> {
        self.files.remove(id)
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// 应用推送事件，返回注册表是否被修改
    ///
    /// `error` 事件不修改注册表。
    pub fn apply(&mut self, event: &ServerEvent) -> bool {
        match event {
            ServerEvent::FilesList(files) => {
                self.replace_all(files.clone());
                true
            }
            ServerEvent::FileUpdated(record) => {
                self.upsert(record.clone());
                true
            }
            ServerEvent::FileDeleted(id) => self.remove(id).is_some(),
            ServerEvent::Error(_) => false,
        }
    }

    /// 按上传时间倒序排列
    ///
    /// 无法解析的时间排在最后，时间相同时按 id 排序。
    pub fn sorted(&self) -> Vec<&FileRecord> {
        let mut records: Vec<&FileRecord> = self.files.values().collect();
        records.sort_by(|a, b| newest_first(a, b));
        records
    }
}

fn newest_first(a: &FileRecord, b: &FileRecord) -> Ordering {
    let by_time = match (a.uploaded_at(), b.uploaded_at()) {
        (Some(ta), Some(tb)) => tb.cmp(&ta),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_time.then_with(|| a.id.cmp(&b.id))
}
