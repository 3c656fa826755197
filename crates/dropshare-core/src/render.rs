//! 列表渲染
//!
//! `render_list` 是从注册表到显示列表的纯函数：按上传时间倒序，
//! 每一项带有下载和删除两个操作。

use crate::notice::Notice;
use crate::registry::FileRegistry;
use std::fmt::Write as _;

/// 列表项上的操作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemAction {
    Download { url: String },
    Delete { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedItem {
    pub id: String,
    pub label: String,
    pub uploaded_by: String,
    pub timestamp: String,
    pub actions: Vec<ItemAction>,
}

impl RenderedItem {
    pub fn download_url(&self) -> Option<&str> {
        self.actions.iter().find_map(|action| match action {
            ItemAction::Download { url } => Some(url.as_str()),
            ItemAction::Delete { .. } => None,
        })
    }
}

/// 单个文件的下载地址
pub fn download_url(base_url: &str, id: &str) -> String {
    format!("{}/download/{}", base_url.trim_end_matches('/'), id)
}

pub fn render_list(registry: &FileRegistry, base_url: &str) -> Vec<RenderedItem> {
    registry
        .sorted()
        .into_iter()
        .map(|record| RenderedItem {
            id: record.id.clone(),
            label: record.display_path().to_string(),
            uploaded_by: record.uploaded_by.clone(),
            timestamp: record.timestamp.clone(),
            actions: vec![
                ItemAction::Download {
                    url: download_url(base_url, &record.id),
                },
                ItemAction::Delete {
                    id: record.id.clone(),
                },
            ],
        })
        .collect()
}

/// 渲染目标，注册表每次变化后都会同步调用
pub trait Renderer: Send {
    fn render(&mut self, items: &[RenderedItem], stale: bool);

    /// 提示消息变化，`None` 表示清除
    fn show_notice(&mut self, _notice: Option<&Notice>) {}
}

/// 文本表格形式
pub fn format_table(items: &[RenderedItem], stale: bool) -> String {
    let mut out = String::new();
    if stale {
        out.push_str("(offline, showing last known list)\n");
    }
    if items.is_empty() {
        out.push_str("No files shared yet.\n");
        return out;
    }

    // 格式化按字符数填充，宽度也按字符数计算
    let width = items
        .iter()
        .map(|i| i.label.chars().count())
        .max()
        .unwrap_or(0);
    for item in items {
        let _ = writeln!(
            out,
            "{:<width$}  {:<16}  {:<24}  {}",
            item.label,
            item.uploaded_by,
            item.timestamp,
            item.id,
            width = width
        );
    }
    out
}
