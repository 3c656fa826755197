//! 会话上下文
//!
//! 持有注册表、用户标识和提示消息，负责把推送事件分发到注册表并触发重新渲染。
//! 注册表只在这里被修改，上传流程不会直接写入注册表：
//! 自己上传的文件也要等服务器广播后才会出现在列表中。

use crate::notice::Notice;
use crate::protocol::ServerEvent;
use crate::registry::FileRegistry;
use crate::render::{Renderer, render_list};
use crate::upload::{BatchSummary, UploadError};
use log::{debug, info, warn};

pub struct Session<R: Renderer> {
    registry: FileRegistry,
    user_id: String,
    base_url: String,
    renderer: R,
    error: Option<Notice>,
    connectivity: Option<Notice>,
}

impl<R: Renderer> Session<R> {
    pub fn new(user_id: impl Into<String>, base_url: impl Into<String>, renderer: R) -> Self {
        Self {
            registry: FileRegistry::new(),
            user_id: user_id.into(),
            base_url: base_url.into(),
            renderer,
            error: None,
            connectivity: None,
        }
    }

    pub fn registry(&self) -> &FileRegistry {
        &self.registry
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// 当前错误提示（服务器错误或上传汇总）
    pub fn error(&self) -> Option<&Notice> {
        self.error.as_ref()
    }

    /// 当前连接警告
    pub fn connectivity(&self) -> Option<&Notice> {
        self.connectivity.as_ref()
    }

    /// 处理一个服务器事件
    pub fn handle_event(&mut self, event: &ServerEvent) {
        debug!("Push event: {}", event.name());
        match event {
            ServerEvent::Error(message) => {
                warn!("Server error: {}", message);
                self.set_error(Some(Notice::error(message.clone())));
            }
            ServerEvent::FilesList(_) => {
                self.registry.apply(event);
                if self.connectivity.take().is_some() {
                    info!("Resynchronised after reconnect");
                    self.renderer.show_notice(self.error.as_ref());
                }
                self.rerender();
            }
            ServerEvent::FileUpdated(_) | ServerEvent::FileDeleted(_) => {
                self.registry.apply(event);
                self.rerender();
            }
        }
    }

    /// 连接断开：保留最后的列表并显示警告
    pub fn connection_lost(&mut self, reason: &str) {
        warn!("Push channel disconnected: {}", reason);
        self.registry.mark_stale();
        let notice = Notice::warn(format!("Connection lost ({reason}), reconnecting..."));
        self.renderer.show_notice(Some(&notice));
        self.connectivity = Some(notice);
        self.rerender();
    }

    /// 记录批处理结果：有跳过时显示汇总，否则清除之前的错误
    pub fn record_batch(&mut self, outcome: &Result<BatchSummary, UploadError>) {
        let notice = match outcome {
            Ok(summary) => summary.notice(),
            Err(e) => Some(Notice::error(e.to_string())),
        };
        self.set_error(notice);
    }

    fn set_error(&mut self, notice: Option<Notice>) {
        self.error = notice;
        self.renderer.show_notice(self.error.as_ref());
    }

    fn rerender(&mut self) {
        let items = render_list(&self.registry, &self.base_url);
        self.renderer.render(&items, self.registry.is_stale());
    }
}
