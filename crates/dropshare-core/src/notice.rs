//! 用户可见的提示消息
//!
//! 与诊断日志分开：这里只存放需要展示给用户的错误、警告和摘要。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 提示级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NoticeLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
}

impl NoticeLevel {
    /// 获取对应的 Emoji 图标
    pub fn icon(&self) -> &'static str {
        match self {
            NoticeLevel::Error => "❌",
            NoticeLevel::Warn => "⚠️",
            NoticeLevel::Info => "ℹ️",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            NoticeLevel::Error => "ERROR",
            NoticeLevel::Warn => "WARN",
            NoticeLevel::Info => "INFO",
        }
    }
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Error, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Warn, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoticeLevel::Info, message)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.level.icon(), self.message)
    }
}
