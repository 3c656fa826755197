//! 应用配置和持久化
//!
//! 客户端与服务器设置保存在同一个 `settings.toml` 中，服务器设置位于 `[server]` 表。

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 默认单文件大小上限 (50 MiB)，与服务器请求体上限一致
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// 上传传输方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// 内容编码为 data URI，通过推送通道发送
    Inline,
    /// 通过 HTTP multipart 发送原始字节
    #[default]
    Multipart,
}

impl TransportMode {
    pub fn name(&self) -> &'static str {
        match self {
            TransportMode::Inline => "inline",
            TransportMode::Multipart => "multipart",
        }
    }
}

impl std::str::FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inline" => Ok(TransportMode::Inline),
            "multipart" => Ok(TransportMode::Multipart),
            other => Err(format!(
                "unknown transport '{other}', expected 'inline' or 'multipart'"
            )),
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 服务器设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// 监听地址
    pub bind: String,
    /// 文件存储目录
    pub storage_dir: PathBuf,
    /// 请求体上限（字节）
    pub max_body_size: u64,
    /// 在广播的记录中附带 data URI 内容
    pub embed_content: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            storage_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("dropshare")
                .join("files"),
            max_body_size: DEFAULT_MAX_FILE_SIZE,
            embed_content: false,
        }
    }
}

/// 应用设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// 服务器地址，例如 `http://127.0.0.1:5000`
    pub server_url: String,
    /// 上传传输方式
    pub transport: TransportMode,
    /// 单文件大小上限（字节）
    pub max_file_size: u64,
    /// 把 MIME 类型为空的文件视为目录并跳过
    pub empty_type_is_directory: bool,
    /// 下载目录
    pub download_dir: PathBuf,
    /// 逐个下载时两次请求之间的间隔（毫秒）
    pub download_delay_ms: u64,
    pub server: ServerSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            transport: TransportMode::default(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            empty_type_is_directory: false,
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            download_delay_ms: 500,
            server: ServerSettings::default(),
        }
    }
}

impl AppSettings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dropshare");
        config_dir.join("settings.toml")
    }

    /// 加载设置（如果文件不存在则使用默认值）
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }
        Self::default()
    }

    /// 保存设置
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    /// 推送通道地址：`http(s)://host` → `ws(s)://host/ws`
    pub fn push_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{base}")
        };
        format!("{ws_base}/ws")
    }
}
