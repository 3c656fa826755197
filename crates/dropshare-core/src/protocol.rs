//! 推送通道消息格式
//!
//! 每个 WebSocket 文本帧是一个 JSON 数组 `["<event>", <payload>]`。
//!
//! | 方向 | 事件 | 载荷 |
//! |---|---|---|
//! | server→client | `files_list` | FileRecord 数组 |
//! | server→client | `file_updated` | FileRecord |
//! | server→client | `file_deleted` | 文件 id |
//! | server→client | `error` | 错误文本 |
//! | client→server | `upload_file` | [`UploadPayload`] |
//! | client→server | `delete_file` | 文件 id |

use crate::model::FileRecord;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;

pub const FILES_LIST: &str = "files_list";
pub const FILE_UPDATED: &str = "file_updated";
pub const FILE_DELETED: &str = "file_deleted";
pub const ERROR: &str = "error";
pub const UPLOAD_FILE: &str = "upload_file";
pub const DELETE_FILE: &str = "delete_file";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Invalid payload for '{event}': {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 原始推送消息
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub event: String,
    pub payload: Value,
}

impl std::fmt::Display for PushMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let frame = Value::Array(vec![Value::String(self.event.clone()), self.payload.clone()]);
        write!(f, "{frame}")
    }
}

impl PushMessage {
    pub fn new(event: &str, payload: Value) -> Self {
        Self {
            event: event.to_string(),
            payload,
        }
    }

    /// 解析一帧文本，不是 `["name", payload?]` 形式时返回 `None`
    pub fn parse(text: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(text).ok()?;
        let mut items = match value {
            Value::Array(items) if !items.is_empty() && items.len() <= 2 => items,
            _ => return None,
        };

        let payload = if items.len() == 2 {
            items.pop()?
        } else {
            Value::Null
        };
        let event = match items.pop()? {
            Value::String(name) => name,
            _ => return None,
        };

        Some(Self { event, payload })
    }

    fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_value(self.payload.clone()).map_err(|source| ProtocolError::Payload {
            event: self.event.clone(),
            source,
        })
    }
}

/// 服务器推送给客户端的事件
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// 完整快照
    FilesList(Vec<FileRecord>),
    /// 新增或覆盖单个记录
    FileUpdated(FileRecord),
    FileDeleted(String),
    Error(String),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::FilesList(_) => FILES_LIST,
            ServerEvent::FileUpdated(_) => FILE_UPDATED,
            ServerEvent::FileDeleted(_) => FILE_DELETED,
            ServerEvent::Error(_) => ERROR,
        }
    }

    pub fn to_message(&self) -> PushMessage {
        let payload = match self {
            ServerEvent::FilesList(files) => serde_json::to_value(files),
            ServerEvent::FileUpdated(file) => serde_json::to_value(file),
            ServerEvent::FileDeleted(id) => Ok(Value::String(id.clone())),
            ServerEvent::Error(message) => Ok(Value::String(message.clone())),
        };
        // FileRecord 只包含字符串字段，序列化不会失败
        PushMessage::new(self.name(), payload.unwrap_or(Value::Null))
    }

    pub fn from_message(message: &PushMessage) -> Result<Self, ProtocolError> {
        match message.event.as_str() {
            FILES_LIST => Ok(ServerEvent::FilesList(message.payload_as()?)),
            FILE_UPDATED => Ok(ServerEvent::FileUpdated(message.payload_as()?)),
            FILE_DELETED => Ok(ServerEvent::FileDeleted(message.payload_as()?)),
            ERROR => Ok(ServerEvent::Error(message.payload_as()?)),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let message =
            PushMessage::parse(text).ok_or_else(|| ProtocolError::Malformed(text.to_string()))?;
        Self::from_message(&message)
    }
}

/// 内联上传载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    pub file_name: String,
    /// data URI 编码的内容
    pub file_content: String,
    #[serde(default)]
    pub uploaded_by: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
}

impl UploadPayload {
    /// 缺少相对路径时回退到文件名
    pub fn effective_path(&self) -> &str {
        self.relative_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.file_name)
    }
}

/// 客户端发给服务器的事件
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    UploadFile(UploadPayload),
    DeleteFile(String),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::UploadFile(_) => UPLOAD_FILE,
            ClientEvent::DeleteFile(_) => DELETE_FILE,
        }
    }

    pub fn to_message(&self) -> PushMessage {
        let payload = match self {
            ClientEvent::UploadFile(upload) => {
                serde_json::to_value(upload).unwrap_or(Value::Null)
            }
            ClientEvent::DeleteFile(id) => Value::String(id.clone()),
        };
        PushMessage::new(self.name(), payload)
    }

    pub fn from_message(message: &PushMessage) -> Result<Self, ProtocolError> {
        match message.event.as_str() {
            UPLOAD_FILE => Ok(ClientEvent::UploadFile(message.payload_as()?)),
            DELETE_FILE => Ok(ClientEvent::DeleteFile(message.payload_as()?)),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }

    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let message =
            PushMessage::parse(text).ok_or_else(|| ProtocolError::Malformed(text.to_string()))?;
        Self::from_message(&message)
    }
}

/// 编码为 `data:<type>;base64,<data>`，类型未知时使用 `application/octet-stream`
pub fn encode_data_uri(content_type: &str, bytes: &[u8]) -> String {
    let content_type = if content_type.is_empty() {
        "application/octet-stream"
    } else {
        content_type
    };
    format!("data:{};base64,{}", content_type, STANDARD.encode(bytes))
}

/// 解码 data URI，返回 (MIME 类型, 内容)
///
/// 只扫描第一个 `,` 之前的头部，内容部分直接交给 base64 解码。
pub fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let (header, data) = uri.strip_prefix("data:")?.split_once(',')?;
    let (params, is_base64) = match header.strip_suffix(";base64") {
        Some(params) => (params, true),
        None => (header, false),
    };
    let content_type = params.split_once(';').map_or(params, |(mime, _)| mime);

    let bytes = if is_base64 {
        STANDARD.decode(data).ok()?
    } else {
        data.as_bytes().to_vec()
    };

    Some((content_type.to_string(), bytes))
}
