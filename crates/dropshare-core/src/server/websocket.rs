//! 推送通道服务端
//!
//! 连接建立后先发送 `files_list` 快照；之后转发广播事件，
//! 并处理客户端的 `upload_file` 与 `delete_file`。
//! `error` 只发给发起请求的客户端。

use super::AppState;
use super::store::{NewFile, StoreError};
use crate::protocol::{ClientEvent, ProtocolError, ServerEvent, UploadPayload, decode_data_uri};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    // data URI 比原始内容大约三分之一
    let limit = usize::try_from(state.settings.max_body_size.saturating_mul(2)).unwrap_or(usize::MAX);
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    sink.send(Message::Text(event.to_message().to_string())).await
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sink, mut receiver) = socket.split();
    // 先订阅再发送快照，避免漏掉中间的事件
    let events = state.events.subscribe();
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();

    info!("Client connected");
    // 写入在独立任务中进行，客户端不读取时也能继续处理它的上传
    let mut writer = tokio::spawn(write_loop(sink, events, reply_rx, state.clone()));

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_client_message(&state, &text).await {
                        if reply_tx.send(reply).is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket read error: {}", e);
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    writer.abort();
    info!("Client disconnected");
}

/// 发送快照，然后转发广播事件和只发给该客户端的回复
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut events: broadcast::Receiver<ServerEvent>,
    mut replies: mpsc::UnboundedReceiver<ServerEvent>,
    state: Arc<AppState>,
) {
    let snapshot = ServerEvent::FilesList(state.store.list().await);
    if send_event(&mut sink, &snapshot).await.is_err() {
        return;
    }

    loop {
        let event = tokio::select! {
            event = events.recv() => match event {
                Ok(event) => event,
                Err(RecvError::Lagged(missed)) => {
                    warn!("Client lagged by {} events, resending snapshot", missed);
                    ServerEvent::FilesList(state.store.list().await)
                }
                Err(RecvError::Closed) => break,
            },
            reply = replies.recv() => match reply {
                Some(reply) => reply,
                None => break,
            },
        };
        if send_event(&mut sink, &event).await.is_err() {
            break;
        }
    }

    let _ = sink.close().await;
}

/// 处理客户端消息，返回只发给该客户端的回复
pub async fn handle_client_message(state: &AppState, text: &str) -> Option<ServerEvent> {
    let event = match ClientEvent::parse(text) {
        Ok(event) => event,
        Err(ProtocolError::UnknownEvent(name)) => {
            debug!("Ignoring unknown event {}", name);
            return None;
        }
        Err(e) => {
            warn!("Invalid client message: {}", e);
            return Some(ServerEvent::Error(format!("invalid message: {e}")));
        }
    };

    match event {
        ClientEvent::UploadFile(payload) => upload_inline(state, payload).await,
        ClientEvent::DeleteFile(id) => match state.store.remove(&id).await {
            Ok(_) => {
                state.broadcast(ServerEvent::FileDeleted(id));
                None
            }
            Err(StoreError::NotFound(_)) => {
                info!("Delete requested for unknown file {}", id);
                Some(ServerEvent::Error("file not found for deletion".to_string()))
            }
            Err(e) => Some(ServerEvent::Error(e.to_string())),
        },
    }
}

async fn upload_inline(state: &AppState, payload: UploadPayload) -> Option<ServerEvent> {
    let relative_path = payload.effective_path().to_string();
    let Some((content_type, bytes)) = decode_data_uri(&payload.file_content) else {
        warn!("Undecodable content for {}", relative_path);
        return Some(ServerEvent::Error(format!(
            "error processing file {}",
            payload.file_name
        )));
    };
    if bytes.len() as u64 > state.settings.max_body_size {
        return Some(ServerEvent::Error(format!(
            "{} exceeds the upload limit",
            payload.file_name
        )));
    }

    let new_file = NewFile {
        file_name: payload.file_name,
        relative_path,
        uploaded_by: payload.uploaded_by,
        timestamp: payload.timestamp,
        content_type,
        bytes,
    };

    match state.store.insert(new_file).await {
        Ok(record) => {
            state.broadcast(ServerEvent::FileUpdated(record));
            None
        }
        Err(e) => Some(ServerEvent::Error(e.to_string())),
    }
}
