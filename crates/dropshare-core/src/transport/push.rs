//! 推送通道客户端
//!
//! - [`PushConnection`]: 单次连接，适合一次性命令
//! - [`spawn_push_client`]: 后台任务，断线后按退避策略重连，
//!   把事件和连接状态通过 channel 交给会话
//!
//! 写入端由 [`PushSender`] 共享，重连后自动指向新的连接。

use crate::protocol::{ClientEvent, ServerEvent};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("push channel is not connected")]
    NotConnected,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// 推送通道写入端，可克隆
#[derive(Clone, Default)]
pub struct PushSender {
    sink: Arc<Mutex<Option<WsSink>>>,
}

impl PushSender {
    /// 未连接的写入端
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub async fn is_connected(&self) -> bool {
        self.sink.lock().await.is_some()
    }

    /// 发送事件，写入完成后返回
    pub async fn send(&self, event: &ClientEvent) -> Result<(), PushError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(PushError::NotConnected)?;
        let text = event.to_message().to_string();
        debug!("Push send: {} ({} bytes)", event.name(), text.len());
        sink.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn attach(&self, sink: WsSink) {
        *self.sink.lock().await = Some(sink);
    }

    async fn detach(&self) {
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
    }
}

async fn open(url: &str) -> Result<(WsSink, WsSource), PushError> {
    let (ws_stream, _) = connect_async(url).await?;
    Ok(ws_stream.split())
}

/// 读取下一个服务器事件
///
/// 无法识别的帧被记录后跳过，连接关闭时返回 `None`。
async fn next_server_event(source: &mut WsSource) -> Option<Result<ServerEvent, PushError>> {
    while let Some(msg) = source.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => return Some(Err(e.into())),
        };

        match ServerEvent::parse(&text) {
            Ok(event) => return Some(Ok(event)),
            Err(e) => warn!("Ignoring push frame: {}", e),
        }
    }
    None
}

/// 单次推送连接
pub struct PushConnection {
    sender: PushSender,
    source: WsSource,
}

impl PushConnection {
    pub async fn connect(url: &str) -> Result<Self, PushError> {
        info!("Connecting to push channel: {}", url);
        let (sink, source) = open(url).await?;
        let sender = PushSender::default();
        sender.attach(sink).await;
        Ok(Self { sender, source })
    }

    pub fn sender(&self) -> PushSender {
        self.sender.clone()
    }

    pub async fn send(&self, event: &ClientEvent) -> Result<(), PushError> {
        self.sender.send(event).await
    }

    pub async fn next_event(&mut self) -> Option<Result<ServerEvent, PushError>> {
        next_server_event(&mut self.source).await
    }

    pub async fn close(self) {
        self.sender.detach().await;
    }
}

/// 后台推送客户端的通知
#[derive(Debug, Clone, PartialEq)]
pub enum PushUpdate {
    Connected,
    Event(ServerEvent),
    Disconnected(String),
}

/// 重连退避策略
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    fn next_delay(&self, current: Duration) -> Duration {
        (current * 2).min(self.max_delay)
    }
}

/// 启动带自动重连的推送客户端
///
/// 接收端被丢弃后后台任务退出。
pub fn spawn_push_client(
    url: String,
    policy: ReconnectPolicy,
) -> (PushSender, mpsc::Receiver<PushUpdate>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(64);
    let sender = PushSender::default();
    let task_sender = sender.clone();

    let handle = tokio::spawn(async move {
        let mut delay = policy.initial_delay;
        let mut reported_down = false;

        loop {
            match open(&url).await {
                Ok((sink, mut source)) => {
                    info!("Push channel connected: {}", url);
                    task_sender.attach(sink).await;
                    delay = policy.initial_delay;
                    reported_down = false;
                    if tx.send(PushUpdate::Connected).await.is_err() {
                        break;
                    }

                    let reason = loop {
                        match next_server_event(&mut source).await {
                            Some(Ok(event)) => {
                                if tx.send(PushUpdate::Event(event)).await.is_err() {
                                    task_sender.detach().await;
                                    return;
                                }
                            }
                            Some(Err(e)) => break e.to_string(),
                            None => break "connection closed".to_string(),
                        }
                    };

                    task_sender.detach().await;
                    reported_down = true;
                    if tx.send(PushUpdate::Disconnected(reason)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Push connect failed: {}", e);
                    if !reported_down {
                        reported_down = true;
                        if tx.send(PushUpdate::Disconnected(e.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
            }

            if tx.is_closed() {
                break;
            }
            tokio::time::sleep(delay).await;
            delay = policy.next_delay(delay);
        }
    });

    (sender, rx, handle)
}
