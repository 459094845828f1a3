//! `ws://` / `wss://` — each WebSocket message (binary or text) is forwarded
//! to `send_to_frontend` as a byte chunk; `receive_from_frontend` replies
//! with a message of the same type it last saw (spec.md 4.6).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::buffer::buffer_for_context;
use crate::context::InterfaceContext;
use crate::error::{Result, SiobaError};

use super::{finish_construction, Interface, InterfaceCore};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct WebSocketInterface {
    core: InterfaceCore,
    sink: AsyncMutex<Option<futures_util::stream::SplitSink<WsStream, Message>>>,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    last_was_text: Arc<AtomicBool>,
}

impl WebSocketInterface {
    fn new(ctx: InterfaceContext) -> Result<Self> {
        let buffer = buffer_for_context(&ctx)?;
        Ok(Self {
            core: InterfaceCore::new(ctx, buffer),
            sink: AsyncMutex::new(None),
            reader_task: std::sync::Mutex::new(None),
            last_was_text: Arc::new(AtomicBool::new(false)),
        })
    }
}

#[async_trait]
impl Interface for WebSocketInterface {
    fn core(&self) -> &InterfaceCore {
        &self.core
    }

    async fn start_interface(&self) -> Result<()> {
        let uri = self.core().with_context(|c| c.uri.clone()).ok_or_else(|| {
            SiobaError::Transport("websocket interface requires a uri".into())
        })?;

        let (ws, _response) = tokio_tungstenite::connect_async(uri)
            .await
            .map_err(|e| SiobaError::Transport(Box::new(e)))?;
        let (sink, mut stream) = ws.split();
        *self.sink.lock().await = Some(sink);

        let handle = self
            .core()
            .upgrade_self()
            .ok_or_else(|| SiobaError::Transport("interface handle not bound".into()))?;
        let last_was_text = self.last_was_text.clone();

        let task = tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        last_was_text.store(false, Ordering::SeqCst);
                        if handle.send_to_frontend(Bytes::from(data)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Text(text)) => {
                        last_was_text.store(true, Ordering::SeqCst);
                        if handle.send_to_frontend(Bytes::from(text.into_bytes())).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        tracing::debug!(error = %err, "websocket read loop ending");
                        break;
                    }
                }
            }
            let _ = handle.shutdown().await;
        });
        *self.reader_task.lock().unwrap() = Some(task);
        Ok(())
    }

    async fn shutdown_interface(&self) -> Result<()> {
        if let Some(task) = self.reader_task.lock().unwrap().take() {
            task.abort();
        }
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        Ok(())
    }

    async fn write_to_transport(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(SiobaError::TerminalClosed)?;
        let message = if self.last_was_text.load(Ordering::SeqCst) {
            Message::Text(String::from_utf8_lossy(data).into_owned().into())
        } else {
            Message::Binary(data.to_vec().into())
        };
        sink.send(message).await.map_err(|e| SiobaError::Transport(Box::new(e)))?;
        Ok(())
    }
}

pub fn factory(ctx: InterfaceContext) -> Result<Arc<dyn Interface>> {
    Ok(finish_construction(WebSocketInterface::new(ctx)?))
}
