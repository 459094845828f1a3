//! `udp://` — datagram variant of the socket transport (spec.md 4.6), with
//! the supplemented `"quit"` sentinel from `examples/original_source`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::buffer::buffer_for_context;
use crate::context::InterfaceContext;
use crate::error::{Result, SiobaError};

use super::{finish_construction, Interface, InterfaceCore};

const QUIT_SENTINEL: &[u8] = b"quit";

pub struct UdpInterface {
    core: InterfaceCore,
    socket: tokio::sync::OnceCell<Arc<UdpSocket>>,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl UdpInterface {
    fn new(ctx: InterfaceContext) -> Result<Self> {
        let buffer = buffer_for_context(&ctx)?;
        Ok(Self {
            core: InterfaceCore::new(ctx, buffer),
            socket: tokio::sync::OnceCell::new(),
            reader_task: std::sync::Mutex::new(None),
        })
    }
}

#[async_trait]
impl Interface for UdpInterface {
    fn core(&self) -> &InterfaceCore {
        &self.core
    }

    async fn start_interface(&self) -> Result<()> {
        let (host, port) = self.core().with_context(|c| (c.host.clone(), c.port));
        let host = host.ok_or_else(|| SiobaError::Transport("udp interface requires a host".into()))?;
        let port = port.ok_or_else(|| SiobaError::Transport("udp interface requires a port".into()))?;

        let local_addr = if host.parse::<std::net::Ipv6Addr>().is_ok() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(local_addr).await?;
        socket.connect((host.as_str(), port)).await?;
        let socket = Arc::new(socket);
        let _ = self.socket.set(socket.clone());

        let handle = self
            .core()
            .upgrade_self()
            .ok_or_else(|| SiobaError::Transport("interface handle not bound".into()))?;

        let task = tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match socket.recv(&mut buf).await {
                    Ok(n) => {
                        if &buf[..n] == QUIT_SENTINEL {
                            break;
                        }
                        if handle.send_to_frontend(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "udp read loop ending");
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
        Ok(())
    }

    async fn write_to_transport(&self, data: &[u8]) -> Result<()> {
        let socket = self.socket.get().ok_or(SiobaError::TerminalClosed)?;
        socket.send(data).await?;
        Ok(())
    }
}

pub fn factory(ctx: InterfaceContext) -> Result<Arc<dyn Interface>> {
    Ok(finish_construction(UdpInterface::new(ctx)?))
}
