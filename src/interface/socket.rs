//! `tcp://` and `ssl://` — stream-socket transports (spec.md 4.6).
//!
//! TLS setup follows the teacher's `config.rs::ensure_rustls_provider`
//! one-time crypto-provider install.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Once};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::buffer::buffer_for_context;
use crate::context::InterfaceContext;
use crate::error::{Result, SiobaError};

use super::{finish_construction, Interface, InterfaceCore};

static RUSTLS_PROVIDER_INIT: Once = Once::new();

fn ensure_rustls_provider() {
    RUSTLS_PROVIDER_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Either a plain TCP stream or a TLS stream over one, unified behind
/// `AsyncRead`/`AsyncWrite` so the rest of the transport doesn't care which.
enum Stream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl AsyncRead for Stream {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_flush(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Stream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Stream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

pub struct SocketInterface {
    core: InterfaceCore,
    secure: bool,
    writer: AsyncMutex<Option<WriteHalf<Stream>>>,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    local_echo: bool,
}

impl SocketInterface {
    fn new(ctx: InterfaceContext, secure: bool) -> Result<Self> {
        let buffer = buffer_for_context(&ctx)?;
        let local_echo = ctx.local_echo.unwrap_or(false);
        Ok(Self {
            core: InterfaceCore::new(ctx, buffer),
            secure,
            writer: AsyncMutex::new(None),
            reader_task: std::sync::Mutex::new(None),
            local_echo,
        })
    }

    async fn connect(&self) -> Result<Stream> {
        let (host, port) = self.core().with_context(|c| (c.host.clone(), c.port));
        let host = host.ok_or_else(|| SiobaError::Transport("socket interface requires a host".into()))?;
        let port = port.ok_or_else(|| SiobaError::Transport("socket interface requires a port".into()))?;
        let tcp = TcpStream::connect((host.as_str(), port)).await?;

        if !self.secure {
            return Ok(Stream::Plain(tcp));
        }

        ensure_rustls_provider();
        let root_store = {
            let mut store = rustls::RootCertStore::empty();
            for cert in rustls_native_certs::load_native_certs().certs {
                let _ = store.add(cert);
            }
            store
        };
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let connector = tokio_rustls::TlsConnector::from(Arc::new(config));
        let server_name = rustls::pki_types::ServerName::try_from(host.clone())
            .map_err(|e| SiobaError::SslVerifyFailed(e.to_string()))?;
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| SiobaError::SslVerifyFailed(e.to_string()))?;
        Ok(Stream::Tls(Box::new(tls)))
    }
}

#[async_trait]
impl Interface for SocketInterface {
    fn core(&self) -> &InterfaceCore {
        &self.core
    }

    async fn start_interface(&self) -> Result<()> {
        let stream = self.connect().await?;
        let (mut read_half, write_half) = tokio::io::split(stream);
        *self.writer.lock().await = Some(write_half);

        let handle = self
            .core()
            .upgrade_self()
            .ok_or_else(|| SiobaError::Transport("interface handle not bound".into()))?;
        // `shutdown_interface` aborts this task outright, so any error seen
        // here is a genuine peer reset, not a cooperative cancellation.
        let task = tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match tokio::io::AsyncReadExt::read(&mut read_half, &mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if handle.send_to_frontend(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "socket read loop ending");
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
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        Ok(())
    }

    async fn write_to_transport(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SiobaError::TerminalClosed)?;
        writer.write_all(data).await?;
        drop(guard);
        if self.local_echo {
            self.send_to_frontend(Bytes::copy_from_slice(data)).await?;
        }
        Ok(())
    }
}

pub fn tcp_factory(ctx: InterfaceContext) -> Result<Arc<dyn Interface>> {
    Ok(finish_construction(SocketInterface::new(ctx, false)?))
}

pub fn ssl_factory(ctx: InterfaceContext) -> Result<Arc<dyn Interface>> {
    Ok(finish_construction(SocketInterface::new(ctx, true)?))
}
