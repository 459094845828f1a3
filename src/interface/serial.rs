//! `serial://` and the supplemented `serial+loop://` loopback (spec.md 4.6,
//! §11) — a worker-thread + channel bridge around the synchronous
//! `serialport` crate, mirroring the teacher's `pty.rs` thread+mpsc shape.

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::buffer::buffer_for_context;
use crate::context::InterfaceContext;
use crate::error::{Result, SiobaError};

use super::{finish_construction, Interface, InterfaceCore};

enum Port {
    Real(Box<dyn serialport::SerialPort>),
    Loopback(LoopbackPort),
}

/// In-process loopback used by `serial+loop://` (no hardware involved):
/// bytes written come back out as bytes read.
struct LoopbackPort {
    buf: std::collections::VecDeque<u8>,
}

impl Read for Port {
    fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Port::Real(p) => p.read(out),
            Port::Loopback(lb) => {
                let mut n = 0;
                while n < out.len() {
                    match lb.buf.pop_front() {
                        Some(b) => {
                            out[n] = b;
                            n += 1;
                        }
                        None => break,
                    }
                }
                if n == 0 {
                    std::thread::sleep(Duration::from_millis(10));
                    return Err(std::io::ErrorKind::WouldBlock.into());
                }
                Ok(n)
            }
        }
    }
}

impl Write for Port {
    fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
        match self {
            Port::Real(p) => p.write(data),
            Port::Loopback(lb) => {
                lb.buf.extend(data.iter().copied());
                Ok(data.len())
            }
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Port::Real(p) => p.flush(),
            Port::Loopback(_) => Ok(()),
        }
    }
}

pub struct SerialInterface {
    core: InterfaceCore,
    writer: Arc<std::sync::Mutex<Option<Port>>>,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    loopback: bool,
}

impl SerialInterface {
    fn new(ctx: InterfaceContext, loopback: bool) -> Result<Self> {
        let buffer = buffer_for_context(&ctx)?;
        Ok(Self {
            core: InterfaceCore::new(ctx, buffer),
            writer: Arc::new(std::sync::Mutex::new(None)),
            reader_task: std::sync::Mutex::new(None),
            loopback,
        })
    }
}

#[async_trait]
impl Interface for SerialInterface {
    fn core(&self) -> &InterfaceCore {
        &self.core
    }

    async fn start_interface(&self) -> Result<()> {
        let (path, baud) = self.core().with_context(|c| {
            let baud = c
                .get("baudrate")
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(9600);
            (c.path.clone().unwrap_or_default(), baud)
        });

        let port = if self.loopback {
            Port::Loopback(LoopbackPort { buf: std::collections::VecDeque::new() })
        } else {
            let device = path.trim_start_matches('/').to_string();
            let built = serialport::new(device, baud)
                .timeout(Duration::from_millis(100))
                .open()
                .map_err(|e| SiobaError::Transport(Box::new(e)))?;
            Port::Real(built)
        };

        *self.writer.lock().unwrap() = Some(port);
        // Writer and the blocking reader thread take turns under one lock;
        // serial ports are duplex but `serialport`'s handle isn't cloneable.
        let shared = self.writer.clone();

        let handle = self
            .core()
            .upgrade_self()
            .ok_or_else(|| SiobaError::Transport("interface handle not bound".into()))?;

        let (tx, mut rx) = tokio::sync::mpsc::channel::<Vec<u8>>(64);
        std::thread::spawn(move || loop {
            let mut buf = [0u8; 1024];
            let read = {
                let mut guard = shared.lock().unwrap();
                match guard.as_mut() {
                    Some(port) => port.read(&mut buf),
                    None => return,
                }
            };
            match read {
                Ok(0) => {}
                Ok(n) => {
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        return;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(_) => return,
            }
        });

        let task = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                if handle.send_to_frontend(Bytes::from(chunk)).await.is_err() {
                    break;
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
        self.writer.lock().unwrap().take();
        Ok(())
    }

    async fn write_to_transport(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().unwrap();
        let port = guard.as_mut().ok_or(SiobaError::TerminalClosed)?;
        port.write_all(data).map_err(SiobaError::Io)
    }
}

pub fn factory(ctx: InterfaceContext) -> Result<Arc<dyn Interface>> {
    Ok(finish_construction(SerialInterface::new(ctx, false)?))
}

pub fn loopback_factory(ctx: InterfaceContext) -> Result<Arc<dyn Interface>> {
    Ok(finish_construction(SerialInterface::new(ctx, true)?))
}
