//! `exec://` — spawns a child process on a pty pair (spec.md 4.6), grounded
//! on the teacher's `pty.rs::spawn_pty` dual-channel thread+mpsc bridge:
//! a blocking OS thread drives the pty's reader and the child's `wait()`,
//! forwarding both into the async dispatch loop over channels.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::task::JoinHandle;

use crate::buffer::buffer_for_context;
use crate::context::InterfaceContext;
use crate::error::{Result, SiobaError};

use super::{finish_construction, Interface, InterfaceCore};

pub struct PtyInterface {
    core: InterfaceCore,
    writer: std::sync::Mutex<Option<Box<dyn Write + Send>>>,
    master: std::sync::Mutex<Option<Box<dyn MasterPty + Send>>>,
    child: Arc<std::sync::Mutex<Option<Box<dyn Child + Send + Sync>>>>,
    reader_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PtyInterface {
    fn new(ctx: InterfaceContext) -> Result<Self> {
        let buffer = buffer_for_context(&ctx)?;
        Ok(Self {
            core: InterfaceCore::new(ctx, buffer),
            writer: std::sync::Mutex::new(None),
            master: std::sync::Mutex::new(None),
            child: Arc::new(std::sync::Mutex::new(None)),
            reader_task: std::sync::Mutex::new(None),
        })
    }
}

#[async_trait]
impl Interface for PtyInterface {
    fn core(&self) -> &InterfaceCore {
        &self.core
    }

    async fn start_interface(&self) -> Result<()> {
        let (path, args, rows, cols) = self.core().with_context(|c| {
            (
                c.path.clone().unwrap_or_else(|| "/bin/sh".to_string()),
                c.query.get("arg").cloned().unwrap_or_default(),
                c.rows.unwrap_or(crate::context::DEFAULT_ROWS),
                c.cols.unwrap_or(crate::context::DEFAULT_COLS),
            )
        });

        let pty_system = native_pty_system();
        let size = PtySize { rows, cols, pixel_width: 0, pixel_height: 0 };
        let pair = pty_system
            .openpty(size)
            .map_err(|e| SiobaError::Transport(e.into()))?;

        let mut cmd = CommandBuilder::new(path);
        for arg in args {
            cmd.arg(arg);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SiobaError::Transport(e.into()))?;
        drop(pair.slave);

        let writer = pair.master.take_writer().map_err(|e| SiobaError::Transport(e.into()))?;
        let mut reader = pair.master.try_clone_reader().map_err(|e| SiobaError::Transport(e.into()))?;

        *self.writer.lock().unwrap() = Some(writer);
        *self.master.lock().unwrap() = Some(pair.master);
        *self.child.lock().unwrap() = Some(child);

        let handle = self
            .core()
            .upgrade_self()
            .ok_or_else(|| SiobaError::Transport("interface handle not bound".into()))?;

        let (tx, mut rx) = tokio::sync::mpsc::channel::<Vec<u8>>(64);
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        let child_handle = self.child.clone();
        let exit_handle = handle.clone();
        // This thread carries no Tokio runtime context, so the exit-triggered
        // shutdown is handed to a captured runtime `Handle` rather than
        // `tokio::spawn`-ed directly.
        let rt = tokio::runtime::Handle::current();
        std::thread::spawn(move || loop {
            let status = {
                let mut guard = child_handle.lock().unwrap();
                guard.as_mut().and_then(|c| c.try_wait().ok().flatten())
            };
            if status.is_some() {
                let exit_handle = exit_handle.clone();
                rt.spawn(async move {
                    let _ = exit_handle.shutdown().await;
                });
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
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
        if let Some(mut child) = self.child.lock().unwrap().take() {
            let _ = child.kill();
        }
        self.writer.lock().unwrap().take();
        self.master.lock().unwrap().take();
        Ok(())
    }

    async fn write_to_transport(&self, data: &[u8]) -> Result<()> {
        let data = data.to_vec();
        let writer_mutex = &self.writer;
        // `Write` is synchronous; portable-pty's writer has no async counterpart.
        let result: Result<()> = {
            let mut guard = writer_mutex.lock().unwrap();
            let writer = guard.as_mut().ok_or(SiobaError::TerminalClosed)?;
            writer.write_all(&data).map_err(SiobaError::Io)?;
            writer.flush().map_err(SiobaError::Io)?;
            Ok(())
        };
        result
    }

    async fn set_terminal_size(&self, rows: u16, cols: u16) {
        if let Some(master) = self.master.lock().unwrap().as_ref() {
            let _ = master.resize(PtySize { rows, cols, pixel_width: 0, pixel_height: 0 });
        }
        self.core().reshape_buffer(rows, cols);
        self.core().update_context(|c| {
            c.rows = Some(rows);
            c.cols = Some(cols);
        });
    }
}

pub fn factory(ctx: InterfaceContext) -> Result<Arc<dyn Interface>> {
    Ok(finish_construction(PtyInterface::new(ctx)?))
}
