//! `function://` — wraps a blocking user routine `f(handle)` running on a
//! dedicated worker thread, bridged to the async dispatch loop by a pair of
//! channels (spec.md 4.5). Not URI-constructible — the routine is a Rust
//! closure, not something a URI can carry — so unlike the other transports
//! this has no entry in the scheme registry; callers use
//! [`FunctionInterface::new`] directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;

use crate::buffer::buffer_for_context;
use crate::context::InterfaceContext;
use crate::error::{Result, SiobaError};

use super::{finish_construction, Interface, InterfaceCore, InterfaceState};

/// The Function endpoint's input-handling policy, set by the worker and
/// consumed by `receive_from_frontend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Drop bytes; Ctrl-C still shuts down.
    Discard,
    /// Echo bytes back, translating CR to CRLF; Ctrl-C still shuts down.
    Echo,
    /// Line-edited input, echoed.
    Input,
    /// Line-edited input, not echoed (password capture).
    Getpass,
}

/// Handle given to the user routine; every method blocks the calling
/// (worker) thread, never touches `Interface` state directly.
pub struct FunctionHandle {
    queue_tx: SyncSender<Vec<u8>>,
    input_rx: Receiver<String>,
    capture_mode: Arc<Mutex<CaptureMode>>,
    shutdown_flag: Arc<AtomicBool>,
}

impl FunctionHandle {
    pub fn print(&self, text: &str) -> Result<()> {
        self.check_alive()?;
        let formatted = text.replace('\n', "\r\n");
        self.queue_tx
            .send(formatted.into_bytes())
            .map_err(|_| SiobaError::InterfaceShutdown)
    }

    pub fn input(&self, prompt: &str) -> Result<String> {
        self.capture(prompt, CaptureMode::Input)
    }

    pub fn getpass(&self, prompt: &str) -> Result<String> {
        self.capture(prompt, CaptureMode::Getpass)
    }

    fn capture(&self, prompt: &str, mode: CaptureMode) -> Result<String> {
        self.check_alive()?;
        *self.capture_mode.lock().unwrap() = mode;
        self.queue_tx
            .send(prompt.as_bytes().to_vec())
            .map_err(|_| SiobaError::InterfaceShutdown)?;
        // A Ctrl-C during capture delivers "" here (see `receive_from_frontend`)
        // rather than failing the call; the interface shuts down separately.
        let line = self.input_rx.recv().map_err(|_| SiobaError::InterfaceShutdown)?;
        *self.capture_mode.lock().unwrap() = CaptureMode::Discard;
        Ok(line)
    }

    fn check_alive(&self) -> Result<()> {
        if self.shutdown_flag.load(Ordering::SeqCst) {
            Err(SiobaError::InterfaceShutdown)
        } else {
            Ok(())
        }
    }
}

type UserFn = dyn FnOnce(FunctionHandle) -> Result<()> + Send;

pub struct FunctionInterface {
    core: InterfaceCore,
    capture_mode: Arc<Mutex<CaptureMode>>,
    line_acc: Mutex<Vec<u8>>,
    input_tx: Mutex<Option<SyncSender<String>>>,
    shutdown_flag: Arc<AtomicBool>,
    user_fn: Mutex<Option<Box<UserFn>>>,
    drain_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl FunctionInterface {
    pub fn new(ctx: InterfaceContext, user_fn: impl FnOnce(FunctionHandle) -> Result<()> + Send + 'static) -> Result<Arc<dyn Interface>> {
        let buffer = buffer_for_context(&ctx)?;
        let iface = Self {
            core: InterfaceCore::new(ctx, buffer),
            capture_mode: Arc::new(Mutex::new(CaptureMode::Discard)),
            line_acc: Mutex::new(Vec::new()),
            input_tx: Mutex::new(None),
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            user_fn: Mutex::new(Some(Box::new(user_fn))),
            drain_task: Mutex::new(None),
        };
        Ok(finish_construction(iface))
    }

    async fn handle_line_edit(&self, byte: u8, echo: bool) -> Result<()> {
        match byte {
            b'\r' | b'\n' => {
                let line = {
                    let mut acc = self.line_acc.lock().unwrap();
                    String::from_utf8_lossy(&std::mem::take(&mut *acc)).into_owned()
                };
                if echo {
                    self.send_to_frontend(Bytes::from_static(b"\r\n")).await?;
                }
                if let Some(tx) = self.input_tx.lock().unwrap().as_ref() {
                    let _ = tx.send(line);
                }
            }
            0x7f | 0x08 => {
                let had = self.line_acc.lock().unwrap().pop().is_some();
                if had && echo {
                    self.send_to_frontend(Bytes::from_static(b"\x08 \x08")).await?;
                }
            }
            b if (0x20..0x7f).contains(&b) => {
                self.line_acc.lock().unwrap().push(b);
                if echo {
                    self.send_to_frontend(Bytes::copy_from_slice(&[b])).await?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Interface for FunctionInterface {
    fn core(&self) -> &InterfaceCore {
        &self.core
    }

    async fn start_interface(&self) -> Result<()> {
        let handle = self
            .core()
            .upgrade_self()
            .ok_or_else(|| SiobaError::Transport("interface handle not bound".into()))?;

        let (queue_tx, queue_rx) = std::sync::mpsc::sync_channel::<Vec<u8>>(64);
        let (input_tx, input_rx) = std::sync::mpsc::sync_channel::<String>(1);
        *self.input_tx.lock().unwrap() = Some(input_tx);

        let (atx, mut arx) = tokio::sync::mpsc::channel::<Vec<u8>>(64);
        std::thread::spawn(move || {
            while let Ok(chunk) = queue_rx.recv() {
                if atx.blocking_send(chunk).is_err() {
                    break;
                }
            }
        });

        let drain_handle = handle.clone();
        let drain_task = tokio::spawn(async move {
            while let Some(chunk) = arx.recv().await {
                if drain_handle.send_to_frontend(Bytes::from(chunk)).await.is_err() {
                    break;
                }
            }
        });
        *self.drain_task.lock().unwrap() = Some(drain_task);

        let user_fn = self.user_fn.lock().unwrap().take();
        let capture_mode = self.capture_mode.clone();
        let shutdown_flag = self.shutdown_flag.clone();
        let exit_handle = handle.clone();
        // The worker runs on a plain OS thread with no Tokio runtime context
        // of its own, so the final shutdown must be handed to a captured
        // runtime `Handle` rather than `tokio::spawn`-ed directly.
        let rt = tokio::runtime::Handle::current();

        std::thread::spawn(move || {
            if let Some(f) = user_fn {
                let worker_handle = FunctionHandle { queue_tx, input_rx, capture_mode, shutdown_flag };
                let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(worker_handle)));
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(SiobaError::InterfaceShutdown)) => {}
                    Ok(Err(err)) => tracing::warn!(error = %err, "function worker returned an error"),
                    Err(_) => tracing::error!("function worker panicked"),
                }
            }
            rt.spawn(async move {
                let _ = exit_handle.shutdown().await;
            });
        });

        Ok(())
    }

    async fn shutdown_interface(&self) -> Result<()> {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        // Dropping the sender unblocks any worker blocked in `input()`/`getpass()`.
        self.input_tx.lock().unwrap().take();
        if let Some(task) = self.drain_task.lock().unwrap().take() {
            task.abort();
        }
        Ok(())
    }

    async fn write_to_transport(&self, _data: &[u8]) -> Result<()> {
        // Function endpoints have no outbound transport; all frontend-facing
        // bytes are produced by the worker via `FunctionHandle::print`.
        Ok(())
    }

    async fn receive_from_frontend(&self, data: Bytes) -> Result<()> {
        match self.core().state() {
            InterfaceState::Initialized => return Err(SiobaError::NotStarted),
            InterfaceState::Shutdown => return Err(SiobaError::TerminalClosed),
            InterfaceState::Started => {}
        }
        let mode = *self.capture_mode.lock().unwrap();
        for &byte in data.iter() {
            if byte == 0x03 {
                if let Some(tx) = self.input_tx.lock().unwrap().as_ref() {
                    let _ = tx.send(String::new());
                }
                self.shutdown_flag.store(true, Ordering::SeqCst);
                self.core().schedule_shutdown();
                continue;
            }
            match mode {
                CaptureMode::Discard => {}
                CaptureMode::Echo => {
                    let echoed: Vec<u8> = if byte == b'\r' { vec![b'\r', b'\n'] } else { vec![byte] };
                    self.send_to_frontend(Bytes::from(echoed)).await?;
                }
                CaptureMode::Input => self.handle_line_edit(byte, true).await?,
                CaptureMode::Getpass => self.handle_line_edit(byte, false).await?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn print_then_input_round_trips_through_the_buffer() {
        let iface = FunctionInterface::new(InterfaceContext::default(), |h| {
            h.print("Hello, World!")?;
            let name = h.input("name? ")?;
            h.print(&format!("Hello, {name}!"))?;
            Ok(())
        })
        .unwrap();
        iface.start().await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        iface.receive_from_frontend(Bytes::from_static(b"Mochi\r\n")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let dumped = String::from_utf8_lossy(&iface.get_terminal_buffer()).into_owned();
        assert!(dumped.contains("Hello, World!"));
        assert!(dumped.contains("Hello, Mochi!"));
        assert_eq!(dumped.matches("Mochi").count(), 2);
    }
}
