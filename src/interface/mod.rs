//! Interface abstraction and lifecycle engine (spec component #4).
//!
//! `InterfaceCore` holds the engine state shared by every transport
//! (lifecycle state machine, callback fan-out lists, client metadata,
//! reference counting, the owned buffer). Concrete transports embed an
//! `InterfaceCore` by composition — mirroring the teacher's
//! `SessionContext` struct-of-resources shape rather than inheritance —
//! and implement the [`Interface`] trait, overriding only the
//! transport-specific hooks (`start_interface`, `shutdown_interface`,
//! `write_to_transport`).

pub mod echo;
pub mod function;
pub mod pty;
pub mod socket;
pub mod udp;
pub mod websocket;

#[cfg(unix)]
pub mod serial;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, RwLock, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use uuid::Uuid;

use crate::buffer::Buffer;
use crate::context::InterfaceContext;
use crate::error::{Result, SiobaError};

/// A boxed future, the shape `async_trait` and our callback types need to
/// stay dyn-compatible.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type ByteCallback = Arc<dyn Fn(Bytes) -> BoxFuture<'static, ()> + Send + Sync>;
pub type ShutdownCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;
pub type TitleCallback = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

/// Factory registered per URI scheme; see [`crate::registry::register_scheme`].
pub type InterfaceFactory = fn(InterfaceContext) -> Result<Arc<dyn Interface>>;

/// `INITIALIZED -> STARTED -> SHUTDOWN`, monotonic, no other transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceState {
    Initialized,
    Started,
    Shutdown,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClientMetadata {
    pub rows: Option<u16>,
    pub cols: Option<u16>,
}

/// Shared lifecycle engine embedded by every concrete transport.
pub struct InterfaceCore {
    id: Uuid,
    state: RwLock<InterfaceState>,
    context: RwLock<InterfaceContext>,
    buffer: std::sync::Mutex<Box<dyn Buffer>>,

    on_receive_from_frontend: RwLock<Vec<ByteCallback>>,
    on_send_to_frontend: RwLock<Vec<ByteCallback>>,
    on_shutdown: RwLock<Vec<ShutdownCallback>>,
    on_set_terminal_title: RwLock<Vec<TitleCallback>>,

    client_metadata: DashMap<String, ClientMetadata>,
    ref_count: AtomicUsize,
    auto_shutdown: AtomicBool,

    self_handle: OnceLock<Weak<dyn Interface>>,

    // Captured at construction so `schedule_shutdown`/`reference_decrement`
    // can hand work to the runtime even when called from a caller's own
    // thread (e.g. a transport's blocking reader/worker thread), which
    // carries no Tokio runtime context of its own.
    runtime: Option<tokio::runtime::Handle>,

    // Serialize the callback fan-out for each event so a suspending
    // callback can't interleave with another dispatch of the same event.
    send_lock: tokio::sync::Mutex<()>,
    receive_lock: tokio::sync::Mutex<()>,
}

impl InterfaceCore {
    pub fn new(context: InterfaceContext, buffer: Box<dyn Buffer>) -> Self {
        let auto_shutdown = context.auto_shutdown.unwrap_or(true);
        Self {
            id: Uuid::new_v4(),
            state: RwLock::new(InterfaceState::Initialized),
            context: RwLock::new(context),
            buffer: std::sync::Mutex::new(buffer),
            on_receive_from_frontend: RwLock::new(Vec::new()),
            on_send_to_frontend: RwLock::new(Vec::new()),
            on_shutdown: RwLock::new(Vec::new()),
            on_set_terminal_title: RwLock::new(Vec::new()),
            client_metadata: DashMap::new(),
            ref_count: AtomicUsize::new(0),
            auto_shutdown: AtomicBool::new(auto_shutdown),
            self_handle: OnceLock::new(),
            runtime: tokio::runtime::Handle::try_current().ok(),
            send_lock: tokio::sync::Mutex::new(()),
            receive_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Must be called once, immediately after the owning `Arc<dyn Interface>`
    /// is constructed, so reference-count-to-zero shutdown can schedule
    /// itself onto the dispatch loop (spec.md 4.4, 9 "reference counting").
    pub fn bind_self_handle(&self, handle: Weak<dyn Interface>) {
        let _ = self.self_handle.set(handle);
    }

    /// Upgrade the bound self-handle, if any. Used by transports to get an
    /// owned `Arc<dyn Interface>` to move into spawned tasks/threads.
    pub fn upgrade_self(&self) -> Option<Arc<dyn Interface>> {
        self.self_handle.get().and_then(|w| w.upgrade())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> InterfaceState {
        *self.state.read().unwrap()
    }

    fn set_state(&self, state: InterfaceState) {
        *self.state.write().unwrap() = state;
    }

    pub fn context_snapshot(&self) -> InterfaceContext {
        self.context.read().unwrap().clone()
    }

    pub fn with_context<T>(&self, f: impl FnOnce(&InterfaceContext) -> T) -> T {
        f(&self.context.read().unwrap())
    }

    pub fn update_context(&self, f: impl FnOnce(&mut InterfaceContext)) {
        f(&mut self.context.write().unwrap());
    }

    pub fn register_receive_from_frontend(&self, cb: ByteCallback) {
        self.on_receive_from_frontend.write().unwrap().push(cb);
    }

    pub fn register_send_to_frontend(&self, cb: ByteCallback) {
        self.on_send_to_frontend.write().unwrap().push(cb);
    }

    pub fn register_shutdown(&self, cb: ShutdownCallback) {
        self.on_shutdown.write().unwrap().push(cb);
    }

    pub fn register_set_terminal_title(&self, cb: TitleCallback) {
        self.on_set_terminal_title.write().unwrap().push(cb);
    }

    /// Feed `data` to the buffer, publish the resulting cursor position onto
    /// the context, and return an OSC title update if one was parsed.
    pub fn feed_buffer(&self, data: &[u8]) -> Option<String> {
        let (row, col, title) = {
            let mut buf = self.buffer.lock().unwrap();
            buf.feed(data);
            let (row, col) = buf.cursor_position();
            (row, col, buf.take_title_update())
        };
        let mut ctx = self.context.write().unwrap();
        ctx.cursor_row = Some(row);
        ctx.cursor_col = Some(col);
        title
    }

    pub fn dump_screen_state(&self) -> Vec<u8> {
        self.buffer.lock().unwrap().dump_screen_state()
    }

    pub fn cursor_position(&self) -> (u32, u32) {
        self.buffer.lock().unwrap().cursor_position()
    }

    pub fn reshape_buffer(&self, rows: u16, cols: u16) {
        self.buffer.lock().unwrap().reshape(rows, cols);
    }

    /// Record `client_id`'s declared size and return the aggregate
    /// (minimum across all known clients), if any client has reported one.
    pub fn record_client_metadata(&self, client_id: &str, rows: Option<u16>, cols: Option<u16>) -> (Option<u16>, Option<u16>) {
        self.client_metadata.insert(client_id.to_string(), ClientMetadata { rows, cols });
        let min_rows = self.client_metadata.iter().filter_map(|e| e.value().rows).min();
        let min_cols = self.client_metadata.iter().filter_map(|e| e.value().cols).min();
        (min_rows, min_cols)
    }

    pub fn reference_increment(&self) {
        self.ref_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns `true` if this decrement reached zero and auto-shutdown is
    /// armed — the caller schedules the actual shutdown on the dispatch loop.
    pub fn reference_decrement(&self) -> bool {
        let prev = self.ref_count.fetch_sub(1, Ordering::SeqCst);
        prev == 1 && self.auto_shutdown.load(Ordering::SeqCst)
    }

    pub fn set_auto_shutdown(&self, value: bool) {
        self.auto_shutdown.store(value, Ordering::SeqCst);
    }

    /// Spawn `self.shutdown()` onto the dispatch loop rather than running it
    /// inline from (possibly) a callback's own call stack.
    pub fn schedule_shutdown(&self) {
        let Some(iface) = self.upgrade_self() else { return };
        let Some(rt) = self.runtime.as_ref() else {
            tracing::warn!("schedule_shutdown called with no bound runtime handle; dropping");
            return;
        };
        rt.spawn(async move {
            if let Err(err) = iface.shutdown().await {
                tracing::warn!(error = %err, "scheduled shutdown failed");
            }
        });
    }
}

fn normalize_eol(data: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        if b == b'\n' && out.last() != Some(&b'\r') {
            out.push(b'\r');
        }
        out.push(b);
    }
    Bytes::from(out)
}

/// A bidirectional byte-stream endpoint: echo, tcp, ssl, udp, exec, ws,
/// serial, or function (spec.md §4.6, §4.5).
#[async_trait]
pub trait Interface: Send + Sync {
    /// Access to the shared lifecycle engine.
    fn core(&self) -> &InterfaceCore;

    /// Transport-specific startup, invoked once by `start()`.
    async fn start_interface(&self) -> Result<()>;
    /// Transport-specific teardown, invoked once by `shutdown()`.
    async fn shutdown_interface(&self) -> Result<()>;
    /// Transport-specific write, invoked by the default `receive_from_frontend`
    /// after external callbacks have run.
    async fn write_to_transport(&self, data: &[u8]) -> Result<()>;

    fn id(&self) -> Uuid {
        self.core().id()
    }

    fn state(&self) -> InterfaceState {
        self.core().state()
    }

    fn context(&self) -> InterfaceContext {
        self.core().context_snapshot()
    }

    async fn start(&self) -> Result<()> {
        if self.core().state() != InterfaceState::Initialized {
            return Ok(());
        }
        self.start_interface().await?;
        self.core().set_state(InterfaceState::Started);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if self.core().state() != InterfaceState::Started {
            return Ok(());
        }
        self.shutdown_interface().await?;
        self.core().set_state(InterfaceState::Shutdown);
        let callbacks = self.core().on_shutdown.read().unwrap().clone();
        for cb in callbacks {
            cb().await;
        }
        Ok(())
    }

    async fn send_to_frontend(&self, data: Bytes) -> Result<()> {
        match self.core().state() {
            InterfaceState::Initialized => return Err(SiobaError::NotStarted),
            InterfaceState::Shutdown => return Err(SiobaError::TerminalClosed),
            InterfaceState::Started => {}
        }
        if data.is_empty() {
            return Ok(());
        }
        let _guard = self.core().send_lock.lock().await;

        let convert_eol = self.core().with_context(|c| c.convert_eol.unwrap_or(false));
        let data = if convert_eol { normalize_eol(&data) } else { data };

        if let Some(title) = self.core().feed_buffer(&data) {
            self.core().update_context(|c| c.title = Some(title.clone()));
            let title_callbacks = self.core().on_set_terminal_title.read().unwrap().clone();
            for cb in title_callbacks {
                cb(title.clone()).await;
            }
        }

        let callbacks = self.core().on_send_to_frontend.read().unwrap().clone();
        for cb in callbacks {
            cb(data.clone()).await;
        }
        Ok(())
    }

    async fn receive_from_frontend(&self, data: Bytes) -> Result<()> {
        match self.core().state() {
            InterfaceState::Initialized => return Err(SiobaError::NotStarted),
            InterfaceState::Shutdown => return Err(SiobaError::TerminalClosed),
            InterfaceState::Started => {}
        }
        let _guard = self.core().receive_lock.lock().await;

        let callbacks = self.core().on_receive_from_frontend.read().unwrap().clone();
        for cb in callbacks {
            cb(data.clone()).await;
        }
        self.write_to_transport(&data).await
    }

    async fn set_terminal_title(&self, title: &str) {
        self.core().update_context(|c| c.title = Some(title.to_string()));
        let callbacks = self.core().on_set_terminal_title.read().unwrap().clone();
        for cb in callbacks {
            cb(title.to_string()).await;
        }
    }

    async fn set_terminal_size(&self, rows: u16, cols: u16) {
        self.core().reshape_buffer(rows, cols);
        self.core().update_context(|c| {
            c.rows = Some(rows);
            c.cols = Some(cols);
        });
    }

    async fn update_terminal_metadata(&self, client_id: &str, rows: Option<u16>, cols: Option<u16>) {
        let (agg_rows, agg_cols) = self.core().record_client_metadata(client_id, rows, cols);
        if let (Some(r), Some(c)) = (agg_rows, agg_cols) {
            self.set_terminal_size(r, c).await;
        }
    }

    fn get_terminal_buffer(&self) -> Vec<u8> {
        self.core().dump_screen_state()
    }

    fn get_terminal_cursor_position(&self) -> (u32, u32) {
        self.core().cursor_position()
    }

    fn reference_increment(&self) {
        self.core().reference_increment();
    }

    fn reference_decrement(&self) {
        if self.core().reference_decrement() {
            self.core().schedule_shutdown();
        }
    }

    fn on_send_to_frontend(&self, cb: ByteCallback) {
        self.core().register_send_to_frontend(cb);
    }

    fn on_receive_from_frontend(&self, cb: ByteCallback) {
        self.core().register_receive_from_frontend(cb);
    }

    fn on_shutdown(&self, cb: ShutdownCallback) {
        self.core().register_shutdown(cb);
    }

    fn on_set_terminal_title(&self, cb: TitleCallback) {
        self.core().register_set_terminal_title(cb);
    }
}

/// Construct `iface` behind an `Arc`, binding its self-handle so reference
/// counting can schedule its own shutdown. Every transport factory ends
/// with this.
pub fn finish_construction<T: Interface + 'static>(iface: T) -> Arc<dyn Interface> {
    let arc: Arc<dyn Interface> = Arc::new(iface);
    arc.core().bind_self_handle(Arc::downgrade(&arc));
    arc
}

/// Snapshot for tests/introspection of an Interface's registered client sizes.
pub fn describe_client_metadata(core: &InterfaceCore) -> HashMap<String, ClientMetadata> {
    core.client_metadata
        .iter()
        .map(|e| (e.key().clone(), *e.value()))
        .collect()
}
