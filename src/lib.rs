//! sioba: bidirectional byte-stream I/O endpoints (processes, sockets,
//! serial lines, WebSockets, echo/function loopbacks) behind a URI-scheme
//! registry, with a pluggable terminal/line buffer subsystem.
//!
//! Start with [`interface_from_uri`] to construct an endpoint, `start()` it,
//! register frontend callbacks with `on_send_to_frontend`, and pump bytes in
//! with `receive_from_frontend`.

pub mod buffer;
pub mod context;
pub mod error;
pub mod interface;
pub mod registry;

pub use buffer::{buffer_for_context, Buffer, BufferFactory};
pub use context::InterfaceContext;
pub use error::{Result, SiobaError};
pub use interface::function::{CaptureMode, FunctionHandle, FunctionInterface};
pub use interface::{
    BoxFuture, ByteCallback, ClientMetadata, Interface, InterfaceCore, InterfaceFactory, InterfaceState,
    ShutdownCallback, TitleCallback,
};
pub use registry::{
    buffer_from_uri, describe_schemes, interface_from_uri, list_buffer_schemes, list_schemes, register_buffer,
    register_scheme,
};
