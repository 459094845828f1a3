//! Buffer subsystem (spec component #3): scheme-dispatched consumers of
//! endpoint bytes that maintain a replayable view of the stream.

mod line;
mod terminal;

pub use line::LineBuffer;
pub use terminal::TerminalBuffer;

use dashmap::DashMap;

use crate::context::InterfaceContext;
use crate::error::Result;

/// Factory registered per buffer URI scheme; see
/// [`crate::registry::register_buffer`].
pub type BufferFactory = fn(&InterfaceContext) -> Result<Box<dyn Buffer>>;

/// A consumer of the endpoint -> frontend byte stream that maintains a
/// replayable representation of it.
pub trait Buffer: Send + Sync {
    /// Consume `data`. A no-op on empty input.
    fn feed(&mut self, data: &[u8]);

    /// The replayable representation: for `line://`, the buffered lines
    /// joined by `\n`; for `terminal://`, an ANSI byte stream that
    /// reproduces scrollback + screen + cursor position when replayed.
    fn dump_screen_state(&self) -> Vec<u8>;

    /// 0-based (row, col) of the buffer's notion of cursor, if any.
    fn cursor_position(&self) -> (u32, u32) {
        (0, 0)
    }

    /// Reshape to `rows x cols`. A no-op for buffers with no grid concept.
    fn reshape(&mut self, _rows: u16, _cols: u16) {}

    /// Returns and clears the most recently observed title (OSC 0/2),
    /// if any changed since the last call.
    fn take_title_update(&mut self) -> Option<String> {
        None
    }
}

pub(crate) fn register_builtin_buffers(map: &DashMap<String, BufferFactory>) {
    map.insert("line".to_string(), line_factory as BufferFactory);
    map.insert("terminal".to_string(), terminal_factory as BufferFactory);
}

fn line_factory(ctx: &InterfaceContext) -> Result<Box<dyn Buffer>> {
    let size = ctx.scrollback_buffer_size.unwrap_or(crate::context::DEFAULT_SCROLLBACK_BUFFER_SIZE);
    Ok(Box::new(LineBuffer::new(size)))
}

fn terminal_factory(ctx: &InterfaceContext) -> Result<Box<dyn Buffer>> {
    let rows = ctx.rows.unwrap_or(crate::context::DEFAULT_ROWS);
    let cols = ctx.cols.unwrap_or(crate::context::DEFAULT_COLS);
    let scrollback = ctx.scrollback_buffer_size.unwrap_or(crate::context::DEFAULT_SCROLLBACK_BUFFER_SIZE);
    Ok(Box::new(TerminalBuffer::new(rows, cols, scrollback)))
}

/// Construct the buffer named by `ctx.scrollback_buffer_uri` (falling back
/// to `terminal://`), via the global buffer registry.
pub fn buffer_for_context(ctx: &InterfaceContext) -> Result<Box<dyn Buffer>> {
    let uri = ctx
        .scrollback_buffer_uri
        .clone()
        .unwrap_or_else(|| crate::context::DEFAULT_SCROLLBACK_BUFFER_URI.to_string());
    crate::registry::buffer_from_uri(&uri, ctx)
}
