//! `terminal://` — a VT100-ish screen emulator built on the `vte` crate's
//! byte-stream parser (grounded on the ANSI parser in
//! `r3bl-org-r3bl-open-core/tui`, scaled down to this crate's budget: one
//! file, a flat `Perform` impl, no per-operation doc essays).

use std::collections::VecDeque;

use vte::{Params, Parser, Perform};

use super::Buffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Attrs {
    bold: bool,
    italic: bool,
    underline: bool,
    blink: bool,
    reverse: bool,
    strikethrough: bool,
    fg: Option<u8>,
    bg: Option<u8>,
}

impl Attrs {
    fn sgr_on_codes(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.bold {
            out.push("1".into());
        }
        if self.italic {
            out.push("3".into());
        }
        if self.underline {
            out.push("4".into());
        }
        if self.blink {
            out.push("5".into());
        }
        if self.reverse {
            out.push("7".into());
        }
        if self.strikethrough {
            out.push("9".into());
        }
        if let Some(fg) = self.fg {
            out.push(format!("38;5;{fg}"));
        }
        if let Some(bg) = self.bg {
            out.push(format!("48;5;{bg}"));
        }
        out
    }

    /// Codes that turn on something present in `self` but absent in `prev`.
    fn additions_over(&self, prev: &Attrs) -> Vec<String> {
        let mut out = Vec::new();
        if self.bold && !prev.bold {
            out.push("1".into());
        }
        if self.italic && !prev.italic {
            out.push("3".into());
        }
        if self.underline && !prev.underline {
            out.push("4".into());
        }
        if self.blink && !prev.blink {
            out.push("5".into());
        }
        if self.reverse && !prev.reverse {
            out.push("7".into());
        }
        if self.strikethrough && !prev.strikethrough {
            out.push("9".into());
        }
        if self.fg.is_some() && self.fg != prev.fg {
            out.push(format!("38;5;{}", self.fg.unwrap()));
        }
        if self.bg.is_some() && self.bg != prev.bg {
            out.push(format!("48;5;{}", self.bg.unwrap()));
        }
        out
    }

    /// Whether any attribute active in `prev` has turned off in `self`.
    fn drops_from(&self, prev: &Attrs) -> bool {
        (prev.bold && !self.bold)
            || (prev.italic && !self.italic)
            || (prev.underline && !self.underline)
            || (prev.blink && !self.blink)
            || (prev.reverse && !self.reverse)
            || (prev.strikethrough && !self.strikethrough)
            || (prev.fg.is_some() && self.fg != prev.fg)
            || (prev.bg.is_some() && self.bg != prev.bg)
    }
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    ch: char,
    attrs: Attrs,
}

impl Default for Cell {
    fn default() -> Self {
        Cell { ch: ' ', attrs: Attrs::default() }
    }
}

/// The `vte::Perform` target: everything the parser can mutate. Kept
/// separate from the owning `vte::Parser` field so `advance()` can borrow
/// each independently.
struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<Vec<Cell>>,
    cursor_row: usize,
    cursor_col: usize,
    scrollback: VecDeque<Vec<Cell>>,
    scrollback_cap: usize,
    cur_attrs: Attrs,
    pending_title: Option<String>,
}

impl Grid {
    fn new(rows: u16, cols: u16, scrollback_cap: usize) -> Self {
        let rows = rows.max(1) as usize;
        let cols = cols.max(1) as usize;
        Self {
            rows,
            cols,
            cells: vec![vec![Cell::default(); cols]; rows],
            cursor_row: 0,
            cursor_col: 0,
            scrollback: VecDeque::new(),
            scrollback_cap: scrollback_cap.max(1),
            cur_attrs: Attrs::default(),
            pending_title: None,
        }
    }

    fn advance_row(&mut self) {
        self.cursor_row += 1;
        if self.cursor_row >= self.rows {
            self.cursor_row = self.rows - 1;
            self.scroll_up();
        }
    }

    fn scroll_up(&mut self) {
        let top = self.cells.remove(0);
        self.scrollback.push_back(top);
        while self.scrollback.len() > self.scrollback_cap {
            self.scrollback.pop_front();
        }
        self.cells.push(vec![Cell::default(); self.cols]);
    }

    fn clear_screen(&mut self) {
        for row in &mut self.cells {
            for cell in row.iter_mut() {
                *cell = Cell::default();
            }
        }
    }

    fn clear_line(&mut self, row: usize) {
        if let Some(line) = self.cells.get_mut(row) {
            for cell in line.iter_mut() {
                *cell = Cell::default();
            }
        }
    }

    fn reshape(&mut self, rows: u16, cols: u16) {
        let rows = rows.max(1) as usize;
        let cols = cols.max(1) as usize;
        self.cells = vec![vec![Cell::default(); cols]; rows];
        self.rows = rows;
        self.cols = cols;
        self.cursor_row = self.cursor_row.min(rows - 1);
        self.cursor_col = self.cursor_col.min(cols - 1);
    }

    fn dump(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"\x1b[0m");
        let mut current = Attrs::default();

        let total_lines = self.scrollback.len() + self.rows;
        let mut line_no = 0usize;
        let mut emit_line = |out: &mut Vec<u8>, current: &mut Attrs, line: &[Cell]| {
            for cell in line {
                if cell.attrs != *current {
                    if cell.attrs.drops_from(current) {
                        out.extend_from_slice(b"\x1b[0m");
                        *current = Attrs::default();
                    }
                    let additions = cell.attrs.additions_over(current);
                    if !additions.is_empty() {
                        out.extend_from_slice(format!("\x1b[{}m", additions.join(";")).as_bytes());
                    }
                    *current = cell.attrs;
                }
                let mut buf = [0u8; 4];
                out.extend_from_slice(cell.ch.encode_utf8(&mut buf).as_bytes());
            }
            if *current != Attrs::default() {
                out.extend_from_slice(b"\x1b[0m");
                *current = Attrs::default();
            }
            line_no += 1;
            if line_no < total_lines {
                out.extend_from_slice(b"\n\r");
            }
        };

        for line in &self.scrollback {
            emit_line(&mut out, &mut current, line);
        }
        for line in &self.cells {
            emit_line(&mut out, &mut current, line);
        }

        out.extend_from_slice(format!("\x1b[{};1H", total_lines).as_bytes());
        out
    }
}

impl Perform for Grid {
    fn print(&mut self, c: char) {
        self.cells[self.cursor_row][self.cursor_col] = Cell { ch: c, attrs: self.cur_attrs };
        self.cursor_col += 1;
        if self.cursor_col >= self.cols {
            self.cursor_col = 0;
            self.advance_row();
        }
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.advance_row(),
            b'\r' => self.cursor_col = 0,
            0x08 => {
                if self.cursor_col > 0 {
                    self.cursor_col -= 1;
                }
            }
            b'\t' => {
                let next_stop = (self.cursor_col / 8 + 1) * 8;
                self.cursor_col = next_stop.min(self.cols - 1);
            }
            _ => {}
        }
    }

    fn hook(&mut self, _params: &Params, _intermediates: &[u8], _ignore: bool, _action: char) {}
    fn put(&mut self, _byte: u8) {}
    fn unhook(&mut self) {}

    fn osc_dispatch(&mut self, params: &[&[u8]], _bell_terminated: bool) {
        if params.len() >= 2 && matches!(params[0], b"0" | b"1" | b"2") {
            self.pending_title = Some(String::from_utf8_lossy(params[1]).into_owned());
        }
    }

    fn csi_dispatch(&mut self, params: &Params, _intermediates: &[u8], ignore: bool, action: char) {
        if ignore {
            tracing::debug!(action, "ignoring malformed CSI sequence");
            return;
        }
        let values: Vec<u16> = params.iter().map(|p| p.first().copied().unwrap_or(0)).collect();
        let n = |default: u16| -> usize {
            values.first().copied().filter(|&v| v != 0).unwrap_or(default) as usize
        };

        match action {
            'A' => self.cursor_row = self.cursor_row.saturating_sub(n(1)),
            'B' => self.cursor_row = (self.cursor_row + n(1)).min(self.rows - 1),
            'C' => self.cursor_col = (self.cursor_col + n(1)).min(self.cols - 1),
            'D' => self.cursor_col = self.cursor_col.saturating_sub(n(1)),
            'H' | 'f' => {
                let row = values.first().copied().unwrap_or(1).max(1) as usize - 1;
                let col = values.get(1).copied().unwrap_or(1).max(1) as usize - 1;
                self.cursor_row = row.min(self.rows - 1);
                self.cursor_col = col.min(self.cols - 1);
            }
            'J' => match values.first().copied().unwrap_or(0) {
                2 | 3 => self.clear_screen(),
                _ => self.clear_line(self.cursor_row),
            },
            'K' => self.clear_line(self.cursor_row),
            'm' => self.apply_sgr(&values),
            _ => {
                tracing::debug!(action, "unhandled CSI action");
            }
        }
    }
}

impl Grid {
    fn apply_sgr(&mut self, params: &[u16]) {
        if params.is_empty() {
            self.cur_attrs = Attrs::default();
            return;
        }
        let mut i = 0;
        while i < params.len() {
            match params[i] {
                0 => self.cur_attrs = Attrs::default(),
                1 => self.cur_attrs.bold = true,
                3 => self.cur_attrs.italic = true,
                4 => self.cur_attrs.underline = true,
                5 => self.cur_attrs.blink = true,
                7 => self.cur_attrs.reverse = true,
                9 => self.cur_attrs.strikethrough = true,
                22 => self.cur_attrs.bold = false,
                23 => self.cur_attrs.italic = false,
                24 => self.cur_attrs.underline = false,
                25 => self.cur_attrs.blink = false,
                27 => self.cur_attrs.reverse = false,
                29 => self.cur_attrs.strikethrough = false,
                30..=37 => self.cur_attrs.fg = Some((params[i] - 30) as u8),
                39 => self.cur_attrs.fg = None,
                40..=47 => self.cur_attrs.bg = Some((params[i] - 40) as u8),
                49 => self.cur_attrs.bg = None,
                90..=97 => self.cur_attrs.fg = Some((params[i] - 90 + 8) as u8),
                100..=107 => self.cur_attrs.bg = Some((params[i] - 100 + 8) as u8),
                38 | 48 => {
                    // 38;5;N / 48;5;N (256-color); ignore truecolor (38;2;r;g;b) as
                    // a private/unsupported sequence per spec.md's resilience clause.
                    if params.get(i + 1) == Some(&5) {
                        if let Some(&idx) = params.get(i + 2) {
                            if params[i] == 38 {
                                self.cur_attrs.fg = Some(idx as u8);
                            } else {
                                self.cur_attrs.bg = Some(idx as u8);
                            }
                        }
                        i += 2;
                    }
                }
                _ => {}
            }
            i += 1;
        }
    }
}

pub struct TerminalBuffer {
    parser: Parser,
    grid: Grid,
}

impl TerminalBuffer {
    pub fn new(rows: u16, cols: u16, scrollback_buffer_size: usize) -> Self {
        Self {
            parser: Parser::new(),
            grid: Grid::new(rows, cols, scrollback_buffer_size),
        }
    }
}

impl Buffer for TerminalBuffer {
    fn feed(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let Self { parser, grid } = self;
        for &byte in data {
            parser.advance(grid, byte);
        }
    }

    fn dump_screen_state(&self) -> Vec<u8> {
        self.grid.dump()
    }

    fn cursor_position(&self) -> (u32, u32) {
        (self.grid.cursor_row as u32, self.grid.cursor_col as u32)
    }

    fn reshape(&mut self, rows: u16, cols: u16) {
        self.grid.reshape(rows, cols);
    }

    fn take_title_update(&mut self) -> Option<String> {
        self.grid.pending_title.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printable_bytes_advance_cursor() {
        let mut buf = TerminalBuffer::new(24, 80, 1000);
        buf.feed(b"foo");
        assert_eq!(buf.cursor_position(), (0, 3));
    }

    #[test]
    fn resize_clamps_cursor() {
        let mut buf = TerminalBuffer::new(24, 80, 1000);
        buf.feed(b"foo");
        buf.reshape(10, 10);
        let (row, col) = buf.cursor_position();
        assert!(row < 10 && col < 10);
    }

    #[test]
    fn long_line_wraps_to_expected_position() {
        let mut buf = TerminalBuffer::new(24, 80, 1000);
        buf.reshape(10, 10);
        buf.feed(b"abcdefghijklmnopqrstuvwxyz");
        assert_eq!(buf.cursor_position(), (2, 6));
    }

    #[test]
    fn empty_feed_is_idempotent() {
        let mut buf = TerminalBuffer::new(24, 80, 1000);
        buf.feed(b"foo");
        let before = buf.cursor_position();
        buf.feed(b"");
        assert_eq!(buf.cursor_position(), before);
    }

    #[test]
    fn osc_title_is_captured_once() {
        let mut buf = TerminalBuffer::new(24, 80, 1000);
        buf.feed(b"\x1b]0;hello\x07");
        assert_eq!(buf.take_title_update().as_deref(), Some("hello"));
        assert_eq!(buf.take_title_update(), None);
    }

    #[test]
    fn scrollback_is_bounded() {
        let mut buf = TerminalBuffer::new(5, 10, 10);
        for i in 0..30 {
            buf.feed(format!("{i}\n").as_bytes());
        }
        assert!(buf.grid.scrollback.len() <= 10);
    }
}
