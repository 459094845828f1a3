//! `line://` — an append-only byte buffer bounded to `scrollback_buffer_size`
//! lines (spec.md 4.3).

use std::collections::VecDeque;

use super::Buffer;

pub struct LineBuffer {
    lines: VecDeque<Vec<u8>>,
    partial: Vec<u8>,
    max_lines: usize,
}

impl LineBuffer {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            partial: Vec::new(),
            max_lines: max_lines.max(1),
        }
    }

    fn push_line(&mut self, line: Vec<u8>) {
        self.lines.push_back(line);
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }
}

impl Buffer for LineBuffer {
    fn feed(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        for &b in data {
            if b == b'\n' {
                let line = std::mem::take(&mut self.partial);
                self.push_line(line);
            } else {
                self.partial.push(b);
            }
        }
    }

    fn dump_screen_state(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut first = true;
        for line in &self.lines {
            if !first {
                out.push(b'\n');
            }
            out.extend_from_slice(line);
            first = false;
        }
        if !self.partial.is_empty() {
            if !first {
                out.push(b'\n');
            }
            out.extend_from_slice(&self.partial);
        }
        out
    }

    fn cursor_position(&self) -> (u32, u32) {
        (self.lines.len() as u32, self.partial.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_feed_is_a_no_op() {
        let mut buf = LineBuffer::new(10);
        buf.feed(b"hello");
        buf.feed(b"");
        assert_eq!(buf.dump_screen_state(), b"hello");
    }

    #[test]
    fn evicts_oldest_beyond_the_bound() {
        let mut buf = LineBuffer::new(10);
        for i in 1..=20 {
            buf.feed(format!("{i}\n").as_bytes());
        }
        let dumped = String::from_utf8(buf.dump_screen_state()).unwrap();
        let lines: Vec<&str> = dumped.split('\n').collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "11");
        assert_eq!(lines[9], "20");
        for i in 1..=10 {
            assert!(!dumped.lines().any(|l| l == i.to_string()));
        }
    }

    #[test]
    fn joins_lines_without_trailing_newline() {
        let mut buf = LineBuffer::new(5);
        buf.feed(b"a\nb\nc");
        assert_eq!(buf.dump_screen_state(), b"a\nb\nc");
    }
}
