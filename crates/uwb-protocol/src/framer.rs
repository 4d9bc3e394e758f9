//! Streaming line framer
//!
//! Serial reads hand the framer arbitrary byte chunks; the framer yields
//! complete report lines with their terminator stripped. Lines end in
//! `\r\n` on the wire, but a bare `\n` is accepted for devices left in
//! LF mode.

/// Longest line any known report produces, with margin
const MAX_LINE_LEN: usize = 256;

/// Push-based splitter from raw serial bytes to report lines
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Create an empty framer
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_LINE_LEN),
        }
    }

    /// Push raw bytes into the framer's buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Prevent buffer overflow when a device never sends a terminator
        if self.buffer.len() > MAX_LINE_LEN * 4 {
            let start = self.buffer.len() - MAX_LINE_LEN;
            self.buffer = self.buffer[start..].to_vec();
        }
    }

    /// Extract the next complete line, terminator stripped
    ///
    /// Returns `None` when no full line is buffered yet. Empty lines
    /// (consecutive terminators) come out as empty slices; callers skip
    /// them.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let term_pos = self.buffer.iter().position(|&b| b == b'\n')?;

        let mut line: Vec<u8> = self.buffer.drain(..=term_pos).collect();
        line.pop(); // the '\n'
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        Some(line)
    }

    /// Drop any buffered partial line
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
