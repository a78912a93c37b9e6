//! Newline framing for socket feeds.
//!
//! Socket reads arrive in arbitrary chunks; [`LineFramer`] buffers them and
//! hands back complete lines, keeping any trailing partial line until the
//! chunk that completes it shows up.

/// Line delimiter used by both the decoder feed and the aggregator link.
pub const DELIMITER: u8 = b'\n';

/// Incremental splitter turning a byte stream into newline-delimited lines.
///
/// Lines are pulled lazily: anything not pulled yet stays buffered and is
/// returned first by the next pull, so dropping a [`Lines`] iterator early
/// loses nothing.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
    /// Start of the first unconsumed byte in `buf`.
    pos: usize,
    /// Bytes before this offset are known to contain no delimiter.
    scanned: usize,
}

impl LineFramer {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            pos: 0,
            scanned: 0,
        }
    }

    /// Append a chunk to the internal buffer without pulling any lines.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.scanned -= self.pos;
            self.pos = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Append a chunk and iterate over every line that is now complete.
    pub fn feed(&mut self, chunk: &[u8]) -> Lines<'_> {
        self.push(chunk);
        Lines { framer: self }
    }

    /// Pull the next complete line, without its delimiter.
    ///
    /// Empty segments (consecutive delimiters) come back as empty strings.
    /// Invalid UTF-8 is replaced with U+FFFD.
    pub fn next_line(&mut self) -> Option<String> {
        let from = self.scanned.max(self.pos);
        let Some(offset) = self.buf[from..].iter().position(|&b| b == DELIMITER) else {
            self.scanned = self.buf.len();
            return None;
        };
        let end = from + offset;
        let line = String::from_utf8_lossy(&self.buf[self.pos..end]).into_owned();
        self.pos = end + 1;
        self.scanned = self.pos;
        Some(line)
    }

    /// Number of buffered bytes not yet returned as part of a line.
    pub fn pending(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// Iterator over the complete lines currently buffered in a [`LineFramer`].
#[derive(Debug)]
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.framer.next_line()
    }
}
