//! Incremental UTF-8 + line decoder.
//!
//! Transport chunks do not respect character or line boundaries. Bytes of
//! an incomplete UTF-8 sequence are carried into the next chunk, and the
//! text after the last `\n` is held until its line completes.

/// Splits a byte stream into complete lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    carry: Vec<u8>,
    buffer: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every line it completed, without the
    /// terminator. A trailing `\r` is stripped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);
        self.decode_carry(false);
        self.drain_lines()
    }

    /// Flushes at end of input. Incomplete UTF-8 becomes U+FFFD and the
    /// unterminated tail is returned as a final line.
    pub fn finish(&mut self) -> Vec<String> {
        self.decode_carry(true);
        let mut lines = self.drain_lines();
        if !self.buffer.is_empty() {
            let tail = std::mem::take(&mut self.buffer);
            lines.push(strip_cr(tail));
        }
        lines
    }

    fn decode_carry(&mut self, at_end: bool) {
        let mut consumed = 0;
        loop {
            let rest = &self.carry[consumed..];
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    consumed = self.carry.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // Safe: the prefix was just validated.
                    self.buffer
                        .push_str(std::str::from_utf8(&rest[..valid]).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid + bad;
                        }
                        None if at_end => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            consumed = self.carry.len();
                            break;
                        }
                        None => {
                            // Incomplete sequence: wait for the next chunk.
                            consumed += valid;
                            break;
                        }
                    }
                }
            }
        }
        self.carry.drain(..consumed);
    }

    fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            lines.push(strip_cr(line[..line.len() - 1].to_string()));
        }
        lines
    }
}

fn strip_cr(mut line: String) -> String {
    if line.ends_with('\r') {
        line.pop();
    }
    line
}
