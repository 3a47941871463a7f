//! Incremental decoder for the backend's event stream
//!
//! The wire format is line oriented: `event: <type>` names the kind of the
//! following `data: <payload>` lines, and every `data:` line is its own
//! frame. The event type is sticky until the next `event:` line, so several
//! `data:` lines may share one label. Blank lines are tolerated but carry no
//! meaning.
//!
//! Bytes may be split anywhere by the transport, including inside a UTF-8
//! sequence, so decoding keeps the incomplete tail of the previous chunk.

/// One `data:` line together with the event type in effect when it arrived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Label from the most recent `event:` line, if any
    pub event_type: Option<String>,

    /// Remainder of the `data:` line, one optional leading space removed
    pub data: String,
}

impl SseFrame {
    /// Event type, falling back to `"unknown"` when none was announced
    #[must_use]
    pub fn event_type_or_unknown(&self) -> &str {
        self.event_type.as_deref().unwrap_or("unknown")
    }
}

/// Stateful byte-to-frame decoder for a single stream
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending_bytes: Vec<u8>,

    /// Decoded text not yet terminated by a newline
    line_buffer: String,

    /// Label of the last `event:` line
    current_event_type: Option<String>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk of raw bytes and return every completed frame
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let text = self.decode_utf8(chunk);
        self.parse_chunk(&text)
    }

    /// Parse already-decoded text
    ///
    /// Returns completed frames. A trailing partial line is buffered until the
    /// next call.
    pub fn parse_chunk(&mut self, chunk: &str) -> Vec<SseFrame> {
        let mut frames = Vec::new();

        self.line_buffer.push_str(chunk);

        while let Some(line_end) = self.line_buffer.find('\n') {
            let line = self.line_buffer[..line_end]
                .trim_end_matches('\r')
                .to_string();
            self.line_buffer.drain(..=line_end);

            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }

        frames
    }

    /// Drain whatever is left once the transport reports end of stream
    ///
    /// Incomplete UTF-8 is replaced with U+FFFD and an unterminated final line
    /// is treated as complete.
    pub fn flush(&mut self) -> Option<SseFrame> {
        if !self.pending_bytes.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending_bytes).into_owned();
            self.pending_bytes.clear();
            self.line_buffer.push_str(&tail);
        }

        if self.line_buffer.is_empty() {
            return None;
        }

        let line = std::mem::take(&mut self.line_buffer);
        self.process_line(line.trim_end_matches('\r'))
    }

    /// Label of the most recent `event:` line
    #[must_use]
    pub fn current_event_type(&self) -> Option<&str> {
        self.current_event_type.as_deref()
    }

    /// Text received after the last newline
    #[must_use]
    pub fn buffered(&self) -> &str {
        &self.line_buffer
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() || line.starts_with(':') {
            return None;
        }

        let (field, value) = Self::parse_field(line);
        match field {
            "event" => {
                self.current_event_type = Some(value.trim().to_string());
                None
            }
            "data" if !value.is_empty() => Some(SseFrame {
                event_type: self.current_event_type.clone(),
                data: value.to_string(),
            }),
            // id, retry and unknown fields have no meaning for this backend
            _ => None,
        }
    }

    /// Split a field line into (field_name, value)
    fn parse_field(line: &str) -> (&str, &str) {
        match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        }
    }

    /// Decode as much of `pending_bytes + chunk` as forms complete characters
    fn decode_utf8(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending_bytes);
        bytes.extend_from_slice(chunk);

        let mut decoded = String::with_capacity(bytes.len());
        let mut start = 0;
        loop {
            match std::str::from_utf8(&bytes[start..]) {
                Ok(text) => {
                    decoded.push_str(text);
                    start = bytes.len();
                    break;
                }
                Err(err) => {
                    let valid_end = start + err.valid_up_to();
                    decoded.push_str(&String::from_utf8_lossy(&bytes[start..valid_end]));
                    match err.error_len() {
                        Some(len) => {
                            decoded.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending_bytes = bytes[start..].to_vec();
        decoded
    }
}
