//! Incremental decoder for `text/event-stream` bodies
//!
//! Bytes arrive in arbitrary network-sized pieces; events are separated by a
//! blank line. Partial UTF-8 sequences at a chunk boundary are held back
//! until the rest of the character arrives.

/// One decoded server-sent event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if any
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
    /// Value of the `id:` field, if any
    pub id: Option<String>,
}

/// Buffering SSE decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    pending: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and collect every event completed by them
    ///
    /// # Examples
    ///
    /// ```
    /// use botchat::providers::sse::SseDecoder;
    ///
    /// let mut decoder = SseDecoder::new();
    /// assert!(decoder.push(b"data: hel").is_empty());
    /// let events = decoder.push(b"lo\n\n");
    /// assert_eq!(events[0].data, "hello");
    /// ```
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);

        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => {
                // Invalid bytes, not just a truncated character: replace them.
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                self.append_text(&text);
                return self.drain_events();
            }
        };

        let rest = self.pending.split_off(valid_up_to);
        let complete = std::mem::replace(&mut self.pending, rest);
        if let Ok(text) = std::str::from_utf8(&complete) {
            self.append_text(text);
        }
        self.drain_events()
    }

    /// Flush whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.pending.is_empty() {
            let text = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.append_text(&text);
        }
        let block = std::mem::take(&mut self.buffer);
        parse_event_block(&block)
    }

    fn append_text(&mut self, text: &str) {
        if text.contains('\r') {
            self.buffer.push_str(&text.replace("\r\n", "\n").replace('\r', "\n"));
        } else {
            self.buffer.push_str(text);
        }
    }

    fn drain_events(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = parse_event_block(&block) {
                events.push(event);
            }
        }
        events
    }
}

/// Parse one event block; comment-only or empty blocks yield `None`
fn parse_event_block(block: &str) -> Option<SseEvent> {
    let mut data_lines: Vec<&str> = Vec::new();
    let mut event = None;
    let mut id = None;

    for line in block.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        } else if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("id:") {
            id = Some(value.trim().to_string());
        }
        // `retry:` and `:` comment lines are ignored.
    }

    if data_lines.is_empty() && event.is_none() {
        return None;
    }

    Some(SseEvent {
        event,
        data: data_lines.join("\n"),
        id,
    })
}
