//! Newline-delimited JSON framing for event streams.
//!
//! The encoder writes one JSON object per line and flushes after every
//! event. The decoder accepts arbitrary byte chunks, buffers partial lines,
//! and yields events in arrival order. Lines that fail to parse are dropped
//! with a debug log; a conforming encoder never produces them.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Serialize one event as a single `\n`-terminated JSON line.
pub fn encode_line<T: Serialize>(event: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    Ok(line)
}

/// Writes events to an async byte sink, one line each.
pub struct StreamEncoder<W> {
    sink: W,
}

impl<W: AsyncWrite + Unpin> StreamEncoder<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    /// Write and flush one event.
    pub async fn write<T: Serialize>(&mut self, event: &T) -> std::io::Result<()> {
        let line = encode_line(event).map_err(std::io::Error::other)?;
        self.sink.write_all(&line).await?;
        self.sink.flush().await
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// Incremental decoder for newline-delimited JSON.
pub struct StreamDecoder<T> {
    buffer: Vec<u8>,
    _event: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> StreamDecoder<T> {
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            _event: PhantomData,
        }
    }

    /// Feed a chunk of bytes; returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<T> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            if let Some(event) = Self::decode(&self.buffer[start..end]) {
                events.push(event);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);
        events
    }

    /// Decode whatever remains after the byte stream ended without a final newline.
    pub fn finish(mut self) -> Option<T> {
        let rest = std::mem::take(&mut self.buffer);
        Self::decode(&rest)
    }

    /// Bytes buffered but not yet terminated by a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn decode(line: &[u8]) -> Option<T> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_slice(line) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!(error = %e, bytes = line.len(), "Dropping malformed stream line");
                None
            }
        }
    }
}

impl<T: DeserializeOwned> Default for StreamDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_event::StreamEvent;

    fn sample() -> Vec<StreamEvent> {
        vec![
            StreamEvent::delta("Hello, "),
            StreamEvent::delta("wörld"),
            StreamEvent::ToolResult {
                tool_name: "get_item".into(),
                tool_output: "{\"id\":\"i1\"}\nsecond line".into(),
            },
            StreamEvent::Done {
                model: "mock-model".into(),
            },
        ]
    }

    #[test]
    fn decodes_across_arbitrary_chunk_boundaries() {
        let wire: Vec<u8> = sample()
            .iter()
            .flat_map(|e| encode_line(e).unwrap())
            .collect();

        // Split every 3 bytes, which also cuts through multi-byte characters
        let mut decoder = StreamDecoder::<StreamEvent>::new();
        let mut decoded = Vec::new();
        for chunk in wire.chunks(3) {
            decoded.extend(decoder.push(chunk));
        }
        assert_eq!(decoded, sample());
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn malformed_lines_are_dropped() {
        let mut decoder = StreamDecoder::<StreamEvent>::new();
        let events = decoder.push(
            b"{\"type\":\"delta\",\"content\":\"a\"}\nnot json\n\n{\"type\":\"unknown\"}\n{\"type\":\"done\",\"model\":\"m\"}\n",
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::delta("a"),
                StreamEvent::Done { model: "m".into() }
            ]
        );
    }

    #[test]
    fn finish_decodes_unterminated_tail() {
        let mut decoder = StreamDecoder::<StreamEvent>::new();
        assert!(decoder.push(br#"{"type":"error","error":"late"}"#).is_empty());
        assert_eq!(decoder.finish(), Some(StreamEvent::error("late")));
    }

    #[tokio::test]
    async fn encoder_writes_one_line_per_event() {
        let mut encoder = StreamEncoder::new(Vec::new());
        for event in sample() {
            encoder.write(&event).await.unwrap();
        }
        let bytes = encoder.into_inner();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.ends_with("{\"type\":\"done\",\"model\":\"mock-model\"}\n"));
    }
}
