//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! This module converts the raw byte stream of a streaming HTTP response into
//! a stream of [`StreamChunk`] values. Both supported provider families speak
//! SSE: events are delimited by blank lines, payloads ride on `data:` lines,
//! and the OpenAI family terminates the stream with a `data: [DONE]` marker.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::chunk::StreamChunk;
use crate::error::{Error, Result};

/// One parsed SSE frame.
enum SseFrame {
    /// A data payload (or a parse error for it).
    Chunk(Result<StreamChunk>),
    /// The `[DONE]` end-of-stream marker.
    Done,
    /// A comment or empty event, skipped entirely.
    Skip,
}

/// Process a stream of bytes into a stream of provider chunks.
///
/// This function takes a byte stream from an HTTP response and converts it
/// into a stream of parsed [`StreamChunk`] objects, handling SSE framing,
/// buffering across chunk boundaries, and error conditions.
pub fn process_sse<S>(byte_stream: S) -> impl Stream<Item = Result<StreamChunk>>
where
    S: Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Unpin + 'static,
{
    // Convert reqwest errors to our error type
    let stream = byte_stream.map(|result| {
        result
            .map_err(|e| Error::streaming(format!("Error in HTTP stream: {e}"), Some(Box::new(e))))
    });

    // Use a state machine to process the SSE stream
    let buffer = String::new();

    stream::unfold(
        (stream, buffer, false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }
            loop {
                // First check if we have a complete event in the buffer
                if let Some((frame, remaining)) = extract_event(&buffer) {
                    buffer = remaining;
                    match frame {
                        SseFrame::Chunk(chunk) => {
                            return Some((chunk, (stream, buffer, false)));
                        }
                        SseFrame::Done => return None,
                        SseFrame::Skip => continue,
                    }
                }

                // Read more data
                match stream.next().await {
                    Some(Ok(bytes)) => match String::from_utf8(bytes.to_vec()) {
                        // Gemini delimits events with \r\n\r\n; normalize.
                        Ok(text) => buffer.push_str(&text.replace("\r\n", "\n")),
                        Err(e) => {
                            return Some((
                                Err(Error::encoding(
                                    format!("Invalid UTF-8 in stream: {e}"),
                                    Some(Box::new(e)),
                                )),
                                (stream, buffer, false),
                            ));
                        }
                    },
                    Some(Err(e)) => {
                        return Some((Err(e), (stream, buffer, false)));
                    }
                    None => {
                        // End of stream; flush any complete trailing event.
                        if !buffer.is_empty()
                            && let Some((SseFrame::Chunk(chunk), _)) =
                                extract_event(&format!("{buffer}\n\n"))
                        {
                            return Some((chunk, (stream, String::new(), true)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Extract a complete SSE event from a buffer string.
///
/// Events are delimited by double newlines; the payload is the concatenation
/// of the event's `data:` lines.
fn extract_event(buffer: &str) -> Option<(SseFrame, String)> {
    let parts: Vec<&str> = buffer.splitn(2, "\n\n").collect();
    if parts.len() != 2 {
        return None;
    }
    let event_text = parts[0];
    let rest = parts[1].to_string();

    let mut data = String::new();
    for line in event_text.lines() {
        if let Some(payload) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(payload.trim_start());
        }
    }

    if data.is_empty() {
        // Comment-only or keep-alive event.
        return Some((SseFrame::Skip, rest));
    }

    if data == "[DONE]" {
        return Some((SseFrame::Done, rest));
    }

    match serde_json::from_str::<StreamChunk>(&data) {
        Ok(chunk) => Some((SseFrame::Chunk(Ok(chunk)), rest)),
        Err(e) => Some((
            SseFrame::Chunk(Err(Error::serialization(
                format!("Failed to parse event JSON: {e}"),
                Some(Box::new(e)),
            ))),
            rest,
        )),
    }
}
