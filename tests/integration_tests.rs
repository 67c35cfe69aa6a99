//! Integration tests exercising the streaming pipeline end to end: SSE bytes
//! in, rendered text and committed history out.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;

use terai::chat::{ChatSession, ExchangeOutcome};
use terai::client::{ChunkStream, ModelInfo, OPENAI_MODELS, Provider, ProviderKind};
use terai::history::ChatHistory;
use terai::render::{LiveDisplay, RenderStyle, stream_to_string};
use terai::sse::process_sse;

/// Write sink shared with the test so rendered output can be inspected.
#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn byte_stream(
    frames: Vec<&'static [u8]>,
) -> impl futures::Stream<Item = Result<Bytes, reqwest::Error>> + Unpin + 'static {
    stream::iter(frames.into_iter().map(|frame| Ok(Bytes::from(frame))))
}

#[tokio::test]
async fn openai_sse_bytes_render_to_plain_text() {
    let frames: Vec<&'static [u8]> = vec![
        b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        b"data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        b"data: [DONE]\n\n",
    ];
    let sink = SharedSink::default();
    let mut display = LiveDisplay::with_sink(Box::new(sink.clone())).with_color(false);

    let chunks = process_sse(byte_stream(frames));
    let full = stream_to_string(chunks, RenderStyle::Plain, &mut display, None)
        .await
        .unwrap();

    assert_eq!(full, "Hello");
    assert_eq!(sink.contents(), "Hello\n");
}

#[tokio::test]
async fn gemini_sse_bytes_render_to_plain_text() {
    // Gemini delimits events with CRLF pairs and nests text under
    // candidates/content/parts.
    let frames: Vec<&'static [u8]> = vec![
        b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hi \"}]}}]}\r\n\r\n",
        b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"there\"}]}}]}\r\n\r\n",
    ];
    let sink = SharedSink::default();
    let mut display = LiveDisplay::with_sink(Box::new(sink.clone())).with_color(false);

    let chunks = process_sse(byte_stream(frames));
    let full = stream_to_string(chunks, RenderStyle::Plain, &mut display, None)
        .await
        .unwrap();

    assert_eq!(full, "Hi there");
}

#[tokio::test]
async fn markdown_stream_renders_structure() {
    let frames: Vec<&'static [u8]> = vec![
        b"data: {\"text\":\"# Title\\n\\n- one\\n\"}\n\n",
        b"data: {\"text\":\"- two\"}\n\n",
    ];
    let sink = SharedSink::default();
    let mut display = LiveDisplay::with_sink(Box::new(sink.clone()))
        .with_color(false)
        .with_refresh_per_second(1000);

    let chunks = process_sse(byte_stream(frames));
    let full = stream_to_string(chunks, RenderStyle::Markdown, &mut display, None)
        .await
        .unwrap();

    assert_eq!(full, "# Title\n\n- one\n- two");
    let output = sink.contents();
    assert!(output.contains("# Title"));
    assert!(output.contains("- one"));
    assert!(output.contains("- two"));
}

/// Provider that replays scripted SSE byte frames through the real SSE
/// processing layer.
struct SsePlaybackProvider {
    model: String,
    responses: Mutex<VecDeque<Vec<&'static [u8]>>>,
}

impl SsePlaybackProvider {
    fn new() -> Self {
        Self {
            model: OPENAI_MODELS[0].id.to_string(),
            responses: Mutex::new(VecDeque::new()),
        }
    }

    fn respond(self, frames: Vec<&'static [u8]>) -> Self {
        self.responses.lock().unwrap().push_back(frames);
        self
    }
}

#[async_trait]
impl Provider for SsePlaybackProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn models(&self) -> &'static [ModelInfo] {
        OPENAI_MODELS
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn set_model(&mut self, model: String) {
        self.model = model;
    }

    async fn validate_connection(&self) -> bool {
        true
    }

    async fn open_stream(&self, _prompt: &str, _history: &ChatHistory) -> terai::Result<ChunkStream> {
        let frames = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(Box::pin(process_sse(byte_stream(frames))))
    }
}

#[tokio::test]
async fn conversation_grows_history_through_real_sse() {
    let provider = SsePlaybackProvider::new()
        .respond(vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            b"data: [DONE]\n\n",
        ])
        .respond(vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"I said \"}}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\n",
            b"data: [DONE]\n\n",
        ]);

    let mut session = ChatSession::new(vec![Box::new(provider)], 20, false).unwrap();
    let mut display = LiveDisplay::with_sink(Box::new(std::io::sink())).with_color(false);

    let outcome = session.send("hi", &mut display).await;
    assert_eq!(outcome, ExchangeOutcome::Completed("Hello".to_string()));

    let outcome = session.send("what did you say?", &mut display).await;
    assert_eq!(outcome, ExchangeOutcome::Completed("I said Hello".to_string()));

    assert_eq!(session.history().len(), 4);
    let contents: Vec<&str> = session
        .history()
        .iter()
        .map(|turn| turn.content.as_str())
        .collect();
    assert_eq!(contents, vec!["hi", "Hello", "what did you say?", "I said Hello"]);
}

#[tokio::test]
async fn malformed_sse_fails_exchange_without_committing() {
    let provider = SsePlaybackProvider::new().respond(vec![
        b"data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n\n",
        b"data: {not json}\n\n",
    ]);

    let mut session = ChatSession::new(vec![Box::new(provider)], 20, false).unwrap();
    let mut display = LiveDisplay::with_sink(Box::new(std::io::sink())).with_color(false);

    let outcome = session.send("hi", &mut display).await;
    assert_eq!(outcome, ExchangeOutcome::Failed);
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn empty_stream_yields_empty_outcome() {
    let provider = SsePlaybackProvider::new().respond(vec![b"data: [DONE]\n\n" as &[u8]]);

    let mut session = ChatSession::new(vec![Box::new(provider)], 20, false).unwrap();
    let mut display = LiveDisplay::with_sink(Box::new(std::io::sink())).with_color(false);

    let outcome = session.send("hi", &mut display).await;
    assert_eq!(outcome, ExchangeOutcome::Empty);
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn structure_is_identical_across_render_styles() {
    let frames: Vec<&'static [u8]> =
        vec![b"data: {\"text\":\"**bold** and `code`\"}\n\n" as &[u8]];

    let mut plain_display = LiveDisplay::with_sink(Box::new(std::io::sink())).with_color(false);
    let plain = stream_to_string(
        process_sse(byte_stream(frames.clone())),
        RenderStyle::Plain,
        &mut plain_display,
        None,
    )
    .await
    .unwrap();

    let mut markdown_display = LiveDisplay::with_sink(Box::new(std::io::sink())).with_color(false);
    let markdown = stream_to_string(
        process_sse(byte_stream(frames)),
        RenderStyle::Markdown,
        &mut markdown_display,
        None,
    )
    .await
    .unwrap();

    // The accumulated text is the same; only presentation differs.
    assert_eq!(plain, markdown);
    assert_eq!(plain, "**bold** and `code`");
}
