//! Output rendering for streaming chat responses.
//!
//! This module is the aggregation layer of the client: it consumes a stream
//! of provider chunks, accumulates the extracted deltas into the final
//! response text, and keeps a live terminal region up to date while tokens
//! arrive. Two render styles are supported:
//!
//! - Markdown: every delta is appended to an accumulator and the whole
//!   accumulator is re-parsed as markdown and redrawn in place. If a partial
//!   accumulation does not parse, the raw text is shown for that frame and
//!   parsing is retried on the next delta.
//! - Plain: deltas are written straight through with no re-rendering.
//!
//! The returned string is always the exact in-order concatenation of the
//! extracted deltas, independent of render style.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt, pin_mut};
use markdown::mdast::Node;
use markdown::{ParseOptions, to_mdast};

use crate::chunk::StreamChunk;
use crate::error::{Error, Result};

/// ANSI escape code for bold text (headings, strong emphasis).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code for dim text (rules, link targets).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for italic text (emphasis).
const ANSI_ITALIC: &str = "\x1b[3m";

/// ANSI escape code for strikethrough text.
const ANSI_STRIKE: &str = "\x1b[9m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (inline code).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (code blocks, informational messages).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for red text (errors).
const ANSI_RED: &str = "\x1b[31m";

/// Default redraw rate for the live region, in frames per second.
pub const DEFAULT_REFRESH_PER_SECOND: u32 = 10;

/// How streamed text is displayed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RenderStyle {
    /// Accumulate and re-parse the response as markdown on every delta.
    Markdown,

    /// Write each delta straight through.
    Plain,
}

/////////////////////////////////////////// LiveDisplay //////////////////////////////////////////

/// A repeatedly-overwritten terminal region.
///
/// The display remembers how many lines the previous frame occupied, moves
/// the cursor back up, clears, and redraws. Redraws are throttled to a
/// bounded rate; the caller's accumulator keeps every delta, so a skipped
/// frame is reflected by a later one. Output goes to an injected sink so
/// tests can capture it; by default it writes to stdout.
pub struct LiveDisplay {
    out: Box<dyn Write + Send>,
    use_color: bool,
    refresh_interval: Duration,
    lines_drawn: usize,
    last_draw: Option<Instant>,
}

impl LiveDisplay {
    /// Creates a display writing to stdout with colors enabled.
    pub fn new() -> Self {
        Self::with_sink(Box::new(io::stdout()))
    }

    /// Creates a display writing to the given sink.
    pub fn with_sink(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            use_color: true,
            refresh_interval: Duration::from_secs(1) / DEFAULT_REFRESH_PER_SECOND,
            lines_drawn: 0,
            last_draw: None,
        }
    }

    /// Sets whether ANSI colors and styles are emitted.
    pub fn with_color(mut self, use_color: bool) -> Self {
        self.use_color = use_color;
        self
    }

    /// Sets the redraw throttle rate.
    pub fn with_refresh_per_second(mut self, per_second: u32) -> Self {
        self.refresh_interval = Duration::from_secs(1) / per_second.max(1);
        self
    }

    /// Returns whether ANSI styling is enabled.
    pub fn use_color(&self) -> bool {
        self.use_color
    }

    /// Redraws the live region with a new frame, subject to the throttle.
    pub fn update(&mut self, frame: &str) {
        let now = Instant::now();
        if let Some(last) = self.last_draw
            && now.duration_since(last) < self.refresh_interval
        {
            return;
        }
        self.last_draw = Some(now);
        self.redraw(frame);
    }

    /// Redraws the live region one final time, bypassing the throttle, and
    /// leaves the frame as the terminal render.
    pub fn finish(&mut self, frame: &str) {
        self.redraw(frame);
        self.lines_drawn = 0;
        self.last_draw = None;
    }

    fn redraw(&mut self, frame: &str) {
        if self.lines_drawn > 0 {
            let _ = write!(self.out, "\x1b[{}A\r\x1b[0J", self.lines_drawn);
        }
        let _ = writeln!(self.out, "{frame}");
        self.lines_drawn = frame.split('\n').count();
        let _ = self.out.flush();
    }

    /// Writes a delta straight through, flushing immediately. Plain mode.
    pub fn print_inline(&mut self, text: &str) {
        let _ = write!(self.out, "{text}");
        let _ = self.out.flush();
    }

    /// Terminates a run of inline output with a newline.
    pub fn end_inline(&mut self) {
        let _ = writeln!(self.out);
        let _ = self.out.flush();
    }

    /// Prints a styled error diagnostic on its own line.
    pub fn print_error(&mut self, message: &str) {
        if self.use_color {
            let _ = writeln!(self.out, "\n{ANSI_RED}Error: {message}{ANSI_RESET}");
        } else {
            let _ = writeln!(self.out, "\nError: {message}");
        }
        self.lines_drawn = 0;
        let _ = self.out.flush();
    }

    /// Prints a styled informational message on its own line.
    pub fn print_info(&mut self, message: &str) {
        if self.use_color {
            let _ = writeln!(self.out, "{ANSI_YELLOW}{message}{ANSI_RESET}");
        } else {
            let _ = writeln!(self.out, "{message}");
        }
        self.lines_drawn = 0;
        let _ = self.out.flush();
    }
}

impl Default for LiveDisplay {
    fn default() -> Self {
        Self::new()
    }
}

//////////////////////////////////////// stream_to_string ////////////////////////////////////////

/// Consumes a chunk stream, rendering incrementally, and returns the full
/// concatenated response text.
///
/// Mid-stream errors from the chunk stream propagate to the caller; markdown
/// parse failures on partial accumulations are handled internally and never
/// abort the stream. When `interrupt` is set while streaming, the render
/// stops and [`Error::Abort`] is returned so the caller commits nothing.
pub async fn stream_to_string<S>(
    stream: S,
    style: RenderStyle,
    display: &mut LiveDisplay,
    interrupt: Option<&AtomicBool>,
) -> Result<String>
where
    S: Stream<Item = Result<StreamChunk>>,
{
    pin_mut!(stream);
    let mut full = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if interrupt.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(Error::abort("stream interrupted"));
        }
        let delta = chunk.extract_text();
        if delta.is_empty() {
            continue;
        }
        full.push_str(&delta);
        match style {
            RenderStyle::Markdown => {
                let frame = render_markdown(&full, display.use_color())
                    .unwrap_or_else(|| full.clone());
                display.update(&frame);
            }
            RenderStyle::Plain => {
                display.print_inline(&delta);
            }
        }
    }

    match style {
        RenderStyle::Markdown => {
            if !full.is_empty() {
                let frame = render_markdown(&full, display.use_color())
                    .unwrap_or_else(|| full.clone());
                display.finish(&frame);
            }
        }
        RenderStyle::Plain => {
            if !full.is_empty() {
                display.end_inline();
            }
        }
    }

    Ok(full)
}

//////////////////////////////////////// markdown render /////////////////////////////////////////

/// Renders a markdown document to ANSI-styled terminal text.
///
/// Returns `None` when the document does not parse; the caller falls back to
/// displaying the raw text for that frame.
pub fn render_markdown(text: &str, use_color: bool) -> Option<String> {
    let tree = to_mdast(text, &ParseOptions::default()).ok()?;
    let mut writer = MarkdownWriter::new(use_color);
    if let Some(children) = tree.children() {
        writer.blocks(children, "");
    } else {
        writer.inline(&tree);
    }
    Some(writer.finish())
}

struct MarkdownWriter {
    out: String,
    use_color: bool,
}

impl MarkdownWriter {
    fn new(use_color: bool) -> Self {
        Self {
            out: String::new(),
            use_color,
        }
    }

    fn finish(self) -> String {
        self.out.trim_end_matches('\n').to_string()
    }

    fn style(&mut self, code: &str) {
        if self.use_color {
            self.out.push_str(code);
        }
    }

    /// Renders a sequence of block-level nodes, separated by blank lines and
    /// prefixed for nesting (list indentation, quote bars).
    fn blocks(&mut self, nodes: &[Node], prefix: &str) {
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                self.out.push('\n');
                self.out.push_str(prefix.trim_end());
                self.out.push('\n');
            }
            self.block(node, prefix);
        }
    }

    fn block(&mut self, node: &Node, prefix: &str) {
        match node {
            Node::Paragraph(paragraph) => {
                self.out.push_str(prefix);
                for child in &paragraph.children {
                    self.inline(child);
                }
            }
            Node::Heading(heading) => {
                self.out.push_str(prefix);
                self.style(ANSI_BOLD);
                for _ in 0..heading.depth {
                    self.out.push('#');
                }
                self.out.push(' ');
                for child in &heading.children {
                    self.inline(child);
                }
                self.style(ANSI_RESET);
            }
            Node::Code(code) => {
                self.style(ANSI_YELLOW);
                for line in code.value.lines() {
                    self.out.push_str(prefix);
                    self.out.push_str("    ");
                    self.out.push_str(line);
                    self.out.push('\n');
                }
                // Drop the trailing newline so block separation stays uniform.
                while self.out.ends_with('\n') {
                    self.out.pop();
                }
                self.style(ANSI_RESET);
            }
            Node::Blockquote(quote) => {
                let bar = if self.use_color {
                    format!("{prefix}{ANSI_DIM}| {ANSI_RESET}")
                } else {
                    format!("{prefix}| ")
                };
                self.blocks(&quote.children, &bar);
            }
            Node::List(list) => {
                for (i, item) in list.children.iter().enumerate() {
                    if i > 0 {
                        self.out.push('\n');
                    }
                    let marker = if list.ordered {
                        format!("{}. ", list.start.unwrap_or(1) + i as u32)
                    } else {
                        "- ".to_string()
                    };
                    let item_prefix = format!("{prefix}{marker}");
                    let continuation = format!("{prefix}{}", " ".repeat(marker.len()));
                    if let Node::ListItem(list_item) = item {
                        self.list_item(&list_item.children, &item_prefix, &continuation);
                    }
                }
            }
            Node::ThematicBreak(_) => {
                self.out.push_str(prefix);
                self.style(ANSI_DIM);
                self.out.push_str("--------");
                self.style(ANSI_RESET);
            }
            Node::Html(html) => {
                self.out.push_str(prefix);
                self.out.push_str(&html.value);
            }
            other => {
                // Unknown block: render its inline content, if any.
                self.out.push_str(prefix);
                self.inline(other);
            }
        }
    }

    fn list_item(&mut self, children: &[Node], item_prefix: &str, continuation: &str) {
        for (i, child) in children.iter().enumerate() {
            if i == 0 {
                self.block(child, item_prefix);
            } else {
                self.out.push('\n');
                self.block(child, continuation);
            }
        }
        if children.is_empty() {
            self.out.push_str(item_prefix.trim_end());
        }
    }

    fn inline(&mut self, node: &Node) {
        match node {
            Node::Text(text) => self.out.push_str(&text.value),
            Node::Emphasis(emphasis) => {
                self.style(ANSI_ITALIC);
                for child in &emphasis.children {
                    self.inline(child);
                }
                self.style(ANSI_RESET);
            }
            Node::Strong(strong) => {
                self.style(ANSI_BOLD);
                for child in &strong.children {
                    self.inline(child);
                }
                self.style(ANSI_RESET);
            }
            Node::Delete(delete) => {
                self.style(ANSI_STRIKE);
                for child in &delete.children {
                    self.inline(child);
                }
                self.style(ANSI_RESET);
            }
            Node::InlineCode(code) => {
                self.style(ANSI_CYAN);
                self.out.push('`');
                self.out.push_str(&code.value);
                self.out.push('`');
                self.style(ANSI_RESET);
            }
            Node::Link(link) => {
                for child in &link.children {
                    self.inline(child);
                }
                self.style(ANSI_DIM);
                self.out.push_str(" (");
                self.out.push_str(&link.url);
                self.out.push(')');
                self.style(ANSI_RESET);
            }
            Node::Break(_) => self.out.push('\n'),
            other => {
                if let Some(children) = other.children() {
                    for child in children {
                        self.inline(child);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::{Arc, Mutex};

    /// A Write sink backed by a shared buffer, for capturing display output.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl SharedSink {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).to_string()
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture_display(sink: &SharedSink) -> LiveDisplay {
        LiveDisplay::with_sink(Box::new(sink.clone())).with_color(false)
    }

    fn chunks(texts: &[&str]) -> Vec<crate::error::Result<StreamChunk>> {
        texts.iter().map(|t| Ok(StreamChunk::from_text(*t))).collect()
    }

    #[tokio::test]
    async fn plain_returns_concatenation() {
        let sink = SharedSink::default();
        let mut display = capture_display(&sink);
        let stream = stream::iter(chunks(&["Hel", "lo", ", world"]));

        let full = stream_to_string(stream, RenderStyle::Plain, &mut display, None)
            .await
            .unwrap();
        assert_eq!(full, "Hello, world");
        assert!(sink.contents().contains("Hello, world"));
    }

    #[tokio::test]
    async fn markdown_returns_same_text_as_plain() {
        let texts = ["# Ti", "tle\n\nSome *styl", "ed* text"];

        let sink = SharedSink::default();
        let mut display = capture_display(&sink);
        let plain = stream_to_string(
            stream::iter(chunks(&texts)),
            RenderStyle::Plain,
            &mut display,
            None,
        )
        .await
        .unwrap();

        let sink = SharedSink::default();
        let mut display = capture_display(&sink);
        let md = stream_to_string(
            stream::iter(chunks(&texts)),
            RenderStyle::Markdown,
            &mut display,
            None,
        )
        .await
        .unwrap();

        assert_eq!(plain, md);
        assert_eq!(md, "# Title\n\nSome *styled* text");
    }

    #[tokio::test]
    async fn empty_chunks_are_skipped() {
        let sink = SharedSink::default();
        let mut display = capture_display(&sink);
        let items = vec![
            Ok(StreamChunk::from_text("Hel")),
            Ok(StreamChunk::default()),
            Ok(StreamChunk::from_text("lo")),
        ];

        let full = stream_to_string(
            stream::iter(items),
            RenderStyle::Plain,
            &mut display,
            None,
        )
        .await
        .unwrap();
        assert_eq!(full, "Hello");
    }

    #[tokio::test]
    async fn empty_stream_yields_empty_string() {
        let sink = SharedSink::default();
        let mut display = capture_display(&sink);
        let stream = stream::iter(Vec::<crate::error::Result<StreamChunk>>::new());

        let full = stream_to_string(stream, RenderStyle::Markdown, &mut display, None)
            .await
            .unwrap();
        assert_eq!(full, "");
    }

    #[tokio::test]
    async fn mid_stream_error_propagates() {
        let sink = SharedSink::default();
        let mut display = capture_display(&sink);
        let items = vec![
            Ok(StreamChunk::from_text("Hel")),
            Err(Error::streaming("connection reset", None)),
        ];

        let result = stream_to_string(
            stream::iter(items),
            RenderStyle::Markdown,
            &mut display,
            None,
        )
        .await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_streaming());
    }

    #[tokio::test]
    async fn interrupt_aborts_render() {
        let sink = SharedSink::default();
        let mut display = capture_display(&sink);
        let interrupt = AtomicBool::new(true);
        let stream = stream::iter(chunks(&["Hel", "lo"]));

        let result = stream_to_string(
            stream,
            RenderStyle::Plain,
            &mut display,
            Some(&interrupt),
        )
        .await;
        assert!(result.unwrap_err().is_abort());
    }

    #[tokio::test]
    async fn final_markdown_frame_is_drawn() {
        let sink = SharedSink::default();
        // Throttle everything except the final frame.
        let mut display = LiveDisplay::with_sink(Box::new(sink.clone()))
            .with_color(false)
            .with_refresh_per_second(1);
        let stream = stream::iter(chunks(&["**bo", "ld**"]));

        let full = stream_to_string(stream, RenderStyle::Markdown, &mut display, None)
            .await
            .unwrap();
        assert_eq!(full, "**bold**");
        assert!(sink.contents().contains("bold"));
    }

    #[test]
    fn render_markdown_heading_and_code() {
        let rendered = render_markdown("# Title\n\n```\nlet x = 1;\n```", false).unwrap();
        assert_eq!(rendered, "# Title\n\n    let x = 1;");
    }

    #[test]
    fn render_markdown_lists() {
        let rendered = render_markdown("- one\n- two", false).unwrap();
        assert_eq!(rendered, "- one\n- two");

        let rendered = render_markdown("1. one\n2. two", false).unwrap();
        assert_eq!(rendered, "1. one\n2. two");
    }

    #[test]
    fn render_markdown_quote() {
        let rendered = render_markdown("> quoted", false).unwrap();
        assert_eq!(rendered, "| quoted");
    }

    #[test]
    fn render_markdown_inline_styles_emit_ansi() {
        let rendered = render_markdown("**bold** and `code`", true).unwrap();
        assert!(rendered.contains(ANSI_BOLD));
        assert!(rendered.contains(ANSI_CYAN));
        assert!(rendered.contains("bold"));
        assert!(rendered.contains("`code`"));
    }

    #[test]
    fn render_markdown_partial_emphasis_still_renders() {
        // An unterminated emphasis marker is valid commonmark (literal `*`),
        // so mid-stream accumulations keep rendering.
        let rendered = render_markdown("some *styl", false).unwrap();
        assert_eq!(rendered, "some *styl");
    }

    #[test]
    fn live_display_overwrites_previous_frame() {
        let sink = SharedSink::default();
        let mut display = LiveDisplay::with_sink(Box::new(sink.clone()))
            .with_color(false)
            .with_refresh_per_second(u32::MAX);
        display.update("one");
        display.finish("one two");

        let contents = sink.contents();
        assert!(contents.contains("one"));
        assert!(contents.contains("one two"));
        // The second frame rewinds over the first.
        assert!(contents.contains("\x1b[1A"));
    }
}
