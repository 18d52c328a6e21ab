//! Widget injection into proxied HTML.
//!
//! # Streaming
//!
//! ```text
//! chunk ──► buffer ──► "</body>" found? ──yes──► emit head + tag + tail, pass the rest through
//!                          │
//!                          no ──► over threshold? ──yes──► emit all but the last 6 bytes
//! end of body ──► tag not inserted yet? append it
//! ```
//!
//! The injector is created per response, so the tag lands at most once in
//! any single response body.

use bytes::{Bytes, BytesMut};

/// Script reference inserted into every HTML page.
pub const WIDGET_TAG: &str = r#"<script src="/buildover/widget.js"></script>"#;

/// Buffered bytes are flushed once they exceed this without a marker.
pub const FLUSH_THRESHOLD: usize = 100_000;

const MARKER: &[u8] = b"</body>";

pub struct HtmlInjector {
    tag: Bytes,
    buffer: BytesMut,
    injected: bool,
}

impl HtmlInjector {
    pub fn new() -> Self {
        Self::with_tag(WIDGET_TAG)
    }

    pub fn with_tag(tag: &str) -> Self {
        Self {
            tag: Bytes::copy_from_slice(tag.as_bytes()),
            buffer: BytesMut::new(),
            injected: false,
        }
    }

    pub fn is_injected(&self) -> bool {
        self.injected
    }

    /// Feed one upstream chunk. Returns the bytes that are ready to send.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Bytes> {
        if self.injected {
            return (!chunk.is_empty()).then(|| Bytes::copy_from_slice(chunk));
        }

        self.buffer.extend_from_slice(chunk);

        if let Some(pos) = find_marker(&self.buffer) {
            let tail = self.buffer.split_off(pos);
            let mut out = BytesMut::with_capacity(self.buffer.len() + self.tag.len() + tail.len());
            out.extend_from_slice(&self.buffer);
            out.extend_from_slice(&self.tag);
            out.extend_from_slice(&tail);
            self.buffer.clear();
            self.injected = true;
            return Some(out.freeze());
        }

        if self.buffer.len() > FLUSH_THRESHOLD {
            // A marker may start in the retained bytes
            let keep = MARKER.len() - 1;
            let ready = self.buffer.split_to(self.buffer.len() - keep);
            return Some(ready.freeze());
        }

        None
    }

    /// End of body: emit what is left, appending the tag if no marker was seen.
    pub fn finish(&mut self) -> Option<Bytes> {
        let mut out = std::mem::take(&mut self.buffer);
        if !self.injected {
            out.extend_from_slice(&self.tag);
            self.injected = true;
        }
        (!out.is_empty()).then(|| out.freeze())
    }
}

impl Default for HtmlInjector {
    fn default() -> Self {
        Self::new()
    }
}

/// Whole-document form of [`HtmlInjector`].
pub fn inject_widget(html: &[u8]) -> Bytes {
    let mut injector = HtmlInjector::new();
    let mut out = BytesMut::new();
    if let Some(head) = injector.push(html) {
        out.extend_from_slice(&head);
    }
    if let Some(rest) = injector.finish() {
        out.extend_from_slice(&rest);
    }
    out.freeze()
}

/// ASCII case-insensitive search for `</body>`.
fn find_marker(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(MARKER.len())
        .position(|window| window.eq_ignore_ascii_case(MARKER))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn run(chunks: &[&[u8]]) -> Vec<u8> {
        let mut injector = HtmlInjector::new();
        let mut out = Vec::new();
        for chunk in chunks {
            if let Some(bytes) = injector.push(chunk) {
                out.extend_from_slice(&bytes);
            }
        }
        if let Some(bytes) = injector.finish() {
            out.extend_from_slice(&bytes);
        }
        out
    }

    fn count_tags(body: &[u8]) -> usize {
        String::from_utf8_lossy(body).matches(WIDGET_TAG).count()
    }

    #[test]
    fn inserts_before_body_close() {
        let out = inject_widget(b"<html><body><p>hi</p></body></html>");
        assert_eq!(
            String::from_utf8(out.to_vec()).unwrap(),
            format!("<html><body><p>hi</p>{WIDGET_TAG}</body></html>")
        );
    }

    #[test]
    fn appends_when_marker_missing() {
        let out = inject_widget(b"<p>fragment</p>");
        assert_eq!(
            String::from_utf8(out.to_vec()).unwrap(),
            format!("<p>fragment</p>{WIDGET_TAG}")
        );
    }

    #[test]
    fn only_first_marker_gets_the_tag() {
        let out = run(&[b"<body>a</body>", b"<body>b</body>"]);
        assert_eq!(count_tags(&out), 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(&format!("<body>a{WIDGET_TAG}</body>")));
    }

    #[test]
    fn marker_split_across_chunks() {
        let out = run(&[b"<body>hello</bo", b"dy></html>"]);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("<body>hello{WIDGET_TAG}</body></html>")
        );
    }

    #[test]
    fn marker_match_ignores_case() {
        let out = inject_widget(b"<BODY>x</BODY>");
        assert_eq!(
            String::from_utf8(out.to_vec()).unwrap(),
            format!("<BODY>x{WIDGET_TAG}</BODY>")
        );
    }

    #[test]
    fn large_document_is_flushed_before_the_marker() {
        let mut injector = HtmlInjector::new();
        let filler = vec![b'a'; FLUSH_THRESHOLD + 10];

        let flushed = injector.push(&filler).unwrap();
        assert_eq!(flushed.len(), filler.len() - (MARKER.len() - 1));
        assert!(!injector.is_injected());

        // The retained tail plus this chunk completes the marker
        let mut out = flushed.to_vec();
        out.extend_from_slice(&injector.push(b"</body>").unwrap());
        assert!(injector.finish().is_none());

        assert_eq!(out.len(), filler.len() + MARKER.len() + WIDGET_TAG.len());
        assert_eq!(count_tags(&out), 1);
        assert!(out.ends_with(format!("{WIDGET_TAG}</body>").as_bytes()));
    }

    #[test]
    fn marker_straddling_a_flush_boundary_is_found() {
        let mut first = vec![b'a'; FLUSH_THRESHOLD];
        first.extend_from_slice(b"</bo");
        let out = run(&[&first, b"dy>"]);
        assert_eq!(count_tags(&out), 1);
        assert!(out.ends_with(format!("{WIDGET_TAG}</body>").as_bytes()));
    }

    #[test]
    fn after_injection_chunks_pass_through() {
        let mut injector = HtmlInjector::new();
        injector.push(b"<body></body>").unwrap();
        assert_eq!(injector.push(b"tail").unwrap(), Bytes::from_static(b"tail"));
        assert!(injector.push(b"").is_none());
        assert!(injector.finish().is_none());
    }

    #[test]
    fn empty_body_still_gets_the_tag() {
        assert_eq!(run(&[]), WIDGET_TAG.as_bytes());
    }
}
