//! Record extraction: one record per call from a byte feed, according to
//! the configured [`Format`].
//!
//! The framer also owns the end-of-stream policy. A record cut short by end
//! of stream is dropped silently by default; `allow_partial_records` emits
//! it instead, and `abort_on_partial_record` escalates. Read and decode
//! failures below the framer truncate the stream unless `abort_on_error`
//! escalates them.

use crate::error::{abort_with, Error};
use crate::format::Format;
use crate::input::base::{DelimRead, Feed, Span};

/// End-of-stream policy, copied out of the cursor options.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FramePolicy {
    pub full_record_required: bool,
    pub abort_on_partial_record: bool,
    pub abort_on_error: bool,
}

/// Pulls framed records out of a [`Feed`].
pub(crate) struct Framer {
    feed: Box<dyn Feed>,
    format: Format,
    policy: FramePolicy,
}

impl Framer {
    pub fn new(feed: Box<dyn Feed>, format: Format, policy: FramePolicy) -> Framer {
        Framer { feed, format, policy }
    }

    /// Location of the next record, or `None` at end of stream. The span is
    /// valid until the next call.
    pub fn advance_span(&mut self) -> Option<Span> {
        match self.format {
            Format::Prefix => self.advance_prefix(),
            Format::Fixed(n) => self.advance_fixed(n as usize),
            Format::Delimited { delim, csv } => self.advance_delimited(delim, csv),
        }
    }

    /// Resolves a span previously produced by [`Framer::advance_span`].
    pub fn span_bytes(&self, span: Span) -> &[u8] {
        self.feed.span_bytes(span)
    }

    fn advance_prefix(&mut self) -> Option<Span> {
        let len_span = match self.feed.read(4) {
            Ok(Some(s)) => s,
            // A missing or truncated length word ends the stream.
            Ok(None) => return None,
            Err(e) => return self.stream_error(e),
        };
        let len = {
            let b = self.feed.span_bytes(len_span);
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize
        };
        if len == 0 {
            let pos = self.feed.buf().pos;
            return Some(Span::Buf { start: pos, len: 0 });
        }
        let span = match self.feed.read_partial(len) {
            Ok(s) => s,
            Err(e) => return self.stream_error(e),
        };
        if span.len() < len {
            return self.partial(span);
        }
        Some(span)
    }

    fn advance_fixed(&mut self, n: usize) -> Option<Span> {
        let span = match self.feed.read_partial(n) {
            Ok(s) => s,
            Err(e) => return self.stream_error(e),
        };
        if span.len() == 0 {
            return None;
        }
        if span.len() < n {
            return self.partial(span);
        }
        Some(span)
    }

    fn advance_delimited(&mut self, delim: u8, csv: bool) -> Option<Span> {
        match self.feed.read_delimited(delim, csv) {
            Ok(DelimRead::Found(span)) => Some(span),
            Ok(DelimRead::Tail(span)) => self.partial(span),
            Ok(DelimRead::End) => None,
            Err(e) => self.stream_error(e),
        }
    }

    /// A record cut short by end of stream.
    fn partial(&self, span: Span) -> Option<Span> {
        if self.policy.abort_on_partial_record {
            abort_with(&Error::PartialRecord);
        }
        if self.policy.full_record_required {
            None
        } else {
            Some(span)
        }
    }

    /// A read or decode failure below the framing layer.
    fn stream_error(&self, e: Error) -> Option<Span> {
        if self.policy.abort_on_error {
            abort_with(&e);
        }
        crate::progress::note(2, &format!("recio: input truncated: {e}"));
        None
    }
}
