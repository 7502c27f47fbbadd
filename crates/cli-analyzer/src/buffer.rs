//! Lazy token buffer: the analyzer's external collaborator, per §6. The
//! distilled spec treats this as something the embedder supplies; this
//! crate defines the trait plus one in-memory reference implementation
//! (`VecTokenBuffer`) so the analyzer is testable and usable stand-alone.
//!
//! Departure from the Python original worth noting: there, `buffer.next()`
//! returns a token object carrying its own `apply()` method, so the caller
//! decides per-peek whether to commit. Rust has no convenient way to hand
//! out a borrowed "commit handle" without fighting the borrow checker for no
//! behavioral gain, so here `next` peeks and caches, and a separate
//! `apply()` on the buffer itself commits the most recent peek. Observable
//! behavior is identical; only the method lives on a different receiver.

use crate::error::OutOfData;

/// One token's payload. `Str` is the common case (an unquoted word); `Quoted`
/// preserves a token that was wrapped in quotes by the input syntax (still a
/// string once resolved, but capture strategies may treat it differently);
/// `Opaque` carries a value that was pushed in programmatically rather than
/// parsed from text (e.g. by an embedder pre-binding arguments).
#[derive(Debug, Clone)]
pub enum TokenValue {
    Str(String),
    Quoted(String),
    Opaque(std::sync::Arc<dyn std::any::Any + Send + Sync>),
}

impl TokenValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TokenValue::Str(s) | TokenValue::Quoted(s) => Some(s),
            TokenValue::Opaque(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            TokenValue::Str(_) => "str",
            TokenValue::Quoted(_) => "quoted",
            TokenValue::Opaque(_) => "opaque",
        }
    }
}

/// A source of tokens the analyzer consumes one at a time. `next` is
/// peek-like: repeated calls with no intervening `apply()` return the same
/// token. Pushed-back text (`pushleft`/`add_to_ahead`) is re-split lazily the
/// next time `next` is called, against whatever separator set is passed
/// then — separators are a property of the *call site* (command vs. option
/// context), not of the buffer.
pub trait TokenBuffer {
    /// Peek the next token, splitting raw text on the first occurrence of
    /// any character in `separators`. Returns the same cached token on
    /// repeated calls until `apply()` is called.
    fn next(&mut self, separators: &str) -> Result<TokenValue, OutOfData>;

    /// Commit the most recently peeked token. A no-op if nothing has been
    /// peeked since the last `apply`.
    fn apply(&mut self);

    /// The first character of the next raw string segment, for prefix-trie
    /// probing. `None` if the buffer is exhausted or the next segment isn't
    /// a string.
    fn first(&self) -> Option<char>;

    /// Push text back onto the front of the buffer, to be re-split on the
    /// next `next()` call.
    fn pushleft(&mut self, value: String);

    /// Push a leftover tail (e.g. from a regex capture or a compact-header
    /// split) just ahead of the rest of the buffer.
    fn add_to_ahead(&mut self, value: String);
}

enum Segment {
    Raw(String),
    Resolved(TokenValue),
}

/// Straightforward reference [`TokenBuffer`] over an in-memory queue of
/// segments. Good enough for tests and doctests; real embedders wrap
/// whatever their own input source looks like.
pub struct VecTokenBuffer {
    queue: std::collections::VecDeque<Segment>,
    pending: Option<(TokenValue, Option<String>)>,
}

impl VecTokenBuffer {
    pub fn new(words: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            queue: words.into_iter().map(|w| Segment::Raw(w.into())).collect(),
            pending: None,
        }
    }

    pub fn push_opaque(&mut self, value: std::sync::Arc<dyn std::any::Any + Send + Sync>) {
        self.queue.push_back(Segment::Resolved(TokenValue::Opaque(value)));
    }
}

impl TokenBuffer for VecTokenBuffer {
    fn next(&mut self, separators: &str) -> Result<TokenValue, OutOfData> {
        if let Some((value, _)) = &self.pending {
            return Ok(value.clone());
        }

        let Some(front) = self.queue.pop_front() else { return Err(OutOfData) };

        match front {
            Segment::Resolved(value) => {
                self.pending = Some((value.clone(), None));
                Ok(value)
            }
            Segment::Raw(text) => {
                let split_at = text.find(|c: char| separators.contains(c));
                let (head, tail) = match split_at {
                    Some(idx) => (text[..idx].to_string(), Some(text[idx + 1..].to_string())),
                    None => (text, None),
                };
                let value = TokenValue::Str(head);
                self.pending = Some((value.clone(), tail));
                Ok(value)
            }
        }
    }

    fn apply(&mut self) {
        if let Some((_, tail)) = self.pending.take() {
            if let Some(tail) = tail {
                if !tail.is_empty() {
                    self.queue.push_front(Segment::Raw(tail));
                }
            }
        }
    }

    fn first(&self) -> Option<char> {
        if let Some((value, _)) = &self.pending {
            return value.as_str().and_then(|s| s.chars().next());
        }
        match self.queue.front()? {
            Segment::Raw(text) => text.chars().next(),
            Segment::Resolved(value) => value.as_str().and_then(|s| s.chars().next()),
        }
    }

    fn pushleft(&mut self, value: String) {
        self.queue.push_front(Segment::Raw(value));
    }

    fn add_to_ahead(&mut self, value: String) {
        self.queue.push_front(Segment::Raw(value));
    }
}
