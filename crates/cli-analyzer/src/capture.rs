//! Capture strategies read one token out of the buffer and turn it into a
//! [`Value`]. Grounded on `core/model/capture.py`'s `Capture` hierarchy.
//!
//! A capture may report a leftover tail (second element of the returned
//! tuple) that the caller re-queues via `buffer.add_to_ahead` — used by
//! [`RegexCapture`] when the match doesn't consume the whole token.

use regex::Regex;

use crate::buffer::{TokenBuffer, TokenValue};
use crate::error::CaptureRejected;
use crate::value::Value;

pub type CaptureResult = Result<(Value, Option<String>), CaptureRejected>;

pub trait Capture: Send + Sync {
    fn capture(&self, buffer: &mut dyn TokenBuffer, separators: &str) -> CaptureResult;
}

fn plain_string(token: &TokenValue) -> Result<&str, CaptureRejected> {
    token.as_str().ok_or(CaptureRejected::UnexpectedType { expected: "str", got: token.type_name() })
}

/// Accepts whatever the buffer hands back, without inspecting its shape.
pub struct SimpleCapture;

impl Capture for SimpleCapture {
    fn capture(&self, buffer: &mut dyn TokenBuffer, separators: &str) -> CaptureResult {
        let token = buffer.next(separators).map_err(|_| CaptureRejected::OutOfData)?;
        let value = match &token {
            TokenValue::Str(s) => Value::Str(s.clone()),
            TokenValue::Quoted(s) => Value::Str(s.clone()),
            TokenValue::Opaque(v) => Value::Opaque(v.clone()),
        };
        Ok((value, None))
    }
}

/// Requires the token to be a plain or quoted string (rejects `Opaque`).
pub struct PlainCapture;

impl Capture for PlainCapture {
    fn capture(&self, buffer: &mut dyn TokenBuffer, separators: &str) -> CaptureResult {
        let token = buffer.next(separators).map_err(|_| CaptureRejected::OutOfData)?;
        let s = plain_string(&token)?;
        Ok((Value::Str(s.to_string()), None))
    }
}

/// Requires the token to be `Opaque` carrying a value of type `T`.
pub struct ObjectCapture<T> {
    expected: &'static str,
    _marker: std::marker::PhantomData<T>,
}

impl<T> ObjectCapture<T> {
    pub fn new(expected: &'static str) -> Self {
        Self { expected, _marker: std::marker::PhantomData }
    }
}

impl<T: Send + Sync + 'static> Capture for ObjectCapture<T> {
    fn capture(&self, buffer: &mut dyn TokenBuffer, separators: &str) -> CaptureResult {
        let token = buffer.next(separators).map_err(|_| CaptureRejected::OutOfData)?;
        match token {
            TokenValue::Opaque(v) if v.downcast_ref::<T>().is_some() => Ok((Value::Opaque(v), None)),
            other => Err(CaptureRejected::UnexpectedType { expected: self.expected, got: other.type_name() }),
        }
    }
}

/// Matches the token (which must be a plain/quoted string) against a regex.
/// Whatever the match doesn't consume becomes the leftover tail.
pub struct RegexCapture {
    pattern: Regex,
    match_quote: bool,
}

impl RegexCapture {
    pub fn new(pattern: Regex) -> Self {
        Self { pattern, match_quote: false }
    }

    pub fn match_quote(mut self, match_quote: bool) -> Self {
        self.match_quote = match_quote;
        self
    }
}

impl Capture for RegexCapture {
    fn capture(&self, buffer: &mut dyn TokenBuffer, separators: &str) -> CaptureResult {
        let token = buffer.next(separators).map_err(|_| CaptureRejected::OutOfData)?;

        let raw = match &token {
            TokenValue::Str(s) => s.as_str(),
            TokenValue::Quoted(s) if self.match_quote => s.as_str(),
            other => return Err(CaptureRejected::UnexpectedType { expected: "str", got: other.type_name() }),
        };

        let Some(m) = self.pattern.find(raw) else {
            return Err(CaptureRejected::RegexMismatch { pattern: self.pattern.as_str().to_string(), raw: raw.to_string() });
        };
        if m.start() != 0 {
            return Err(CaptureRejected::RegexMismatch { pattern: self.pattern.as_str().to_string(), raw: raw.to_string() });
        }

        let matched = m.as_str().to_string();
        let tail = raw[m.end()..].to_string();
        let tail = if tail.is_empty() { None } else { Some(tail) };

        Ok((Value::Str(matched), tail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::VecTokenBuffer;

    #[test]
    fn plain_capture_reads_a_word() {
        let mut buf = VecTokenBuffer::new(["alice"]);
        let (value, tail) = PlainCapture.capture(&mut buf, " ").unwrap();
        assert_eq!(value.as_str(), Some("alice"));
        assert!(tail.is_none());
    }

    #[test]
    fn regex_capture_reports_unmatched_tail() {
        let mut buf = VecTokenBuffer::new(["123abc"]);
        let re = Regex::new(r"^\d+").unwrap();
        let (value, tail) = RegexCapture::new(re).capture(&mut buf, " ").unwrap();
        assert_eq!(value.as_str(), Some("123"));
        assert_eq!(tail.as_deref(), Some("abc"));
    }

    #[test]
    fn regex_capture_rejects_non_matching_input() {
        let mut buf = VecTokenBuffer::new(["abc"]);
        let re = Regex::new(r"^\d+").unwrap();
        assert!(RegexCapture::new(re).capture(&mut buf, " ").is_err());
    }
}
