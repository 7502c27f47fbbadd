//! The mutable runtime partner of a fragment list (a [`Track`]), and the
//! flat assignment map plus per-path bookkeeping that collects everything a
//! parse has captured (a [`Mix`]). Grounded on `core/model/mix.py`.

use std::collections::{HashMap, HashSet};

use crate::buffer::TokenBuffer;
use crate::error::{CaptureRejected, FragmentError, ParsePanic, ValidateRejected};
use crate::fragment::{assert_fragments_order, Fragment, FragmentGroup};
use crate::value::Value;

/// Everything a fragment-capture attempt can fail with. [`ParsePanic`] is
/// the one variant that isn't converted into a loop rejection — it
/// propagates out of [`crate::analyzer::analyze_loopflow`] directly.
pub enum TrackError {
    Rejected(FragmentError),
    Panic(ParsePanic),
    /// The buffer ran dry mid-capture — distinct from a fragment rejection
    /// so the loop can report `expect_forward_subcommand`/`expect_forward_option`.
    OutOfData,
}

impl From<CaptureRejected> for TrackError {
    fn from(e: CaptureRejected) -> Self {
        TrackError::Rejected(FragmentError::Capture(e))
    }
}

impl From<ValidateRejected> for TrackError {
    fn from(e: ValidateRejected) -> Self {
        TrackError::Rejected(FragmentError::Validate(e))
    }
}

/// The runtime cursor over a fragment list: either a subcommand's
/// positional fragments, or one option's fragments.
#[derive(Clone)]
pub struct Track {
    pub fragments: Vec<Fragment>,
    pub header: Option<Fragment>,
    pub cursor: usize,
    pub max_length: usize,
    pub emitted: bool,
}

impl Track {
    pub fn new(fragments: Vec<Fragment>, header: Option<Fragment>) -> Self {
        assert_fragments_order(&fragments);
        let max_length = fragments.len();
        Self { fragments, header, cursor: 0, max_length, emitted: false }
    }

    pub fn satisfied(&self) -> bool {
        self.cursor >= self.max_length
            || self.fragments[self.cursor].default.is_some()
            || self.fragments[self.cursor].variadic
    }

    pub fn assignable(&self) -> bool {
        self.cursor < self.max_length
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// A fresh copy of this track's shape — used when seeding a brand-new
    /// command/option track from a pattern's preset.
    pub fn fresh_copy(&self) -> Track {
        Track {
            fragments: self.fragments.clone(),
            header: self.header.clone(),
            cursor: 0,
            max_length: self.max_length,
            emitted: false,
        }
    }

    /// Fills in defaults for every still-unassigned fragment, and resolves a
    /// trailing variadic fragment to an empty list if it never captured
    /// anything.
    pub fn complete(&self, mix: &mut Mix) {
        if let Some(header) = &self.header {
            if !mix.assignes.contains_key(&header.name) {
                if let Some(default) = &header.default {
                    mix.assignes.insert(header.name.clone(), default.clone());
                }
            }
        }

        if self.cursor >= self.max_length {
            return;
        }

        for frag in &self.fragments[self.cursor..] {
            if mix.assignes.contains_key(&frag.name) {
                continue;
            }
            if let Some(default) = &frag.default {
                mix.assignes.insert(frag.name.clone(), default.clone());
            } else if let Some(factory) = &frag.default_factory {
                mix.assignes.insert(frag.name.clone(), factory());
            }
        }

        if let Some(last) = self.fragments.last() {
            if last.variadic && !mix.assignes.contains_key(&last.name) {
                mix.assignes.insert(last.name.clone(), Value::List(Vec::new()));
            }
        }
    }

    /// Rejects the capture outright if `group` was already closed off by an
    /// earlier fragment in the same group family.
    fn group_check(group: &Option<FragmentGroup>, mix: &Mix) -> Result<(), CaptureRejected> {
        if let Some(group) = group {
            if mix.rejected_group.contains(group.ident()) {
                return Err(CaptureRejected::GroupRejected { group: group.ident().to_string() });
            }
        }
        Ok(())
    }

    /// Once a grouped fragment captures successfully, closes off the
    /// sibling groups it rejects.
    fn group_commit(group: &Option<FragmentGroup>, mix: &mut Mix) {
        if let Some(group) = group {
            mix.rejected_group.extend(group.rejects.iter().cloned());
        }
    }

    fn effective_separators(frag: &Fragment, upper: &str) -> String {
        match &frag.separators {
            Some(own) if frag.hybrid_separators => format!("{own}{upper}"),
            Some(own) => own.clone(),
            None => upper.to_string(),
        }
    }

    /// Runs one fragment's capture → validate → transform → receive
    /// pipeline, merges the result into `mix`, and commits the consumed
    /// token(s) to `buffer`.
    fn run_pipeline(
        frag: &Fragment,
        mix: &mut Mix,
        buffer: &mut dyn TokenBuffer,
        separators: &str,
    ) -> Result<Value, TrackError> {
        Self::group_check(&frag.group, mix)?;

        let prev = mix.assignes.get(&frag.name).cloned();

        let mut panic: Option<ParsePanic> = None;
        let mut rejection: Option<FragmentError> = None;
        let mut out_of_data = false;
        let mut tail: Option<String> = None;

        let mut fetch = || -> Value {
            let (raw, leftover) = match frag.capture.capture(buffer, separators) {
                Ok(pair) => pair,
                Err(CaptureRejected::OutOfData) => {
                    out_of_data = true;
                    return Value::Str(String::new());
                }
                Err(e) => {
                    rejection = Some(FragmentError::Capture(e));
                    return Value::Str(String::new());
                }
            };
            tail = leftover;

            if let Some(validator) = &frag.validator {
                if !validator(&raw) {
                    rejection =
                        Some(FragmentError::Validate(ValidateRejected { field: frag.name.clone(), value: format!("{raw:?}") }));
                    return Value::Str(String::new());
                }
            }

            match &frag.transformer {
                Some(transformer) => match transformer(raw) {
                    Ok(v) => v,
                    Err(source) => {
                        panic = Some(ParsePanic::Transform { field: frag.name.clone(), source });
                        Value::Str(String::new())
                    }
                },
                None => raw,
            }
        };

        let received = frag.receiver.receive(&mut fetch, prev.as_ref());

        if out_of_data {
            return Err(TrackError::OutOfData);
        }
        if let Some(p) = panic {
            return Err(TrackError::Panic(p));
        }
        if let Some(r) = rejection {
            return Err(TrackError::Rejected(r));
        }

        if let Some(tail) = tail {
            if !tail.is_empty() {
                buffer.add_to_ahead(tail);
            }
        }
        buffer.apply();
        Self::group_commit(&frag.group, mix);

        Ok(received)
    }

    /// Captures the current fragment (if any). Returns `Ok(None)` when the
    /// cursor is already past the end — the caller decides what that means
    /// (`unexpected_segment` in COMMAND, fall back to COMMAND in OPTION).
    pub fn forward(
        &mut self,
        mix: &mut Mix,
        buffer: &mut dyn TokenBuffer,
        separators: &str,
    ) -> Result<Option<String>, TrackError> {
        if self.cursor >= self.max_length {
            return Ok(None);
        }

        let frag = self.fragments[self.cursor].clone();
        let effective = Self::effective_separators(&frag, separators);
        let received = Self::run_pipeline(&frag, mix, buffer, &effective)?;

        if frag.variadic {
            let mut list = mix.assignes.get(&frag.name).and_then(Value::as_list).map(<[Value]>::to_vec).unwrap_or_default();
            list.push(received);
            mix.assignes.insert(frag.name.clone(), Value::List(list));
        } else {
            mix.assignes.insert(frag.name.clone(), received);
            self.cursor += 1;
        }

        Ok(Some(frag.name))
    }

    /// Runs the header fragment's pipeline against a raw token segment
    /// (already matched by the caller — no buffer read happens here).
    pub fn emit_header(&mut self, mix: &mut Mix, segment: &str) -> Result<(), TrackError> {
        self.emitted = true;

        let Some(header) = self.header.clone() else { return Ok(()) };
        Self::group_check(&header.group, mix)?;
        let prev = mix.assignes.get(&header.name).cloned();

        let value = if let Some(validator) = &header.validator {
            if !validator(&Value::Str(segment.to_string())) {
                return Err(ValidateRejected { field: header.name.clone(), value: segment.to_string() }.into());
            }
            Value::Str(segment.to_string())
        } else {
            Value::Str(segment.to_string())
        };

        let value = match &header.transformer {
            Some(transformer) => transformer(value)
                .map_err(|source| TrackError::Panic(ParsePanic::Transform { field: header.name.clone(), source }))?,
            None => value,
        };

        let mut once = Some(value);
        let mut fetch = move || once.take().expect("receive calls fetch at most once");
        let received = header.receiver.receive(&mut fetch, prev.as_ref());
        mix.assignes.insert(header.name.clone(), received);
        Self::group_commit(&header.group, mix);

        Ok(())
    }
}

/// A pattern's fixed shape: the subcommand's own fragment track, plus one
/// track per option keyword.
pub struct Preset {
    pub subcommand_track: Track,
    pub option_tracks: HashMap<String, Track>,
}

impl Preset {
    pub fn new(subcommand_track: Track, option_tracks: HashMap<String, Track>) -> Self {
        for track in option_tracks.values() {
            assert_fragments_order(&track.fragments);
        }
        Self { subcommand_track, option_tracks }
    }
}

/// The flat assignment map plus one track per traversed command path and
/// one per `(path, keyword)` option pair.
#[derive(Default)]
pub struct Mix {
    pub assignes: HashMap<String, Value>,
    pub command_tracks: HashMap<Vec<String>, Track>,
    pub option_tracks: HashMap<(Vec<String>, String), Track>,
    /// Group idents closed off by an earlier fragment capture in the same
    /// family — any fragment whose group is in this set is rejected before
    /// it even attempts to read from the buffer.
    pub rejected_group: HashSet<String>,
}

impl Mix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete(&mut self) {
        let paths: Vec<Vec<String>> = self.command_tracks.keys().cloned().collect();
        for path in paths {
            let track = self.command_tracks.get(&path).expect("path just listed").clone();
            track.complete(self);
        }
    }

    pub fn satisfied(&self) -> bool {
        self.command_tracks.values().all(Track::satisfied) && self.option_tracks.values().all(Track::satisfied)
    }

    pub fn update(&mut self, root: Vec<String>, preset: &Preset) {
        self.command_tracks.insert(root.clone(), preset.subcommand_track.fresh_copy());
        for (keyword, track) in &preset.option_tracks {
            self.option_tracks.insert((root.clone(), keyword.clone()), track.fresh_copy());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::VecTokenBuffer;

    fn name_fragment(name: &str) -> Fragment {
        Fragment::new(name)
    }

    #[test]
    fn forward_assigns_then_advances_cursor() {
        let mut track = Track::new(vec![name_fragment("a"), name_fragment("b")], None);
        let mut mix = Mix::new();
        let mut buffer = VecTokenBuffer::new(["x", "y"]);

        track.forward(&mut mix, &mut buffer, " ").unwrap();
        track.forward(&mut mix, &mut buffer, " ").unwrap();

        assert_eq!(mix.assignes.get("a").unwrap().as_str(), Some("x"));
        assert_eq!(mix.assignes.get("b").unwrap().as_str(), Some("y"));
        assert!(track.satisfied());
    }

    #[test]
    fn variadic_fragment_accumulates_without_advancing() {
        let mut track = Track::new(vec![name_fragment("rest").variadic()], None);
        let mut mix = Mix::new();
        let mut buffer = VecTokenBuffer::new(["a", "b", "c"]);

        track.forward(&mut mix, &mut buffer, " ").unwrap();
        track.forward(&mut mix, &mut buffer, " ").unwrap();
        track.forward(&mut mix, &mut buffer, " ").unwrap();

        let list = mix.assignes.get("rest").unwrap().as_list().unwrap();
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].as_str(), Some("a"));
        assert_eq!(list[2].as_str(), Some("c"));
    }

    #[test]
    fn complete_fills_defaults_and_empty_variadic() {
        let track = Track::new(
            vec![name_fragment("a").default_value(Value::Str("fallback".into())), name_fragment("rest").variadic()],
            None,
        );
        let mut mix = Mix::new();
        track.complete(&mut mix);

        assert_eq!(mix.assignes.get("a").unwrap().as_str(), Some("fallback"));
        assert_eq!(mix.assignes.get("rest").unwrap().as_list().unwrap().len(), 0);
    }
}
