//! The analyzer's running state: what stage of the state machine it's in,
//! which command path it has traversed, which options are still pending,
//! and the [`Mix`] accumulating captured values. Grounded on
//! `core/model/snapshot.py`.

use std::collections::HashMap;

use crate::error::FragmentError;
use crate::mix::{Mix, TrackError};
use crate::pattern::{OptionPattern, SubcommandPattern};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    Prefix,
    Header,
    Command,
    Option,
}

/// A pinned reference to `(owner path, keyword)` while the loop is inside
/// that option's own fragment track.
pub type ActiveOption = (Vec<String>, String);

pub struct AnalyzeSnapshot<'p> {
    pub state: ProcessingState,
    pub command: Vec<String>,
    pub option: Option<ActiveOption>,

    pub mix: Mix,
    pub endpoint: Option<Vec<String>>,
    pub traverses: HashMap<Vec<String>, &'p SubcommandPattern>,
    /// Owner paths in traversal order (parent before child) — `get_option`
    /// and `stage_satisfied` depend on this order for a deterministic
    /// parent-first match when a forwarding parent option and a child option
    /// both match the same token.
    pub available_options: Vec<(Vec<String>, Vec<&'p OptionPattern>)>,

    /// Set when the most recent fragment pipeline failed with a
    /// `FragmentError` rather than a pure grammar mismatch — consumed by
    /// the caller to build a [`crate::error::Rejected`] with a cause.
    pub last_rejection: Option<FragmentError>,
}

impl<'p> AnalyzeSnapshot<'p> {
    pub fn new(root: &'p SubcommandPattern, state: ProcessingState) -> Self {
        let path = vec![root.header.clone()];
        let mut traverses = HashMap::new();
        traverses.insert(path.clone(), root);

        let mut mix = Mix::new();
        mix.update(path.clone(), &root.preset);

        let mut snapshot = Self {
            state,
            command: path.clone(),
            option: None,
            mix,
            endpoint: None,
            traverses,
            available_options: Vec::new(),
            last_rejection: None,
        };
        snapshot.options_enter(path, root);
        snapshot
    }

    pub fn context(&self) -> &'p SubcommandPattern {
        self.traverses[&self.command]
    }

    fn options_enter(&mut self, owner: Vec<String>, pattern: &'p SubcommandPattern) {
        self.available_options.retain(|(o, _)| o != &owner);
        self.available_options.push((owner, pattern.options.iter().collect()));
    }

    /// Prunes the owning path's pending options down to forwarding-only,
    /// called on leaving a subcommand for one of its children.
    fn options_exit(&mut self, owner: &[String]) {
        if let Some((_, options)) = self.available_options.iter_mut().find(|(o, _)| o == owner) {
            options.retain(|opt| opt.forwarding);
        }
    }

    pub fn enter_subcommand(&mut self, trigger: &str, pattern: &'p SubcommandPattern) -> Result<(), TrackError> {
        self.options_exit(&self.command.clone());

        self.command.push(pattern.header.clone());
        self.state = ProcessingState::Command;
        self.option = None;

        let key = self.command.clone();
        self.traverses.insert(key.clone(), pattern);
        self.mix.update(key.clone(), &pattern.preset);

        let mut track = self.mix.command_tracks.remove(&key).expect("just inserted");
        let result = track.emit_header(&mut self.mix, trigger);
        self.mix.command_tracks.insert(key.clone(), track);
        result?;

        self.options_enter(key, pattern);
        Ok(())
    }

    /// Returns `Ok(true)` on entry, `Ok(false)` if blocked by
    /// `option_duplicated_prohibited`.
    pub fn enter_option(
        &mut self,
        trigger: &str,
        owner: Vec<String>,
        keyword: &str,
        pattern: &OptionPattern,
    ) -> Result<bool, TrackError> {
        let key = (owner.clone(), keyword.to_string());
        let already_emitted = self.mix.option_tracks.get(&key).map(|t| t.emitted).unwrap_or(false);
        if already_emitted && !pattern.allow_duplicate {
            return Ok(false);
        }

        let mut track = self.mix.option_tracks.remove(&key).expect("option track seeded at subcommand entry");
        let result = track.emit_header(&mut self.mix, trigger);

        let has_fragments = !track.fragments.is_empty();
        if has_fragments {
            track.reset();
        }
        self.mix.option_tracks.insert(key.clone(), track);
        result?;

        if has_fragments {
            self.state = ProcessingState::Option;
            self.option = Some(key);
        }

        Ok(true)
    }

    pub fn determined(&self) -> bool {
        self.endpoint.is_some()
    }

    /// True when the current command's own track is satisfied and every
    /// non-forwarding option across every traversed path is also satisfied.
    pub fn stage_satisfied(&self) -> bool {
        let command_satisfied = self.mix.command_tracks[&self.command].satisfied();
        if !command_satisfied {
            return false;
        }

        for (owner, options) in &self.available_options {
            for option in options {
                if !option.forwarding {
                    let satisfied = self.mix.option_tracks[&(owner.clone(), option.keyword.clone())].satisfied();
                    if !satisfied {
                        return false;
                    }
                }
            }
        }

        true
    }

    pub fn determine(&mut self) {
        self.state = ProcessingState::Command;
        self.endpoint = Some(self.command.clone());
    }

    pub fn get_subcommand(&self, token: &str) -> Option<(&'p SubcommandPattern, Option<String>)> {
        let context = self.context();
        if let Some(pattern) = context.find_subcommand(token) {
            return Some((pattern, None));
        }
        context.find_compact_subcommand(token).map(|(pattern, tail)| (pattern, Some(tail.to_string())))
    }

    /// Scans pending options for `token`, in registration order, trying
    /// exact/compact-prefix match before header-separator split for each
    /// option — mirroring the original's per-option check ordering.
    pub fn get_option(&self, token: &str) -> Option<(&'p OptionPattern, Vec<String>, Option<String>)> {
        let mut split_cache: HashMap<&str, (String, Option<String>)> = HashMap::new();

        for (owner, options) in &self.available_options {
            for option in options {
                if option.compact_header {
                    if let Some(prefix) = option.triggers_compact_prefix(token) {
                        return Some((option, owner.clone(), Some(token[prefix.len()..].to_string())));
                    }
                } else if option.triggers_exact(token) {
                    return Some((option, owner.clone(), None));
                }

                if let Some(sep) = &option.header_separators {
                    let (keyword, tail) = split_cache.entry(sep).or_insert_with(|| match token.split_once(sep.as_str()) {
                        Some((k, t)) => (k.to_string(), Some(t.to_string())),
                        None => (token.to_string(), None),
                    });

                    if option.triggers_exact(keyword) {
                        return Some((option, owner.clone(), tail.clone()));
                    }
                }
            }
        }

        None
    }
}
