//! The grammar: a tree of subcommand patterns, each carrying positional
//! fragments and named options. Grounded on `core/model/pattern.py`.

use std::collections::HashMap;

use crate::fragment::Fragment;
use crate::mix::{Preset, Track};
use crate::snapshot::{AnalyzeSnapshot, ProcessingState};
use crate::trie::RadixTrie;

pub const DEFAULT_SEPARATORS: &str = " \t\r\n";

pub struct OptionPattern {
    pub keyword: String,
    pub aliases: Vec<String>,
    pub separators: String,

    pub soft_keyword: bool,
    pub allow_duplicate: bool,
    pub header_fragment: Option<Fragment>,
    pub header_separators: Option<String>,
    pub compact_header: bool,
    pub forwarding: bool,

    trigger_set: std::collections::HashSet<String>,
    trigger_trie: Option<RadixTrie<()>>,
}

impl OptionPattern {
    pub fn triggers_exact(&self, keyword: &str) -> bool {
        self.trigger_set.contains(keyword)
    }

    pub fn triggers_compact_prefix(&self, keyword: &str) -> Option<String> {
        self.trigger_trie.as_ref()?.longest_prefix_key(keyword)
    }
}

/// A node in the grammar tree: a header keyword, its own fragment track,
/// its options, and its children (subcommands).
pub struct SubcommandPattern {
    pub header: String,
    pub preset: Preset,

    pub soft_keyword: bool,
    pub separators: String,

    pub aliases: Vec<String>,
    pub prefixes: Option<RadixTrie<()>>,
    pub compact_header: bool,
    pub enter_instantly: bool,
    pub header_fragment: Option<Fragment>,

    pub options: Vec<OptionPattern>,
    pub exit_options: Vec<String>,

    /// Keyed by canonical header only; `subcommand_aliases` maps an alias
    /// to its pattern's canonical header.
    pub subcommands: HashMap<String, SubcommandPattern>,
    pub subcommand_aliases: HashMap<String, String>,
    pub compact_keywords: Option<RadixTrie<String>>,
}

impl SubcommandPattern {
    pub fn build(header: impl Into<String>) -> SubcommandPatternBuilder {
        SubcommandPatternBuilder::new(header)
    }

    pub fn create_snapshot(&self, state: ProcessingState) -> AnalyzeSnapshot<'_> {
        AnalyzeSnapshot::new(self, state)
    }

    pub fn root_entrypoint(&self) -> AnalyzeSnapshot<'_> {
        self.create_snapshot(ProcessingState::Command)
    }

    pub fn prefix_entrypoint(&self) -> AnalyzeSnapshot<'_> {
        self.create_snapshot(ProcessingState::Prefix)
    }

    pub fn header_entrypoint(&self) -> AnalyzeSnapshot<'_> {
        self.create_snapshot(ProcessingState::Header)
    }

    /// Attaches a previously built child subcommand: registers its header
    /// and aliases in this pattern's child map, and — if the child is
    /// `compact_header` — its header and aliases in this pattern's
    /// compact-keyword trie.
    pub fn attach_subcommand(&mut self, pattern: SubcommandPattern) {
        let header = pattern.header.clone();

        if pattern.compact_header {
            let keywords = self.compact_keywords.get_or_insert_with(RadixTrie::new);
            keywords.set(&header, header.clone());
            for alias in &pattern.aliases {
                keywords.set(alias, header.clone());
            }
        }

        for alias in &pattern.aliases {
            self.subcommand_aliases.insert(alias.clone(), header.clone());
        }

        self.subcommands.insert(header, pattern);
    }

    /// Resolves a token to a child pattern by exact header/alias match.
    pub fn find_subcommand(&self, token: &str) -> Option<&SubcommandPattern> {
        if let Some(pattern) = self.subcommands.get(token) {
            return Some(pattern);
        }
        let canonical = self.subcommand_aliases.get(token)?;
        self.subcommands.get(canonical)
    }

    /// Resolves a token's longest compact-keyword prefix to a child pattern
    /// plus the unmatched suffix.
    pub fn find_compact_subcommand(&self, token: &str) -> Option<(&SubcommandPattern, &str)> {
        let keywords = self.compact_keywords.as_ref()?;
        let prefix = keywords.longest_prefix_key(token)?;
        let pattern = self.subcommands.get(&prefix)?;
        Some((pattern, &token[prefix.len()..]))
    }

    pub fn option(&mut self, keyword: impl Into<String>) -> OptionPatternBuilder<'_> {
        OptionPatternBuilder::new(self, keyword)
    }
}

/// Fluent builder for a [`SubcommandPattern`], mirroring `SubcommandPattern.build`
/// and the `.subcommand(...)`/`.option(...)` attach methods in the original.
pub struct SubcommandPatternBuilder {
    header: String,
    fragments: Vec<Fragment>,
    aliases: Vec<String>,
    soft_keyword: bool,
    separators: String,
    prefixes: Vec<String>,
    compact_header: bool,
    enter_instantly: bool,
    header_fragment: Option<Fragment>,
}

impl SubcommandPatternBuilder {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            fragments: Vec::new(),
            aliases: Vec::new(),
            soft_keyword: false,
            separators: DEFAULT_SEPARATORS.to_string(),
            prefixes: Vec::new(),
            compact_header: false,
            enter_instantly: true,
            header_fragment: None,
        }
    }

    pub fn fragment(mut self, fragment: Fragment) -> Self {
        self.fragments.push(fragment);
        self
    }

    pub fn aliases(mut self, aliases: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn soft_keyword(mut self, value: bool) -> Self {
        self.soft_keyword = value;
        self
    }

    pub fn separators(mut self, separators: impl Into<String>) -> Self {
        self.separators = separators.into();
        self
    }

    pub fn prefixes(mut self, prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn compact_header(mut self, value: bool) -> Self {
        self.compact_header = value;
        self
    }

    pub fn enter_instantly(mut self, value: bool) -> Self {
        self.enter_instantly = value;
        self
    }

    pub fn header_fragment(mut self, fragment: Fragment) -> Self {
        self.header_fragment = Some(fragment);
        self
    }

    pub fn finish(self) -> SubcommandPattern {
        let subcommand_track = Track::new(self.fragments, self.header_fragment.clone());
        let preset = Preset::new(subcommand_track, HashMap::new());

        let mut prefixes = None;
        if !self.prefixes.is_empty() {
            let mut trie = RadixTrie::new();
            for p in &self.prefixes {
                trie.set(p, ());
            }
            prefixes = Some(trie);
        }

        SubcommandPattern {
            header: self.header,
            preset,
            soft_keyword: self.soft_keyword,
            separators: self.separators,
            aliases: self.aliases,
            prefixes,
            compact_header: self.compact_header,
            enter_instantly: self.enter_instantly,
            header_fragment: self.header_fragment,
            options: Vec::new(),
            exit_options: Vec::new(),
            subcommands: HashMap::new(),
            subcommand_aliases: HashMap::new(),
            compact_keywords: None,
        }
    }
}

/// Fluent builder for one option attached to a [`SubcommandPattern`], mirroring
/// `SubcommandPattern.option(...)`.
pub struct OptionPatternBuilder<'p> {
    owner: &'p mut SubcommandPattern,
    keyword: String,
    fragments: Vec<Fragment>,
    aliases: Vec<String>,
    separators: Option<String>,
    hybrid_separators: bool,
    soft_keyword: bool,
    allow_duplicate: bool,
    compact_header: bool,
    header_fragment: Option<Fragment>,
    header_separators: Option<String>,
    forwarding: bool,
}

impl<'p> OptionPatternBuilder<'p> {
    fn new(owner: &'p mut SubcommandPattern, keyword: impl Into<String>) -> Self {
        Self {
            owner,
            keyword: keyword.into(),
            fragments: Vec::new(),
            aliases: Vec::new(),
            separators: None,
            hybrid_separators: false,
            soft_keyword: false,
            allow_duplicate: false,
            compact_header: false,
            header_fragment: None,
            header_separators: None,
            forwarding: true,
        }
    }

    pub fn fragment(mut self, fragment: Fragment) -> Self {
        self.fragments.push(fragment);
        self
    }

    pub fn aliases(mut self, aliases: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn separators(mut self, separators: impl Into<String>) -> Self {
        self.separators = Some(separators.into());
        self
    }

    pub fn hybrid_separators(mut self, value: bool) -> Self {
        self.hybrid_separators = value;
        self
    }

    pub fn soft_keyword(mut self, value: bool) -> Self {
        self.soft_keyword = value;
        self
    }

    pub fn allow_duplicate(mut self, value: bool) -> Self {
        self.allow_duplicate = value;
        self
    }

    pub fn compact_header(mut self, value: bool) -> Self {
        self.compact_header = value;
        self
    }

    pub fn header_fragment(mut self, fragment: Fragment) -> Self {
        self.header_fragment = Some(fragment);
        self
    }

    pub fn header_separators(mut self, separators: impl Into<String>) -> Self {
        self.header_separators = Some(separators.into());
        self
    }

    pub fn forwarding(mut self, value: bool) -> Self {
        self.forwarding = value;
        self
    }

    /// Validates and attaches the option to its owning subcommand.
    ///
    /// Panics (a pattern-construction-time programmer error, mirroring the
    /// original's `raise ValueError`) if `header_separators` is set without
    /// any fragments to split into.
    pub fn attach(self) {
        if self.header_separators.is_some() && self.fragments.is_empty() {
            panic!("header_separators must be used with fragments");
        }

        let separators = match self.separators {
            Some(own) if self.hybrid_separators => format!("{own}{}", self.owner.separators),
            Some(own) => own,
            None => self.owner.separators.clone(),
        };

        let mut trigger_set = std::collections::HashSet::new();
        trigger_set.insert(self.keyword.clone());
        trigger_set.extend(self.aliases.iter().cloned());

        let trigger_trie = if self.compact_header {
            let mut trie = RadixTrie::new();
            trie.set(&self.keyword, ());
            for alias in &self.aliases {
                trie.set(alias, ());
            }
            Some(trie)
        } else {
            None
        };

        let forwarding = self.forwarding;
        let keyword = self.keyword.clone();

        let option = OptionPattern {
            keyword: keyword.clone(),
            aliases: self.aliases,
            separators,
            soft_keyword: self.soft_keyword,
            allow_duplicate: self.allow_duplicate,
            header_fragment: self.header_fragment.clone(),
            header_separators: self.header_separators,
            compact_header: self.compact_header,
            forwarding,
            trigger_set,
            trigger_trie,
        };

        let track = Track::new(self.fragments, self.header_fragment);
        self.owner.preset.option_tracks.insert(keyword.clone(), track);
        self.owner.options.push(option);
        if !forwarding {
            self.owner.exit_options.push(keyword);
        }
    }
}
