//! The state machine driving one parse: PREFIX → HEADER → COMMAND/OPTION,
//! dispatching each token against the grammar and feeding matched
//! fragments through their tracks. Grounded on `core/analyzer.py`.

use std::fmt;

use crate::buffer::TokenBuffer;
use crate::error::{OutOfData, ParsePanic, Rejected};
use crate::mix::TrackError;
use crate::pattern::SubcommandPattern;
use crate::snapshot::{AnalyzeSnapshot, ProcessingState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopflowExitReason {
    Satisfied,
    Unsatisfied,
    PrefixExpectStr,
    PrefixMismatch,
    HeaderExpectStr,
    HeaderMismatch,
    UnexpectedSegment,
    OptionDuplicatedProhibited,
    ExpectForwardSubcommand,
    ExpectForwardOption,
    PreviousOptionUnsatisfied,
    PreviousSubcommandUnsatisfied,
    /// Not in the original's exit-reason set: raised when a fragment's own
    /// capture/validate pipeline rejects a token outright. The original
    /// folds this into a bare `ParsePanic`; we keep it recoverable and
    /// inspectable through `Rejected::cause` instead.
    ComponentRejected,
}

impl fmt::Display for LoopflowExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Satisfied => "satisfied",
            Self::Unsatisfied => "unsatisfied",
            Self::PrefixExpectStr => "prefix_expect_str",
            Self::PrefixMismatch => "prefix_mismatch",
            Self::HeaderExpectStr => "header_expect_str",
            Self::HeaderMismatch => "header_mismatch",
            Self::UnexpectedSegment => "unexpected_segment",
            Self::OptionDuplicatedProhibited => "option_duplicated_prohibited",
            Self::ExpectForwardSubcommand => "expect_forward_subcommand",
            Self::ExpectForwardOption => "expect_forward_option",
            Self::PreviousOptionUnsatisfied => "previous_option_unsatisfied",
            Self::PreviousSubcommandUnsatisfied => "previous_subcommand_unsatisfied",
            Self::ComponentRejected => "component_rejected",
        };
        f.write_str(s)
    }
}

/// A completed, accepted parse: the final snapshot, carrying the
/// traversed command path and every captured assignment.
pub struct Accepted<'p> {
    pub snapshot: AnalyzeSnapshot<'p>,
}

pub enum AnalyzeOutcome<'p> {
    Accepted(Accepted<'p>),
    Rejected(Rejected),
}

/// Runs the loop to completion against one snapshot, turning any
/// fragment-level rejection collected along the way into `ComponentRejected`
/// with the cause stashed on the snapshot.
pub fn analyze_loopflow(
    snapshot: &mut AnalyzeSnapshot<'_>,
    buffer: &mut dyn TokenBuffer,
) -> Result<LoopflowExitReason, ParsePanic> {
    loop {
        let state = snapshot.state;
        let separators = snapshot.context().separators.clone();

        let token = match buffer.next(&separators) {
            Ok(t) => t,
            Err(OutOfData) => {
                if snapshot.mix.satisfied() {
                    snapshot.mix.complete();
                    snapshot.determine();
                    return Ok(LoopflowExitReason::Satisfied);
                }
                if state == ProcessingState::Option {
                    if let Some(key) = &snapshot.option {
                        if let Some(track) = snapshot.mix.option_tracks.get_mut(key) {
                            track.reset();
                        }
                    }
                }
                return Ok(LoopflowExitReason::Unsatisfied);
            }
        };

        if state == ProcessingState::Prefix {
            let context = snapshot.context();
            if let Some(prefixes) = &context.prefixes {
                let Some(text) = token.as_str() else {
                    return Ok(LoopflowExitReason::PrefixExpectStr);
                };
                let Some(prefix) = prefixes.longest_prefix_key(text) else {
                    return Ok(LoopflowExitReason::PrefixMismatch);
                };
                buffer.apply();
                let rest = text[prefix.len()..].to_string();
                if !rest.is_empty() {
                    buffer.pushleft(rest);
                }
            }
            snapshot.state = ProcessingState::Header;
            continue;
        }

        if state == ProcessingState::Header {
            let context = snapshot.context();
            let Some(text) = token.as_str().map(str::to_string) else {
                return Ok(LoopflowExitReason::HeaderExpectStr);
            };
            buffer.apply();

            if text == context.header {
                // exact match, nothing left to strip
            } else if context.compact_header && text.starts_with(&context.header) {
                let rest = text[context.header.len()..].to_string();
                if !rest.is_empty() {
                    buffer.pushleft(rest);
                }
            } else {
                return Ok(LoopflowExitReason::HeaderMismatch);
            }

            let command = snapshot.command.clone();
            let mut track = snapshot.mix.command_tracks.remove(&command).expect("root command track seeded at construction");
            let result = track.emit_header(&mut snapshot.mix, &text);
            snapshot.mix.command_tracks.insert(command, track);
            if let Err(e) = result {
                return handle_track_error(snapshot, e, LoopflowExitReason::Unsatisfied);
            }

            snapshot.state = ProcessingState::Command;
            continue;
        }

        if let Some(text) = token.as_str().map(str::to_string) {
            if let Some((subcommand, tail)) = snapshot.get_subcommand(&text) {
                let mut enter_forward = false;

                if state == ProcessingState::Option {
                    let key = snapshot.option.clone().expect("state is Option");
                    let satisfied = snapshot.mix.option_tracks[&key].satisfied();
                    if satisfied {
                        let track = snapshot.mix.option_tracks[&key].clone();
                        track.complete(&mut snapshot.mix);
                    } else if !subcommand.soft_keyword {
                        snapshot.mix.option_tracks.get_mut(&key).expect("just read").reset();
                        return Ok(LoopflowExitReason::PreviousOptionUnsatisfied);
                    } else {
                        enter_forward = true;
                    }
                }

                if !enter_forward {
                    if snapshot.stage_satisfied() || subcommand.enter_instantly {
                        buffer.apply();
                        snapshot.mix.complete();
                        if let Some(tail) = tail {
                            if !tail.is_empty() {
                                buffer.pushleft(tail);
                            }
                        }
                        match snapshot.enter_subcommand(&text, subcommand) {
                            Ok(()) => continue,
                            Err(e) => return handle_track_error(snapshot, e, LoopflowExitReason::Unsatisfied),
                        }
                    }
                    if !subcommand.soft_keyword {
                        return Ok(LoopflowExitReason::PreviousSubcommandUnsatisfied);
                    }
                }
            } else if let Some((option, owner, tail)) = snapshot.get_option(&text) {
                let mut enter_forward = false;

                if state == ProcessingState::Option {
                    let key = snapshot.option.clone().expect("state is Option");
                    let satisfied = snapshot.mix.option_tracks[&key].satisfied();
                    if satisfied {
                        let track = snapshot.mix.option_tracks[&key].clone();
                        track.complete(&mut snapshot.mix);
                        snapshot.state = ProcessingState::Command;
                    } else if !option.soft_keyword {
                        snapshot.mix.option_tracks.get_mut(&key).expect("just read").reset();
                        return Ok(LoopflowExitReason::PreviousOptionUnsatisfied);
                    } else {
                        enter_forward = true;
                    }
                }

                if !enter_forward && (!option.soft_keyword || snapshot.stage_satisfied()) {
                    let keyword = option.keyword.clone();
                    match snapshot.enter_option(&text, owner, &keyword, option) {
                        Ok(true) => {
                            buffer.apply();
                            if let Some(tail) = tail {
                                if !tail.is_empty() {
                                    buffer.pushleft(tail);
                                }
                            }
                            continue;
                        }
                        Ok(false) => return Ok(LoopflowExitReason::OptionDuplicatedProhibited),
                        Err(e) => return handle_track_error(snapshot, e, LoopflowExitReason::Unsatisfied),
                    }
                }
            }
        }

        if snapshot.state == ProcessingState::Command {
            let command = snapshot.command.clone();
            let mut track = snapshot.mix.command_tracks.remove(&command).expect("command track present");
            let result = track.forward(&mut snapshot.mix, buffer, &separators);
            snapshot.mix.command_tracks.insert(command, track);

            match result {
                Ok(Some(_)) => {}
                Ok(None) => return Ok(LoopflowExitReason::UnexpectedSegment),
                Err(TrackError::OutOfData) => return Ok(LoopflowExitReason::ExpectForwardSubcommand),
                Err(TrackError::Panic(p)) => return Err(p),
                Err(TrackError::Rejected(e)) => {
                    snapshot.last_rejection = Some(e);
                    return Ok(LoopflowExitReason::ComponentRejected);
                }
            }
        } else {
            let key = snapshot.option.clone().expect("state is Option");
            let option_separators = snapshot.context().options.iter().find(|o| o.keyword == key.1).map(|o| o.separators.clone());
            let separators = option_separators.unwrap_or(separators);

            let mut track = snapshot.mix.option_tracks.remove(&key).expect("option track present");
            let result = track.forward(&mut snapshot.mix, buffer, &separators);

            match result {
                Ok(Some(_)) => {
                    snapshot.mix.option_tracks.insert(key, track);
                }
                Ok(None) => {
                    snapshot.mix.option_tracks.insert(key, track);
                    snapshot.state = ProcessingState::Command;
                }
                Err(TrackError::OutOfData) => {
                    track.reset();
                    snapshot.mix.option_tracks.insert(key, track);
                    return Ok(LoopflowExitReason::ExpectForwardOption);
                }
                Err(TrackError::Panic(p)) => {
                    snapshot.mix.option_tracks.insert(key, track);
                    return Err(p);
                }
                Err(TrackError::Rejected(e)) => {
                    snapshot.mix.option_tracks.insert(key, track);
                    snapshot.last_rejection = Some(e);
                    return Ok(LoopflowExitReason::ComponentRejected);
                }
            }
        }
    }
}

/// Converts a fragment pipeline's failure into a loop exit: a rejection is
/// stashed on the snapshot and reported as `ComponentRejected`, a panic
/// propagates, and `OutOfData` (never actually produced by `emit_header`,
/// `enter_subcommand` or `enter_option`, which don't read from the buffer)
/// falls back to `stuck`.
fn handle_track_error(
    snapshot: &mut AnalyzeSnapshot<'_>,
    error: TrackError,
    stuck: LoopflowExitReason,
) -> Result<LoopflowExitReason, ParsePanic> {
    match error {
        TrackError::Rejected(e) => {
            snapshot.last_rejection = Some(e);
            Ok(LoopflowExitReason::ComponentRejected)
        }
        TrackError::Panic(p) => Err(p),
        TrackError::OutOfData => Ok(stuck),
    }
}

/// Entry point: runs [`analyze_loopflow`] to completion from a pattern's
/// root snapshot and turns the raw exit reason into an `AnalyzeOutcome`.
#[tracing::instrument(skip(pattern, buffer), fields(root = %pattern.header))]
pub fn analyze<'p>(pattern: &'p SubcommandPattern, buffer: &mut dyn TokenBuffer) -> Result<AnalyzeOutcome<'p>, ParsePanic> {
    let mut snapshot = pattern.root_entrypoint();
    let reason = analyze_loopflow(&mut snapshot, buffer)?;

    match reason {
        LoopflowExitReason::Satisfied => {
            tracing::debug!(command = ?snapshot.command, "parse satisfied");
            Ok(AnalyzeOutcome::Accepted(Accepted { snapshot }))
        }
        LoopflowExitReason::ComponentRejected => {
            let cause = snapshot.last_rejection.take().expect("ComponentRejected always stashes a cause");
            tracing::warn!(%cause, "fragment pipeline rejected input");
            Ok(AnalyzeOutcome::Rejected(Rejected::with_cause(reason, cause)))
        }
        other => {
            tracing::warn!(reason = %other, "parse rejected");
            Ok(AnalyzeOutcome::Rejected(Rejected::new(other)))
        }
    }
}
