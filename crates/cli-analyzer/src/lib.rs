//! A streaming, table-driven command-line argument analyzer over a lazy
//! token buffer: a grammar of subcommand patterns with positional
//! fragments and named options, parsed by a prefix → header →
//! command/option state machine into a snapshot of captured assignments.

pub mod analyzer;
pub mod buffer;
pub mod capture;
pub mod error;
pub mod fragment;
pub mod mix;
pub mod pattern;
pub mod receiver;
pub mod snapshot;
pub mod trie;
pub mod value;

pub use analyzer::{analyze, analyze_loopflow, AnalyzeOutcome, Accepted, LoopflowExitReason};
pub use buffer::{TokenBuffer, TokenValue, VecTokenBuffer};
pub use capture::{Capture, ObjectCapture, PlainCapture, RegexCapture, SimpleCapture};
pub use error::{CaptureRejected, FragmentError, OutOfData, ParsePanic, Rejected, ValidateRejected};
pub use fragment::{assert_fragments_order, Fragment, FragmentGroup};
pub use mix::{Mix, Preset, Track, TrackError};
pub use pattern::{OptionPattern, OptionPatternBuilder, SubcommandPattern, SubcommandPatternBuilder};
pub use receiver::{AccumRx, AddRx, ConstRx, CountRx, DefaultRx, Rx};
pub use snapshot::{AnalyzeSnapshot, ProcessingState};
pub use trie::RadixTrie;
pub use value::Value;
