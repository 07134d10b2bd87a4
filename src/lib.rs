//! Approximate matching engine for identifying known open-source license
//! texts in arbitrary input.
//!
//! The classifier layers cheap exclusion filters over an expensive diff:
//! queries are tokenized against the corpus dictionary, a frequency-table
//! similarity check prunes the corpus, q-gram search sets locate candidate
//! spans while tolerating insertions and deletions, and a word-level diff
//! with an edit policy scores what remains. See [`Classifier`] for the
//! library entry point and the `identify-license` binary for the CLI.

pub mod classifier;
pub mod cli;
pub mod error;
pub mod results;
pub mod scanner;

pub use classifier::{Classifier, Match, MatchType, Matches, TraceConfiguration, TraceFn};
pub use error::Error;
