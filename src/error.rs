//! Error types for the classifier library.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by corpus loading and query classification.
///
/// Internal matching conditions (a span that shrinks to nothing after diff
/// trimming, a checksum collision without real overlap, an edit the policy
/// table rejects) are not errors; they simply produce no match.
#[derive(Debug, Error)]
pub enum Error {
    /// The corpus root is missing or is not a directory. Fatal during
    /// construction.
    #[error("corpus root {} does not exist or is not a directory", .0.display())]
    CorpusRoot(PathBuf),

    /// A corpus file could not be read. Fatal during construction.
    #[error("failed to load corpus entry {}: {source}", .path.display())]
    CorpusLoad {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The query stream errored. Returned instead of a partial result so
    /// callers cannot mistake truncated input for the absence of a license.
    #[error("failed to read input: {0}")]
    InputRead(#[from] io::Error),

    /// A file in a batch could not be read; accumulated into the batch's
    /// error slice alongside whichever results completed.
    #[error("failed to read {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The batch deadline expired. Results gathered before the deadline are
    /// still returned.
    #[error("classification deadline exceeded; {completed} of {total} files finished")]
    Cancelled { completed: usize, total: usize },
}
