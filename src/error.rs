//! Error taxonomy for cursor and writer construction and I/O.
//!
//! The streaming layer is option-driven: by default a missing file is an
//! empty stream, a truncated compressed file ends early, and a partial
//! trailing record is dropped. The `abort_on_*` toggles in
//! [`crate::CursorOptions`] / [`crate::WriterOptions`] escalate those
//! conditions instead; escalation reports the error at notification level 1
//! and terminates the process — it never unwinds into caller code.

use std::io;

use thiserror::Error;

use crate::progress::note;

/// Everything that can go wrong while opening or driving a stream.
#[derive(Debug, Error)]
pub enum Error {
    /// Open failed because the path does not exist.
    #[error("{0}: file not found")]
    FileNotFound(String),

    /// Zero bytes were read where a stream header was expected.
    #[error("{0}: empty file")]
    EmptyFile(String),

    /// A malformed compressed header or block, or a decode failure.
    #[error("codec error: {0}")]
    Codec(String),

    /// End of stream arrived in the middle of a record.
    #[error("partial record at end of stream")]
    PartialRecord,

    /// An invalid option combination, detected at construction.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An underlying read, write, or stat failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Report `err` on stderr and terminate. Used by the `abort_on_*` option
/// paths, which promise the caller that control never returns.
pub(crate) fn abort_with(err: &Error) -> ! {
    note(1, &format!("recio: {err}"));
    std::process::abort();
}
