//! Record-oriented streaming I/O for batch data pipelines.
//!
//! The crate reads and writes files of framed records, merges and sorts
//! record sets that exceed memory, and composes those primitives into
//! map/partition/reduce pipelines:
//!
//! - [`input::Cursor`] — a uniform iterator over records stored in
//!   length-prefixed, delimited, or fixed-size framing, with transparent
//!   gzip / LZ4 decompression, concatenation over file lists, and k-way
//!   sorted merging.
//! - [`output::Writer`] / [`output::ExtWriter`] — buffered framing writers
//!   with safe-rename publication, plus external sorting (spill to
//!   compressed runs, multi-level merge) and partitioned output.
//! - [`fsutil`] — recursive directory enumeration and file helpers feeding
//!   the above.
//!
//! Records are borrowed byte slices ([`Record`]); the bytes stay valid until
//! the next advance on the producing cursor. Consumers that need to keep a
//! record copy it ([`Record::to_owned`]).

pub mod error;
pub mod format;
pub mod fsutil;
pub mod input;
pub mod output;
pub mod progress;
pub mod record;

pub use error::{Error, Result};
pub use format::Format;
pub use fsutil::FileInfo;
pub use input::{Cursor, CursorOptions};
pub use output::{ExtOptions, ExtWriter, Writer, WriterOptions};
pub use progress::set_notification_level;
pub use record::{OwnedRecord, Record, Reduced};

/// One kibibyte; buffer sizes throughout the crate are expressed in these.
pub const KB: usize = 1 << 10;
/// One mebibyte.
pub const MB: usize = 1 << 20;
