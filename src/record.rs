//! The record type and the callback seams built around it.
//!
//! A [`Record`] is a borrowed byte slice plus a caller-assigned `i32` tag.
//! The bytes live inside the producing cursor's buffer and are valid only
//! until the next advance on that cursor; anything that must outlive an
//! advance is copied into an [`OwnedRecord`] or a [`Group`].
//!
//! Comparators, reducers, and partition functions are shared `Arc<dyn Fn>`
//! values so one function can drive many partitions (and their sort threads)
//! at once.

use std::cmp::Ordering;
use std::sync::Arc;

use xxhash_rust::xxh64::xxh64;

/// A borrowed record: the framing layer has already stripped any length
/// prefix or delimiter.
#[derive(Clone, Copy, Debug)]
pub struct Record<'a> {
    /// The record payload, borrowed from the producing cursor.
    pub bytes: &'a [u8],
    /// Caller-assigned metadata, commonly used to identify the source stream
    /// in a merge.
    pub tag: i32,
}

impl<'a> Record<'a> {
    pub fn new(bytes: &'a [u8], tag: i32) -> Record<'a> {
        Record { bytes, tag }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copies the payload into `scratch` with a trailing NUL and returns the
    /// terminated slice, for consumers that hand records to C-string APIs.
    pub fn to_null_terminated<'s>(&self, scratch: &'s mut Vec<u8>) -> &'s [u8] {
        scratch.clear();
        scratch.extend_from_slice(self.bytes);
        scratch.push(0);
        scratch
    }

    /// Copies the record so it survives the next advance.
    pub fn to_owned(&self) -> OwnedRecord {
        OwnedRecord { bytes: self.bytes.to_vec(), tag: self.tag }
    }
}

/// An owned record, used where records must outlive their cursor (in-memory
/// cursors, reducer results kept by callers).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedRecord {
    pub bytes: Vec<u8>,
    pub tag: i32,
}

impl OwnedRecord {
    pub fn new(bytes: Vec<u8>, tag: i32) -> OwnedRecord {
        OwnedRecord { bytes, tag }
    }

    pub fn as_record(&self) -> Record<'_> {
        Record { bytes: &self.bytes, tag: self.tag }
    }
}

/// Orders two records. Shared across partitions and sort threads.
pub type CompareFn = Arc<dyn Fn(&Record<'_>, &Record<'_>) -> Ordering + Send + Sync>;

/// Collapses a group of equal-key records into `out`. Returning `false`
/// rejects the whole group; the caller moves on to the next one.
pub type ReduceFn = Arc<dyn Fn(&[Record<'_>], &mut Reduced) -> bool + Send + Sync>;

/// Maps a record to a partition in `0..num_partitions`; returning
/// `num_partitions` drops the record.
pub type PartitionFn = Arc<dyn Fn(&Record<'_>, usize) -> usize + Send + Sync>;

/// Decides whether a file takes part in a listing or a file-list cursor.
pub type FileValidFn = Arc<dyn Fn(&std::path::Path) -> bool + Send + Sync>;

/// Reusable reducer output: the collapsed payload plus its tag. The caller
/// pre-sets `tag` to the first record's tag; reducers may override it.
#[derive(Debug, Default)]
pub struct Reduced {
    pub data: Vec<u8>,
    pub tag: i32,
}

impl Reduced {
    pub fn as_record(&self) -> Record<'_> {
        Record { bytes: &self.data, tag: self.tag }
    }

    pub fn set(&mut self, bytes: &[u8], tag: i32) {
        self.data.clear();
        self.data.extend_from_slice(bytes);
        self.tag = tag;
    }
}

/// The most common reducer: keep the first record of the group as-is.
pub fn keep_first(group: &[Record<'_>], out: &mut Reduced) -> bool {
    out.set(group[0].bytes, group[0].tag);
    true
}

/// Returns `keep_first` in the shared callback form.
pub fn keep_first_fn() -> ReduceFn {
    Arc::new(keep_first)
}

// ---------------------------------------------------------------------------
// Comparators and partitioners over the leading words of a record
// ---------------------------------------------------------------------------

#[inline]
fn leading_u32(r: &Record<'_>) -> u32 {
    let mut b = [0u8; 4];
    let n = r.bytes.len().min(4);
    b[..n].copy_from_slice(&r.bytes[..n]);
    u32::from_le_bytes(b)
}

#[inline]
fn leading_u64(r: &Record<'_>) -> u64 {
    let mut b = [0u8; 8];
    let n = r.bytes.len().min(8);
    b[..n].copy_from_slice(&r.bytes[..n]);
    u64::from_le_bytes(b)
}

#[inline]
fn word_u32(r: &Record<'_>, word: usize) -> u32 {
    let start = word * 4;
    let mut b = [0u8; 4];
    if r.bytes.len() > start {
        let n = (r.bytes.len() - start).min(4);
        b[..n].copy_from_slice(&r.bytes[start..start + n]);
    }
    u32::from_le_bytes(b)
}

#[inline]
fn word_u64(r: &Record<'_>, word: usize) -> u64 {
    let start = word * 8;
    let mut b = [0u8; 8];
    if r.bytes.len() > start {
        let n = (r.bytes.len() - start).min(8);
        b[..n].copy_from_slice(&r.bytes[start..start + n]);
    }
    u64::from_le_bytes(b)
}

/// Compares the first four bytes of each record as a little-endian `u32`.
pub fn compare_u32(a: &Record<'_>, b: &Record<'_>) -> Ordering {
    leading_u32(a).cmp(&leading_u32(b))
}

/// Compares the first eight bytes of each record as a little-endian `u64`.
pub fn compare_u64(a: &Record<'_>, b: &Record<'_>) -> Ordering {
    leading_u64(a).cmp(&leading_u64(b))
}

/// Whole-record byte comparison, shortest-first on ties.
pub fn compare_bytes(a: &Record<'_>, b: &Record<'_>) -> Ordering {
    a.bytes.cmp(b.bytes)
}

/// Partitions by the first `u32` modulo `num_partitions`.
pub fn split_by_u32(r: &Record<'_>, num_partitions: usize) -> usize {
    leading_u32(r) as usize % num_partitions
}

/// Partitions by the second `u32` modulo `num_partitions`.
pub fn split_by_u32_2(r: &Record<'_>, num_partitions: usize) -> usize {
    word_u32(r, 1) as usize % num_partitions
}

/// Partitions by the first `u64` modulo `num_partitions`.
pub fn split_by_u64(r: &Record<'_>, num_partitions: usize) -> usize {
    (leading_u64(r) % num_partitions as u64) as usize
}

/// Partitions by the second `u64` modulo `num_partitions`.
pub fn split_by_u64_2(r: &Record<'_>, num_partitions: usize) -> usize {
    (word_u64(r, 1) % num_partitions as u64) as usize
}

/// Hash-partitions the record payload, optionally skipping the first
/// `skip_prefix` bytes (for records with a sort key up front that should not
/// influence placement).
pub fn hash_partition(r: &Record<'_>, num_partitions: usize, skip_prefix: usize) -> usize {
    let start = skip_prefix.min(r.bytes.len());
    (xxh64(&r.bytes[start..], 0) % num_partitions as u64) as usize
}

// ---------------------------------------------------------------------------
// Group: owned copies of a run of records
// ---------------------------------------------------------------------------

/// A reusable buffer of record copies. The cursor's per-record buffer is
/// overwritten on every advance, so any operation that needs a whole run of
/// records at once (grouping, reduction) materializes them here first.
///
/// Payloads are stored back-to-back in one allocation with `(offset, len,
/// tag)` entries on the side; clearing and refilling does not reallocate
/// once the buffer has warmed up.
#[derive(Debug, Default)]
pub struct Group {
    data: Vec<u8>,
    items: Vec<(usize, usize, i32)>,
}

impl Group {
    pub fn clear(&mut self) {
        self.data.clear();
        self.items.clear();
    }

    pub fn push(&mut self, r: &Record<'_>) {
        let off = self.data.len();
        self.data.extend_from_slice(r.bytes);
        self.items.push((off, r.bytes.len(), r.tag));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, i: usize) -> Record<'_> {
        let (off, len, tag) = self.items[i];
        Record { bytes: &self.data[off..off + len], tag }
    }

    pub fn first(&self) -> Option<Record<'_>> {
        if self.items.is_empty() { None } else { Some(self.get(0)) }
    }

    pub fn iter(&self) -> impl Iterator<Item = Record<'_>> {
        (0..self.items.len()).map(move |i| self.get(i))
    }

    /// Borrows every member at once, for reducer calls.
    pub fn records(&self) -> Vec<Record<'_>> {
        self.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(bytes: &[u8]) -> Record<'_> {
        Record::new(bytes, 0)
    }

    #[test]
    fn compare_u32_orders_by_leading_word() {
        let a = 5u32.to_le_bytes();
        let b = 9u32.to_le_bytes();
        assert_eq!(compare_u32(&rec(&a), &rec(&b)), Ordering::Less);
        assert_eq!(compare_u32(&rec(&b), &rec(&a)), Ordering::Greater);
        assert_eq!(compare_u32(&rec(&a), &rec(&a)), Ordering::Equal);
    }

    #[test]
    fn compare_u32_ignores_trailing_bytes() {
        let mut a = 7u32.to_le_bytes().to_vec();
        a.extend_from_slice(b"xyz");
        let b = 7u32.to_le_bytes();
        assert_eq!(compare_u32(&rec(&a), &rec(&b)), Ordering::Equal);
    }

    #[test]
    fn split_by_u32_takes_modulo() {
        let a = 10u32.to_le_bytes();
        assert_eq!(split_by_u32(&rec(&a), 4), 2);
        let b = 13u32.to_le_bytes();
        assert_eq!(split_by_u32(&rec(&b), 4), 1);
    }

    #[test]
    fn split_by_u32_2_uses_second_word() {
        let mut a = 1u32.to_le_bytes().to_vec();
        a.extend_from_slice(&9u32.to_le_bytes());
        assert_eq!(split_by_u32_2(&rec(&a), 4), 1);
    }

    #[test]
    fn hash_partition_is_stable_and_in_range() {
        let r = rec(b"user-42");
        let p = hash_partition(&r, 16, 0);
        assert!(p < 16);
        assert_eq!(p, hash_partition(&r, 16, 0));
        // Skipping a prefix changes the hashed region.
        let with_key = rec(b"KEY!user-42");
        assert_eq!(hash_partition(&with_key, 16, 4), p);
    }

    #[test]
    fn keep_first_copies_first_member() {
        let g = [rec(b"first"), rec(b"second")];
        let mut out = Reduced::default();
        assert!(keep_first(&g, &mut out));
        assert_eq!(out.data, b"first");
    }

    #[test]
    fn group_round_trips_records() {
        let mut g = Group::default();
        g.push(&Record::new(b"a", 1));
        g.push(&Record::new(b"bb", 2));
        assert_eq!(g.len(), 2);
        assert_eq!(g.get(0).bytes, b"a");
        assert_eq!(g.get(0).tag, 1);
        assert_eq!(g.get(1).bytes, b"bb");
        assert_eq!(g.get(1).tag, 2);
        g.clear();
        assert!(g.is_empty());
    }

    #[test]
    fn null_terminated_helper_appends_nul() {
        let mut scratch = Vec::new();
        let r = rec(b"text");
        assert_eq!(r.to_null_terminated(&mut scratch), b"text\0");
    }
}
