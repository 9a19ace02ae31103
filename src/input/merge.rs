//! K-way sorted merge over sub-cursors.
//!
//! A [`MergeCursor`] owns a binary min-heap of cursors ordered by their
//! current record under a caller-supplied comparator. Advancing pops the
//! smallest; the popped cursors form the *active set* and are only
//! re-advanced and re-inserted on the next call, so a whole batch of equal
//! records (one per stream) can be observed at once by
//! [`MergeCursor::step_unique`] and collapsed by a reducer.
//!
//! The heap is hand-rolled over a `Vec` because ordering lives in a runtime
//! comparator, not in an `Ord` impl.

use std::cmp::Ordering;

use crate::record::{keep_first_fn, CompareFn, Record, ReduceFn, Reduced};

use super::Cursor;

/// What the merge's `current` refers to.
enum MergeCur {
    None,
    /// The head of the active set (all of it, for `step_unique`).
    Active,
    /// The reducer's scratch output.
    Reduced,
}

pub(crate) struct MergeCursor {
    compare: CompareFn,
    heap: Vec<Cursor>,
    active: Vec<Cursor>,
    reducer: Option<ReduceFn>,
    scratch: Reduced,
    cur: MergeCur,
}

impl MergeCursor {
    pub fn new(compare: CompareFn) -> MergeCursor {
        MergeCursor {
            compare,
            heap: Vec::new(),
            active: Vec::new(),
            reducer: None,
            scratch: Reduced::default(),
            cur: MergeCur::None,
        }
    }

    /// Adds a sub-cursor under `tag`. The cursor is primed with one advance;
    /// an empty one is dropped on the spot. Members of the active set go
    /// back on the heap un-advanced, so adding mid-stream re-offers their
    /// current records.
    pub fn add(&mut self, mut sub: Cursor, tag: i32) {
        sub.set_tag(tag);
        if sub.current().is_some() {
            sub.reset();
        }
        if !sub.advance_ok() {
            return;
        }
        let actives = std::mem::take(&mut self.active);
        for c in actives {
            heap_push(&mut self.heap, &self.compare, c);
        }
        self.cur = MergeCur::None;
        heap_push(&mut self.heap, &self.compare, sub);
    }

    pub fn set_reducer(&mut self, reduce: ReduceFn) {
        self.reducer = Some(reduce);
    }

    /// Keep only the first record of each equal batch.
    pub fn keep_first(&mut self) {
        self.reducer = Some(keep_first_fn());
    }

    /// Re-advances the active set into the heap; exhausted sub-cursors are
    /// dropped (closing their files).
    fn readvance_active(&mut self) {
        let actives = std::mem::take(&mut self.active);
        for mut c in actives {
            if c.advance_ok() {
                heap_push(&mut self.heap, &self.compare, c);
            }
        }
    }

    pub fn step(&mut self) -> bool {
        match self.reducer.clone() {
            Some(red) => self.step_reduce(&red),
            None => self.step_plain(),
        }
    }

    fn step_plain(&mut self) -> bool {
        self.readvance_active();
        match heap_pop(&mut self.heap, &self.compare) {
            Some(c) => {
                self.active.push(c);
                self.cur = MergeCur::Active;
                true
            }
            None => {
                self.cur = MergeCur::None;
                false
            }
        }
    }

    /// Peels the smallest record plus every heap top equal to it; the whole
    /// batch becomes the active set. Returns the batch size, 0 at end.
    pub fn step_unique(&mut self) -> usize {
        self.readvance_active();
        let first = match heap_pop(&mut self.heap, &self.compare) {
            Some(c) => c,
            None => {
                self.cur = MergeCur::None;
                return 0;
            }
        };
        self.active.push(first);
        loop {
            let tied = match (self.active[0].current(), self.heap.first().and_then(|c| c.current()))
            {
                (Some(a), Some(b)) => (self.compare)(&a, &b) == Ordering::Equal,
                _ => false,
            };
            if !tied {
                break;
            }
            if let Some(c) = heap_pop(&mut self.heap, &self.compare) {
                self.active.push(c);
            }
        }
        self.cur = MergeCur::Active;
        self.active.len()
    }

    fn step_reduce(&mut self, reduce: &ReduceFn) -> bool {
        loop {
            if self.step_unique() == 0 {
                return false;
            }
            let records: Vec<Record<'_>> =
                self.active.iter().filter_map(|c| c.current()).collect();
            let Some(first) = records.first() else { continue };
            self.scratch.tag = first.tag;
            if reduce(&records, &mut self.scratch) {
                self.cur = MergeCur::Reduced;
                return true;
            }
        }
    }

    pub fn current(&self) -> Option<Record<'_>> {
        match self.cur {
            MergeCur::None => None,
            MergeCur::Active => self.active.first().and_then(|c| c.current()),
            MergeCur::Reduced => Some(self.scratch.as_record()),
        }
    }
}

// ---------------------------------------------------------------------------
// Heap of cursors keyed by their current record
// ---------------------------------------------------------------------------

fn cur_cmp(cmp: &CompareFn, a: &Cursor, b: &Cursor) -> Ordering {
    match (a.current(), b.current()) {
        (Some(ra), Some(rb)) => cmp(&ra, &rb),
        // A cursor without a current record cannot win the heap; this arm
        // is unreachable while the invariants hold.
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn heap_push(heap: &mut Vec<Cursor>, cmp: &CompareFn, c: Cursor) {
    heap.push(c);
    let mut i = heap.len() - 1;
    while i > 0 {
        let parent = (i - 1) / 2;
        if cur_cmp(cmp, &heap[i], &heap[parent]) == Ordering::Less {
            heap.swap(i, parent);
            i = parent;
        } else {
            break;
        }
    }
}

fn heap_pop(heap: &mut Vec<Cursor>, cmp: &CompareFn) -> Option<Cursor> {
    if heap.is_empty() {
        return None;
    }
    let last = heap.len() - 1;
    heap.swap(0, last);
    let top = heap.pop();
    let n = heap.len();
    let mut i = 0;
    loop {
        let left = 2 * i + 1;
        if left >= n {
            break;
        }
        let mut min = left;
        let right = left + 1;
        if right < n && cur_cmp(cmp, &heap[right], &heap[left]) == Ordering::Less {
            min = right;
        }
        if cur_cmp(cmp, &heap[min], &heap[i]) == Ordering::Less {
            heap.swap(min, i);
            i = min;
        } else {
            break;
        }
    }
    top
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::CursorOptions;
    use crate::record::compare_bytes;
    use crate::Format;
    use std::sync::Arc;

    fn lines(data: &str) -> Cursor {
        let mut opts = CursorOptions::default();
        opts.format = Format::delimited(b'\n');
        Cursor::from_buffer(data.as_bytes().to_vec(), &opts)
    }

    fn byte_cmp() -> CompareFn {
        Arc::new(|a: &Record<'_>, b: &Record<'_>| compare_bytes(a, b))
    }

    #[test]
    fn merges_in_comparator_order() {
        let mut m = Cursor::merge(byte_cmp(), &CursorOptions::default());
        m.add(lines("a\nc\ne\n"), 0);
        m.add(lines("b\nd\n"), 1);
        let mut got = Vec::new();
        while let Some(r) = m.advance() {
            got.push(r.bytes.to_vec());
        }
        let want: Vec<Vec<u8>> =
            ["a", "b", "c", "d", "e"].iter().map(|s| s.as_bytes().to_vec()).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn unique_batches_ties_across_streams() {
        let mut m = Cursor::merge(byte_cmp(), &CursorOptions::default());
        m.add(lines("a\nb\n"), 0);
        m.add(lines("a\nc\n"), 1);
        let (r, n) = m.advance_unique().unwrap();
        assert_eq!(r.bytes, b"a");
        assert_eq!(n, 2);
        let (r, n) = m.advance_unique().unwrap();
        assert_eq!(n, 1);
        let first = r.bytes.to_vec();
        let (r, n) = m.advance_unique().unwrap();
        assert_eq!(n, 1);
        assert_ne!(first, r.bytes.to_vec());
        assert!(m.advance_unique().is_none());
    }

    #[test]
    fn keep_first_dedupes() {
        let mut m = Cursor::merge(byte_cmp(), &CursorOptions::default());
        m.keep_first();
        m.add(lines("a\nb\nc\n"), 0);
        m.add(lines("a\nc\nd\n"), 1);
        let mut got = Vec::new();
        while let Some(r) = m.advance() {
            got.push(r.bytes.to_vec());
        }
        let want: Vec<Vec<u8>> =
            ["a", "b", "c", "d"].iter().map(|s| s.as_bytes().to_vec()).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn keep_first_survivor_comes_from_first_added_stream() {
        let mut m = Cursor::merge(byte_cmp(), &CursorOptions::default());
        m.keep_first();
        m.add(lines("k\n"), 1);
        m.add(lines("k\n"), 2);
        let r = m.advance().unwrap();
        assert_eq!(r.bytes, b"k");
        assert_eq!(r.tag, 1);
        assert!(m.advance().is_none());
    }

    #[test]
    fn tag_tiebreak_comparator_orders_equal_bytes_by_stream() {
        // With tags folded into the comparator, equal bytes from different
        // streams are distinct keys: nothing collapses, and the lower tag
        // comes out first.
        let cmp: CompareFn = Arc::new(|a: &Record<'_>, b: &Record<'_>| {
            compare_bytes(a, b).then(a.tag.cmp(&b.tag))
        });
        let mut m = Cursor::merge(cmp, &CursorOptions::default());
        m.keep_first();
        m.add(lines("k\n"), 2);
        m.add(lines("k\n"), 1);
        let tags: Vec<i32> = std::iter::from_fn(|| m.advance().map(|r| r.tag)).collect();
        assert_eq!(tags, vec![1, 2]);
    }

    #[test]
    fn reducer_can_reject_groups() {
        // Drop every group that appears in more than one stream.
        let reduce: ReduceFn = Arc::new(|group: &[Record<'_>], out: &mut Reduced| {
            if group.len() > 1 {
                return false;
            }
            out.set(group[0].bytes, group[0].tag);
            true
        });
        let mut m = Cursor::merge(byte_cmp(), &CursorOptions::default());
        m.set_merge_reducer(reduce);
        m.add(lines("a\nb\n"), 0);
        m.add(lines("a\nc\n"), 1);
        let mut got = Vec::new();
        while let Some(r) = m.advance() {
            got.push(r.bytes.to_vec());
        }
        assert_eq!(got, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn empty_sub_cursors_are_dropped_on_add() {
        let mut m = Cursor::merge(byte_cmp(), &CursorOptions::default());
        m.add(lines(""), 0);
        m.add(lines("x\n"), 1);
        let r = m.advance().unwrap();
        assert_eq!(r.bytes, b"x");
        assert!(m.advance().is_none());
    }

    #[test]
    fn merge_of_nothing_is_empty() {
        let mut m = Cursor::merge(byte_cmp(), &CursorOptions::default());
        assert!(m.advance().is_none());
        assert!(m.advance_unique().is_none());
    }
}
