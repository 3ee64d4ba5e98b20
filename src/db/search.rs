//! Binary search over the mapped byte buffer.
//!
//! The data file carries no index: the lower-bound search runs over raw
//! byte positions and snaps every probe backward to the start of its
//! enclosing line, so arbitrary offsets never address record interiors.
//! Lines have variable length, so adjacent probe positions may snap to the
//! same record; the redundant scans are cheap next to faulting in a page.
//!
//! All three public operations acquire the shared lock for the whole
//! probe-and-copy, materialize their result into an owned buffer, and only
//! then release. Returned buffers never alias the mapping.

use std::sync::atomic::Ordering;

use crate::bytes;

use super::Db;

impl Db {
    /// Point lookup. Returns the full matched line (key, separator, value,
    /// without the trailing line ending) for the first record whose key
    /// equals `needle`, or `None`. A record whose key merely extends
    /// `needle` does not match: the needle must be followed by the record
    /// separator.
    ///
    /// Panics if nothing is mapped; querying a closed holder is a
    /// lifecycle bug, not a client error.
    pub fn search(&self, needle: &[u8]) -> Option<Vec<u8>> {
        let mapped = self.mapped.read().unwrap();
        let m = mapped.as_ref().expect("DB not mapped");
        let buf = &m.map[..];

        let i = self.find_first_match(buf, needle.len(), |key| key >= needle);
        if i == buf.len() {
            return None;
        }
        let start = self.beginning_of_line(buf, i);
        let end = self.end_of_line(buf, start);
        let line = buf[start..end].to_vec();
        drop(mapped);

        if line.len() > needle.len()
            && line.starts_with(needle)
            && line[needle.len()] == self.record_separator
        {
            Some(line)
        } else {
            None
        }
    }

    /// Prefix match. Returns every line whose key starts with `needle`, in
    /// file order, each terminated by the line ending. Empty when no key
    /// matches.
    pub fn forward_match(&self, needle: &[u8]) -> Vec<u8> {
        let mapped = self.mapped.read().unwrap();
        let m = mapped.as_ref().expect("DB not mapped");
        let buf = &m.map[..];
        let n = needle.len();

        // (records where prefix >= needle) - (records where prefix > needle)
        // leaves exactly the records where prefix == needle. Truncating the
        // probed key to the needle's length turns the comparison into a
        // prefix test.
        let start_record = self.find_first_match(buf, n, |key| truncate(key, n) >= needle);
        if start_record == buf.len() {
            return Vec::new();
        }
        let end_record = self.find_first_match(buf, n, |key| truncate(key, n) > needle);

        let start = self.beginning_of_line(buf, start_record);
        let end = if end_record < buf.len() {
            self.beginning_of_line(buf, end_record)
        } else {
            buf.len()
        };
        buf[start..end].to_vec()
    }

    /// Range match, inclusive on both ends by key. `None` for `end_needle`
    /// leaves the range unbounded on the right. Empty when the range is
    /// ill-defined (`start_needle > end_needle`) or matches nothing.
    pub fn range_match(&self, start_needle: &[u8], end_needle: Option<&[u8]>) -> Vec<u8> {
        let mapped = self.mapped.read().unwrap();
        let m = mapped.as_ref().expect("DB not mapped");
        let buf = &m.map[..];

        if let Some(end) = end_needle {
            if start_needle > end {
                return Vec::new();
            }
        }

        let start_record =
            self.find_first_match(buf, start_needle.len(), |key| key >= start_needle);
        if start_record == buf.len() {
            return Vec::new();
        }
        let start = self.beginning_of_line(buf, start_record);

        let end = match end_needle {
            Some(en) => {
                let end_record = self.find_first_match(buf, en.len(), |key| key > en);
                if end_record < buf.len() {
                    self.beginning_of_line(buf, end_record)
                } else {
                    buf.len()
                }
            }
            None => buf.len(),
        };
        buf[start..end].to_vec()
    }

    /// Lower-bound search over byte positions `0..buf.len()`: the smallest
    /// position whose enclosing record key satisfies `is_match`, or
    /// `buf.len()` if none does. Probes landing past the last key long
    /// enough to hold `needle_len` bytes report false, pushing the bound
    /// right.
    fn find_first_match(
        &self,
        buf: &[u8],
        needle_len: usize,
        is_match: impl Fn(&[u8]) -> bool,
    ) -> usize {
        let (mut lo, mut hi) = (0, buf.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.probe(buf, needle_len, mid, &is_match) {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    /// Evaluates the match predicate against the key of the record
    /// enclosing position `i`.
    fn probe(&self, buf: &[u8], needle_len: usize, i: usize, is_match: &impl Fn(&[u8]) -> bool) -> bool {
        self.seek_count.fetch_add(1, Ordering::SeqCst);

        let start_of_key = self.beginning_of_line(buf, i);

        // make sure we have space before the end of the buffer
        if start_of_key + 1 + needle_len > buf.len() {
            return false;
        }

        // The key runs to the first record separator or line ending,
        // whichever comes first; a record without either runs to the end
        // of the buffer.
        let sep = bytes::index_byte(buf, start_of_key, buf.len(), self.record_separator);
        let le = bytes::index_byte(buf, start_of_key, buf.len(), self.line_ending);
        let end_of_key = match (sep, le) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => buf.len(),
        };
        is_match(&buf[start_of_key..end_of_key])
    }

    /// Start of the line enclosing position `i`: one past the previous
    /// line ending, or 0 when there is none. A probe landing on a line
    /// ending byte snaps to the next line's start.
    fn beginning_of_line(&self, buf: &[u8], i: usize) -> usize {
        match bytes::last_index_byte(buf, i, self.line_ending) {
            Some(previous) => previous + 1,
            None => 0,
        }
    }

    /// End of the line starting at or after `i`: the next line ending, or
    /// the end of the buffer when the final record has no terminator.
    fn end_of_line(&self, buf: &[u8], i: usize) -> usize {
        bytes::index_byte(buf, i, buf.len(), self.line_ending).unwrap_or(buf.len())
    }
}

fn truncate(key: &[u8], n: usize) -> &[u8] {
    if key.len() > n {
        &key[..n]
    } else {
        key
    }
}
