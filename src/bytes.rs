//! Bounded byte scans over the mapped buffer.
//!
//! The search engine brackets candidate records by scanning for delimiter
//! bytes around arbitrary probe offsets. Both scans are memchr-backed.

use memchr::{memchr, memrchr};

/// Returns the highest index `j <= i` with `buf[j] == c`, or `None` if `c`
/// does not occur at or before `i`. `i` past the end of the buffer is
/// clamped to the last byte.
pub fn last_index_byte(buf: &[u8], i: usize, c: u8) -> Option<usize> {
    if buf.is_empty() {
        return None;
    }
    let i = i.min(buf.len() - 1);
    memrchr(c, &buf[..=i])
}

/// Returns the lowest index `j` with `i <= j < m` and `buf[j] == c`, or
/// `None` if `c` does not occur in that window. `m` past the end of the
/// buffer is clamped.
pub fn index_byte(buf: &[u8], i: usize, m: usize, c: u8) -> Option<usize> {
    let m = m.min(buf.len());
    if i >= m {
        return None;
    }
    memchr(c, &buf[i..m]).map(|j| i + j)
}
