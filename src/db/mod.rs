//! The mapped file holder.
//!
//! A [`Db`] owns at most one mapped snapshot of the sorted data file: the
//! open file handle, its read-only shared mapping, and the path used to
//! reopen it on remap. A reader/writer lock guards the snapshot lifetime:
//! queries probe and copy under the shared mode, while open/close/remap
//! install or drop the mapping under the exclusive mode. Queries never
//! retain references into the mapping past the lock release; every result
//! is copied into a freshly allocated buffer first.

pub mod search;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::SystemTime;

use memmap2::Mmap;

use crate::error::{Error, Result};

/// Byte terminating each record. Records must be sorted ascending by their
/// raw bytes up to this terminator.
pub const DEFAULT_LINE_ENDING: u8 = b'\n';

/// Byte partitioning a record into key and value.
pub const DEFAULT_RECORD_SEPARATOR: u8 = b'\t';

/// One mapped snapshot of the data file.
struct Mapped {
    file: File,
    map: Mmap,
    path: PathBuf,
}

/// Read-only lookup database over a sorted, delimited flat file.
pub struct Db {
    mapped: RwLock<Option<Mapped>>,
    seek_count: AtomicU64,
    record_separator: u8,
    line_ending: u8,
    mlock: bool,
}

impl Db {
    /// Creates a closed holder with the given delimiters. `mlock` requests
    /// that every mapping be pinned in physical memory; a pin failure is
    /// then fatal to the open.
    pub fn new(record_separator: u8, line_ending: u8, mlock: bool) -> Self {
        Self {
            mapped: RwLock::new(None),
            seek_count: AtomicU64::new(0),
            record_separator,
            line_ending,
            mlock,
        }
    }

    /// Creates a holder and immediately opens it against `path`.
    pub fn open_path(path: &Path, record_separator: u8, mlock: bool) -> Result<Self> {
        let db = Self::new(record_separator, DEFAULT_LINE_ENDING, mlock);
        db.open(path)?;
        Ok(db)
    }

    /// Maps `path` read-only/shared as the current snapshot, displacing any
    /// prior snapshot under the exclusive lock. Zero-length files are
    /// rejected: a mapped snapshot must cover at least one byte.
    pub fn open(&self, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        if size == 0 {
            return Err(Error::InvalidSize(size));
        }
        let map = unsafe { Mmap::map(&file)? };
        if self.mlock {
            map.lock()
                .map_err(|e| Error::IO(format!("mlock failed: {e}")))?;
            tracing::info!("DB mlock engaged");
        }
        tracing::info!(size, path = %path.display(), "DB mmap");

        let mut mapped = self.mapped.write()?;
        close_slot(&mut mapped);
        *mapped = Some(Mapped {
            file,
            map,
            path: path.to_path_buf(),
        });
        Ok(())
    }

    /// Unmaps and closes the current snapshot, if any.
    pub fn close(&self) {
        let mut mapped = self.mapped.write().unwrap();
        close_slot(&mut mapped);
    }

    /// Reopens and remaps the file the current snapshot was opened from.
    /// The path is captured under the shared lock; the subsequent open
    /// takes the exclusive lock and displaces the prior snapshot.
    pub fn remap(&self) -> Result<()> {
        let path = {
            let mapped = self.mapped.read()?;
            match mapped.as_ref() {
                Some(m) => m.path.clone(),
                None => return Err(Error::NotOpen),
            }
        };
        tracing::info!(path = %path.display(), "DB remapping");
        self.open(&path)
    }

    /// Returns the mapped backing file's size in bytes and modification
    /// time as unix seconds, or `(0, 0)` if nothing is mapped.
    pub fn info(&self) -> (i64, i64) {
        let mapped = self.mapped.read().unwrap();
        match mapped.as_ref() {
            Some(m) => {
                let mtime = m
                    .file
                    .metadata()
                    .ok()
                    .and_then(|md| md.modified().ok())
                    .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0);
                (m.map.len() as i64, mtime)
            }
            None => (0, 0),
        }
    }

    /// Total binary-search probes performed over the process lifetime.
    /// Remaps do not reset it.
    pub fn seek_count(&self) -> u64 {
        self.seek_count.load(Ordering::SeqCst)
    }

    pub fn record_separator(&self) -> u8 {
        self.record_separator
    }

    pub fn line_ending(&self) -> u8 {
        self.line_ending
    }
}

fn close_slot(slot: &mut Option<Mapped>) {
    if let Some(m) = slot.take() {
        tracing::info!(size = m.map.len(), path = %m.path.display(), "DB munmap");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmpfs::NamedTempFile;

    #[test]
    fn test_open_rejects_empty_file() {
        let tmp = NamedTempFile::create(b"").expect("create temp file");
        let db = Db::new(DEFAULT_RECORD_SEPARATOR, DEFAULT_LINE_ENDING, false);
        assert_eq!(db.open(tmp.path()), Err(Error::InvalidSize(0)));
        assert_eq!(db.info(), (0, 0));
    }

    #[test]
    fn test_remap_requires_open() {
        let db = Db::new(DEFAULT_RECORD_SEPARATOR, DEFAULT_LINE_ENDING, false);
        assert_eq!(db.remap(), Err(Error::NotOpen));
    }

    #[test]
    fn test_info_reports_size_and_mtime() {
        let tmp = NamedTempFile::create(b"k\tv\n").expect("create temp file");
        let db = Db::new(DEFAULT_RECORD_SEPARATOR, DEFAULT_LINE_ENDING, false);
        db.open(tmp.path()).expect("open");

        let (size, mtime) = db.info();
        assert_eq!(size, 4);
        assert!(mtime > 0);

        db.close();
        assert_eq!(db.info(), (0, 0));
    }

    #[test]
    fn test_reopen_displaces_previous_snapshot() {
        let first = NamedTempFile::create(b"a\tone\n").expect("create temp file");
        let second = NamedTempFile::create(b"b\ttwo\nc\tthree\n").expect("create temp file");

        let db = Db::new(DEFAULT_RECORD_SEPARATOR, DEFAULT_LINE_ENDING, false);
        db.open(first.path()).expect("open first");
        assert_eq!(db.info().0, 6);

        db.open(second.path()).expect("open second");
        assert_eq!(db.info().0, 13);
        assert_eq!(db.search(b"b"), Some(b"b\ttwo".to_vec()));
        assert_eq!(db.search(b"a"), None);
    }
}
