use std::fs;
use std::path::{Path, PathBuf};

pub struct NamedTempFile {
    path: PathBuf,
}

impl NamedTempFile {
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = PathBuf::from("/tmp/flatdb_tests");
        fs::create_dir_all(&temp_dir)?;

        let unique_name = format!("file_{}_{}", std::process::id(), rand_suffix());
        let path = temp_dir.join(unique_name);

        Ok(Self { path })
    }

    /// Creates a temp file with the given contents already written.
    pub fn create(contents: &[u8]) -> std::io::Result<Self> {
        let file = Self::new()?;
        fs::write(&file.path, contents)?;
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for NamedTempFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn rand_suffix() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64;
    nanos ^ (COUNTER.fetch_add(1, Ordering::Relaxed) << 48)
}
