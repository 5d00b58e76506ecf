use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use wx_common::{PipelineError, Result};

/// Advisory single-instance lock held for the process lifetime. Created
/// with `O_EXCL` semantics so a second concurrent run fails fast instead
/// of racing the first for the same scratch directories.
pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => PipelineError::AlreadyRunning(path.to_path_buf()),
                _ => PipelineError::Io(e),
            })?;
        writeln!(file, "{}", std::process::id())?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
