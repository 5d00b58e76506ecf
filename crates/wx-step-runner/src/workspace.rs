use std::path::{Path, PathBuf};

use tracing::{error, warn};

/// Owns the four scratch directories (`downloads/`, `processed/`,
/// `colored/`, `tiles/`) for one run and removes them on every exit path
/// via `Drop` — normal completion, early return, or panic unwind alike.
///
/// Subprocess tools sometimes leave files owned by a different uid (e.g.
/// a containerized colormap tool running as root). The first cleanup
/// attempt is a plain `remove_dir_all`; if that fails, one `sudo rm -rf`
/// escalation is attempted before giving up and logging the leftover path.
pub struct WorkspaceGuard {
    root: PathBuf,
    /// Count of scratch dirs that needed `sudo rm -rf` to clean up.
    escalations: std::sync::atomic::AtomicU64,
}

impl WorkspaceGuard {
    /// Creates `root` and its four scratch subdirectories.
    pub fn create(root: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&root)?;
        for sub in ["downloads", "processed", "colored", "tiles"] {
            std::fs::create_dir_all(root.join(sub))?;
        }
        Ok(Self {
            root,
            escalations: std::sync::atomic::AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn escalation_count(&self) -> u64 {
        self.escalations.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn teardown(&self) {
        for sub in ["downloads", "processed", "colored", "tiles"] {
            let dir = self.root.join(sub);
            if !dir.exists() {
                continue;
            }
            if std::fs::remove_dir_all(&dir).is_ok() {
                continue;
            }
            warn!(dir = %dir.display(), "scratch dir cleanup failed, attempting privilege escalation");
            let escalated = std::process::Command::new("sudo")
                .arg("rm")
                .arg("-rf")
                .arg(&dir)
                .status();
            match escalated {
                Ok(status) if status.success() => {
                    self.escalations
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
                Ok(status) => {
                    error!(dir = %dir.display(), code = status.code(), "sudo rm -rf failed, leaving scratch dir behind");
                }
                Err(e) => {
                    error!(dir = %dir.display(), error = %e, "could not invoke sudo for scratch dir cleanup");
                }
            }
        }
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_populates_four_scratch_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("run");
        let guard = WorkspaceGuard::create(root.clone()).unwrap();
        for sub in ["downloads", "processed", "colored", "tiles"] {
            assert!(root.join(sub).is_dir());
        }
        assert_eq!(guard.escalation_count(), 0);
    }

    #[test]
    fn drop_removes_scratch_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("run");
        {
            let guard = WorkspaceGuard::create(root.clone()).unwrap();
            std::fs::write(root.join("downloads").join("f.grib2"), b"data").unwrap();
            drop(guard);
        }
        assert!(!root.join("downloads").exists());
    }
}
