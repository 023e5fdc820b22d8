//! Single-writer lock for commands that sync into the database.
//!
//! Two syncs against the same database would race on `replace_session`, so
//! every writing command holds an advisory `flock` on a lock file scoped to
//! the database path. Readers (`sessions`, `show`, `insights`) take no lock.

use anyhow::{Context, Result};
use std::collections::hash_map::DefaultHasher;
use std::fs::{self, File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

const SYNC_LOCK_FILE: &str = "claude-deck-sync.lock";

/// Held for as long as the process may write to the database.
pub struct SyncGuard {
    file: File,
    path: PathBuf,
}

impl Drop for SyncGuard {
    fn drop(&mut self) {
        let _ = unlock_file(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

/// Take the sync lock for `db_path`, failing if another sync holds it.
pub fn acquire_sync_guard(db_path: &Path) -> Result<SyncGuard> {
    let dir = lock_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create lock directory: {}", dir.display()))?;
    let path = dir.join(scoped_lock_filename(db_path));

    match try_lock(&path)? {
        Some(guard) => Ok(guard),
        None => {
            let holder = fs::read_to_string(&path).unwrap_or_default();
            anyhow::bail!(
                "another claude-deck sync is already running for {} ({})",
                db_path.display(),
                holder.trim()
            )
        }
    }
}

fn try_lock(path: &Path) -> Result<Option<SyncGuard>> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("failed to open lock file: {}", path.display()))?;

    match lock_file_nonblocking(&file) {
        Ok(()) => {
            let _ = file.set_len(0);
            let _ = file.seek(SeekFrom::Start(0));
            let _ = writeln!(file, "pid={}", std::process::id());
            let _ = file.flush();
            Ok(Some(SyncGuard {
                file,
                path: path.to_path_buf(),
            }))
        }
        Err(e) if is_lock_busy(&e) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to lock file: {}", path.display())),
    }
}

fn lock_dir() -> PathBuf {
    let mut dir = match std::env::var_os("XDG_RUNTIME_DIR") {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => std::env::temp_dir(),
    };
    dir.push("claude-deck");
    dir
}

/// One lock per database, so syncs into different databases do not block.
fn scoped_lock_filename(db_path: &Path) -> String {
    let mut hasher = DefaultHasher::new();
    db_path.to_string_lossy().hash(&mut hasher);
    format!("{}.{:016x}", SYNC_LOCK_FILE, hasher.finish())
}

fn is_lock_busy(error: &io::Error) -> bool {
    // EAGAIN on Linux, EWOULDBLOCK on macOS
    matches!(error.kind(), io::ErrorKind::WouldBlock)
        || matches!(error.raw_os_error(), Some(11) | Some(35))
}

#[cfg(unix)]
fn lock_file_nonblocking(file: &File) -> io::Result<()> {
    const LOCK_EX: i32 = 2;
    const LOCK_NB: i32 = 4;
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(file.as_raw_fd(), LOCK_EX | LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn unlock_file(file: &File) -> io::Result<()> {
    const LOCK_UN: i32 = 8;
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(file.as_raw_fd(), LOCK_UN) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
unsafe extern "C" {
    fn flock(fd: i32, operation: i32) -> i32;
}

#[cfg(not(unix))]
compile_error!("claude-deck sync locking currently requires Unix (macOS/Linux)");
