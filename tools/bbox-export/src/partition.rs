//! Waiting for the output location to become usable, and flushing it.

use log::{debug, warn};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Interval between two polls of [`wait_partition`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Access the caller needs on the waited-for path.
#[derive(Debug, Copy, Clone, Eq, PartialEq, clap::ValueEnum)]
pub enum AccessMode {
    Read,
    ReadWrite,
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("{} did not appear after {retries} attempt(s)", path.display())]
    Missing { path: PathBuf, retries: u32 },
    #[error("{} is read-only", path.display())]
    ReadOnly { path: PathBuf },
    #[error("cannot inspect {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Poll `path` until it exists and grants `mode`.
///
/// Probes at most `retries` times, [`POLL_INTERVAL`] apart. A path that
/// exists but stays read-only while `mode` asks for writing is reported as
/// [`WaitError::ReadOnly`] once the retries run out.
pub fn wait_partition(path: &Path, retries: u32, mode: AccessMode) -> Result<(), WaitError> {
    let retries = retries.max(1);
    let mut read_only = false;
    for attempt in 1..=retries {
        match fs::metadata(path) {
            Ok(meta) if mode == AccessMode::ReadWrite && meta.permissions().readonly() => {
                debug!("{} is read-only (attempt {attempt}/{retries})", path.display());
                read_only = true;
            }
            Ok(_) => {
                debug!("{} ready after {attempt} attempt(s)", path.display());
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} not there yet (attempt {attempt}/{retries})", path.display());
                read_only = false;
            }
            Err(source) => {
                return Err(WaitError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }
        if attempt < retries {
            thread::sleep(POLL_INTERVAL);
        }
    }
    warn!("gave up waiting for {}", path.display());
    let path = path.to_path_buf();
    Err(if read_only {
        WaitError::ReadOnly { path }
    } else {
        WaitError::Missing { path, retries }
    })
}

/// Flush `files` and the directories holding them to stable storage.
pub fn sys_sync(files: &[PathBuf]) -> io::Result<()> {
    let mut dirs: Vec<&Path> = Vec::new();
    for file in files {
        File::open(file)?.sync_all()?;
        if let Some(dir) = file.parent()
            && !dirs.contains(&dir)
        {
            dirs.push(dir);
        }
    }
    for dir in dirs {
        // Directories cannot be opened for syncing everywhere.
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            debug!("cannot sync {}: {e}", dir.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn existing_directory_is_ready_at_once() {
        let dir = tempfile::tempdir().unwrap();
        let start = Instant::now();
        wait_partition(dir.path(), 5, AccessMode::ReadWrite).unwrap();
        assert!(start.elapsed() < POLL_INTERVAL);
    }

    #[test]
    fn missing_path_times_out_after_the_retries() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("data");
        let start = Instant::now();
        let err = wait_partition(&missing, 3, AccessMode::Read).unwrap_err();
        assert!(matches!(err, WaitError::Missing { retries: 3, .. }));
        assert!(start.elapsed() >= 2 * POLL_INTERVAL);
    }

    #[test]
    fn path_appearing_late_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let late = dir.path().join("late");
        let creator = {
            let late = late.clone();
            thread::spawn(move || {
                thread::sleep(POLL_INTERVAL);
                fs::create_dir(late).unwrap();
            })
        };
        wait_partition(&late, 20, AccessMode::Read).unwrap();
        creator.join().unwrap();
    }

    #[test]
    fn read_only_file_fails_a_write_wait_but_passes_a_read_wait() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("ro");
        fs::write(&file, b"x").unwrap();
        let mut perms = fs::metadata(&file).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&file, perms).unwrap();

        wait_partition(&file, 1, AccessMode::Read).unwrap();
        assert!(matches!(
            wait_partition(&file, 2, AccessMode::ReadWrite),
            Err(WaitError::ReadOnly { .. })
        ));
    }

    #[test]
    fn sync_flushes_written_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();
        sys_sync(&[a, b]).unwrap();
        assert!(sys_sync(&[dir.path().join("gone")]).is_err());
    }
}
