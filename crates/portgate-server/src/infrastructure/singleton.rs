//! Single-instance guard based on an exclusive lock on the pid file.
//!
//! [`acquire`] opens (creating if needed) the pid file, takes a non-blocking
//! exclusive POSIX record lock over the whole file with `fcntl(F_SETLK)`, and
//! writes the process id into it.  The returned [`LockHandle`] keeps the file
//! open; the lock lives until the handle is dropped or the process exits.
//!
//! Whether another server is running is decided by the lock alone.  The pid
//! text is diagnostic and may be stale or incomplete.
//!
//! # POSIX record lock caveats
//!
//! - Locks belong to the *process*: a second [`acquire`] from the process that
//!   already holds the lock succeeds.  The guard protects against other
//!   processes, which is what "one server per host" needs.
//! - Closing *any* descriptor for the file releases the process's lock on it.
//!   [`test_owner`] and [`read_pid_file`] open their own descriptor, so they
//!   must not be called by the process holding the lock.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use portgate_core::pidfile::{format_pid_line, parse_pid};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from the single-instance guard.
#[derive(Debug, Error)]
pub enum SingletonError {
    /// Another process holds the lock.  Not an operational failure.
    #[error("another instance holds the lock on {}", path.display())]
    AlreadyRunning { path: PathBuf },

    /// The pid file could not be opened, locked, queried or read.
    #[error("{op} {} failed: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SingletonError {
    fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Proof that this process holds the single-instance lock.
///
/// Dropping the handle closes the file and releases the lock.
#[derive(Debug)]
pub struct LockHandle {
    _file: File,
    path: PathBuf,
    pid: u32,
}

impl LockHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The process id written into the file.
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Takes the single-instance lock on `path` and records this process's id.
///
/// A failed truncate or write of the pid text is logged and otherwise
/// ignored: the lock is what matters and it is held either way.
///
/// # Errors
///
/// - [`SingletonError::AlreadyRunning`] if another process holds the lock.
///   The other process's lock is left untouched.
/// - [`SingletonError::Io`] if the file cannot be opened or the lock call
///   fails for another reason.
pub fn acquire(path: impl AsRef<Path>) -> Result<LockHandle, SingletonError> {
    let path = path.as_ref();
    let mut file = open_lock_file(path)?;

    if let Err(e) = sys::try_write_lock(&file) {
        if sys::is_contended(&e) {
            debug!("pid file {} is locked by another process", path.display());
            return Err(SingletonError::AlreadyRunning {
                path: path.to_path_buf(),
            });
        }
        return Err(SingletonError::io("lock", path, e));
    }

    let pid = std::process::id();
    write_pid(&mut file, path, pid);
    info!("acquired single-instance lock {} (pid {pid})", path.display());

    Ok(LockHandle {
        _file: file,
        path: path.to_path_buf(),
        pid,
    })
}

/// Returns the pid of the process holding the lock on `path`, or 0 when the
/// file is not locked.  Never takes a lock.
///
/// The file is created if it does not exist, the same way [`acquire`] would.
///
/// # Errors
///
/// Returns [`SingletonError::Io`] if the file cannot be opened or queried.
pub fn test_owner(path: impl AsRef<Path>) -> Result<u32, SingletonError> {
    let path = path.as_ref();
    let file = open_lock_file(path)?;
    sys::lock_owner(&file).map_err(|e| SingletonError::io("query lock on", path, e))
}

/// Reads the pid recorded in the file.
///
/// Returns `Ok(None)` when the file does not exist or does not start with a
/// valid pid.
///
/// # Errors
///
/// Returns [`SingletonError::Io`] for read failures other than "not found".
pub fn read_pid_file(path: impl AsRef<Path>) -> Result<Option<u32>, SingletonError> {
    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SingletonError::io("read", path, e)),
    };
    match parse_pid(&content) {
        Ok(pid) => Ok(Some(pid)),
        Err(e) => {
            debug!("pid file {}: {e}", path.display());
            Ok(None)
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File, SingletonError> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options
        .open(path)
        .map_err(|e| SingletonError::io("open", path, e))
}

fn write_pid(file: &mut File, path: &Path, pid: u32) {
    if let Err(e) = file.set_len(0) {
        warn!("could not truncate pid file {}: {e}", path.display());
    }
    let line = format_pid_line(pid);
    let written = file
        .seek(SeekFrom::Start(0))
        .and_then(|_| file.write_all(line.as_bytes()))
        .and_then(|_| file.flush());
    if let Err(e) = written {
        warn!(
            "could not write pid {pid} to {}: {e} (lock is still held)",
            path.display()
        );
    }
}

#[cfg(unix)]
mod sys {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    fn whole_file_write_lock() -> libc::flock {
        // SAFETY: `flock` is a plain C struct; all-zero is a valid value.
        let mut fl: libc::flock = unsafe { std::mem::zeroed() };
        fl.l_type = libc::F_WRLCK as libc::c_short;
        fl.l_whence = libc::SEEK_SET as libc::c_short;
        fl.l_start = 0;
        fl.l_len = 0;
        fl
    }

    /// `fcntl(F_SETLK)` with a write lock over the whole file.
    pub(super) fn try_write_lock(file: &File) -> io::Result<()> {
        let fl = whole_file_write_lock();
        // SAFETY: the descriptor is owned by `file` and `fl` outlives the call.
        let rc = unsafe {
            libc::fcntl(file.as_raw_fd(), libc::F_SETLK, &fl as *const libc::flock)
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// `fcntl(F_GETLK)`: pid of the conflicting holder, 0 if none.
    pub(super) fn lock_owner(file: &File) -> io::Result<u32> {
        let mut fl = whole_file_write_lock();
        // SAFETY: as above; the kernel writes the result back into `fl`.
        let rc = unsafe {
            libc::fcntl(file.as_raw_fd(), libc::F_GETLK, &mut fl as *mut libc::flock)
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        if fl.l_type == libc::F_UNLCK as libc::c_short {
            return Ok(0);
        }
        Ok(u32::try_from(fl.l_pid).unwrap_or(0))
    }

    /// EACCES and EAGAIN both mean "someone else holds it".
    pub(super) fn is_contended(err: &io::Error) -> bool {
        matches!(err.raw_os_error(), Some(code) if code == libc::EACCES || code == libc::EAGAIN)
    }
}

#[cfg(not(unix))]
mod sys {
    use std::fs::File;
    use std::io;

    fn unsupported() -> io::Error {
        io::Error::new(
            io::ErrorKind::Unsupported,
            "pid-file locking requires POSIX record locks",
        )
    }

    pub(super) fn try_write_lock(_file: &File) -> io::Result<()> {
        Err(unsupported())
    }

    pub(super) fn lock_owner(_file: &File) -> io::Result<u32> {
        Err(unsupported())
    }

    pub(super) fn is_contended(_err: &io::Error) -> bool {
        false
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
//
// Cross-process behaviour (a second server refusing to start) is covered by
// `tests/singleton_process.rs`, which runs the real binary.
