//! Per-home ownership through a PID file
//!
//! Each daemon locks a PID file in its home directory on startup. Another
//! daemon for the same home refuses to start while that lock is held, so
//! the status record only ever has one writer.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Name of the ownership record inside a home directory
pub const PID_FILE_NAME: &str = "daemon.pid";

pub fn pid_path(home: &Path) -> PathBuf {
    home.join(PID_FILE_NAME)
}

/// PID recorded at `path`; `None` when there is no record
fn recorded_owner(path: &Path) -> io::Result<Option<u32>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    contents
        .trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Whether `pid` names a running process
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid == 0 {
        return false;
    }
    // Signal 0 probes without delivering; EPERM still proves existence
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(windows)]
pub fn is_process_alive(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) };
    if handle == 0 {
        return false;
    }
    unsafe { CloseHandle(handle) };
    true
}

/// Exclusive claim on a home directory, released on drop
///
/// The PID file stays open and exclusively locked for the life of the
/// claim. The OS drops the lock when the owner exits, so a record left by a
/// crashed daemon never blocks a new one.
#[derive(Debug)]
pub struct HomeLock {
    path: PathBuf,
    file: Option<File>,
}

/// Open `path` and take its exclusive lock; `None` when another holder has it
#[cfg(unix)]
fn lock_record(path: &Path) -> io::Result<Option<File>> {
    use std::os::unix::fs::OpenOptionsExt;
    use std::os::unix::io::AsRawFd;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o600)
        .open(path)?;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(Some(file));
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(None)
    } else {
        Err(err)
    }
}

#[cfg(windows)]
fn lock_record(path: &Path) -> io::Result<Option<File>> {
    use std::os::windows::fs::OpenOptionsExt;
    use windows_sys::Win32::Foundation::ERROR_SHARING_VIOLATION;

    // No sharing at all: a second open fails until this handle closes
    let opened = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .share_mode(0)
        .open(path);
    match opened {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.raw_os_error() == Some(ERROR_SHARING_VIOLATION as i32) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Whether `path` still names the file we locked
#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let ours = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(current.dev() == ours.dev() && current.ino() == ours.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(windows)]
fn still_linked(_file: &File, _path: &Path) -> io::Result<bool> {
    // An unshared handle cannot be deleted out from under us
    Ok(true)
}

impl HomeLock {
    /// Claim `home` for the current process
    ///
    /// Fails with `AddrInUse` while another holder has the claim, including
    /// another claim from this same process.
    pub fn acquire(home: &Path) -> io::Result<Self> {
        fs::create_dir_all(home)?;
        let path = pid_path(home);
        let ours = std::process::id();

        // A retry only follows a previous owner unlinking the file between
        // our open and our lock
        for _ in 0..3 {
            let Some(mut file) = lock_record(&path)? else {
                let message = match recorded_owner(&path) {
                    Ok(Some(pid)) => format!("daemon already running for {:?} (PID {})", home, pid),
                    _ => format!("daemon already running for {:?}", home),
                };
                return Err(io::Error::new(io::ErrorKind::AddrInUse, message));
            };
            if !still_linked(&file, &path)? {
                continue;
            }

            let mut previous = String::new();
            file.read_to_string(&mut previous)?;
            match previous.trim() {
                "" => {}
                pid => match pid.parse::<u32>() {
                    Ok(pid) => tracing::info!(
                        "Previous daemon (PID {}) exited without cleanup, taking over {:?}",
                        pid,
                        home
                    ),
                    Err(_) => tracing::warn!("Overwriting unreadable PID file {:?}", path),
                },
            }

            file.set_len(0)?;
            file.seek(SeekFrom::Start(0))?;
            writeln!(file, "{}", ours)?;
            file.sync_all()?;
            return Ok(Self {
                path,
                file: Some(file),
            });
        }

        Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            format!("PID file {:?} keeps being replaced", path),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for HomeLock {
    fn drop(&mut self) {
        // Unlink while still holding the lock so no one can claim the
        // doomed file
        #[cfg(unix)]
        self.remove_record();
        drop(self.file.take());
        #[cfg(windows)]
        self.remove_record();
    }
}

impl HomeLock {
    fn remove_record(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove PID file {:?}: {}", self.path, e),
        }
    }
}
