//! Local daemon discovery
//!
//! Each daemon writes its base URL as a single line to `url.txt` inside its
//! own home directory once it is listening. Front-ends read that file to find
//! the daemon; there is no registry.
//!
//! Registration also claims the home directory through a PID file, so a
//! second daemon for the same home refuses to start instead of overwriting
//! the first one's URL.

use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::ipc::API_PREFIX;
use crate::pidfile::HomeLock;

/// File name of the discovery record
pub const URL_FILENAME: &str = "url.txt";

/// Path of the discovery record for a home directory
pub fn url_path(home: &Path) -> PathBuf {
    home.join(URL_FILENAME)
}

/// Base URL a daemon bound to `addr` serves its routes under
pub fn base_url(addr: SocketAddr) -> String {
    format!("http://{}{}", addr, API_PREFIX)
}

/// Write the discovery record
///
/// Creates the home directory if needed and restricts the file to its owner
/// on Unix.
pub fn write_url_file(home: &Path, url: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(home)?;
    let path = url_path(home);
    fs::write(&path, format!("{}\n", url))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(path)
}

/// Read the base URL of the daemon serving `home`
pub fn read_url_file(home: &Path) -> io::Result<String> {
    let path = url_path(home);
    match fs::read_to_string(&path) {
        Ok(contents) => {
            let url = contents.lines().next().unwrap_or_default().trim().to_string();
            if url.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("{:?} is empty", path),
                ));
            }
            Ok(url)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no daemon is running for {:?} ({:?} not found)", home, path),
        )),
        Err(e) => Err(e),
    }
}

/// Remove the discovery record; succeeds if it is already gone
pub fn remove_url_file(home: &Path) -> io::Result<()> {
    match fs::remove_file(url_path(home)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// A daemon's claim on its home directory
///
/// Dropping the registration removes `url.txt` and the PID file.
pub struct Registration {
    home: PathBuf,
    url: String,
    _pid: HomeLock,
}

impl Registration {
    /// Claim `home` for this process and publish `url`
    pub fn register(home: &Path, url: &str) -> io::Result<Self> {
        let pid = HomeLock::acquire(home)?;
        write_url_file(home, url)?;
        tracing::info!("Published {} to {:?}", url, url_path(home));

        Ok(Self {
            home: home.to_path_buf(),
            url: url.to_string(),
            _pid: pid,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Err(e) = remove_url_file(&self.home) {
            tracing::warn!("Failed to remove {:?}: {}", url_path(&self.home), e);
        }
    }
}
