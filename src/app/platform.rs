// Author: Dustin Pilgrim
// License: MIT

use std::fmt;
use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "ticktrack.lock";

#[derive(Debug)]
pub enum LockError {
    NoRuntimeDir(String),
    AlreadyRunning(PathBuf),
    Bind { path: PathBuf, source: io::Error },
}

impl fmt::Display for LockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockError::NoRuntimeDir(e) => write!(f, "{e} (cannot create instance lock)"),
            LockError::AlreadyRunning(path) => write!(
                f,
                "ticktrack is already running (another instance holds {})",
                path.display()
            ),
            LockError::Bind { path, source } => {
                write!(f, "failed to bind instance lock {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for LockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LockError::Bind { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Held for the daemon's lifetime so only one process writes the state file.
/// The socket file is removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
    _listener: UnixListener,
    path: PathBuf,
}

impl InstanceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Take the lock under `$XDG_RUNTIME_DIR/ticktrack`.
pub fn acquire_single_instance_lock() -> Result<InstanceLock, LockError> {
    let dir = crate::ipc::runtime_dir()
        .map_err(LockError::NoRuntimeDir)?
        .join("ticktrack");
    acquire_in(&dir)
}

/// Bind the lock socket in `dir`. A live holder answers a connect and wins;
/// a socket file left by a crashed run does not, and is replaced.
pub fn acquire_in(dir: &Path) -> Result<InstanceLock, LockError> {
    let _ = std::fs::create_dir_all(dir);
    let path = dir.join(LOCK_FILE);

    let bind = |path: &Path| {
        UnixListener::bind(path).map_err(|source| LockError::Bind {
            path: path.to_path_buf(),
            source,
        })
    };

    let listener = match UnixListener::bind(&path) {
        Ok(l) => l,
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            if UnixStream::connect(&path).is_ok() {
                return Err(LockError::AlreadyRunning(path));
            }
            let _ = std::fs::remove_file(&path);
            bind(&path)?
        }
        Err(source) => return Err(LockError::Bind { path, source }),
    };

    Ok(InstanceLock {
        _listener: listener,
        path,
    })
}
