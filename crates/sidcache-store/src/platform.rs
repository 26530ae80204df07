//! Platform calls the journal needs beyond std
//!
//! Two concerns live here: pushing journal bytes to stable media, and the
//! advisory whole-file locks that let several processes share one journal.
//! Unix uses `fdatasync`/`F_FULLFSYNC` and `flock(2)`; Windows uses
//! `FlushFileBuffers` and `LockFileEx`.

use std::fs::File;
use std::io;
use std::path::Path;

/// Flush journal data (not metadata) to stable media.
///
/// Apple platforms need `F_FULLFSYNC`; a plain fsync there stops at the
/// drive cache.
pub fn sync_data(file: &File) -> io::Result<()> {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the descriptor belongs to `file`, which outlives the call.
        let rc = unsafe { libc::fdatasync(file.as_raw_fd()) };
        cvt(rc)
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the descriptor belongs to `file`, which outlives the call.
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_FULLFSYNC) };
        cvt(rc)
    }

    #[cfg(windows)]
    {
        use std::os::windows::io::AsRawHandle;
        use winapi::um::fileapi::FlushFileBuffers;
        // SAFETY: the handle belongs to `file`, which outlives the call.
        if unsafe { FlushFileBuffers(file.as_raw_handle() as *mut _) } != 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        windows
    )))]
    {
        file.sync_data()
    }
}

/// Make a rename inside `dir` durable. A no-op off unix.
pub fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()
    }

    #[cfg(not(unix))]
    {
        let _ = dir;
        Ok(())
    }
}

/// Take a shared or exclusive lock on the whole of `file`.
///
/// Locks belong to the open file, so two `File`s on the same path conflict
/// even inside one process. With `wait == false` a conflicting lock returns
/// `Ok(false)` instead of blocking.
pub fn lock(file: &File, exclusive: bool, wait: bool) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let mut op = if exclusive { libc::LOCK_EX } else { libc::LOCK_SH };
        if !wait {
            op |= libc::LOCK_NB;
        }
        loop {
            // SAFETY: the descriptor belongs to `file`, which outlives the call.
            if unsafe { libc::flock(file.as_raw_fd(), op) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::Interrupted => continue,
                io::ErrorKind::WouldBlock => return Ok(false),
                _ => return Err(err),
            }
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::io::AsRawHandle;
        use winapi::shared::winerror::ERROR_LOCK_VIOLATION;
        use winapi::um::fileapi::LockFileEx;
        use winapi::um::minwinbase::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, OVERLAPPED};

        let mut flags = 0;
        if exclusive {
            flags |= LOCKFILE_EXCLUSIVE_LOCK;
        }
        if !wait {
            flags |= LOCKFILE_FAIL_IMMEDIATELY;
        }
        // SAFETY: an all-zero OVERLAPPED is valid and selects offset 0.
        let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };
        // SAFETY: the handle belongs to `file`; `overlapped` lives for the call.
        let rc = unsafe { LockFileEx(file.as_raw_handle() as *mut _, flags, 0, !0, !0, &mut overlapped) };
        if rc != 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32) {
            Ok(false)
        } else {
            Err(err)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (file, exclusive, wait);
        Ok(true)
    }
}

/// Release a lock taken with [`lock`].
pub fn unlock(file: &File) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        // SAFETY: the descriptor belongs to `file`, which outlives the call.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
        cvt(rc)
    }

    #[cfg(windows)]
    {
        use std::os::windows::io::AsRawHandle;
        use winapi::um::fileapi::UnlockFile;
        // SAFETY: the handle belongs to `file`, which outlives the call.
        if unsafe { UnlockFile(file.as_raw_handle() as *mut _, 0, 0, !0, !0) } != 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = file;
        Ok(())
    }
}

#[cfg(unix)]
fn cvt(rc: libc::c_int) -> io::Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
