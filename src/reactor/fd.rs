//! Raw descriptor helpers shared by sockets and the readiness waiter.

use libc::{F_GETFD, F_GETFL, F_SETFD, F_SETFL, FD_CLOEXEC, O_NONBLOCK, c_int, fcntl};
use std::io;
use std::os::unix::io::RawFd;

/// Converts a `-1` syscall return into the `errno` captured right after the call.
pub(crate) fn check(result: c_int) -> io::Result<c_int> {
    if result < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(result)
    }
}

/// Same as [`check`] for syscalls returning `ssize_t`.
pub(crate) fn check_size(result: isize) -> io::Result<usize> {
    if result < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(result as usize)
    }
}

pub(crate) fn set_nonblocking(file_descriptor: RawFd) -> io::Result<()> {
    let flags = check(unsafe { fcntl(file_descriptor, F_GETFL) })?;

    if flags & O_NONBLOCK == 0 {
        check(unsafe { fcntl(file_descriptor, F_SETFL, flags | O_NONBLOCK) })?;
    }

    Ok(())
}

pub(crate) fn set_cloexec(file_descriptor: RawFd) -> io::Result<()> {
    let flags = check(unsafe { fcntl(file_descriptor, F_GETFD) })?;

    if flags & FD_CLOEXEC == 0 {
        check(unsafe { fcntl(file_descriptor, F_SETFD, flags | FD_CLOEXEC) })?;
    }

    Ok(())
}

/// Returns true for errors that mean "retry the same call".
pub(crate) fn is_interrupted(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::Interrupted
}

/// Returns true for `EAGAIN`/`EWOULDBLOCK` on a non-blocking descriptor.
pub(crate) fn would_block(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::WouldBlock
}
