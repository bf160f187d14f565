//! Blocking readiness waits built on `select(2)`.
//!
//! [`wait`] blocks the calling thread until at least one descriptor of the
//! given sets is readable, writable or has a pending error condition, or until
//! the timeout elapses. The caller's sets are copied before the call, so they
//! can be reused across waits; the result holds only the ready subsets.
//!
//! Sockets use [`wait_for`] on their own descriptor before every non-blocking
//! syscall, which is what turns `read`/`write`/`accept`/`connect` into
//! timeout-bounded blocking operations.

use crate::error::{Result, SocketError};
use crate::reactor::descriptor_set::{DescriptorSet, NativeSet};
use crate::reactor::fd;
use crate::time::Deadline;

use libc::{suseconds_t, time_t, timeval};
use std::os::unix::io::RawFd;
use std::ptr;
use std::time::Duration;

/// The kind of readiness a single-descriptor wait is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

/// Ready subsets returned by [`wait`].
#[derive(Debug, Clone, Default)]
pub struct Readiness<S> {
    pub readable: S,
    pub writable: S,
    pub errored: S,
}

impl<S: DescriptorSet> Readiness<S> {
    /// Total number of ready descriptors across the three sets.
    pub fn count(&self) -> usize {
        self.readable.len() + self.writable.len() + self.errored.len()
    }
}

/// Waits until a descriptor in one of the sets is ready.
///
/// `timeout` of `Some(Duration::ZERO)` polls once; `None` blocks until
/// something becomes ready. When nothing is ready in time the call fails with
/// [`SocketError::Timeout`].
///
/// # Errors
/// - [`SocketError::InvalidArgument`] when all three sets are empty or a
///   member does not fit the native `fd_set`.
/// - [`SocketError::System`] when `select(2)` fails for a reason other than
///   `EINTR`, which is retried with the remaining budget.
pub fn wait<S: DescriptorSet>(
    read_set: &S,
    write_set: &S,
    error_set: &S,
    timeout: Option<Duration>,
) -> Result<Readiness<S>> {
    if read_set.is_empty() && write_set.is_empty() && error_set.is_empty() {
        return Err(SocketError::invalid_argument(
            "readiness wait needs at least one descriptor",
        ));
    }

    let native_read = to_native(read_set)?;
    let native_write = to_native(write_set)?;
    let native_error = to_native(error_set)?;

    let highest = [read_set, write_set, error_set]
        .iter()
        .flat_map(|set| set.descriptors())
        .max()
        .unwrap_or(0);

    let deadline = Deadline::after(timeout);

    loop {
        let mut ready_read = native_read;
        let mut ready_write = native_write;
        let mut ready_error = native_error;

        let mut time_value = deadline.remaining().map(to_timeval);
        let time_pointer = time_value
            .as_mut()
            .map_or(ptr::null_mut(), |value| value as *mut timeval);

        let result = unsafe {
            libc::select(
                highest + 1,
                ready_read.as_raw_mut(),
                ready_write.as_raw_mut(),
                ready_error.as_raw_mut(),
                time_pointer,
            )
        };

        match fd::check(result) {
            // The timeval may have been clamped below the real budget.
            Ok(0) if !deadline.is_expired() => continue,
            Ok(0) => return Err(SocketError::Timeout(deadline.duration())),
            Ok(_) => {
                return Ok(Readiness {
                    readable: ready_subset(read_set, &ready_read),
                    writable: ready_subset(write_set, &ready_write),
                    errored: ready_subset(error_set, &ready_error),
                });
            }
            Err(error) if fd::is_interrupted(&error) => continue,
            Err(error) => return Err(error.into()),
        }
    }
}

/// Waits for a single descriptor, reporting timeouts against `deadline`.
///
/// An error condition on the descriptor counts as ready: the syscall that
/// follows is what reports the actual error.
pub fn wait_for(file_descriptor: RawFd, interest: Interest, deadline: &Deadline) -> Result<()> {
    let watched = NativeSet::from_descriptors([file_descriptor]);
    if watched.is_empty() {
        return Err(SocketError::invalid_argument(format!(
            "descriptor {file_descriptor} cannot be waited on with select"
        )));
    }

    let empty = NativeSet::new();
    let (read_set, write_set) = match interest {
        Interest::Read => (&watched, &empty),
        Interest::Write => (&empty, &watched),
    };

    match wait(read_set, write_set, &watched, deadline.remaining()) {
        Ok(_) => Ok(()),
        Err(SocketError::Timeout(_)) => Err(SocketError::Timeout(deadline.duration())),
        Err(error) => Err(error),
    }
}

fn to_native<S: DescriptorSet>(set: &S) -> Result<NativeSet> {
    let native = NativeSet::from_descriptors(set.descriptors());

    if native.len() != set.len() {
        return Err(SocketError::invalid_argument(format!(
            "descriptor set holds members beyond the select capacity of {}",
            NativeSet::CAPACITY
        )));
    }

    Ok(native)
}

fn ready_subset<S: DescriptorSet>(watched: &S, ready: &NativeSet) -> S {
    S::from_descriptors(
        watched
            .descriptors()
            .into_iter()
            .filter(|&file_descriptor| ready.contains(file_descriptor)),
    )
}

/// Longest single `select(2)` timeout; some kernels reject larger values with
/// `EINVAL`. Longer budgets are waited out over several calls.
const MAX_SELECT_SECS: u64 = 100_000_000;

fn to_timeval(duration: Duration) -> timeval {
    timeval {
        tv_sec: duration.as_secs().min(MAX_SELECT_SECS) as time_t,
        tv_usec: duration.subsec_micros() as suseconds_t,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeval_is_clamped_for_huge_budgets() {
        let value = to_timeval(Duration::from_secs(u64::MAX));

        assert_eq!(value.tv_sec as u64, MAX_SELECT_SECS);
        assert_eq!(value.tv_usec, 0);
    }

    #[test]
    fn timeval_keeps_sub_second_precision() {
        let value = to_timeval(Duration::from_millis(1_250));

        assert_eq!(value.tv_sec, 1);
        assert_eq!(value.tv_usec, 250_000);
    }
}
