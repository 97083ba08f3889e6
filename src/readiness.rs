/*
 * btls - SecureStream/ReadinessSet: blocking TLS byte streams *with* readiness multiplexing
 * This is free and unencumbered software released into the public domain.
 */
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use crate::utilities::Deadline;
use crate::TlsError;

/// A set of socket handles that can be polled for readiness
///
/// Handles are added with [`register()`](ReadinessSet::register) – usually by
/// a [`Transport`](crate::Transport) implementation registering its own
/// underlying handle. A blocking [`wait()`](ReadinessSet::wait) call over up
/// to three sets (one per readiness kind: read, write, error) suspends the
/// calling thread until at least one handle becomes ready; afterwards each
/// handle's flag can be queried with [`is_ready()`](ReadinessSet::is_ready).
///
/// A flag always reflects only the most recent wait. The wait call does *not*
/// report which specific handle fired; callers re-query `is_ready` per handle
/// of interest.
#[derive(Debug, Default)]
pub struct ReadinessSet {
    flags: HashMap<RawFd, bool>,
}

/// Assigns a [`ReadinessSet`] to one readiness kind for a
/// [`wait()`](ReadinessSet::wait) call
///
/// At most one set per kind may be passed to a single wait; passing two sets
/// of the same kind fails with
/// [`TlsError::InvalidArgument`](crate::TlsError::InvalidArgument).
#[derive(Debug)]
pub enum WaitSet<'a> {
    /// Wait for data to become readable on the set's handles.
    Read(&'a mut ReadinessSet),
    /// Wait for the set's handles to become writable.
    Write(&'a mut ReadinessSet),
    /// Wait for an error condition on the set's handles.
    Error(&'a mut ReadinessSet),
}

impl WaitSet<'_> {
    fn kind_index(&self) -> usize {
        match self {
            Self::Read(_) => 0,
            Self::Write(_) => 1,
            Self::Error(_) => 2,
        }
    }

    fn set(&self) -> &ReadinessSet {
        match self {
            Self::Read(set) | Self::Write(set) | Self::Error(set) => set,
        }
    }

    fn set_mut(&mut self) -> &mut ReadinessSet {
        match self {
            Self::Read(set) | Self::Write(set) | Self::Error(set) => set,
        }
    }

    fn matches(&self, event: &mio::event::Event) -> bool {
        match self {
            Self::Read(_) => event.is_readable() || event.is_read_closed(),
            Self::Write(_) => event.is_writable(),
            Self::Error(_) => event.is_error(),
        }
    }
}

impl ReadinessSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes all registered handles and clears all readiness flags.
    pub fn clear(&mut self) {
        self.flags.clear();
    }

    /// Adds a handle to the set. Registering an already-registered handle is
    /// a no-op (its flag is preserved).
    pub fn register(&mut self, handle: RawFd) {
        self.flags.entry(handle).or_insert(false);
    }

    /// Removes a handle from the set and clears its readiness flag.
    pub fn unregister(&mut self, handle: RawFd) {
        self.flags.remove(&handle);
    }

    /// Returns the readiness flag the most recent wait observed for a handle,
    /// or `false` for a handle that was never registered.
    pub fn is_ready(&self, handle: RawFd) -> bool {
        self.flags.get(&handle).copied().unwrap_or(false)
    }

    /// Returns `true` if no handles are registered.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Suspends the calling thread until at least one handle across the given
    /// sets becomes ready.
    ///
    /// All participating sets' flags are reset first. Blocks indefinitely;
    /// use [`wait_timeout()`](ReadinessSet::wait_timeout) for a bounded wait.
    pub fn wait(sets: &mut [WaitSet<'_>]) -> Result<(), TlsError> {
        Self::wait_impl(None, sets)
    }

    /// Suspends the calling thread until at least one handle across the given
    /// sets becomes ready, or until `timeout` elapses.
    ///
    /// An elapsed timeout is not an error; all flags are simply left unset.
    pub fn wait_timeout(timeout: Duration, sets: &mut [WaitSet<'_>]) -> Result<(), TlsError> {
        Self::wait_impl(Some(timeout), sets)
    }

    fn wait_impl(timeout: Option<Duration>, sets: &mut [WaitSet<'_>]) -> Result<(), TlsError> {
        let mut seen = [false; 3];
        for set in sets.iter() {
            let kind = set.kind_index();
            if seen[kind] {
                return Err(TlsError::InvalidArgument(
                    "at most one set per readiness kind may be waited on",
                ));
            }
            seen[kind] = true;
        }

        for set in sets.iter_mut() {
            for flag in set.set_mut().flags.values_mut() {
                *flag = false;
            }
        }

        // Merged interest per handle; a handle may appear in several sets.
        // mio has no error-only interest, but error conditions are delivered
        // regardless of interest, so error-kind sets register as readable.
        let mut interests: HashMap<RawFd, Interest> = HashMap::new();
        for set in sets.iter() {
            let wanted = match set {
                WaitSet::Read(_) | WaitSet::Error(_) => Interest::READABLE,
                WaitSet::Write(_) => Interest::WRITABLE,
            };
            for handle in set.set().flags.keys() {
                interests
                    .entry(*handle)
                    .and_modify(|interest| *interest = *interest | wanted)
                    .or_insert(wanted);
            }
        }

        let mut poll = Poll::new()?;
        for (handle, interest) in &interests {
            poll.registry()
                .register(&mut SourceFd(handle), Token(*handle as usize), *interest)?;
        }

        let mut events = Events::with_capacity(interests.len().max(16));
        let deadline = Deadline::after(timeout);

        loop {
            poll.poll(&mut events, deadline.remaining())?;

            let mut fired = false;
            for event in events.iter() {
                let handle = event.token().0 as RawFd;
                for set in sets.iter_mut() {
                    if set.matches(event) {
                        if let Some(flag) = set.set_mut().flags.get_mut(&handle) {
                            *flag = true;
                            fired = true;
                        }
                    }
                }
            }

            // Stray events (e.g. a writable edge for an error-set handle) do
            // not satisfy the wait; keep polling until a requested kind fires.
            if fired || deadline.expired() {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixStream;

    #[test]
    fn unregistered_handle_is_not_ready() {
        let set = ReadinessSet::new();
        assert!(!set.is_ready(42));
    }

    #[test]
    fn unregister_clears_flag() {
        let mut set = ReadinessSet::new();
        set.register(7);
        set.unregister(7);
        assert!(set.is_empty());
        assert!(!set.is_ready(7));
    }

    #[test]
    fn duplicate_kind_is_rejected() {
        let mut first = ReadinessSet::new();
        let mut second = ReadinessSet::new();
        let mut sets = [WaitSet::Read(&mut first), WaitSet::Read(&mut second)];
        let error = ReadinessSet::wait_timeout(Duration::from_millis(10), &mut sets).unwrap_err();
        assert!(matches!(error, TlsError::InvalidArgument(_)));
    }

    #[test]
    fn wait_flags_readable_handle() {
        let (mut sender, receiver) = UnixStream::pair().expect("socketpair failed");
        let handle = receiver.as_raw_fd();

        let mut read_set = ReadinessSet::new();
        read_set.register(handle);

        sender.write_all(b"x").expect("write failed");
        {
            let mut sets = [WaitSet::Read(&mut read_set)];
            ReadinessSet::wait_timeout(Duration::from_secs(5), &mut sets).expect("wait failed");
        }
        assert!(read_set.is_ready(handle));
    }

    #[test]
    fn timeout_leaves_flags_unset() {
        let (_sender, receiver) = UnixStream::pair().expect("socketpair failed");
        let handle = receiver.as_raw_fd();

        let mut read_set = ReadinessSet::new();
        read_set.register(handle);
        {
            let mut sets = [WaitSet::Read(&mut read_set)];
            ReadinessSet::wait_timeout(Duration::from_millis(50), &mut sets).expect("wait failed");
        }
        assert!(!read_set.is_ready(handle));
    }

    #[test]
    fn flags_reset_between_waits() {
        let (mut sender, receiver) = UnixStream::pair().expect("socketpair failed");
        let handle = receiver.as_raw_fd();

        let mut read_set = ReadinessSet::new();
        read_set.register(handle);

        sender.write_all(b"x").expect("write failed");
        {
            let mut sets = [WaitSet::Read(&mut read_set)];
            ReadinessSet::wait_timeout(Duration::from_secs(5), &mut sets).expect("wait failed");
        }
        assert!(read_set.is_ready(handle));

        // Drain the byte, then the next wait must clear the stale flag.
        let mut byte = [0u8; 1];
        use std::io::Read;
        (&receiver).read_exact(&mut byte).expect("read failed");
        {
            let mut sets = [WaitSet::Read(&mut read_set)];
            ReadinessSet::wait_timeout(Duration::from_millis(50), &mut sets).expect("wait failed");
        }
        assert!(!read_set.is_ready(handle));
    }
}
