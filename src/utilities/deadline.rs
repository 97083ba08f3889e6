/*
 * btls - SecureStream/ReadinessSet: blocking TLS byte streams *with* readiness multiplexing
 * This is free and unencumbered software released into the public domain.
 */
use std::time::{Duration, Instant};

/// Optional deadline for a bounded wait. `None` means "wait forever".
pub struct Deadline {
    deadline: Option<Instant>,
}

impl Deadline {
    pub fn after(timeout: Option<Duration>) -> Self {
        Self {
            deadline: timeout.map(|duration| Instant::now() + duration),
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn expired(&self) -> bool {
        self.remaining().map(|left| left.is_zero()).unwrap_or(false)
    }
}
