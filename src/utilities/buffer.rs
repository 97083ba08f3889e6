/*
 * btls - SecureStream/ReadinessSet: blocking TLS byte streams *with* readiness multiplexing
 * This is free and unencumbered software released into the public domain.
 */

const INITIAL_SIZE: usize = 4096;
const GROW_MARGIN: usize = 1024;

/// Receive buffer that grows on demand
///
/// Starts at 4096 bytes and doubles whenever the remaining headroom drops
/// below 1024 bytes, so a receive call always has a reasonably sized spare
/// region to fill. Extraction truncates to the exact number of committed
/// bytes.
pub struct RecvBuffer {
    data: Vec<u8>,
    filled: usize,
}

impl RecvBuffer {
    pub fn new() -> Self {
        Self {
            data: vec![0; INITIAL_SIZE],
            filled: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.filled
    }

    /// Doubles the buffer if the spare region has shrunk below the margin.
    pub fn ensure_headroom(&mut self) {
        if self.data.len() - self.filled < GROW_MARGIN {
            self.data.resize(self.data.len() * 2, 0);
        }
    }

    /// The writable spare region. Call [`ensure_headroom()`](Self::ensure_headroom)
    /// first to guarantee it is at least the margin long.
    pub fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.filled..]
    }

    /// Marks `count` bytes of the spare region as filled.
    pub fn commit(&mut self, count: usize) {
        debug_assert!(self.filled + count <= self.data.len());
        self.filled += count;
    }

    pub fn into_bytes(mut self) -> Vec<u8> {
        self.data.truncate(self.filled);
        self.data
    }
}
