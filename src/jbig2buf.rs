//! Output buffer for the MQ coder.
//!
//! The coder never writes a byte straight away: the most recent byte stays
//! pending in `B` because a later carry out of the `C` register may still
//! increment it (T.88 E.2.4). The buffer keeps that pending byte next to the
//! finished output so the coder only has to decide *what* moves out, not
//! *where* it goes.

/// Growable byte buffer with a single pending byte.
#[derive(Debug, Clone, Default)]
pub struct CodedBuffer {
    data: Vec<u8>,
    pending: u8,
    // BP starts one position before the buffer; the first shift drops the
    // placeholder instead of emitting it.
    started: bool,
}

impl CodedBuffer {
    /// Creates an empty buffer holding the initial placeholder byte.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `capacity` output bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            pending: 0,
            started: false,
        }
    }

    /// Clears the output and restores the placeholder byte.
    pub fn clear(&mut self) {
        self.data.clear();
        self.pending = 0;
        self.started = false;
    }

    /// The byte currently held back (register `B`).
    #[inline]
    pub fn pending(&self) -> u8 {
        self.pending
    }

    /// Propagates a carry into the pending byte and returns its new value.
    #[inline]
    pub fn carry(&mut self) -> u8 {
        self.pending = self.pending.wrapping_add(1);
        self.pending
    }

    /// Emits the pending byte and holds `next` in its place.
    #[inline]
    pub fn shift_in(&mut self, next: u8) {
        if self.started {
            self.data.push(self.pending);
        }
        self.started = true;
        self.pending = next;
    }

    /// Emits the pending byte followed by the `0xFF 0xAC` end-of-stream
    /// marker. A pending `0xFF` doubles as the marker prefix.
    pub fn finish_with_marker(&mut self) {
        let pending_ff = self.started && self.pending == 0xFF;
        if self.started {
            self.data.push(self.pending);
        }
        if !pending_ff {
            self.data.push(0xFF);
        }
        self.data.push(0xAC);
        self.started = false;
        self.pending = 0;
    }

    /// Emits the pending byte without any marker.
    pub fn finish(&mut self) {
        if self.started {
            self.data.push(self.pending);
        }
        self.started = false;
        self.pending = 0;
    }

    /// Number of bytes already emitted.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if nothing has been emitted yet.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The emitted bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the buffer, returning the emitted bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}
