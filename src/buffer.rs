//! Growable receive buffer feeding the frame parser.

use crate::constants::MAX_BUFFER_SIZE;
use crate::error::{EslError, EslResult};

/// Byte buffer with a consumed-prefix cursor.
///
/// Bytes are appended at the tail and extracted from the head; the
/// consumed prefix is reclaimed by [`compact`](Self::compact) once it
/// grows past a threshold, so steady-state parsing does not reallocate.
#[derive(Debug, Default)]
pub(crate) struct RecvBuffer {
    data: Vec<u8>,
    pos: usize,
}

/// Reclaim the consumed prefix once it exceeds this many bytes.
const COMPACT_THRESHOLD: usize = 64 * 1024;

impl RecvBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the socket. Errors if the unparsed backlog
    /// exceeds [`MAX_BUFFER_SIZE`].
    pub fn extend(&mut self, bytes: &[u8]) -> EslResult<()> {
        self.data.extend_from_slice(bytes);
        if self.remaining() > MAX_BUFFER_SIZE {
            return Err(EslError::protocol(format!(
                "receive buffer exceeded {} bytes, peer is not speaking ESL",
                MAX_BUFFER_SIZE
            )));
        }
        Ok(())
    }

    /// Unconsumed byte count.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Extract all bytes up to (but not including) the first occurrence of
    /// `pattern`, consuming the pattern too. Returns `None` if the pattern
    /// has not arrived yet.
    pub fn take_until(&mut self, pattern: &[u8]) -> Option<Vec<u8>> {
        let haystack = &self.data[self.pos..];
        let at = haystack
            .windows(pattern.len())
            .position(|w| w == pattern)?;
        let out = haystack[..at].to_vec();
        self.pos += at + pattern.len();
        self.maybe_compact();
        Some(out)
    }

    /// Extract exactly `n` bytes, or `None` if fewer have arrived.
    pub fn take_exact(&mut self, n: usize) -> Option<Vec<u8>> {
        if self.remaining() < n {
            return None;
        }
        let out = self.data[self.pos..self.pos + n].to_vec();
        self.pos += n;
        self.maybe_compact();
        Some(out)
    }

    fn maybe_compact(&mut self) {
        if self.pos >= COMPACT_THRESHOLD {
            self.compact();
        }
    }

    /// Drop the consumed prefix.
    pub fn compact(&mut self) {
        if self.pos > 0 {
            self.data.drain(..self.pos);
            self.pos = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_until_splits_on_pattern() {
        let mut buf = RecvBuffer::new();
        buf.extend(b"hello\n\nworld").unwrap();

        assert_eq!(buf.take_until(b"\n\n"), Some(b"hello".to_vec()));
        assert_eq!(buf.remaining(), 5);
        assert_eq!(buf.take_until(b"\n\n"), None);
    }

    #[test]
    fn take_until_pattern_split_across_extends() {
        let mut buf = RecvBuffer::new();
        buf.extend(b"partial\n").unwrap();
        assert_eq!(buf.take_until(b"\n\n"), None);
        buf.extend(b"\nrest").unwrap();
        assert_eq!(buf.take_until(b"\n\n"), Some(b"partial".to_vec()));
        assert_eq!(buf.remaining(), 4);
    }

    #[test]
    fn take_exact_waits_for_enough_bytes() {
        let mut buf = RecvBuffer::new();
        buf.extend(b"abc").unwrap();
        assert_eq!(buf.take_exact(5), None);
        buf.extend(b"de").unwrap();
        assert_eq!(buf.take_exact(5), Some(b"abcde".to_vec()));
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn compact_preserves_unconsumed_bytes() {
        let mut buf = RecvBuffer::new();
        buf.extend(b"aaa\n\nbbb").unwrap();
        buf.take_until(b"\n\n").unwrap();
        buf.compact();
        assert_eq!(buf.take_exact(3), Some(b"bbb".to_vec()));
    }
}
