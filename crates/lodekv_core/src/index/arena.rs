//! Append-only byte arena holding every key and edge label of a trie.

/// A `(offset, len)` reference into an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Start offset.
    pub offset: usize,
    /// Length in bytes.
    pub len: usize,
}

impl Span {
    /// Sub-span starting `from` bytes in.
    #[must_use]
    pub fn skip(self, from: usize) -> Self {
        debug_assert!(from <= self.len);
        Self {
            offset: self.offset + from,
            len: self.len - from,
        }
    }

    /// Sub-span of the first `len` bytes.
    #[must_use]
    pub fn take(self, len: usize) -> Self {
        debug_assert!(len <= self.len);
        Self {
            offset: self.offset,
            len,
        }
    }
}

/// Growable buffer that is only ever appended to.
///
/// Bytes are never rewritten or freed individually; a trie that has churned
/// through many keys reclaims space only by being rebuilt into a fresh arena.
#[derive(Debug, Default)]
pub struct Arena {
    bytes: Vec<u8>,
}

impl Arena {
    /// Copies `data` in and returns its span.
    pub fn push(&mut self, data: &[u8]) -> Span {
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(data);
        Span {
            offset,
            len: data.len(),
        }
    }

    /// Bytes referenced by `span`.
    #[must_use]
    pub fn get(&self, span: Span) -> &[u8] {
        &self.bytes[span.offset..span.offset + span.len]
    }

    /// Total bytes held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if nothing has been pushed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
