//! Immutable byte snapshots returned to cache callers.
//!
//! A [`ByteView`] is the only value type that crosses the cache boundary.
//! Bytes are copied once on ingress and the backing buffer is never exposed
//! mutably, so a caller can hold a view indefinitely without being able to
//! corrupt what other callers observe.

use bytes::Bytes;

/// An immutable, cheaply cloneable view of a cached value.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteView {
    data: Bytes,
}

impl ByteView {
    /// Create a view that takes ownership of the given buffer.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Create a view by copying the given slice.
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self {
            data: Bytes::copy_from_slice(data),
        }
    }

    /// Length of the value in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the value is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the value as a byte slice.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Copy the value out into an owned vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.to_vec()
    }

    /// Consume the view, yielding the backing buffer.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl From<Vec<u8>> for ByteView {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for ByteView {
    fn from(data: &[u8]) -> Self {
        Self::copy_from_slice(data)
    }
}

impl From<&str> for ByteView {
    fn from(data: &str) -> Self {
        Self::copy_from_slice(data.as_bytes())
    }
}

impl From<Bytes> for ByteView {
    fn from(data: Bytes) -> Self {
        Self { data }
    }
}

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::fmt::Display for ByteView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.data))
    }
}

impl std::fmt::Debug for ByteView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteView").field("len", &self.len()).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byteview_copies_on_ingress() {
        let mut source = vec![1u8, 2, 3];
        let view = ByteView::copy_from_slice(&source);
        source[0] = 99;
        assert_eq!(view.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_byteview_to_vec_is_a_copy() {
        let view = ByteView::from("630");
        let mut out = view.to_vec();
        out[0] = b'X';
        assert_eq!(view.as_slice(), b"630");
    }

    #[test]
    fn test_byteview_display() {
        let view = ByteView::from("hello");
        assert_eq!(view.to_string(), "hello");
        assert_eq!(view.len(), 5);
    }

    #[test]
    fn test_byteview_empty() {
        let view = ByteView::from(Vec::new());
        assert!(view.is_empty());
        assert_eq!(view.len(), 0);
    }

    #[test]
    fn test_byteview_clone_is_cheap_and_equal() {
        let view = ByteView::from("value");
        let clone = view.clone();
        assert_eq!(view, clone);
        assert_eq!(clone.as_slice(), b"value");
    }
}
