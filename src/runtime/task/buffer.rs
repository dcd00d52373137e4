//! Shared element buffers.
//!
//! A `Buffer` is what a caller hands to the runtime for `Reference`, `Result`
//! and `Address` arguments, and what a node registers as a broadcast target.
//! Clones share the same storage; writes made by a task on the home node are
//! visible to every holder, and answers shipped back from a remote node are
//! copied into it before the parent's dependency is released.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::datatype::{from_bytes, to_bytes, Datatype, Element};

/// Shared, typed byte storage.
#[derive(Clone)]
pub struct Buffer {
    dtype: Datatype,
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl Buffer {
    /// Create a zero-filled buffer of `len` elements of type `T`.
    pub fn new<T: Element>(len: usize) -> Self {
        Self::zeroed(T::DATATYPE, len)
    }

    /// Create a zero-filled buffer of `len` elements of `dtype`.
    pub fn zeroed(
        dtype: Datatype,
        len: usize,
    ) -> Self {
        Self {
            dtype,
            bytes: Arc::new(RwLock::new(vec![0u8; len * dtype.size()])),
        }
    }

    /// Create a buffer holding a copy of `values`.
    pub fn from_slice<T: Element>(values: &[T]) -> Self {
        Self {
            dtype: T::DATATYPE,
            bytes: Arc::new(RwLock::new(to_bytes(values))),
        }
    }

    /// Element datatype.
    #[inline]
    pub fn datatype(&self) -> Datatype {
        self.dtype
    }

    /// Number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.read().len() / self.dtype.size()
    }

    /// Whether the buffer holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.bytes.read().len()
    }

    /// Copy the contents out as elements.
    pub fn to_vec<T: Element>(&self) -> Vec<T> {
        from_bytes(&self.bytes.read())
    }

    /// Read element `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn get<T: Element>(
        &self,
        index: usize,
    ) -> T {
        let size = T::DATATYPE.size();
        let bytes = self.bytes.read();
        T::read_le(&bytes[index * size..(index + 1) * size])
    }

    /// Overwrite element `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    pub fn set<T: Element>(
        &self,
        index: usize,
        value: T,
    ) {
        let size = T::DATATYPE.size();
        let mut bytes = self.bytes.write();
        value.write_le(&mut bytes[index * size..(index + 1) * size]);
    }

    /// Overwrite the leading elements with `values`.
    pub fn fill_from<T: Element>(
        &self,
        values: &[T],
    ) {
        let image = to_bytes(values);
        self.copy_from_bytes(&image);
    }

    /// Snapshot of the first `len` bytes (or all of them).
    pub fn snapshot(
        &self,
        len: Option<usize>,
    ) -> Vec<u8> {
        let bytes = self.bytes.read();
        match len {
            Some(len) => bytes[..len.min(bytes.len())].to_vec(),
            None => bytes.clone(),
        }
    }

    /// Copy `src` over the leading bytes of the buffer.
    pub fn copy_from_bytes(
        &self,
        src: &[u8],
    ) {
        let mut bytes = self.bytes.write();
        let n = src.len().min(bytes.len());
        bytes[..n].copy_from_slice(&src[..n]);
    }

    /// Run `f` with shared access to the raw bytes.
    pub fn with_bytes<R>(
        &self,
        f: impl FnOnce(&[u8]) -> R,
    ) -> R {
        f(&self.bytes.read())
    }

    /// Run `f` with exclusive access to the raw bytes.
    pub fn with_bytes_mut<R>(
        &self,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> R {
        f(&mut self.bytes.write())
    }

    /// Whether two handles share storage.
    #[inline]
    pub fn ptr_eq(
        &self,
        other: &Buffer,
    ) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("dtype", &self.dtype)
            .field("len", &self.len())
            .finish()
    }
}
