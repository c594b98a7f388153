//! Byte-buffer allocation.
//!
//! The file table never allocates on its own; every buffer comes from a
//! [`MemoryBackend`] so a deployment can swap the heap for a page-granular
//! allocator without touching the handlers.

use thiserror::Error;

/// Owned byte storage of one file. Its length is the file's allocated size.
///
/// An empty buffer is the "freed" state.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Buffer(Box<[u8]>);

impl Buffer {
    /// The freed/null buffer.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Take ownership of existing bytes.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(bytes.into_boxed_slice())
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0.into_vec()
    }

    /// Capacity in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

/// Allocation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("out of memory: {requested} bytes requested")]
pub struct OutOfMemory {
    pub requested: usize,
}

/// Allocator contract used by the ramdisk.
pub trait MemoryBackend {
    /// Allocate a zero-filled buffer of exactly `size` bytes.
    fn allocate(&mut self, size: usize) -> Option<Buffer>;

    /// Resize `buffer` to exactly `new_size` bytes.
    ///
    /// The first `min(old, new)` bytes are preserved and any extension is
    /// zero-filled. `new_size == 0` frees the storage and leaves `buffer`
    /// empty. On failure `buffer` is left exactly as it was.
    fn reallocate(&mut self, buffer: &mut Buffer, new_size: usize) -> Result<(), OutOfMemory>;

    /// Release a buffer. Freeing an empty buffer is a no-op.
    fn free(&mut self, buffer: Buffer);

    /// Bytes currently handed out.
    fn bytes_in_use(&self) -> usize;
}

/// Heap-backed allocator with an optional byte budget.
#[derive(Debug, Default)]
pub struct HeapMemory {
    limit: Option<usize>,
    in_use: usize,
}

impl HeapMemory {
    /// Unbounded heap allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Heap allocator that refuses to hand out more than `limit` bytes total.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            in_use: 0,
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    fn fits(&self, extra: usize) -> bool {
        match (self.limit, self.in_use.checked_add(extra)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(limit), Some(total)) => total <= limit,
        }
    }
}

impl MemoryBackend for HeapMemory {
    fn allocate(&mut self, size: usize) -> Option<Buffer> {
        if !self.fits(size) {
            return None;
        }
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(size).ok()?;
        bytes.resize(size, 0);
        self.in_use += size;
        Some(Buffer::from_vec(bytes))
    }

    fn reallocate(&mut self, buffer: &mut Buffer, new_size: usize) -> Result<(), OutOfMemory> {
        let old_size = buffer.len();
        if new_size == 0 {
            self.free(std::mem::take(buffer));
            return Ok(());
        }
        if new_size <= old_size {
            let mut bytes = std::mem::take(buffer).into_vec();
            bytes.truncate(new_size);
            *buffer = Buffer::from_vec(bytes);
            self.in_use = self.in_use.saturating_sub(old_size - new_size);
            return Ok(());
        }

        let extra = new_size - old_size;
        let oom = OutOfMemory {
            requested: new_size,
        };
        if !self.fits(extra) {
            return Err(oom);
        }
        let mut bytes = std::mem::take(buffer).into_vec();
        if bytes.try_reserve_exact(extra).is_err() {
            *buffer = Buffer::from_vec(bytes);
            return Err(oom);
        }
        bytes.resize(new_size, 0);
        *buffer = Buffer::from_vec(bytes);
        self.in_use += extra;
        Ok(())
    }

    fn free(&mut self, buffer: Buffer) {
        self.in_use = self.in_use.saturating_sub(buffer.len());
    }

    fn bytes_in_use(&self) -> usize {
        self.in_use
    }
}
