//! The ramdisk: file table, memory backend and capability issuer.
//!
//! The request handlers live in `open.rs`, `rw.rs` and `close.rs` as
//! further `impl` blocks on [`RamDisk`]. Each takes the kernel by reference
//! for the duration of one request; the ramdisk itself holds no kernel
//! state.

use serde::Serialize;

use crate::capability::{CapabilityIssuer, ServiceIdentity};
use crate::config::RamDiskConfig;
use crate::memory::{HeapMemory, MemoryBackend};
use crate::table::FileTable;

/// In-memory file service state.
#[derive(Debug)]
pub struct RamDisk<M: MemoryBackend = HeapMemory> {
    pub(crate) config: RamDiskConfig,
    pub(crate) table: FileTable,
    pub(crate) memory: M,
    pub(crate) issuer: CapabilityIssuer,
}

/// Point-in-time usage figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RamDiskStats {
    /// Slots in use.
    pub files: usize,
    /// Table capacity.
    pub capacity: usize,
    /// Sum of allocated sizes.
    pub bytes_allocated: usize,
    /// Sum of current sizes.
    pub bytes_used: usize,
}

impl RamDisk<HeapMemory> {
    /// Empty ramdisk on the heap allocator, honouring `config.memory_limit`.
    pub fn new(config: RamDiskConfig, identity: ServiceIdentity) -> Self {
        let memory = config
            .memory_limit
            .map_or_else(HeapMemory::new, HeapMemory::with_limit);
        Self::with_memory(config, memory, identity)
    }
}

impl<M: MemoryBackend> RamDisk<M> {
    /// Empty ramdisk on a caller-supplied allocator.
    pub fn with_memory(config: RamDiskConfig, memory: M, identity: ServiceIdentity) -> Self {
        Self {
            table: FileTable::new(config.max_files),
            config,
            memory,
            issuer: CapabilityIssuer::new(identity),
        }
    }

    pub fn config(&self) -> &RamDiskConfig {
        &self.config
    }

    pub fn table(&self) -> &FileTable {
        &self.table
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn identity(&self) -> ServiceIdentity {
        self.issuer.identity()
    }

    pub fn stats(&self) -> RamDiskStats {
        let (bytes_allocated, bytes_used) = self
            .table
            .iter()
            .fold((0, 0), |(alloc, used), (_, entry)| {
                (alloc + entry.allocated_size(), used + entry.current_size())
            });
        RamDiskStats {
            files: self.table.len(),
            capacity: self.table.capacity(),
            bytes_allocated,
            bytes_used,
        }
    }

    /// Free every file buffer and empty the table. Returns how many files
    /// were dropped.
    pub fn shutdown(&mut self) -> usize {
        let entries = self.table.drain();
        let count = entries.len();
        for entry in entries {
            self.memory.free(entry.into_buffer());
        }
        tracing::info!("ramdisk released {} file(s)", count);
        count
    }
}
