//! Saved state for live update.
//!
//! A [`RamDiskState`] carries the service identity and every live file,
//! keyed by slot so capabilities held by clients keep naming the same file
//! after a restart.

use ramdiskfs_types::SlotIndex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capability::ServiceIdentity;
use crate::config::RamDiskConfig;
use crate::memory::MemoryBackend;
use crate::ramdisk::RamDisk;
use crate::table::FileEntry;

/// One file as saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedFile {
    pub slot: SlotIndex,
    pub name: Vec<u8>,
    pub mode: u32,
    pub open_count: u32,
    pub allocated_size: usize,
    /// Contents up to the current size.
    pub data: Vec<u8>,
}

/// Everything needed to resume serving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RamDiskState {
    pub identity: ServiceIdentity,
    pub files: Vec<SavedFile>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot codec: {0}")]
    Codec(#[from] postcard::Error),

    #[error("saved {slot} is outside a table of {capacity}")]
    BadSlot { slot: SlotIndex, capacity: usize },

    #[error("{slot} saved twice or name {name:?} repeated")]
    Duplicate { slot: SlotIndex, name: String },

    #[error("saved name {0:?} is empty or too long")]
    BadName(String),

    #[error("{slot} holds {data} bytes in an allocation of {allocated}")]
    Oversized {
        slot: SlotIndex,
        data: usize,
        allocated: usize,
    },

    #[error("out of memory restoring {0}")]
    OutOfMemory(SlotIndex),
}

impl RamDiskState {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

impl<M: MemoryBackend> RamDisk<M> {
    /// Copy out the identity and all live files.
    pub fn snapshot(&self) -> RamDiskState {
        let files = self
            .table
            .iter()
            .map(|(slot, entry)| SavedFile {
                slot,
                name: entry.name().to_vec(),
                mode: entry.mode(),
                open_count: entry.open_count(),
                allocated_size: entry.allocated_size(),
                data: entry.data().to_vec(),
            })
            .collect();
        RamDiskState {
            identity: self.identity(),
            files,
        }
    }

    /// Rebuild a ramdisk from saved state. Nothing is leaked on failure:
    /// buffers allocated for entries already restored are freed again.
    pub fn restore(config: RamDiskConfig, memory: M, state: RamDiskState) -> Result<Self, SnapshotError> {
        let mut disk = Self::with_memory(config, memory, state.identity);
        let count = state.files.len();
        for file in state.files {
            if let Err(err) = disk.restore_file(file) {
                disk.shutdown();
                return Err(err);
            }
        }
        tracing::info!("restored {} file(s) as {}", count, state.identity.epoch);
        Ok(disk)
    }

    fn restore_file(&mut self, file: SavedFile) -> Result<(), SnapshotError> {
        let slot = file.slot;
        let capacity = self.table.capacity();
        if slot.as_usize() >= capacity {
            return Err(SnapshotError::BadSlot { slot, capacity });
        }
        if file.name.is_empty() || file.name.len() > self.config.max_filename_len {
            return Err(SnapshotError::BadName(
                String::from_utf8_lossy(&file.name).into_owned(),
            ));
        }
        let duplicate = || SnapshotError::Duplicate {
            slot,
            name: String::from_utf8_lossy(&file.name).into_owned(),
        };
        if self.table.find_by_name(&file.name).is_some() {
            return Err(duplicate());
        }
        if file.data.len() > file.allocated_size {
            return Err(SnapshotError::Oversized {
                slot,
                data: file.data.len(),
                allocated: file.allocated_size,
            });
        }

        let mut buffer = self
            .memory
            .allocate(file.allocated_size)
            .ok_or(SnapshotError::OutOfMemory(slot))?;
        buffer.as_mut_slice()[..file.data.len()].copy_from_slice(&file.data);

        let err = duplicate();
        let entry = FileEntry::restored(
            file.name,
            buffer,
            file.data.len(),
            file.mode,
            file.open_count.max(1),
        );
        self.table.insert(slot, entry).map_err(|entry| {
            self.memory.free(entry.into_buffer());
            err
        })
    }
}
