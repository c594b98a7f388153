//! # ramdiskfs-core
//!
//! The in-memory file service behind the ramdisk server.
//!
//! A [`RamDisk`] owns a fixed-size file table and a memory backend. Files
//! are created by OPEN, grown by WRITE and deleted when their last CLOSE
//! arrives; nothing outlives the process except what a [`RamDiskState`]
//! snapshot carries across a live update.
//!
//! All client memory is reached through the [`Kernel`] trait: paths and
//! write payloads are copied in, read results copied out, each under a
//! short-lived [`Grant`]. [`LocalKernel`] provides that contract in-process.

pub mod capability;
pub mod config;
pub mod error;
pub mod kernel;
pub mod memory;
pub mod ramdisk;
pub mod snapshot;
pub mod table;

mod close;
mod open;
mod rw;

#[cfg(test)]
mod testing;

pub use capability::{CapabilityIssuer, ServiceIdentity};
pub use config::{DEFAULT_FILE_ALLOC_SIZE, MAX_FILENAME_LEN, MAX_RAMDISK_FILES, RamDiskConfig};
pub use error::{FsError, FsResult, KernelError, KernelResult};
pub use kernel::{CapabilityRecord, CapabilityRequest, Grant, Kernel, KernelFault, LocalKernel};
pub use memory::{Buffer, HeapMemory, MemoryBackend, OutOfMemory};
pub use ramdisk::{RamDisk, RamDiskStats};
pub use snapshot::{RamDiskState, SavedFile, SnapshotError};
pub use table::{FileEntry, FileTable};
