//! Ramdisk limits.

use serde::{Deserialize, Serialize};

/// Number of slots in the file table.
pub const MAX_RAMDISK_FILES: usize = 64;

/// Longest accepted file name, in bytes.
pub const MAX_FILENAME_LEN: usize = 60;

/// Capacity given to a newly created file.
pub const DEFAULT_FILE_ALLOC_SIZE: usize = 4096;

/// Sizing of one ramdisk instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RamDiskConfig {
    /// File table capacity.
    pub max_files: usize,
    /// Longest accepted name.
    pub max_filename_len: usize,
    /// Initial buffer size of a created file.
    pub default_alloc_size: usize,
    /// Total bytes the memory backend may hand out (unbounded if absent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<usize>,
}

impl Default for RamDiskConfig {
    fn default() -> Self {
        Self {
            max_files: MAX_RAMDISK_FILES,
            max_filename_len: MAX_FILENAME_LEN,
            default_alloc_size: DEFAULT_FILE_ALLOC_SIZE,
            memory_limit: None,
        }
    }
}

impl RamDiskConfig {
    /// Set the table capacity.
    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    /// Set the initial allocation size.
    pub fn with_default_alloc_size(mut self, size: usize) -> Self {
        self.default_alloc_size = size;
        self
    }

    /// Cap total memory.
    pub fn with_memory_limit(mut self, limit: usize) -> Self {
        self.memory_limit = Some(limit);
        self
    }
}
