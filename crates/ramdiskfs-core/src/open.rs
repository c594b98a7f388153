//! OPEN handler.
//!
//! ValidatePath → ResolveExisting → (CreateNew | ReuseExisting) →
//! IssueCapability. Only a freshly created file is rolled back when the
//! kernel refuses the capability; a reused file just gives its open back.

use ramdiskfs_types::{CapIndex, Endpoint, GrantAccess, OpenFlags, OpenRequest, SlotIndex};

use crate::error::{FsError, FsResult};
use crate::kernel::{Grant, Kernel};
use crate::memory::MemoryBackend;
use crate::ramdisk::RamDisk;

impl<M: MemoryBackend> RamDisk<M> {
    /// Handle an OPEN request: fetch the name from the client, then open it.
    #[tracing::instrument(skip_all, fields(endpoint = %req.endpoint, flags = req.flags), name = "ramdisk.open")]
    pub fn open<K: Kernel + ?Sized>(&mut self, kernel: &K, req: &OpenRequest) -> FsResult<CapIndex> {
        let name = self.fetch_name(kernel, req)?;
        let flags = OpenFlags::from_bits(req.flags)
            .ok_or_else(|| FsError::invalid(format!("bad access mode in flags {:#o}", req.flags)))?;
        self.open_name(kernel, &name, flags, req.mode, req.endpoint)
    }

    /// Open (and possibly create) `name` on behalf of `endpoint`.
    pub fn open_name<K: Kernel + ?Sized>(
        &mut self,
        kernel: &K,
        name: &[u8],
        flags: OpenFlags,
        mode: u32,
        endpoint: Endpoint,
    ) -> FsResult<CapIndex> {
        self.check_name(name)?;

        let (slot, created) = match self.table.find_by_name(name) {
            Some(slot) => {
                if flags.is_exclusive_create() {
                    return Err(FsError::already_exists(name));
                }
                if let Some(entry) = self.table.get_mut(slot) {
                    entry.retain();
                }
                (slot, false)
            }
            None if !flags.create => return Err(FsError::not_found(name)),
            None => (self.create(name, mode)?, true),
        };

        let permissions = flags.access.permissions();
        match self.issuer.issue(kernel, endpoint, permissions, slot) {
            Ok(cap) => {
                tracing::debug!(
                    "opened {:?} at {} for {} as {} ({:?})",
                    String::from_utf8_lossy(name),
                    slot,
                    endpoint,
                    cap,
                    permissions
                );
                Ok(cap)
            }
            Err(err) => {
                tracing::warn!("capability for {} refused: {}", slot, err);
                self.undo_open(slot, created);
                Err(FsError::Kernel(err))
            }
        }
    }

    fn check_name(&self, name: &[u8]) -> FsResult<()> {
        if name.is_empty() {
            return Err(FsError::invalid("empty file name"));
        }
        if name.len() > self.config.max_filename_len {
            return Err(FsError::invalid(format!(
                "file name of {} bytes exceeds {}",
                name.len(),
                self.config.max_filename_len
            )));
        }
        Ok(())
    }

    /// Copy the path out of the client, cut at the first NUL.
    fn fetch_name<K: Kernel + ?Sized>(&self, kernel: &K, req: &OpenRequest) -> FsResult<Vec<u8>> {
        let len = req.path_len as usize;
        if len == 0 || len > self.config.max_filename_len {
            return Err(FsError::invalid(format!("path length {len}")));
        }
        if req.path_addr == 0 {
            return Err(FsError::Fault);
        }

        let mut name = vec![0u8; len];
        let grant = Grant::create(kernel, req.endpoint, req.path_addr, len, GrantAccess::Read)
            .map_err(FsError::PermissionDenied)?;
        grant.copy_from(&mut name).map_err(FsError::Io)?;
        drop(grant);

        if let Some(nul) = name.iter().position(|&b| b == 0) {
            name.truncate(nul);
        }
        Ok(name)
    }

    fn create(&mut self, name: &[u8], mode: u32) -> FsResult<SlotIndex> {
        let slot = self
            .table
            .find_free_slot()
            .ok_or(FsError::TableExhausted(self.table.capacity()))?;
        let size = self.config.default_alloc_size;
        let buffer = self
            .memory
            .allocate(size)
            .ok_or(FsError::OutOfMemory(size))?;
        self.table.occupy(slot, name, buffer, mode);
        tracing::info!(
            "created {:?} in {} ({} bytes)",
            String::from_utf8_lossy(name),
            slot,
            size
        );
        Ok(slot)
    }

    fn undo_open(&mut self, slot: SlotIndex, created: bool) {
        if created {
            if let Some(entry) = self.table.release(slot) {
                self.memory.free(entry.into_buffer());
            }
        } else if let Some(entry) = self.table.get_mut(slot) {
            entry.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use ramdiskfs_types::flags::raw::{O_ACCMODE, O_CREAT};
    use ramdiskfs_types::{Errno, Permissions};

    use crate::config::{DEFAULT_FILE_ALLOC_SIZE, RamDiskConfig};
    use crate::kernel::KernelFault;
    use crate::testing::Fixture;

    use super::*;

    #[test]
    fn test_create_exclusive_on_empty_table() {
        let mut fx = Fixture::new();
        let cap = fx.open(b"foo", OpenFlags::create_exclusive()).unwrap();
        assert_eq!(cap, CapIndex::new(0));

        let slot = fx.slot_of(cap);
        assert_eq!(slot, SlotIndex::new(0));
        let entry = fx.disk.table().get(slot).unwrap();
        assert_eq!(entry.allocated_size(), DEFAULT_FILE_ALLOC_SIZE);
        assert_eq!(entry.current_size(), 0);
        assert_eq!(entry.name(), b"foo");
    }

    #[test]
    fn test_exclusive_create_of_existing_fails() {
        let mut fx = Fixture::new();
        fx.open(b"foo", OpenFlags::create()).unwrap();
        let err = fx.open(b"foo", OpenFlags::create_exclusive()).unwrap_err();
        assert_eq!(err.errno(), Errno::Eexist);
    }

    #[test]
    fn test_open_existing_reuses_slot() {
        let mut fx = Fixture::new();
        let a = fx.open(b"foo", OpenFlags::create()).unwrap();
        let b = fx.open(b"foo", OpenFlags::read()).unwrap();
        let c = fx.open(b"foo", OpenFlags::create()).unwrap();
        assert_eq!(fx.slot_of(a), fx.slot_of(b));
        assert_eq!(fx.slot_of(a), fx.slot_of(c));
        assert_eq!(fx.disk.table().len(), 1);
        assert_eq!(fx.disk.table().get(fx.slot_of(a)).unwrap().open_count(), 3);
    }

    #[test]
    fn test_missing_without_create() {
        let mut fx = Fixture::new();
        let err = fx.open(b"nope", OpenFlags::read()).unwrap_err();
        assert_eq!(err.errno(), Errno::Enoent);
        assert!(fx.disk.table().is_empty());
    }

    #[test]
    fn test_name_length_bounds() {
        let mut fx = Fixture::new();
        assert_eq!(fx.open(b"", OpenFlags::create()).unwrap_err().errno(), Errno::Einval);

        let long = vec![b'a'; 61];
        assert_eq!(fx.open(&long, OpenFlags::create()).unwrap_err().errno(), Errno::Einval);

        let max = vec![b'a'; 60];
        assert!(fx.open(&max, OpenFlags::create()).is_ok());
    }

    #[test]
    fn test_table_exhausted() {
        let mut fx = Fixture::with_config(RamDiskConfig::default().with_max_files(2));
        fx.open(b"a", OpenFlags::create()).unwrap();
        fx.open(b"b", OpenFlags::create()).unwrap();
        let err = fx.open(b"c", OpenFlags::create()).unwrap_err();
        assert_eq!(err.errno(), Errno::Enfile);
    }

    #[test]
    fn test_allocation_failure_commits_nothing() {
        let config = RamDiskConfig::default()
            .with_default_alloc_size(64)
            .with_memory_limit(100);
        let mut fx = Fixture::with_config(config);
        fx.open(b"a", OpenFlags::create()).unwrap();
        let err = fx.open(b"b", OpenFlags::create()).unwrap_err();
        assert_eq!(err.errno(), Errno::Enomem);
        assert_eq!(fx.disk.table().len(), 1);
        assert_eq!(fx.disk.table().find_by_name(b"b"), None);
    }

    #[test]
    fn test_permissions_follow_access_mode() {
        let mut fx = Fixture::new();
        let rw = fx.open(b"f", OpenFlags::create()).unwrap();
        let ro = fx.open(b"f", OpenFlags::read()).unwrap();
        let wo = fx
            .open(b"f", OpenFlags::from_bits(ramdiskfs_types::flags::raw::O_WRONLY).unwrap())
            .unwrap();

        let perms = |cap| fx.kernel.capability(fx.client, cap).unwrap().permissions;
        assert_eq!(perms(rw), Permissions::READ | Permissions::WRITE);
        assert_eq!(perms(ro), Permissions::READ);
        assert_eq!(perms(wo), Permissions::WRITE);
    }

    #[test]
    fn test_capability_failure_rolls_back_new_file() {
        let mut fx = Fixture::new();
        fx.kernel.inject(KernelFault::CreateCapability(Errno::Enospc));
        let err = fx.open(b"foo", OpenFlags::create()).unwrap_err();
        assert_eq!(err.code(), Errno::Enospc.code());
        assert!(fx.disk.table().is_empty());
        assert_eq!(fx.disk.memory().bytes_in_use(), 0);
    }

    #[test]
    fn test_capability_failure_keeps_existing_file() {
        let mut fx = Fixture::new();
        let cap = fx.open(b"foo", OpenFlags::create()).unwrap();
        let slot = fx.slot_of(cap);

        fx.kernel.inject(KernelFault::CreateCapability(Errno::Enomem));
        let err = fx.open(b"foo", OpenFlags::read()).unwrap_err();
        assert_eq!(err.code(), Errno::Enomem.code());

        let entry = fx.disk.table().get(slot).unwrap();
        assert_eq!(entry.open_count(), 1);
        assert_eq!(entry.allocated_size(), DEFAULT_FILE_ALLOC_SIZE);
    }

    #[test]
    fn test_open_request_fetches_name() {
        let mut fx = Fixture::new();
        let addr = fx.kernel.map(fx.client, 8);
        fx.kernel.poke(fx.client, addr, b"foo\0").unwrap();

        let req = OpenRequest {
            path_addr: addr,
            path_len: 4,
            flags: OpenFlags::create().bits(),
            mode: 0o644,
            endpoint: fx.client,
        };
        let cap = fx.disk.open(&fx.kernel, &req).unwrap();
        let entry = fx.disk.table().get(fx.slot_of(cap)).unwrap();
        assert_eq!(entry.name(), b"foo");
        assert_eq!(entry.mode(), 0o644);
        assert_eq!(fx.kernel.live_grants(), 0);
    }

    #[test]
    fn test_open_request_validation() {
        let mut fx = Fixture::new();
        let addr = fx.kernel.map(fx.client, 64);
        let base = OpenRequest {
            path_addr: addr,
            path_len: 3,
            flags: O_CREAT,
            mode: 0,
            endpoint: fx.client,
        };

        let empty = OpenRequest { path_len: 0, ..base };
        assert_eq!(fx.disk.open(&fx.kernel, &empty).unwrap_err().errno(), Errno::Einval);

        let long = OpenRequest { path_len: 61, ..base };
        assert_eq!(fx.disk.open(&fx.kernel, &long).unwrap_err().errno(), Errno::Einval);

        let null = OpenRequest { path_addr: 0, ..base };
        assert_eq!(fx.disk.open(&fx.kernel, &null).unwrap_err().errno(), Errno::Efault);

        // all-NUL path collapses to an empty name
        assert_eq!(fx.disk.open(&fx.kernel, &base).unwrap_err().errno(), Errno::Einval);

        fx.kernel.poke(fx.client, addr, b"abc").unwrap();
        let bad_mode = OpenRequest { flags: O_ACCMODE | O_CREAT, ..base };
        assert_eq!(fx.disk.open(&fx.kernel, &bad_mode).unwrap_err().errno(), Errno::Einval);
        assert!(fx.disk.table().is_empty());
    }

    #[test]
    fn test_unmapped_path_is_eperm() {
        let mut fx = Fixture::new();
        let req = OpenRequest {
            path_addr: 0xdead_0000,
            path_len: 3,
            flags: O_CREAT,
            mode: 0,
            endpoint: fx.client,
        };
        assert_eq!(fx.disk.open(&fx.kernel, &req).unwrap_err().errno(), Errno::Eperm);
    }
}
