//! CLOSE handler.

use ramdiskfs_types::SlotIndex;

use crate::error::{FsError, FsResult};
use crate::memory::MemoryBackend;
use crate::ramdisk::RamDisk;

impl<M: MemoryBackend> RamDisk<M> {
    /// Drop one open of `slot`. The last close frees the buffer and the slot.
    #[tracing::instrument(skip(self), name = "ramdisk.close")]
    pub fn close(&mut self, slot: SlotIndex) -> FsResult<()> {
        let entry = self
            .table
            .get_mut(slot)
            .ok_or(FsError::BadHandle(slot.get()))?;

        let remaining = entry.release();
        if remaining > 0 {
            tracing::debug!("{} still open {} time(s)", slot, remaining);
            return Ok(());
        }

        if let Some(entry) = self.table.release(slot) {
            tracing::info!(
                "deleted {:?} from {}",
                String::from_utf8_lossy(entry.name()),
                slot
            );
            self.memory.free(entry.into_buffer());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ramdiskfs_types::{Errno, OpenFlags};

    use crate::memory::MemoryBackend;
    use crate::testing::Fixture;

    #[test]
    fn test_close_frees_slot_and_name() {
        let mut fx = Fixture::new();
        let slot = fx.open_slot(b"foo", OpenFlags::create());
        fx.write(slot, 0, b"bye").unwrap();

        fx.disk.close(slot).unwrap();
        assert!(fx.disk.table().is_empty());
        assert_eq!(fx.disk.memory().bytes_in_use(), 0);
        assert_eq!(fx.open(b"foo", OpenFlags::read()).unwrap_err().errno(), Errno::Enoent);
    }

    #[test]
    fn test_double_close_is_ebadf() {
        let mut fx = Fixture::new();
        let slot = fx.open_slot(b"foo", OpenFlags::create());
        fx.disk.close(slot).unwrap();
        assert_eq!(fx.disk.close(slot).unwrap_err().errno(), Errno::Ebadf);
    }

    #[test]
    fn test_shared_file_survives_first_close() {
        let mut fx = Fixture::new();
        let slot = fx.open_slot(b"foo", OpenFlags::create());
        fx.write(slot, 0, b"shared").unwrap();
        assert_eq!(fx.open_slot(b"foo", OpenFlags::read()), slot);

        fx.disk.close(slot).unwrap();
        assert_eq!(fx.read(slot, 0, 16).unwrap(), b"shared");

        fx.disk.close(slot).unwrap();
        assert!(fx.disk.table().get(slot).is_none());
    }

    #[test]
    fn test_freed_slot_is_reused() {
        let mut fx = Fixture::new();
        let a = fx.open_slot(b"a", OpenFlags::create());
        let b = fx.open_slot(b"b", OpenFlags::create());
        fx.disk.close(a).unwrap();

        let c = fx.open_slot(b"c", OpenFlags::create());
        assert_eq!(c, a);
        assert_ne!(c, b);
        assert_eq!(fx.disk.table().get(c).unwrap().current_size(), 0);
    }
}
