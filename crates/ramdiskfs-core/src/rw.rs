//! READ and WRITE handlers.

use ramdiskfs_types::{GrantAccess, IoRequest};

use crate::error::{FsError, FsResult};
use crate::kernel::{Grant, Kernel};
use crate::memory::MemoryBackend;
use crate::ramdisk::RamDisk;

impl<M: MemoryBackend> RamDisk<M> {
    /// Copy up to `nbytes` from the file at `offset` into the client buffer.
    ///
    /// Reads at or past end of file return 0.
    #[tracing::instrument(skip_all, fields(slot = %req.slot, offset = req.offset(), nbytes = req.nbytes), name = "ramdisk.read")]
    pub fn read<K: Kernel + ?Sized>(&self, kernel: &K, req: &IoRequest) -> FsResult<usize> {
        let offset = checked_offset(req)?;
        let entry = self
            .table
            .get(req.slot)
            .ok_or(FsError::BadHandle(req.slot.get()))?;

        if req.nbytes == 0 {
            return Ok(0);
        }
        if req.buf_addr == 0 {
            return Err(FsError::Fault);
        }

        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        let size = entry.current_size();
        if start >= size {
            return Ok(0);
        }
        let wanted = usize::try_from(req.nbytes).unwrap_or(usize::MAX);
        let count = wanted.min(size - start);

        let grant = Grant::create(kernel, req.endpoint, req.buf_addr, count, GrantAccess::Write)
            .map_err(FsError::PermissionDenied)?;
        grant
            .copy_to(&entry.data()[start..start + count])
            .map_err(FsError::Io)?;

        tracing::debug!("read {} bytes", count);
        Ok(count)
    }

    /// Copy `nbytes` from the client buffer into the file at `offset`,
    /// growing the file as needed.
    ///
    /// The logical size is only raised once the copy has succeeded; a failed
    /// copy may leave a larger allocation behind but never exposes bytes the
    /// client did not write.
    #[tracing::instrument(skip_all, fields(slot = %req.slot, offset = req.offset(), nbytes = req.nbytes), name = "ramdisk.write")]
    pub fn write<K: Kernel + ?Sized>(&mut self, kernel: &K, req: &IoRequest) -> FsResult<usize> {
        let offset = checked_offset(req)?;
        let slot = req.slot;
        let entry = self
            .table
            .get_mut(slot)
            .ok_or(FsError::BadHandle(slot.get()))?;

        if req.nbytes == 0 {
            return Ok(0);
        }
        if req.buf_addr == 0 {
            return Err(FsError::Fault);
        }

        let (start, count, required) = offset
            .checked_add(req.nbytes)
            .and_then(|end| {
                Some((
                    usize::try_from(offset).ok()?,
                    usize::try_from(req.nbytes).ok()?,
                    usize::try_from(end).ok()?,
                ))
            })
            .ok_or_else(|| FsError::invalid(format!("write of {} at {} overflows", req.nbytes, offset)))?;

        // grant first: an unbacked nbytes must not grow the file
        let grant = Grant::create(kernel, req.endpoint, req.buf_addr, count, GrantAccess::Read)
            .map_err(FsError::PermissionDenied)?;

        if required > entry.allocated_size() {
            self.memory
                .reallocate(entry.buffer_mut(), required)
                .map_err(|oom| FsError::OutOfMemory(oom.requested))?;
            tracing::debug!("grew {} to {} bytes", slot, required);
        }

        grant
            .copy_from(&mut entry.buffer_mut().as_mut_slice()[start..required])
            .map_err(FsError::Io)?;
        drop(grant);

        entry.extend_to(required);
        tracing::debug!("wrote {} bytes, size now {}", count, entry.current_size());
        Ok(count)
    }
}

fn checked_offset(req: &IoRequest) -> FsResult<u64> {
    u64::try_from(req.offset()).map_err(|_| FsError::invalid(format!("negative offset {}", req.offset())))
}
