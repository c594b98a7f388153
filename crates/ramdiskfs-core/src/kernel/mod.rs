//! Kernel calls used by the ramdisk.
//!
//! The server talks to the microkernel through the [`Kernel`] trait:
//! capability creation plus grant-scoped copies in and out of a client's
//! address space. [`LocalKernel`] is an in-process implementation used by
//! the tests and the standalone server binary.
//!
//! Every copy goes through a [`Grant`], which is scoped to exactly the bytes
//! being moved and is revoked when it goes out of scope, whether or not the
//! copy succeeded.

mod local;

pub use local::{CapabilityRecord, KernelFault, LocalKernel};

use ramdiskfs_types::{CapIndex, Endpoint, Epoch, GrantAccess, GrantId, Permissions, ServiceId, SlotIndex};

use crate::error::KernelResult;

/// Arguments of the capability-creation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityRequest {
    /// Client that will hold the capability.
    pub holder: Endpoint,
    pub permissions: Permissions,
    /// Object handle: the file table slot.
    pub object: SlotIndex,
    pub service: ServiceId,
    pub epoch: Epoch,
}

/// Microkernel primitives needed by the ramdisk handlers.
pub trait Kernel {
    /// Mint a capability in `req.holder`'s table.
    fn create_capability(&self, req: CapabilityRequest) -> KernelResult<CapIndex>;

    /// Create a grant over `len` bytes at `addr` in `grantor`'s address space.
    fn create_grant(
        &self,
        grantor: Endpoint,
        addr: u64,
        len: usize,
        access: GrantAccess,
    ) -> KernelResult<GrantId>;

    /// Revoke a grant. Revoking an unknown grant is an error.
    fn revoke_grant(&self, grant: GrantId) -> KernelResult<()>;

    /// Copy `src` into the granted region of `dest`, starting `offset` bytes in.
    fn safecopy_to(&self, dest: Endpoint, grant: GrantId, offset: usize, src: &[u8]) -> KernelResult<()>;

    /// Fill `dest` from the granted region of `src`, starting `offset` bytes in.
    fn safecopy_from(
        &self,
        src: Endpoint,
        grant: GrantId,
        offset: usize,
        dest: &mut [u8],
    ) -> KernelResult<()>;
}

impl<K: Kernel + ?Sized> Kernel for std::sync::Arc<K> {
    fn create_capability(&self, req: CapabilityRequest) -> KernelResult<CapIndex> {
        (**self).create_capability(req)
    }

    fn create_grant(
        &self,
        grantor: Endpoint,
        addr: u64,
        len: usize,
        access: GrantAccess,
    ) -> KernelResult<GrantId> {
        (**self).create_grant(grantor, addr, len, access)
    }

    fn revoke_grant(&self, grant: GrantId) -> KernelResult<()> {
        (**self).revoke_grant(grant)
    }

    fn safecopy_to(&self, dest: Endpoint, grant: GrantId, offset: usize, src: &[u8]) -> KernelResult<()> {
        (**self).safecopy_to(dest, grant, offset, src)
    }

    fn safecopy_from(
        &self,
        src: Endpoint,
        grant: GrantId,
        offset: usize,
        dest: &mut [u8],
    ) -> KernelResult<()> {
        (**self).safecopy_from(src, grant, offset, dest)
    }
}

/// A single-use grant over a client buffer, revoked on drop.
pub struct Grant<'k, K: Kernel + ?Sized> {
    kernel: &'k K,
    id: GrantId,
    endpoint: Endpoint,
}

impl<'k, K: Kernel + ?Sized> Grant<'k, K> {
    /// Create a grant over `len` bytes at `addr` in `endpoint`'s memory.
    pub fn create(
        kernel: &'k K,
        endpoint: Endpoint,
        addr: u64,
        len: usize,
        access: GrantAccess,
    ) -> KernelResult<Self> {
        let id = kernel.create_grant(endpoint, addr, len, access)?;
        Ok(Self {
            kernel,
            id,
            endpoint,
        })
    }

    pub fn id(&self) -> GrantId {
        self.id
    }

    /// Copy `src` to the start of the granted region.
    pub fn copy_to(&self, src: &[u8]) -> KernelResult<()> {
        self.kernel.safecopy_to(self.endpoint, self.id, 0, src)
    }

    /// Fill `dest` from the start of the granted region.
    pub fn copy_from(&self, dest: &mut [u8]) -> KernelResult<()> {
        self.kernel.safecopy_from(self.endpoint, self.id, 0, dest)
    }
}

impl<K: Kernel + ?Sized> Drop for Grant<'_, K> {
    fn drop(&mut self) {
        if let Err(e) = self.kernel.revoke_grant(self.id) {
            tracing::warn!("failed to revoke {} for {}: {}", self.id, self.endpoint, e);
        }
    }
}
