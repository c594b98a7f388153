//! Shared fixture for handler tests.

use ramdiskfs_types::{CapIndex, Endpoint, Epoch, IoRequest, OpenFlags, ServiceId, SlotIndex};

use crate::capability::ServiceIdentity;
use crate::config::RamDiskConfig;
use crate::error::FsResult;
use crate::kernel::LocalKernel;
use crate::ramdisk::RamDisk;

pub const CLIENT: Endpoint = Endpoint::new(10);

pub fn identity() -> ServiceIdentity {
    ServiceIdentity {
        service: ServiceId::new(1),
        epoch: Epoch::new(1),
    }
}

pub struct Fixture {
    pub kernel: LocalKernel,
    pub disk: RamDisk,
    pub client: Endpoint,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(RamDiskConfig::default())
    }

    pub fn with_config(config: RamDiskConfig) -> Self {
        let kernel = LocalKernel::new();
        kernel.map(CLIENT, 1);
        Self {
            kernel,
            disk: RamDisk::new(config, identity()),
            client: CLIENT,
        }
    }

    pub fn open(&mut self, name: &[u8], flags: OpenFlags) -> FsResult<CapIndex> {
        self.disk.open_name(&self.kernel, name, flags, 0o600, self.client)
    }

    /// Open and resolve straight to the slot.
    pub fn open_slot(&mut self, name: &[u8], flags: OpenFlags) -> SlotIndex {
        let cap = self.open(name, flags).unwrap();
        self.slot_of(cap)
    }

    pub fn slot_of(&self, cap: CapIndex) -> SlotIndex {
        self.kernel.capability(self.client, cap).unwrap().object
    }

    pub fn write(&mut self, slot: SlotIndex, offset: i64, data: &[u8]) -> FsResult<usize> {
        let addr = self.kernel.map(self.client, data.len());
        self.kernel.poke(self.client, addr, data).unwrap();
        let req = IoRequest::new(slot, offset, data.len() as u64, addr, self.client);
        self.disk.write(&self.kernel, &req)
    }

    /// Read into a fresh client buffer and return the bytes delivered.
    pub fn read(&self, slot: SlotIndex, offset: i64, nbytes: usize) -> FsResult<Vec<u8>> {
        let addr = self.kernel.map(self.client, nbytes);
        let req = IoRequest::new(slot, offset, nbytes as u64, addr, self.client);
        let n = self.disk.read(&self.kernel, &req)?;
        Ok(self.kernel.peek(self.client, addr, n).unwrap())
    }
}
