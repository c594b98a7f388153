//! In-process kernel.
//!
//! Models just enough of a microkernel for the ramdisk to run outside one:
//! per-endpoint address spaces made of mapped regions, per-endpoint
//! capability tables, and a grant table. One-shot faults can be injected to
//! exercise the error paths of the handlers.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use ramdiskfs_types::{
    CapIndex, Endpoint, Epoch, Errno, GrantAccess, GrantId, Permissions, ServiceId, SlotIndex,
};

use super::{CapabilityRequest, Kernel};
use crate::error::{KernelError, KernelResult};

/// First address handed out by [`LocalKernel::map`].
const MAP_BASE: u64 = 0x1000;
const PAGE: u64 = 0x1000;

/// A capability as stored in a holder's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityRecord {
    pub permissions: Permissions,
    pub object: SlotIndex,
    pub service: ServiceId,
    pub epoch: Epoch,
}

/// A one-shot failure of the next matching kernel call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelFault {
    CreateCapability(Errno),
    CreateGrant,
    CopyTo,
    CopyFrom,
}

#[derive(Debug)]
struct GrantRecord {
    grantor: Endpoint,
    addr: u64,
    len: usize,
    access: GrantAccess,
}

#[derive(Debug)]
struct AddressSpace {
    regions: BTreeMap<u64, Vec<u8>>,
    next_addr: u64,
}

impl AddressSpace {
    fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
            next_addr: MAP_BASE,
        }
    }

    /// Region bytes covering `[addr, addr + len)`, as (base, slice start).
    fn locate(&self, addr: u64, len: usize) -> Option<(u64, usize)> {
        let (&base, bytes) = self.regions.range(..=addr).next_back()?;
        let start = usize::try_from(addr - base).ok()?;
        let end = start.checked_add(len)?;
        (end <= bytes.len()).then_some((base, start))
    }

    fn slice(&self, addr: u64, len: usize) -> Option<&[u8]> {
        let (base, start) = self.locate(addr, len)?;
        self.regions.get(&base).map(|b| &b[start..start + len])
    }

    fn slice_mut(&mut self, addr: u64, len: usize) -> Option<&mut [u8]> {
        let (base, start) = self.locate(addr, len)?;
        self.regions.get_mut(&base).map(|b| &mut b[start..start + len])
    }
}

#[derive(Debug, Default)]
struct State {
    spaces: HashMap<Endpoint, AddressSpace>,
    caps: HashMap<Endpoint, Vec<CapabilityRecord>>,
    cap_limit: Option<usize>,
    grants: HashMap<GrantId, GrantRecord>,
    next_grant: u32,
    faults: Vec<KernelFault>,
}

impl State {
    /// Consume a pending fault matching `pred`.
    fn take_fault(&mut self, pred: impl Fn(&KernelFault) -> bool) -> Option<KernelFault> {
        let idx = self.faults.iter().position(pred)?;
        Some(self.faults.remove(idx))
    }
}

/// In-process kernel shared between the server and its clients.
#[derive(Debug, Default)]
pub struct LocalKernel {
    state: Mutex<State>,
}

impl LocalKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kernel whose per-holder capability tables hold at most `limit` entries.
    pub fn with_capability_limit(limit: usize) -> Self {
        let kernel = Self::new();
        kernel.state.lock().cap_limit = Some(limit);
        kernel
    }

    /// Map `len` zeroed bytes into `endpoint`'s address space, creating the
    /// space on first use. Returns the region's address (never 0).
    pub fn map(&self, endpoint: Endpoint, len: usize) -> u64 {
        let mut state = self.state.lock();
        let space = state.spaces.entry(endpoint).or_insert_with(AddressSpace::new);
        let addr = space.next_addr;
        let pages = (len as u64).div_ceil(PAGE).max(1);
        space.next_addr = addr + pages * PAGE;
        space.regions.insert(addr, vec![0; len]);
        addr
    }

    /// Remove the region mapped at `addr`. The address space itself stays.
    pub fn unmap(&self, endpoint: Endpoint, addr: u64) -> KernelResult<()> {
        let mut state = self.state.lock();
        state
            .spaces
            .get_mut(&endpoint)
            .and_then(|s| s.regions.remove(&addr))
            .map(drop)
            .ok_or(KernelError::new("unmap", Errno::Einval))
    }

    /// Number of regions mapped into `endpoint`'s address space.
    pub fn mapped_regions(&self, endpoint: Endpoint) -> usize {
        self.state.lock().spaces.get(&endpoint).map_or(0, |s| s.regions.len())
    }

    /// Write directly into a client's memory.
    pub fn poke(&self, endpoint: Endpoint, addr: u64, bytes: &[u8]) -> KernelResult<()> {
        let mut state = self.state.lock();
        let dest = state
            .spaces
            .get_mut(&endpoint)
            .and_then(|s| s.slice_mut(addr, bytes.len()))
            .ok_or(KernelError::new("poke", Errno::Efault))?;
        dest.copy_from_slice(bytes);
        Ok(())
    }

    /// Read directly from a client's memory.
    pub fn peek(&self, endpoint: Endpoint, addr: u64, len: usize) -> KernelResult<Vec<u8>> {
        let state = self.state.lock();
        state
            .spaces
            .get(&endpoint)
            .and_then(|s| s.slice(addr, len))
            .map(<[u8]>::to_vec)
            .ok_or(KernelError::new("peek", Errno::Efault))
    }

    /// Capability `cap` in `holder`'s table.
    pub fn capability(&self, holder: Endpoint, cap: CapIndex) -> Option<CapabilityRecord> {
        let state = self.state.lock();
        state
            .caps
            .get(&holder)
            .and_then(|table| table.get(cap.get() as usize))
            .copied()
    }

    /// Number of capabilities `holder` owns.
    pub fn capability_count(&self, holder: Endpoint) -> usize {
        self.state.lock().caps.get(&holder).map_or(0, Vec::len)
    }

    /// Drop all of `holder`'s capabilities (client-side cleanup).
    pub fn clear_capabilities(&self, holder: Endpoint) {
        self.state.lock().caps.remove(&holder);
    }

    /// Grants created and not yet revoked.
    pub fn live_grants(&self) -> usize {
        self.state.lock().grants.len()
    }

    /// Make the next matching call fail.
    pub fn inject(&self, fault: KernelFault) {
        self.state.lock().faults.push(fault);
    }
}

impl Kernel for LocalKernel {
    fn create_capability(&self, req: CapabilityRequest) -> KernelResult<CapIndex> {
        const CALL: &str = "create_capability";
        let mut state = self.state.lock();
        if let Some(KernelFault::CreateCapability(errno)) =
            state.take_fault(|f| matches!(f, KernelFault::CreateCapability(_)))
        {
            return Err(KernelError::new(CALL, errno));
        }
        if !state.spaces.contains_key(&req.holder) {
            return Err(KernelError::new(CALL, Errno::Einval));
        }
        let limit = state.cap_limit;
        let table = state.caps.entry(req.holder).or_default();
        if limit.is_some_and(|limit| table.len() >= limit) {
            return Err(KernelError::new(CALL, Errno::Enospc));
        }
        table.push(CapabilityRecord {
            permissions: req.permissions,
            object: req.object,
            service: req.service,
            epoch: req.epoch,
        });
        Ok(CapIndex::new((table.len() - 1) as u32))
    }

    fn create_grant(
        &self,
        grantor: Endpoint,
        addr: u64,
        len: usize,
        access: GrantAccess,
    ) -> KernelResult<GrantId> {
        const CALL: &str = "create_grant";
        let mut state = self.state.lock();
        if state.take_fault(|f| *f == KernelFault::CreateGrant).is_some() {
            return Err(KernelError::new(CALL, Errno::Enomem));
        }
        let mapped = state
            .spaces
            .get(&grantor)
            .is_some_and(|s| s.locate(addr, len).is_some());
        if !mapped {
            return Err(KernelError::new(CALL, Errno::Efault));
        }
        let id = GrantId::new(state.next_grant);
        state.next_grant = state.next_grant.wrapping_add(1);
        state.grants.insert(
            id,
            GrantRecord {
                grantor,
                addr,
                len,
                access,
            },
        );
        Ok(id)
    }

    fn revoke_grant(&self, grant: GrantId) -> KernelResult<()> {
        self.state
            .lock()
            .grants
            .remove(&grant)
            .map(|_| ())
            .ok_or(KernelError::new("revoke_grant", Errno::Einval))
    }

    fn safecopy_to(&self, dest: Endpoint, grant: GrantId, offset: usize, src: &[u8]) -> KernelResult<()> {
        const CALL: &str = "safecopy_to";
        let mut state = self.state.lock();
        if state.take_fault(|f| *f == KernelFault::CopyTo).is_some() {
            return Err(KernelError::new(CALL, Errno::Efault));
        }
        let addr = checked_target(&state, CALL, dest, grant, offset, src.len(), GrantAccess::Write)?;
        let region = state
            .spaces
            .get_mut(&dest)
            .and_then(|s| s.slice_mut(addr, src.len()))
            .ok_or(KernelError::new(CALL, Errno::Efault))?;
        region.copy_from_slice(src);
        Ok(())
    }

    fn safecopy_from(
        &self,
        src: Endpoint,
        grant: GrantId,
        offset: usize,
        dest: &mut [u8],
    ) -> KernelResult<()> {
        const CALL: &str = "safecopy_from";
        let mut state = self.state.lock();
        if state.take_fault(|f| *f == KernelFault::CopyFrom).is_some() {
            return Err(KernelError::new(CALL, Errno::Efault));
        }
        let addr = checked_target(&state, CALL, src, grant, offset, dest.len(), GrantAccess::Read)?;
        let region = state
            .spaces
            .get(&src)
            .and_then(|s| s.slice(addr, dest.len()))
            .ok_or(KernelError::new(CALL, Errno::Efault))?;
        dest.copy_from_slice(region);
        Ok(())
    }
}

/// Validate a copy against its grant and return the absolute address.
fn checked_target(
    state: &State,
    call: &'static str,
    endpoint: Endpoint,
    grant: GrantId,
    offset: usize,
    len: usize,
    access: GrantAccess,
) -> KernelResult<u64> {
    let record = state
        .grants
        .get(&grant)
        .ok_or(KernelError::new(call, Errno::Eperm))?;
    if record.grantor != endpoint || record.access != access {
        return Err(KernelError::new(call, Errno::Eperm));
    }
    let end = offset
        .checked_add(len)
        .ok_or(KernelError::new(call, Errno::Einval))?;
    if end > record.len {
        return Err(KernelError::new(call, Errno::Eperm));
    }
    Ok(record.addr + offset as u64)
}
