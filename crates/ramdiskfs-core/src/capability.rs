//! Capability issuance.
//!
//! The server never stores or checks capabilities itself. It asks the kernel
//! to mint one naming the file's slot, and from then on trusts the kernel to
//! have validated the capability before a READ/WRITE/CLOSE is delivered.

use ramdiskfs_types::{CapIndex, Endpoint, Epoch, Permissions, ServiceId, SlotIndex};
use serde::{Deserialize, Serialize};

use crate::error::KernelResult;
use crate::kernel::{CapabilityRequest, Kernel};

/// Identity under which this server issues capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceIdentity {
    pub service: ServiceId,
    pub epoch: Epoch,
}

/// Thin client of the kernel's capability-creation call.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityIssuer {
    identity: ServiceIdentity,
}

impl CapabilityIssuer {
    pub fn new(identity: ServiceIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> ServiceIdentity {
        self.identity
    }

    /// Mint a capability for `holder` over `slot`. Kernel errors are returned
    /// unchanged.
    pub fn issue<K: Kernel + ?Sized>(
        &self,
        kernel: &K,
        holder: Endpoint,
        permissions: Permissions,
        slot: SlotIndex,
    ) -> KernelResult<CapIndex> {
        kernel.create_capability(CapabilityRequest {
            holder,
            permissions,
            object: slot,
            service: self.identity.service,
            epoch: self.identity.epoch,
        })
    }
}
