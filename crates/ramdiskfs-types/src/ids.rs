//! Typed identifiers for endpoints, table slots, capabilities and grants.
//!
//! All of these are small integers on the wire. The newtypes keep a slot
//! index from being passed where a capability index is expected, which is
//! exactly the mix-up the protocol invites (a capability's object handle
//! *is* a slot index, but the two live in different namespaces).

use std::fmt;

use serde::{Deserialize, Serialize};

/// An IPC endpoint (process address on the message bus).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Endpoint(i32);

/// Index into the server's fixed-size file table.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotIndex(u32);

/// Kernel-chosen index of a capability in a client's capability table.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapIndex(u32);

/// Identity of the service issuing capabilities.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(u32);

/// Generation counter of a service identity, bumped on restart.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(u32);

/// Handle of a transient safe-copy grant.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantId(u32);

macro_rules! impl_typed_int {
    ($T:ident, $inner:ty, $prefix:literal) => {
        impl $T {
            /// Wrap a raw value.
            pub const fn new(raw: $inner) -> Self {
                Self(raw)
            }

            /// The raw value.
            pub const fn get(self) -> $inner {
                self.0
            }
        }

        impl From<$inner> for $T {
            fn from(raw: $inner) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($T), "({})"), self.0)
            }
        }
    };
}

impl_typed_int!(Endpoint, i32, "ep:");
impl_typed_int!(SlotIndex, u32, "slot:");
impl_typed_int!(CapIndex, u32, "cap:");
impl_typed_int!(ServiceId, u32, "svc:");
impl_typed_int!(Epoch, u32, "epoch:");
impl_typed_int!(GrantId, u32, "grant:");

impl Endpoint {
    /// The kernel's "no endpoint" sentinel.
    pub const NONE: Endpoint = Endpoint(-1);
}

impl SlotIndex {
    /// Slot as a table index.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl Epoch {
    /// The epoch after this one.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        assert_eq!(Endpoint::new(7).to_string(), "ep:7");
        assert_eq!(SlotIndex::new(3).to_string(), "slot:3");
        assert_eq!(CapIndex::new(0).to_string(), "cap:0");
        assert_eq!(format!("{:?}", GrantId::new(9)), "GrantId(9)");
    }

    #[test]
    fn test_epoch_next_wraps() {
        assert_eq!(Epoch::new(1).next(), Epoch::new(2));
        assert_eq!(Epoch::new(u32::MAX).next(), Epoch::new(0));
    }

    #[test]
    fn test_serde_transparent() {
        let bytes = postcard::to_allocvec(&SlotIndex::new(5)).unwrap();
        let plain = postcard::to_allocvec(&5u32).unwrap();
        assert_eq!(bytes, plain);
    }
}
