//! # ramdiskfs-types
//!
//! Shared wire types for the ramdiskfs protocol.
//!
//! These types describe what travels between a client, the microkernel and
//! the ramdisk server:
//!
//! - [`ids`] - typed integers for endpoints, slots, capabilities and grants
//! - [`flags`] - open flags and capability permission bits
//! - [`errno`] - the negative reply codes
//! - [`message`] - request/reply messages and their postcard codec

pub mod errno;
pub mod flags;
pub mod ids;
pub mod message;

pub use errno::Errno;
pub use flags::{AccessMode, GrantAccess, OpenFlags, Permissions};
pub use ids::{CapIndex, Endpoint, Epoch, GrantId, ServiceId, SlotIndex};
pub use message::{
    Call, CloseRequest, IoRequest, Message, OpenRequest, Reply, Request, WireError, WireResult,
};
