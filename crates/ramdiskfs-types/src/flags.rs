//! Open flags and capability permission bits.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Raw `O_*` values as they appear in an OPEN request.
pub mod raw {
    pub const O_RDONLY: u32 = 0o0;
    pub const O_WRONLY: u32 = 0o1;
    pub const O_RDWR: u32 = 0o2;
    pub const O_ACCMODE: u32 = 0o3;
    pub const O_CREAT: u32 = 0o100;
    pub const O_EXCL: u32 = 0o200;
}

/// Access-mode portion of the open flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    /// Capability permissions conveyed by this access mode.
    pub fn permissions(self) -> Permissions {
        match self {
            AccessMode::ReadOnly => Permissions::READ,
            AccessMode::WriteOnly => Permissions::WRITE,
            AccessMode::ReadWrite => Permissions::READ | Permissions::WRITE,
        }
    }
}

/// Decoded open flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    /// Requested access.
    pub access: AccessMode,
    /// Create if not exists.
    pub create: bool,
    /// Exclusive create (fail if exists). Only meaningful with `create`.
    pub exclusive: bool,
}

impl OpenFlags {
    /// Decode the raw flag word.
    ///
    /// Returns `None` when the access mode is the undefined value `3`.
    /// Bits this server does not know about are ignored.
    pub fn from_bits(bits: u32) -> Option<Self> {
        let access = match bits & raw::O_ACCMODE {
            raw::O_RDONLY => AccessMode::ReadOnly,
            raw::O_WRONLY => AccessMode::WriteOnly,
            raw::O_RDWR => AccessMode::ReadWrite,
            _ => return None,
        };
        Some(Self {
            access,
            create: bits & raw::O_CREAT != 0,
            exclusive: bits & raw::O_EXCL != 0,
        })
    }

    /// Encode back into the raw flag word.
    pub fn bits(&self) -> u32 {
        let mut bits = match self.access {
            AccessMode::ReadOnly => raw::O_RDONLY,
            AccessMode::WriteOnly => raw::O_WRONLY,
            AccessMode::ReadWrite => raw::O_RDWR,
        };
        if self.create {
            bits |= raw::O_CREAT;
        }
        if self.exclusive {
            bits |= raw::O_EXCL;
        }
        bits
    }

    /// Read-only, no creation.
    pub fn read() -> Self {
        Self {
            access: AccessMode::ReadOnly,
            create: false,
            exclusive: false,
        }
    }

    /// Read-write, no creation.
    pub fn read_write() -> Self {
        Self {
            access: AccessMode::ReadWrite,
            ..Self::read()
        }
    }

    /// Read-write, create if missing.
    pub fn create() -> Self {
        Self {
            access: AccessMode::ReadWrite,
            create: true,
            exclusive: false,
        }
    }

    /// Read-write, create, fail if it already exists.
    pub fn create_exclusive() -> Self {
        Self {
            exclusive: true,
            ..Self::create()
        }
    }

    /// True when both O_CREAT and O_EXCL are set.
    pub fn is_exclusive_create(&self) -> bool {
        self.create && self.exclusive
    }
}

bitflags! {
    /// Rights carried by a ramdisk capability.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Permissions: u32 {
        const READ  = 1 << 0;
        const WRITE = 1 << 1;
    }
}

/// Direction of a safe-copy grant, seen from the granting client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrantAccess {
    /// The server may read the client's memory (`safecopy_from`).
    Read,
    /// The server may write the client's memory (`safecopy_to`).
    Write,
}

#[cfg(test)]
mod tests {
    use super::raw::*;
    use super::*;

    #[test]
    fn test_access_modes() {
        let ro = OpenFlags::from_bits(O_RDONLY).unwrap();
        assert_eq!(ro.access.permissions(), Permissions::READ);

        let wo = OpenFlags::from_bits(O_WRONLY | O_CREAT).unwrap();
        assert_eq!(wo.access.permissions(), Permissions::WRITE);
        assert!(wo.create);
        assert!(!wo.is_exclusive_create());

        let rw = OpenFlags::from_bits(O_RDWR | O_CREAT | O_EXCL).unwrap();
        assert_eq!(rw.access.permissions(), Permissions::READ | Permissions::WRITE);
        assert!(rw.is_exclusive_create());
    }

    #[test]
    fn test_invalid_access_mode() {
        assert!(OpenFlags::from_bits(O_ACCMODE).is_none());
    }

    #[test]
    fn test_excl_without_creat() {
        let flags = OpenFlags::from_bits(O_RDONLY | O_EXCL).unwrap();
        assert!(flags.exclusive);
        assert!(!flags.is_exclusive_create());
    }

    #[test]
    fn test_bits_roundtrip_of_constructors() {
        for flags in [
            OpenFlags::read(),
            OpenFlags::read_write(),
            OpenFlags::create(),
            OpenFlags::create_exclusive(),
        ] {
            assert_eq!(OpenFlags::from_bits(flags.bits()), Some(flags));
        }
    }
}
