//! Error numbers carried in replies.
//!
//! A failed request is answered with the negated errno as its status.

use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr, IntoStaticStr};

/// POSIX error numbers used by the ramdisk protocol.
#[repr(i32)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, FromRepr, IntoStaticStr,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Errno {
    Eperm = 1,
    Enoent = 2,
    Eio = 5,
    Ebadf = 9,
    Enomem = 12,
    Efault = 14,
    Eexist = 17,
    Einval = 22,
    Enfile = 23,
    Enospc = 28,
    Enosys = 38,
}

impl Errno {
    /// Positive error number.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Negative status as sent in a reply.
    pub fn status(self) -> i32 {
        -(self as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_negative_code() {
        assert_eq!(Errno::Ebadf.code(), 9);
        assert_eq!(Errno::Ebadf.status(), -9);
        assert_eq!(Errno::from_repr(22), Some(Errno::Einval));
        assert_eq!(Errno::from_repr(3), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Errno::Enfile.to_string(), "ENFILE");
        let name: &'static str = Errno::Enosys.into();
        assert_eq!(name, "ENOSYS");
    }
}
