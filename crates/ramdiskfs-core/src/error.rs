//! Ramdisk error types.

use ramdiskfs_types::{Endpoint, Errno, WireError};
use thiserror::Error;

/// Error returned by a kernel call.
///
/// The kernel's error number is kept as-is; when a capability cannot be
/// created the client sees exactly this code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{call} failed (errno {code})")]
pub struct KernelError {
    /// Name of the kernel call, for diagnostics.
    pub call: &'static str,
    /// Positive error number reported by the kernel.
    pub code: i32,
}

impl KernelError {
    pub fn new(call: &'static str, errno: Errno) -> Self {
        Self {
            call,
            code: errno.code(),
        }
    }
}

/// Kernel call result type.
pub type KernelResult<T> = Result<T, KernelError>;

/// Ramdisk request error.
#[derive(Debug, Error)]
pub enum FsError {
    /// Malformed path, negative offset, offset arithmetic overflow.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// open() without O_CREAT on a missing name.
    #[error("not found: {0}")]
    NotFound(String),

    /// open() with O_CREAT|O_EXCL on an existing name.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// No free slot for a new file.
    #[error("file table full ({0} slots)")]
    TableExhausted(usize),

    /// Allocation or reallocation failed.
    #[error("out of memory ({0} bytes requested)")]
    OutOfMemory(usize),

    /// Slot out of range or not in use.
    #[error("bad handle: {0}")]
    BadHandle(u32),

    /// Null user buffer address.
    #[error("bad address")]
    Fault,

    /// Grant creation failed.
    #[error("grant refused: {0}")]
    PermissionDenied(KernelError),

    /// Safe copy failed after the grant was created.
    #[error("copy failed: {0}")]
    Io(KernelError),

    /// Unknown request at the dispatch layer.
    #[error("request {0} not implemented")]
    NotImplemented(u32),

    /// The request names an endpoint other than its sender.
    #[error("{sender} sent a request on behalf of {claimed}")]
    WrongEndpoint { sender: Endpoint, claimed: Endpoint },

    /// Capability creation failed; the kernel's code is passed through.
    #[error("capability creation refused: {0}")]
    Kernel(KernelError),
}

impl FsError {
    /// Create an InvalidArgument error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a NotFound error from a raw file name.
    pub fn not_found(name: &[u8]) -> Self {
        Self::NotFound(String::from_utf8_lossy(name).into_owned())
    }

    /// Create an AlreadyExists error from a raw file name.
    pub fn already_exists(name: &[u8]) -> Self {
        Self::AlreadyExists(String::from_utf8_lossy(name).into_owned())
    }

    /// Positive error number for the reply.
    pub fn code(&self) -> i32 {
        match self {
            FsError::Kernel(err) => err.code,
            other => other.errno().code(),
        }
    }

    /// Errno class of this error.
    ///
    /// For [`FsError::Kernel`] this is only an approximation; use
    /// [`FsError::code`] to get the kernel's own number.
    pub fn errno(&self) -> Errno {
        match self {
            FsError::InvalidArgument(_) => Errno::Einval,
            FsError::NotFound(_) => Errno::Enoent,
            FsError::AlreadyExists(_) => Errno::Eexist,
            FsError::TableExhausted(_) => Errno::Enfile,
            FsError::OutOfMemory(_) => Errno::Enomem,
            FsError::BadHandle(_) => Errno::Ebadf,
            FsError::Fault => Errno::Efault,
            FsError::PermissionDenied(_) => Errno::Eperm,
            FsError::Io(_) => Errno::Eio,
            FsError::NotImplemented(_) => Errno::Enosys,
            FsError::WrongEndpoint { .. } => Errno::Eperm,
            FsError::Kernel(err) => Errno::from_repr(err.code).unwrap_or(Errno::Eio),
        }
    }
}

impl From<WireError> for FsError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::UnknownCall(call) => FsError::NotImplemented(call),
            other => FsError::InvalidArgument(other.to_string()),
        }
    }
}

/// Ramdisk result type.
pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(FsError::invalid("x").code(), 22);
        assert_eq!(FsError::not_found(b"foo").code(), 2);
        assert_eq!(FsError::TableExhausted(4).code(), 23);
        assert_eq!(FsError::BadHandle(3).code(), 9);
        assert_eq!(FsError::Fault.code(), 14);
    }

    #[test]
    fn test_kernel_code_passes_through() {
        let err = FsError::Kernel(KernelError {
            call: "create_capability",
            code: 28,
        });
        assert_eq!(err.code(), 28);
        assert_eq!(err.errno(), Errno::Enospc);

        let odd = FsError::Kernel(KernelError {
            call: "create_capability",
            code: 1234,
        });
        assert_eq!(odd.code(), 1234);
    }

    #[test]
    fn test_grant_and_copy_map_differently() {
        let kerr = KernelError::new("safecopy", Errno::Efault);
        assert_eq!(FsError::PermissionDenied(kerr).code(), 1);
        assert_eq!(FsError::Io(kerr).code(), 5);
    }

    #[test]
    fn test_lossy_names_in_messages() {
        let err = FsError::not_found(&[b'a', 0xff]);
        assert_eq!(err.to_string(), "not found: a\u{fffd}");
    }

    #[test]
    fn test_wire_errors() {
        let unknown = FsError::from(WireError::UnknownCall(9));
        assert!(matches!(unknown, FsError::NotImplemented(9)));
        assert_eq!(unknown.code(), 38);

        let spoof = FsError::WrongEndpoint {
            sender: Endpoint::new(1),
            claimed: Endpoint::new(2),
        };
        assert_eq!(spoof.errno(), Errno::Eperm);
    }
}
