//! Request and reply messages.
//!
//! A [`Message`] is what the kernel delivers: a call number plus an opaque,
//! postcard-encoded body. [`Request::from_message`] turns it into the typed
//! request the server dispatches on. Unknown call numbers are reported as
//! [`WireError::UnknownCall`] so the dispatcher can answer `ENOSYS` instead
//! of guessing at the body.

use serde::{Deserialize, Serialize};
use strum::{Display, FromRepr, IntoStaticStr};
use thiserror::Error;

use crate::errno::Errno;
use crate::ids::{CapIndex, Endpoint, SlotIndex};

/// Request numbers understood by the ramdisk server.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Call {
    Open = 1,
    Read = 2,
    Write = 3,
    Close = 4,
}

/// OPEN payload. The path lives in the client's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub path_addr: u64,
    pub path_len: u32,
    pub flags: u32,
    pub mode: u32,
    pub endpoint: Endpoint,
}

/// READ and WRITE payload.
///
/// The offset travels as two 32-bit halves and is interpreted as a signed
/// 64-bit value, so a client can send a negative offset and expect EINVAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoRequest {
    pub slot: SlotIndex,
    pub nbytes: u64,
    pub buf_addr: u64,
    pub endpoint: Endpoint,
    pub offset_lo: u32,
    pub offset_hi: u32,
}

impl IoRequest {
    /// Build a request, splitting `offset` into its wire halves.
    pub fn new(slot: SlotIndex, offset: i64, nbytes: u64, buf_addr: u64, endpoint: Endpoint) -> Self {
        let offset = offset as u64;
        Self {
            slot,
            nbytes,
            buf_addr,
            endpoint,
            offset_lo: offset as u32,
            offset_hi: (offset >> 32) as u32,
        }
    }

    /// The reassembled signed offset.
    pub fn offset(&self) -> i64 {
        ((u64::from(self.offset_hi) << 32) | u64::from(self.offset_lo)) as i64
    }
}

/// CLOSE payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRequest {
    pub slot: SlotIndex,
}

/// A decoded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Open(OpenRequest),
    Read(IoRequest),
    Write(IoRequest),
    Close(CloseRequest),
}

impl Request {
    /// The call number of this request.
    pub fn call(&self) -> Call {
        match self {
            Request::Open(_) => Call::Open,
            Request::Read(_) => Call::Read,
            Request::Write(_) => Call::Write,
            Request::Close(_) => Call::Close,
        }
    }

    /// Encode into a kernel message.
    pub fn to_message(&self) -> WireResult<Message> {
        let body = match self {
            Request::Open(req) => postcard::to_allocvec(req),
            Request::Read(req) | Request::Write(req) => postcard::to_allocvec(req),
            Request::Close(req) => postcard::to_allocvec(req),
        }
        .map_err(WireError::Encode)?;
        Ok(Message {
            call: self.call() as u32,
            body,
        })
    }

    /// Decode a kernel message.
    pub fn from_message(msg: &Message) -> WireResult<Self> {
        let call = Call::from_repr(msg.call).ok_or(WireError::UnknownCall(msg.call))?;
        let malformed = |source| WireError::Malformed { call, source };
        let request = match call {
            Call::Open => Request::Open(postcard::from_bytes(&msg.body).map_err(malformed)?),
            Call::Read => Request::Read(postcard::from_bytes(&msg.body).map_err(malformed)?),
            Call::Write => Request::Write(postcard::from_bytes(&msg.body).map_err(malformed)?),
            Call::Close => Request::Close(postcard::from_bytes(&msg.body).map_err(malformed)?),
        };
        Ok(request)
    }
}

/// A message as delivered by the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Request number.
    pub call: u32,
    /// Postcard-encoded payload.
    pub body: Vec<u8>,
}

/// Reply to any request.
///
/// `status` is 0 on success and a negative errno on failure. `value` holds
/// the capability index (OPEN) or byte count (READ/WRITE) on success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub status: i32,
    pub value: u64,
}

impl Reply {
    /// Successful reply carrying `value`.
    pub fn ok(value: u64) -> Self {
        Self { status: 0, value }
    }

    /// Successful OPEN reply.
    pub fn capability(cap: CapIndex) -> Self {
        Self::ok(u64::from(cap.get()))
    }

    /// Failed reply with a positive error number.
    pub fn error(code: i32) -> Self {
        Self {
            status: -code,
            value: 0,
        }
    }

    /// Failed reply with a known errno.
    pub fn errno(errno: Errno) -> Self {
        Self::error(errno.code())
    }

    pub fn is_ok(&self) -> bool {
        self.status >= 0
    }

    /// `Ok(value)` on success, `Err(positive error number)` otherwise.
    pub fn into_result(self) -> Result<u64, i32> {
        if self.is_ok() {
            Ok(self.value)
        } else {
            Err(-self.status)
        }
    }
}

/// Message codec errors.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("unknown call number {0}")]
    UnknownCall(u32),

    #[error("malformed {call} body: {source}")]
    Malformed {
        call: Call,
        #[source]
        source: postcard::Error,
    },

    #[error("failed to encode message: {0}")]
    Encode(postcard::Error),
}

/// Codec result type.
pub type WireResult<T> = Result<T, WireError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn io(offset: i64) -> IoRequest {
        IoRequest::new(SlotIndex::new(2), offset, 16, 0x1000, Endpoint::new(5))
    }

    #[test]
    fn test_offset_halves() {
        let req = io(0x1_0000_0002);
        assert_eq!(req.offset_lo, 2);
        assert_eq!(req.offset_hi, 1);
        assert_eq!(req.offset(), 0x1_0000_0002);

        let neg = io(-1);
        assert_eq!(neg.offset_lo, u32::MAX);
        assert_eq!(neg.offset_hi, u32::MAX);
        assert_eq!(neg.offset(), -1);
    }

    #[test]
    fn test_request_message_codec() {
        let req = Request::Write(io(42));
        let msg = req.to_message().unwrap();
        assert_eq!(msg.call, 3);
        assert_eq!(Request::from_message(&msg).unwrap(), req);
    }

    #[test]
    fn test_unknown_call_rejected() {
        let msg = Message {
            call: 99,
            body: Vec::new(),
        };
        let err = Request::from_message(&msg).unwrap_err();
        assert!(matches!(err, WireError::UnknownCall(99)));
    }

    #[test]
    fn test_truncated_body_rejected() {
        let msg = Message {
            call: Call::Open as u32,
            body: vec![1],
        };
        let err = Request::from_message(&msg).unwrap_err();
        assert!(matches!(err, WireError::Malformed { call: Call::Open, .. }));
    }

    #[test]
    fn test_reply_status() {
        assert_eq!(Reply::ok(5).into_result(), Ok(5));
        assert_eq!(Reply::errno(Errno::Ebadf).status, -9);
        assert_eq!(Reply::errno(Errno::Ebadf).into_result(), Err(9));
        assert_eq!(Reply::capability(CapIndex::new(3)).value, 3);
    }
}
