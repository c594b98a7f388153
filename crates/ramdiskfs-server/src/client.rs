//! Client side of the protocol over an in-process kernel.
//!
//! Stages paths and data in the client's own address space, sends the
//! request and turns the reply back into a `Result`. The capability returned
//! by OPEN is resolved to its slot through the kernel, which is what a real
//! kernel would do when delivering later requests.

use std::sync::Arc;

use ramdiskfs_core::{KernelError, LocalKernel};
use ramdiskfs_types::{
    CapIndex, CloseRequest, Endpoint, Errno, IoRequest, Message, OpenFlags, OpenRequest, Permissions,
    Request, SlotIndex, WireError,
};
use thiserror::Error;

use crate::transport::{ClientPort, TransportError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("client memory: {0}")]
    Memory(#[from] KernelError),

    #[error("server replied with error {code}")]
    Status { code: i32 },

    #[error("{0} does not name a capability")]
    UnknownCapability(CapIndex),
}

impl ClientError {
    /// Errno of a server-side failure.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            ClientError::Status { code } => Errno::from_repr(*code),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// An open file as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle {
    pub cap: CapIndex,
    pub slot: SlotIndex,
    pub permissions: Permissions,
}

pub struct Client {
    kernel: Arc<LocalKernel>,
    port: ClientPort,
}

impl Client {
    /// Wrap a connected port. Maps the client's address space if needed.
    ///
    /// Regions staged for a request are unmapped once its reply arrives.
    pub fn new(kernel: Arc<LocalKernel>, port: ClientPort) -> Self {
        kernel.map(port.endpoint(), 1);
        Self { kernel, port }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.port.endpoint()
    }

    /// Send a raw message.
    pub async fn call(&mut self, message: Message) -> ClientResult<u64> {
        let reply = self.port.call(message).await?;
        reply
            .into_result()
            .map_err(|code| ClientError::Status { code })
    }

    pub async fn request(&mut self, request: Request) -> ClientResult<u64> {
        self.call(request.to_message()?).await
    }

    pub async fn open(&mut self, name: &[u8], flags: OpenFlags) -> ClientResult<FileHandle> {
        let endpoint = self.endpoint();
        let addr = self.stage(name)?;
        let sent = self
            .request(Request::Open(OpenRequest {
                path_addr: addr,
                path_len: u32::try_from(name.len()).unwrap_or(u32::MAX),
                flags: flags.bits(),
                mode: 0o644,
                endpoint,
            }))
            .await;
        self.kernel.unmap(endpoint, addr)?;
        let value = sent?;

        let cap = CapIndex::new(value as u32);
        let record = self
            .kernel
            .capability(endpoint, cap)
            .ok_or(ClientError::UnknownCapability(cap))?;
        Ok(FileHandle {
            cap,
            slot: record.object,
            permissions: record.permissions,
        })
    }

    pub async fn write(&mut self, file: &FileHandle, offset: i64, data: &[u8]) -> ClientResult<usize> {
        let endpoint = self.endpoint();
        let addr = self.stage(data)?;
        let req = IoRequest::new(file.slot, offset, data.len() as u64, addr, endpoint);
        let sent = self.request(Request::Write(req)).await;
        self.kernel.unmap(endpoint, addr)?;
        Ok(sent? as usize)
    }

    pub async fn read(&mut self, file: &FileHandle, offset: i64, nbytes: usize) -> ClientResult<Vec<u8>> {
        let endpoint = self.endpoint();
        let addr = self.kernel.map(endpoint, nbytes);
        let req = IoRequest::new(file.slot, offset, nbytes as u64, addr, endpoint);
        let sent = self.request(Request::Read(req)).await;
        let data = sent.and_then(|n| Ok(self.kernel.peek(endpoint, addr, n as usize)?));
        self.kernel.unmap(endpoint, addr)?;
        data
    }

    pub async fn close(&mut self, file: &FileHandle) -> ClientResult<()> {
        self.request(Request::Close(CloseRequest { slot: file.slot }))
            .await
            .map(|_| ())
    }

    /// Copy `bytes` into a fresh region of the client's memory.
    fn stage(&self, bytes: &[u8]) -> ClientResult<u64> {
        let endpoint = self.endpoint();
        let addr = self.kernel.map(endpoint, bytes.len());
        if let Err(err) = self.kernel.poke(endpoint, addr, bytes) {
            let _ = self.kernel.unmap(endpoint, addr);
            return Err(err.into());
        }
        Ok(addr)
    }
}
