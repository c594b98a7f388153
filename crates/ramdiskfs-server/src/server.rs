//! The ramdisk server loop.
//!
//! One request at a time: receive, decode, run the handler, reply. Handlers
//! are synchronous, so nothing else touches the file table while a request
//! is in flight.

use ramdiskfs_core::{
    FsError, FsResult, HeapMemory, Kernel, MemoryBackend, RamDisk, RamDiskState, RamDiskStats,
    SnapshotError,
};
use ramdiskfs_types::{Endpoint, Message, Reply, Request};
use thiserror::Error;

use crate::config::ServerConfig;
use crate::transport::{Envelope, Incoming, Port, Signal};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("saved state rejected: {0}")]
    Restore(#[source] SnapshotError),

    #[error("failed to save state: {0}")]
    Save(#[source] SnapshotError),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// Why [`Server::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// SIGTERM received; all files freed.
    Terminated,
    /// The port closed with no senders left.
    Disconnected,
}

/// A ramdisk bound to a kernel.
#[derive(Debug)]
pub struct Server<K: Kernel, M: MemoryBackend = HeapMemory> {
    kernel: K,
    disk: RamDisk<M>,
    endpoint: Endpoint,
}

impl<K: Kernel> Server<K, HeapMemory> {
    /// Start with an empty table.
    pub fn init_fresh(config: &ServerConfig, kernel: K) -> Self {
        let disk = RamDisk::new(config.ramdisk.clone(), config.identity());
        tracing::info!(
            "ramdisk fresh start on {} as {} {} ({} slots, memory limit {:?})",
            config.endpoint,
            config.service_id,
            config.epoch,
            config.ramdisk.max_files,
            disk.memory().limit()
        );
        Self::with_disk(kernel, disk, config.endpoint)
    }

    /// Resume from a blob produced by [`Server::state_save`].
    ///
    /// The saved service identity wins over the configured one, so
    /// capabilities issued before the update stay valid.
    pub fn init_restart(config: &ServerConfig, kernel: K, saved: &[u8]) -> ServerResult<Self> {
        let state = RamDiskState::from_bytes(saved).map_err(ServerError::Restore)?;
        let memory = config
            .ramdisk
            .memory_limit
            .map_or_else(HeapMemory::new, HeapMemory::with_limit);
        let disk = RamDisk::restore(config.ramdisk.clone(), memory, state)
            .map_err(ServerError::Restore)?;
        tracing::info!(
            "ramdisk restarted on {} with {} file(s)",
            config.endpoint,
            disk.table().len()
        );
        Ok(Self::with_disk(kernel, disk, config.endpoint))
    }
}

impl<K: Kernel, M: MemoryBackend> Server<K, M> {
    pub fn with_disk(kernel: K, disk: RamDisk<M>, endpoint: Endpoint) -> Self {
        Self {
            kernel,
            disk,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn disk(&self) -> &RamDisk<M> {
        &self.disk
    }

    pub fn stats(&self) -> RamDiskStats {
        self.disk.stats()
    }

    /// Serialize every live file for a live update.
    pub fn state_save(&self) -> ServerResult<Vec<u8>> {
        let bytes = self.disk.snapshot().to_bytes().map_err(ServerError::Save)?;
        tracing::info!("saved {} file(s), {} bytes", self.disk.table().len(), bytes.len());
        Ok(bytes)
    }

    /// Handle a signal. Returns true when the loop should stop.
    pub fn signal(&mut self, signal: Signal) -> bool {
        match signal {
            Signal::Term => {
                let stats = self.disk.stats();
                let freed = self.disk.shutdown();
                tracing::info!(
                    "terminating: freed {} file(s), {} bytes allocated",
                    freed,
                    stats.bytes_allocated
                );
                true
            }
            Signal::Other(signo) => {
                tracing::debug!("ignoring signal {}", signo);
                false
            }
        }
    }

    /// Decode and run one request, producing its reply.
    pub fn dispatch(&mut self, source: Endpoint, message: &Message) -> Reply {
        let request = match Request::from_message(message) {
            Ok(request) => request,
            Err(err) => {
                let err = FsError::from(err);
                tracing::warn!("rejected message from {}: {}", source, err);
                return Reply::error(err.code());
            }
        };

        let call = request.call();
        match self.handle(source, request) {
            Ok(reply) => {
                tracing::debug!("{} from {} -> {}", call, source, reply.value);
                reply
            }
            Err(err) => {
                log_failure(call, source, &err);
                Reply::error(err.code())
            }
        }
    }

    fn handle(&mut self, source: Endpoint, request: Request) -> FsResult<Reply> {
        check_sender(source, &request)?;
        match request {
            Request::Open(req) => self.disk.open(&self.kernel, &req).map(Reply::capability),
            Request::Read(req) => self
                .disk
                .read(&self.kernel, &req)
                .map(|n| Reply::ok(n as u64)),
            Request::Write(req) => self
                .disk
                .write(&self.kernel, &req)
                .map(|n| Reply::ok(n as u64)),
            Request::Close(req) => self.disk.close(req.slot).map(|()| Reply::ok(0)),
        }
    }

    /// Serve `port` until SIGTERM or until it closes.
    pub async fn run<P: Port>(&mut self, port: &mut P) -> Exit {
        tracing::info!("serving on {}", self.endpoint);
        while let Some(incoming) = port.receive().await {
            match incoming {
                Incoming::Request(Envelope { source, message }) => {
                    let reply = self.dispatch(source, &message);
                    if let Err(err) = port.send(source, reply).await {
                        tracing::warn!("reply to {} dropped: {}", source, err);
                    }
                }
                Incoming::Signal(signal) => {
                    if self.signal(signal) {
                        return Exit::Terminated;
                    }
                }
            }
        }
        tracing::info!("port closed, {} file(s) still held", self.disk.table().len());
        Exit::Disconnected
    }
}

/// Grants are built over the endpoint named in the body, so it must be the
/// kernel-stamped sender.
fn check_sender(source: Endpoint, request: &Request) -> FsResult<()> {
    let claimed = match request {
        Request::Open(req) => req.endpoint,
        Request::Read(req) | Request::Write(req) => req.endpoint,
        Request::Close(_) => return Ok(()),
    };
    if claimed == source {
        Ok(())
    } else {
        Err(FsError::WrongEndpoint {
            sender: source,
            claimed,
        })
    }
}

fn log_failure(call: ramdiskfs_types::Call, source: Endpoint, err: &FsError) {
    match err {
        FsError::NotFound(_) | FsError::AlreadyExists(_) => {
            tracing::debug!("{} from {} failed: {}", call, source, err)
        }
        _ => tracing::warn!("{} from {} failed: {}", call, source, err),
    }
}
