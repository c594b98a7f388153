//! Ramdisk server library
//!
//! Message loop, ports and configuration for serving a [`ramdiskfs_core::RamDisk`].

pub mod client;
pub mod config;
pub mod constants;
pub mod server;
pub mod transport;

pub use client::{Client, ClientError, ClientResult, FileHandle};
pub use config::{ConfigError, ConfigResult, ServerConfig};
pub use server::{Exit, Server, ServerError, ServerResult};
pub use transport::{
    ClientPort, Envelope, Incoming, Port, ServerPort, Signal, Switchboard, TransportError,
    TransportResult, channel,
};
