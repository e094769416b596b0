//! tikmon-device - Device sessions for the tikmon exporter
//!
//! This crate abstracts the device API behind [`transport::DeviceConnector`]
//! and [`transport::DeviceSession`], ships a scriptable mock transport, and
//! pools open sessions per host and credentials.

pub mod pool;
pub mod transport;

pub use pool::{CleanupTask, Connection, ConnectionKey, ConnectionPool, PoolConfig, PoolError};
pub use transport::{
    DeviceConnector, DeviceSession, Reply, ReplyStream, Row, TransportError, IDENTITY_COMMAND,
};
