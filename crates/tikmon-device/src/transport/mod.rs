//! Transport layer for device API sessions
//!
//! A [`DeviceConnector`] opens sessions; a [`DeviceSession`] runs one
//! command at a time per call and streams the replies back on a channel:
//! any number of rows, then either a trap or done.
//!
//! # Example
//!
//! ```ignore
//! use tikmon_device::transport::{DeviceConnector, Reply};
//! use tikmon_device::transport::mock::MockConnector;
//!
//! let connector = MockConnector::new(Default::default());
//! let session = connector.open("10.0.0.1", "admin", "").await?;
//! let mut replies = session.execute("/system/identity/print").await?;
//! while let Some(reply) = replies.recv().await {
//!     if let Reply::Row(row) = reply { println!("{row}"); }
//! }
//! ```

pub mod error;
pub mod mock;

pub use error::TransportError;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tikmon_conv::Fields;
use tokio::sync::mpsc;

/// Command used to probe whether a session still answers
pub const IDENTITY_COMMAND: &str = "/system/identity/print";

/// One record of a command response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: BTreeMap<String, String>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn into_fields(self) -> BTreeMap<String, String> {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<BTreeMap<String, String>> for Row {
    fn from(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Fields for Row {
    fn field(&self, name: &str) -> Option<&str> {
        Row::field(self, name)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("!re")?;
        for (name, value) in &self.fields {
            write!(f, " ={name}={value}")?;
        }
        Ok(())
    }
}

/// Reply to a running command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Row(Row),
    /// Error response from the device API
    Trap(String),
    /// Command finished, no more replies follow
    Done,
}

/// Replies of one command. The command is abandoned when this is dropped.
pub type ReplyStream = mpsc::Receiver<Reply>;

/// An open API session to one device
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// Start a command and return the stream of its replies
    async fn execute(&self, command: &str) -> Result<ReplyStream, TransportError>;

    /// Whether the underlying connection is still open
    fn is_open(&self) -> bool;

    /// Close the session, later commands fail with `ConnectionClosed`
    async fn close(&self);
}

/// Opens device sessions
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn open(
        &self,
        host: &str,
        username: &str,
        password: &str,
    ) -> Result<Arc<dyn DeviceSession>, TransportError>;
}
