//! Connection pool for device sessions
//!
//! Sessions are cached per `(host, username, password)`. Only one task at a
//! time may check or open the session of a given key; different keys never
//! wait on each other. A background sweep closes sessions that were not used
//! for a while.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::transport::{DeviceConnector, DeviceSession, Reply, TransportError, IDENTITY_COMMAND};

/// Errors from the connection pool
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to open connection to {key}: {source}")]
    Open {
        key: String,
        #[source]
        source: TransportError,
    },
}

pub type PoolResult<T> = Result<T, PoolError>;

/// Pool timing settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Sessions used more recently than this are trusted without a probe
    pub check_interval: Duration,
    /// Sessions idle longer than this are closed by the sweep
    pub use_timeout: Duration,
    /// Time between two sweeps
    pub cleanup_interval: Duration,
    /// Maximum wait for the health probe
    pub check_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            use_timeout: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            check_timeout: Duration::from_secs(2),
        }
    }
}

/// Identity of a pooled session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl ConnectionKey {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.host)
    }
}

/// A pooled session and its last use
pub struct Connection {
    key: ConnectionKey,
    session: Arc<dyn DeviceSession>,
    last_use: Mutex<Instant>,
}

impl Connection {
    fn new(key: ConnectionKey, session: Arc<dyn DeviceSession>) -> Self {
        Self {
            key,
            session,
            last_use: Mutex::new(Instant::now()),
        }
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn session(&self) -> &Arc<dyn DeviceSession> {
        &self.session
    }

    pub fn last_use(&self) -> Instant {
        *self.last_use.lock()
    }

    pub fn idle_for(&self) -> Duration {
        self.last_use().elapsed()
    }

    /// Record a successful use
    pub fn touch(&self) {
        *self.last_use.lock() = Instant::now();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("key", &self.key.to_string())
            .field("open", &self.session.is_open())
            .field("idle_for", &self.idle_for())
            .finish()
    }
}

/// Keyed cache of device sessions
pub struct ConnectionPool {
    connector: Arc<dyn DeviceConnector>,
    config: RwLock<PoolConfig>,
    connections: RwLock<HashMap<ConnectionKey, Arc<Connection>>>,
    key_locks: Mutex<HashMap<ConnectionKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConnectionPool {
    pub fn new(connector: Arc<dyn DeviceConnector>, config: PoolConfig) -> Self {
        Self {
            connector,
            config: RwLock::new(config),
            connections: RwLock::new(HashMap::new()),
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> PoolConfig {
        *self.config.read()
    }

    /// Apply new timings, e.g. after a configuration reload
    pub fn set_config(&self, config: PoolConfig) {
        *self.config.write() = config;
    }

    /// Number of cached connections
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Return a healthy connection for `key`, opening one if needed
    pub async fn get_connection(&self, key: &ConnectionKey) -> PoolResult<Arc<Connection>> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().await;

        let cached = self.connections.read().get(key).cloned();
        if let Some(connection) = cached {
            debug!(connection = %key, "got connection from cache");
            if self.check(&connection).await {
                // handed out, so the sweep must not take it mid-scrape
                connection.touch();
                return Ok(connection);
            }
            info!(connection = %key, "connection unhealthy, reopening");
            self.connections.write().remove(key);
            connection.session.close().await;
        }

        debug!(connection = %key, "open connection");
        let session = self
            .connector
            .open(&key.host, &key.username, &key.password)
            .await
            .map_err(|source| PoolError::Open {
                key: key.to_string(),
                source,
            })?;

        let connection = Arc::new(Connection::new(key.clone(), session));
        self.connections
            .write()
            .insert(key.clone(), Arc::clone(&connection));
        Ok(connection)
    }

    fn key_lock(&self, key: &ConnectionKey) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.key_locks.lock().entry(key.clone()).or_default())
    }

    /// Health check of a cached connection
    async fn check(&self, connection: &Connection) -> bool {
        if !connection.session.is_open() {
            debug!(connection = %connection.key, "connection is not open");
            return false;
        }

        let config = self.config();
        if connection.idle_for() < config.check_interval {
            debug!(connection = %connection.key, "connection was used recently, do not test");
            return true;
        }

        let probe = async {
            let mut replies = connection.session.execute(IDENTITY_COMMAND).await.ok()?;
            match replies.recv().await {
                Some(Reply::Row(_)) | Some(Reply::Done) => Some(()),
                Some(Reply::Trap(message)) => {
                    debug!(connection = %connection.key, %message, "connection test trapped");
                    None
                }
                None => None,
            }
        };

        match tokio::time::timeout(config.check_timeout, probe).await {
            Ok(Some(())) => {
                debug!(connection = %connection.key, "connection test successful");
                true
            }
            Ok(None) => false,
            Err(_) => {
                debug!(connection = %connection.key, "connection test timed out");
                false
            }
        }
    }

    /// Close and evict connections idle longer than the use timeout.
    /// Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let use_timeout = self.config().use_timeout;

        let expired: Vec<Arc<Connection>> = {
            let mut connections = self.connections.write();
            let keys: Vec<ConnectionKey> = connections
                .iter()
                .filter(|(_, c)| c.idle_for() > use_timeout)
                .map(|(k, _)| k.clone())
                .collect();
            keys.iter()
                .filter_map(|k| connections.remove(k))
                .collect()
        };

        for connection in &expired {
            debug!(connection = %connection.key, "remove idle connection");
            connection.session.close().await;
        }

        // drop lock entries nobody holds for keys no longer cached
        {
            let connections = self.connections.read();
            self.key_locks
                .lock()
                .retain(|k, lock| connections.contains_key(k) || Arc::strong_count(lock) > 1);
        }

        expired.len()
    }

    /// Start the periodic sweep. The task stops when the handle is dropped.
    pub fn spawn_cleanup(self: &Arc<Self>) -> CleanupTask {
        let pool = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let removed = pool.cleanup().await;
                if removed > 0 {
                    info!(removed, remaining = pool.len(), "connection cleanup");
                }
                tokio::time::sleep(pool.config().cleanup_interval).await;
            }
        });
        CleanupTask { handle }
    }

    /// Close every cached connection
    pub async fn close_all(&self) {
        let all: Vec<_> = self.connections.write().drain().map(|(_, c)| c).collect();
        for connection in all {
            connection.session.close().await;
        }
        if !self.is_empty() {
            warn!("connections were opened while closing the pool");
        }
    }
}

/// Handle of the background sweep
pub struct CleanupTask {
    handle: JoinHandle<()>,
}

impl Drop for CleanupTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
