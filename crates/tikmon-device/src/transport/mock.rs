//! Mock device transport for testing and offline runs
//!
//! Responses are scripted per command text. All sessions opened by one
//! connector share the same device state, so tests can change responses
//! between scrapes and inspect the most recent commands sent.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::{
    DeviceConnector, DeviceSession, Reply, ReplyStream, Row, TransportError, IDENTITY_COMMAND,
};

/// Scripted response to one command
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MockResponse {
    #[serde(default)]
    pub rows: Vec<BTreeMap<String, String>>,
    /// Sent after the rows instead of done
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trap: Option<String>,
    /// Extra delay before the first reply
    #[serde(default)]
    pub delay_ms: u64,
    /// Never complete (neither done nor trap)
    #[serde(default)]
    pub hang: bool,
}

impl MockResponse {
    pub fn rows(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter().map(Row::into_fields).collect(),
            ..Default::default()
        }
    }

    pub fn trap(message: impl Into<String>) -> Self {
        Self {
            trap: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = delay.as_millis() as u64;
        self
    }
}

/// Mock device configuration, also the format of fixture files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated latency for every command in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
    /// Simulated latency for opening a session in milliseconds
    #[serde(default)]
    pub open_latency_ms: u64,
    /// Number of most recent commands kept for [`MockConnector::executed`]
    #[serde(default = "default_history")]
    pub history: usize,
    #[serde(default)]
    pub commands: HashMap<String, MockResponse>,
}

fn default_history() -> usize {
    256
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency_ms: 0,
            open_latency_ms: 0,
            history: default_history(),
            commands: HashMap::new(),
        }
    }
}

impl MockConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, TransportError> {
        serde_yaml::from_str(yaml).map_err(|e| TransportError::InvalidConfig(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, TransportError> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            TransportError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        Self::from_yaml(&yaml)
    }
}

/// Device state shared by the connector and all of its sessions
struct MockDevice {
    latency: Duration,
    responses: RwLock<HashMap<String, MockResponse>>,
    history: usize,
    executed: RwLock<VecDeque<String>>,
}

impl MockDevice {
    fn record(&self, command: &str) {
        if self.history == 0 {
            return;
        }
        let mut executed = self.executed.write();
        if executed.len() == self.history {
            executed.pop_front();
        }
        executed.push_back(command.to_string());
    }

    fn response(&self, command: &str) -> MockResponse {
        if let Some(response) = self.responses.read().get(command) {
            return response.clone();
        }
        if command == IDENTITY_COMMAND {
            return MockResponse::rows(vec![Row::new().with_field("name", "MikroTik")]);
        }
        MockResponse::trap(format!("no such command prefix: {command}"))
    }
}

/// Mock connector for testing
pub struct MockConnector {
    device: Arc<MockDevice>,
    open_latency: Duration,
    opened: AtomicUsize,
    fail_open: AtomicBool,
    sessions: RwLock<Vec<Weak<MockSession>>>,
}

impl MockConnector {
    pub fn new(config: MockConfig) -> Self {
        Self {
            device: Arc::new(MockDevice {
                latency: Duration::from_millis(config.latency_ms),
                responses: RwLock::new(config.commands),
                history: config.history,
                executed: RwLock::new(VecDeque::new()),
            }),
            open_latency: Duration::from_millis(config.open_latency_ms),
            opened: AtomicUsize::new(0),
            fail_open: AtomicBool::new(false),
            sessions: RwLock::new(Vec::new()),
        }
    }

    /// Set (or replace) the response to a command
    pub fn set_response(&self, command: impl Into<String>, response: MockResponse) {
        self.device.responses.write().insert(command.into(), response);
    }

    /// Make later `open` calls fail
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Number of sessions opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Most recent commands sent on any session, oldest first
    pub fn executed(&self) -> Vec<String> {
        self.device.executed.read().iter().cloned().collect()
    }

    /// Sessions still referenced by someone
    pub fn live_sessions(&self) -> usize {
        self.sessions
            .read()
            .iter()
            .filter(|s| s.strong_count() > 0)
            .count()
    }

    /// Simulate the device dropping every open session
    pub fn disconnect_all(&self) {
        let mut sessions = self.sessions.write();
        sessions.retain(|session| match session.upgrade() {
            Some(session) => {
                session.open.store(false, Ordering::SeqCst);
                true
            }
            None => false,
        });
    }
}

#[async_trait]
impl DeviceConnector for MockConnector {
    async fn open(
        &self,
        host: &str,
        username: &str,
        _password: &str,
    ) -> Result<Arc<dyn DeviceSession>, TransportError> {
        if !self.open_latency.is_zero() {
            tokio::time::sleep(self.open_latency).await;
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(format!(
                "{username}@{host}: connection refused"
            )));
        }

        let session = Arc::new(MockSession {
            device: Arc::clone(&self.device),
            open: AtomicBool::new(true),
        });
        {
            let mut sessions = self.sessions.write();
            sessions.retain(|s| s.strong_count() > 0);
            sessions.push(Arc::downgrade(&session));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        debug!(%host, %username, "Mock transport: session opened");
        Ok(session)
    }
}

/// Session returned by [`MockConnector`]
pub struct MockSession {
    device: Arc<MockDevice>,
    open: AtomicBool,
}

#[async_trait]
impl DeviceSession for MockSession {
    async fn execute(&self, command: &str) -> Result<ReplyStream, TransportError> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed);
        }

        self.device.record(command);
        let response = self.device.response(command);
        let delay = self.device.latency + Duration::from_millis(response.delay_ms);
        debug!(%command, rows = response.rows.len(), "Mock transport: command sent");

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            for fields in response.rows {
                if tx.send(Reply::Row(Row::from(fields))).await.is_err() {
                    return;
                }
            }
            if response.hang {
                tx.closed().await;
                return;
            }
            let last = match response.trap {
                Some(message) => Reply::Trap(message),
                None => Reply::Done,
            };
            let _ = tx.send(last).await;
        });

        Ok(rx)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
