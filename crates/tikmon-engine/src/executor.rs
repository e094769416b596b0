//! Command tree executor
//!
//! Runs a prepared command on a device session, decodes every response row
//! into labels, metrics and variables, and recurses into sub commands with
//! the row's variables in scope. A node ends exactly once: completed on
//! done, faulted on trap, timeout or a lost reply stream.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tikmon_conv::{decode_label, decode_value, Fields, Param, VariableScope};
use tikmon_device::{DeviceSession, Reply, Row};
use tracing::{debug, debug_span, trace, trace_span, warn, Instrument};

use crate::collector::PreparedCommand;
use crate::error::{ScrapeError, ScrapeResult};
use crate::registry::MetricRegistry;

const PENDING: u8 = 0;
const COMPLETED: u8 = 1;
const FAULTED: u8 = 2;

/// Terminal state of one command invocation
#[derive(Debug)]
pub struct NodeState(AtomicU8);

impl Default for NodeState {
    fn default() -> Self {
        Self(AtomicU8::new(PENDING))
    }
}

impl NodeState {
    /// Move to completed. Returns false if the node already ended.
    pub fn complete(&self) -> bool {
        self.transition(COMPLETED)
    }

    /// Move to faulted. Returns false if the node already ended.
    pub fn fault(&self) -> bool {
        self.transition(FAULTED)
    }

    pub fn is_terminal(&self) -> bool {
        self.0.load(Ordering::Acquire) != PENDING
    }

    pub fn is_faulted(&self) -> bool {
        self.0.load(Ordering::Acquire) == FAULTED
    }

    fn transition(&self, to: u8) -> bool {
        self.0
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Executes prepared commands against one session and one registry
pub struct CommandRunner<'a> {
    session: &'a dyn DeviceSession,
    registry: &'a MetricRegistry,
    default_timeout: Duration,
    responses: AtomicU64,
}

impl<'a> CommandRunner<'a> {
    pub fn new(
        session: &'a dyn DeviceSession,
        registry: &'a MetricRegistry,
        default_timeout: Duration,
    ) -> Self {
        Self {
            session,
            registry,
            default_timeout,
            responses: AtomicU64::new(0),
        }
    }

    /// Number of response rows handled so far
    pub fn responses(&self) -> u64 {
        self.responses.load(Ordering::Relaxed)
    }

    /// Run `node` and its subtree with `scope` as the parent scope
    pub fn run<'b>(
        &'b self,
        node: &'b PreparedCommand<'b>,
        scope: VariableScope,
    ) -> BoxFuture<'b, ScrapeResult<()>>
    where
        'a: 'b,
    {
        let command = scope.substitute(&node.command().command);
        let span = debug_span!("command", command = %command);

        async move {
            let timeout = node.command().command_timeout.unwrap_or(self.default_timeout);
            let state = NodeState::default();

            tokio::select! {
                result = self.execute(node, &command, &scope, &state) => result,
                _ = tokio::time::sleep(timeout) => {
                    state.fault();
                    warn!(?timeout, "command not completed after timeout period");
                    Err(ScrapeError::CommandTimeout { command: command.clone(), timeout })
                }
            }
        }
        .instrument(span)
        .boxed()
    }

    async fn execute(
        &self,
        node: &PreparedCommand<'_>,
        command: &str,
        scope: &VariableScope,
        state: &NodeState,
    ) -> ScrapeResult<()> {
        debug!("run command");
        let fault = |message: String| ScrapeError::CommandFault {
            command: command.to_string(),
            message,
        };

        let mut replies = self
            .session
            .execute(command)
            .await
            .map_err(|e| fault(e.to_string()))?;

        loop {
            match replies.recv().await {
                Some(Reply::Row(row)) => {
                    if state.is_terminal() {
                        debug!("ignore response, command already finished");
                        continue;
                    }
                    self.handle_row(node, &row, scope).await?;
                }
                Some(Reply::Trap(message)) => {
                    state.fault();
                    warn!(%message, "command trapped");
                    return Err(fault(message));
                }
                Some(Reply::Done) => {
                    if state.complete() {
                        debug!("done");
                    }
                    return Ok(());
                }
                None => {
                    state.fault();
                    return Err(fault("reply stream closed before done".to_string()));
                }
            }
        }
    }

    async fn handle_row(
        &self,
        node: &PreparedCommand<'_>,
        row: &Row,
        scope: &VariableScope,
    ) -> ScrapeResult<()> {
        let id = self.responses.fetch_add(1, Ordering::Relaxed) + 1;
        let span = trace_span!("response", id);

        async {
            trace!(%row, "api response");
            let command = node.command();

            let variables: Vec<(String, String)> = command
                .variables
                .iter()
                .map(|variable| {
                    let name = variable.exposed_name();
                    let value = label_text(&variable.param, &name, row, scope);
                    trace!(variable = %name, %value, "set variable");
                    (name, value)
                })
                .collect();
            let scope = scope.child(variables);

            let command_labels: Vec<String> = command
                .labels
                .iter()
                .map(|label| label_text(&label.param, &label.exposed_name(), row, &scope))
                .collect();

            for collector in node.collectors() {
                let metric = collector.metric();
                let value = match decode_value(&metric.param, row, &scope) {
                    Ok(Some(value)) => value,
                    Ok(None) => {
                        trace!(metric = %collector.full_name(), "no value, skipped");
                        continue;
                    }
                    Err(e) => {
                        warn!(metric = %collector.full_name(), error = %e, "failed to decode metric");
                        continue;
                    }
                };

                let Some(family) = collector.family(self.registry) else {
                    continue;
                };

                let metric_labels: Vec<String> = metric
                    .labels
                    .iter()
                    .map(|label| label_text(&label.param, &label.exposed_name(), row, &scope))
                    .collect();
                let label_values: Vec<&str> = command_labels
                    .iter()
                    .chain(&metric_labels)
                    .map(String::as_str)
                    .collect();

                trace!(metric = %collector.full_name(), value, "observe");
                if let Err(e) = family.observe(&label_values, value) {
                    warn!(metric = %collector.full_name(), error = %e, "failed to update metric");
                }
            }

            for child in node.children() {
                self.run(child, scope.clone()).await?;
            }
            Ok(())
        }
        .instrument(span)
        .await
    }
}

/// Label or variable text, empty when there is no value
fn label_text<F: Fields + ?Sized>(
    param: &Param,
    name: &str,
    fields: &F,
    scope: &VariableScope,
) -> String {
    match decode_label(param, fields, scope) {
        Ok(value) => value.unwrap_or_default(),
        Err(e) => {
            warn!(label = %name, error = %e, "failed to decode label");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tikmon_conv::ParamType;
    use tikmon_core::{Label, Metric, MetricType, ModuleCommand};
    use tikmon_device::transport::mock::{MockConfig, MockConnector, MockResponse};
    use tikmon_device::DeviceConnector;

    async fn session(connector: &MockConnector) -> Arc<dyn DeviceSession> {
        connector.open("h", "u", "p").await.unwrap()
    }

    fn gauge(name: &str) -> Metric {
        Metric::new(Param::field(name, ParamType::Int), MetricType::Gauge)
    }

    #[test]
    fn test_node_state_transitions_once() {
        let state = NodeState::default();
        assert!(!state.is_terminal());
        assert!(state.fault());
        assert!(!state.complete());
        assert!(state.is_faulted());
    }

    #[tokio::test]
    async fn test_rows_update_gauges() {
        let connector = MockConnector::new(MockConfig::default());
        connector.set_response(
            "/interface/print",
            MockResponse::rows(vec![
                Row::new().with_field("name", "ether1").with_field("mtu", "1500"),
                Row::new().with_field("name", "ether2").with_field("mtu", "9000"),
            ]),
        );
        let command = ModuleCommand::new("/interface/print")
            .with_label(Label::new(Param::field("name", ParamType::String)))
            .with_metric(gauge("mtu"));
        let prepared = PreparedCommand::prepare(&command, "mikrotik", "interface");

        let registry = MetricRegistry::new();
        let session = session(&connector).await;
        let runner = CommandRunner::new(session.as_ref(), &registry, Duration::from_secs(1));
        runner.run(&prepared, VariableScope::new()).await.unwrap();

        let family = prepared.collectors()[0].family(&registry).unwrap();
        assert_eq!(family.value(&["ether1"]), Some(1500.0));
        assert_eq!(family.value(&["ether2"]), Some(9000.0));
        assert_eq!(runner.responses(), 2);
    }

    #[tokio::test]
    async fn test_trap_faults() {
        let connector = MockConnector::new(MockConfig::default());
        connector.set_response("/x", MockResponse::trap("no such command"));
        let command = ModuleCommand::new("/x").with_metric(gauge("v"));
        let prepared = PreparedCommand::prepare(&command, "m", "x");

        let registry = MetricRegistry::new();
        let session = session(&connector).await;
        let runner = CommandRunner::new(session.as_ref(), &registry, Duration::from_secs(1));
        let err = runner.run(&prepared, VariableScope::new()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::CommandFault { ref message, .. } if message == "no such command"));
    }

    #[tokio::test]
    async fn test_node_timeout_overrides_default() {
        let connector = MockConnector::new(MockConfig::default());
        connector.set_response("/slow", MockResponse::hang());
        let command = ModuleCommand::new("/slow").with_timeout(Duration::from_millis(20));
        let prepared = PreparedCommand::prepare(&command, "m", "x");

        let registry = MetricRegistry::new();
        let session = session(&connector).await;
        let runner = CommandRunner::new(session.as_ref(), &registry, Duration::from_secs(30));

        let started = std::time::Instant::now();
        let err = runner.run(&prepared, VariableScope::new()).await.unwrap_err();
        assert!(matches!(err, ScrapeError::CommandTimeout { timeout, .. } if timeout == Duration::from_millis(20)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_closed_session_is_fault() {
        let connector = MockConnector::new(MockConfig::default());
        let command = ModuleCommand::new("/x");
        let prepared = PreparedCommand::prepare(&command, "m", "x");

        let registry = MetricRegistry::new();
        let session = session(&connector).await;
        session.close().await;
        let runner = CommandRunner::new(session.as_ref(), &registry, Duration::from_secs(1));
        assert!(matches!(
            runner.run(&prepared, VariableScope::new()).await,
            Err(ScrapeError::CommandFault { .. })
        ));
    }

    #[tokio::test]
    async fn test_undecodable_metric_is_skipped() {
        let connector = MockConnector::new(MockConfig::default());
        connector.set_response(
            "/x",
            MockResponse::rows(vec![Row::new().with_field("a", "oops").with_field("b", "2")]),
        );
        let command = ModuleCommand::new("/x")
            .with_metric(gauge("a"))
            .with_metric(gauge("b"));
        let prepared = PreparedCommand::prepare(&command, "m", "x");

        let registry = MetricRegistry::new();
        let session = session(&connector).await;
        let runner = CommandRunner::new(session.as_ref(), &registry, Duration::from_secs(1));
        runner.run(&prepared, VariableScope::new()).await.unwrap();

        assert!(!prepared.collectors()[0].is_materialized());
        let b = prepared.collectors()[1].family(&registry).unwrap();
        assert_eq!(b.value(&[]), Some(2.0));
    }
}
