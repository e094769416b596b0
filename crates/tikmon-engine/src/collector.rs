//! Prepared command trees
//!
//! Before a module runs, each command node is prepared once: label names are
//! computed and every metric gets a collector whose series family is looked
//! up (or created) in the target registry only when a value is first decoded.

use std::sync::OnceLock;

use tikmon_core::{Label, Metric, ModuleCommand};
use tracing::{trace, warn};

use crate::registry::{MetricRegistry, SeriesFamily};

/// A metric and its lazily resolved series family
pub struct MetricCollector<'a> {
    metric: &'a Metric,
    full_name: String,
    label_names: Vec<String>,
    family: OnceLock<Option<SeriesFamily>>,
}

impl<'a> MetricCollector<'a> {
    fn new(metric: &'a Metric, full_name: String, label_names: Vec<String>) -> Self {
        Self {
            metric,
            full_name,
            label_names,
            family: OnceLock::new(),
        }
    }

    pub fn metric(&self) -> &'a Metric {
        self.metric
    }

    /// Exposed name including prefixes
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Command labels followed by the metric's own labels
    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Series family, created on first call. `None` if the registry rejects
    /// the definition; the error is logged once.
    pub fn family(&self, registry: &MetricRegistry) -> Option<&SeriesFamily> {
        self.family
            .get_or_init(|| {
                let help = self.metric.help.as_deref().unwrap_or_default();
                match registry.get_or_create(
                    &self.full_name,
                    help,
                    self.metric.metric_type,
                    &self.label_names,
                ) {
                    Ok(family) => Some(family),
                    Err(e) => {
                        warn!(metric = %self.full_name, error = %e, "metric skipped");
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Whether the series family was already resolved
    pub fn is_materialized(&self) -> bool {
        matches!(self.family.get(), Some(Some(_)))
    }
}

/// Command node with its collectors and prepared sub commands
pub struct PreparedCommand<'a> {
    command: &'a ModuleCommand,
    collectors: Vec<MetricCollector<'a>>,
    children: Vec<PreparedCommand<'a>>,
}

impl<'a> PreparedCommand<'a> {
    /// Prepare `command` and its subtree.
    ///
    /// Metric names are `{global_prefix}_{section}_{metric}` where the
    /// section is the module name unless a node overrides it with `prefix`;
    /// an override applies to the node and everything below it.
    pub fn prepare(command: &'a ModuleCommand, global_prefix: &str, section: &str) -> Self {
        let section = command.prefix.as_deref().unwrap_or(section);
        let name_prefix = format!("{global_prefix}_{section}_");
        let command_labels: Vec<String> = command.labels.iter().map(Label::exposed_name).collect();

        let collectors = command
            .metrics
            .iter()
            .map(|metric| {
                let full_name = format!("{name_prefix}{}", metric.exposed_name());
                let label_names = command_labels
                    .iter()
                    .cloned()
                    .chain(metric.labels.iter().map(Label::exposed_name))
                    .collect();
                trace!(metric = %full_name, kind = ?metric.metric_type, "prepare metric");
                MetricCollector::new(metric, full_name, label_names)
            })
            .collect();

        let children = command
            .sub_commands
            .iter()
            .map(|sub| PreparedCommand::prepare(sub, global_prefix, section))
            .collect();

        Self {
            command,
            collectors,
            children,
        }
    }

    pub fn command(&self) -> &'a ModuleCommand {
        self.command
    }

    pub fn collectors(&self) -> &[MetricCollector<'a>] {
        &self.collectors
    }

    pub fn children(&self) -> &[PreparedCommand<'a>] {
        &self.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tikmon_conv::{Param, ParamType};
    use tikmon_core::MetricType;

    fn label(name: &str) -> Label {
        Label::new(Param::field(name, ParamType::String))
    }

    fn metric(name: &str) -> Metric {
        Metric::new(Param::field(name, ParamType::Int), MetricType::Gauge)
    }

    fn tree() -> ModuleCommand {
        ModuleCommand::new("/interface/print")
            .with_label(label("name"))
            .with_metric(metric("rx-byte").with_label(label("type").with_label_name("kind")))
            .with_sub_command(
                ModuleCommand::new("/interface/monitor-traffic")
                    .with_prefix("traffic")
                    .with_metric(metric("rx-bits-per-second"))
                    .with_sub_command(ModuleCommand::new("/x").with_metric(metric("deep"))),
            )
    }

    #[test]
    fn test_names_and_labels() {
        let command = tree();
        let prepared = PreparedCommand::prepare(&command, "mikrotik", "interface");

        let rx = &prepared.collectors()[0];
        assert_eq!(rx.full_name(), "mikrotik_interface_rx_byte");
        assert_eq!(rx.label_names(), &["name".to_string(), "kind".to_string()]);
        assert!(!rx.is_materialized());
    }

    #[test]
    fn test_prefix_override_applies_to_subtree() {
        let command = tree();
        let prepared = PreparedCommand::prepare(&command, "mikrotik", "interface");

        let traffic = &prepared.children()[0];
        assert_eq!(
            traffic.collectors()[0].full_name(),
            "mikrotik_traffic_rx_bits_per_second"
        );
        assert_eq!(
            traffic.children()[0].collectors()[0].full_name(),
            "mikrotik_traffic_deep"
        );
    }

    #[test]
    fn test_family_is_lazy_and_cached() {
        let command = tree();
        let prepared = PreparedCommand::prepare(&command, "mikrotik", "interface");
        let registry = MetricRegistry::new();
        assert!(registry.is_empty());

        let rx = &prepared.collectors()[0];
        assert!(rx.family(&registry).is_some());
        assert!(rx.family(&registry).is_some());
        assert!(rx.is_materialized());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_rejected_family_is_skipped() {
        let registry = MetricRegistry::new();
        registry
            .get_or_create("mikrotik_interface_rx_byte", "", MetricType::Counter, &[])
            .unwrap();

        let command = tree();
        let prepared = PreparedCommand::prepare(&command, "mikrotik", "interface");
        assert!(prepared.collectors()[0].family(&registry).is_none());
    }
}
