//! Configuration model
//!
//! The YAML layout is `global`, `targets` and `modules`. Each module is an
//! ordered list of command trees; each command carries the labels, metrics
//! and variables decoded from its response rows.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tikmon_conv::Param;

use crate::extension::CommandExtension;

// =============================================================================
// Labels and metrics
// =============================================================================

/// Label attached to every series produced by a command (or a single metric)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Label {
    #[serde(flatten)]
    pub param: Param,
    /// Exposed name, defaults to the field name with `-` replaced by `_`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_name: Option<String>,
}

impl Label {
    pub fn new(param: Param) -> Self {
        Self {
            param,
            label_name: None,
        }
    }

    pub fn with_label_name(mut self, name: impl Into<String>) -> Self {
        self.label_name = Some(name.into());
        self
    }

    /// Name used for the exposed label (or the variable)
    pub fn exposed_name(&self) -> String {
        self.label_name
            .clone()
            .or_else(|| self.param.derived_name())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
    Counter,
    #[default]
    Gauge,
}

/// Numeric series decoded from a response field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    #[serde(flatten)]
    pub param: Param,
    /// Exposed name without prefix, defaults like [`Label::label_name`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_name: Option<String>,
    #[serde(default)]
    pub metric_type: MetricType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    /// Labels appended after the command's labels for this metric only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
}

impl Metric {
    pub fn new(param: Param, metric_type: MetricType) -> Self {
        Self {
            param,
            metric_type,
            ..Default::default()
        }
    }

    pub fn with_metric_name(mut self, name: impl Into<String>) -> Self {
        self.metric_name = Some(name.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    pub fn exposed_name(&self) -> String {
        self.metric_name
            .clone()
            .or_else(|| self.param.derived_name())
            .unwrap_or_default()
    }
}

// =============================================================================
// Command trees
// =============================================================================

/// One node of a module's command tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleCommand {
    /// Command template, `{name}` placeholders are filled from variables
    pub command: String,
    /// Overrides the global command timeout for this node
    #[serde(
        default,
        with = "crate::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub command_timeout: Option<Duration>,
    /// Overrides the module name in metric names for this subtree
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<Metric>,
    /// Decoded per row and visible to this node and its sub commands
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Label>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_commands: Vec<ModuleCommand>,
}

impl ModuleCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metrics.push(metric);
        self
    }

    pub fn with_variable(mut self, variable: Label) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn with_sub_command(mut self, command: ModuleCommand) -> Self {
        self.sub_commands.push(command);
        self
    }
}

/// Ordered forest of command roots
pub type Module = Vec<ModuleCommand>;

// =============================================================================
// Targets and global settings
// =============================================================================

/// Device to scrape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    /// Overrides `global.username`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Overrides `global.password`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Labels published by the discover endpoint
    #[serde(default)]
    pub discover_labels: BTreeMap<String, String>,
    /// Seed variables for every command tree of this target
    #[serde(default)]
    pub variables: HashMap<String, String>,
    /// Modules scraped when the request names none
    #[serde(default)]
    pub modules: Vec<String>,
}

impl Target {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn with_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules = modules.into_iter().map(Into::into).collect();
        self
    }

    /// Username and password after applying the global defaults
    pub fn credentials(&self, global: &Global) -> (String, String) {
        let username = self
            .username
            .clone()
            .or_else(|| global.username.clone())
            .unwrap_or_default();
        let password = self
            .password
            .clone()
            .or_else(|| global.password.clone())
            .unwrap_or_default();
        (username, password)
    }
}

/// Process wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Global {
    /// Default username for targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Default password for targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_metrics_url")]
    pub metrics_url: String,
    #[serde(default = "default_discover_url")]
    pub discover_url: String,
    #[serde(default = "default_reload_url")]
    pub reload_url: String,
    /// First part of every metric name
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Folders (relative to the root file) holding sub config files
    #[serde(default)]
    pub module_folders: Vec<String>,
    #[serde(default = "default_command_timeout", with = "crate::duration")]
    pub command_timeout: Duration,
    /// Connections used more recently than this skip the health check
    #[serde(default = "default_one_minute", with = "crate::duration")]
    pub connection_check_interval: Duration,
    /// Idle connections older than this are closed by the cleanup task
    #[serde(default = "default_connection_use_timeout", with = "crate::duration")]
    pub connection_use_timeout: Duration,
    #[serde(default = "default_one_minute", with = "crate::duration")]
    pub connection_cleanup_interval: Duration,
    #[serde(default = "default_one_minute", with = "crate::duration")]
    pub configuration_reload_interval: Duration,
}

fn default_port() -> u16 {
    9436
}

fn default_metrics_url() -> String {
    "metrics".to_string()
}

fn default_discover_url() -> String {
    "discover".to_string()
}

fn default_reload_url() -> String {
    "-/reload".to_string()
}

fn default_prefix() -> String {
    "mikrotik".to_string()
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_one_minute() -> Duration {
    Duration::from_secs(60)
}

fn default_connection_use_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for Global {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            port: default_port(),
            metrics_url: default_metrics_url(),
            discover_url: default_discover_url(),
            reload_url: default_reload_url(),
            prefix: default_prefix(),
            module_folders: Vec::new(),
            command_timeout: default_command_timeout(),
            connection_check_interval: default_one_minute(),
            connection_use_timeout: default_connection_use_timeout(),
            connection_cleanup_interval: default_one_minute(),
            configuration_reload_interval: default_one_minute(),
        }
    }
}

// =============================================================================
// Files
// =============================================================================

/// Content of a file found in one of the module folders
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubConfig {
    #[serde(default)]
    pub modules: HashMap<String, Module>,
    #[serde(default)]
    pub module_extensions: HashMap<String, Vec<CommandExtension>>,
    #[serde(default)]
    pub targets: BTreeMap<String, Target>,
}

/// Content of the root configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RootFile {
    #[serde(default)]
    pub global: Global,
    #[serde(flatten)]
    pub content: SubConfig,
}

/// Fully assembled configuration, extensions already applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    pub global: Global,
    pub targets: BTreeMap<String, Target>,
    pub modules: HashMap<String, Module>,
}

impl Configuration {
    pub fn target(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tikmon_conv::ParamType;

    #[test]
    fn test_global_defaults() {
        let global: Global = serde_yaml::from_str("{}").unwrap();
        assert_eq!(global, Global::default());
        assert_eq!(global.port, 9436);
        assert_eq!(global.reload_url, "-/reload");
        assert_eq!(global.command_timeout, Duration::from_secs(5));
        assert_eq!(global.connection_use_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_global_durations() {
        let global: Global =
            serde_yaml::from_str("command_timeout: 250ms\nconnection_use_timeout: 1h 30m\n")
                .unwrap();
        assert_eq!(global.command_timeout, Duration::from_millis(250));
        assert_eq!(global.connection_use_timeout, Duration::from_secs(5400));
        assert!(serde_yaml::from_str::<Global>("command_timeout: soon\n").is_err());
    }

    #[test]
    fn test_module_command_tree() {
        let yaml = r#"
command: /interface/print
command_timeout: 2s
labels:
  - name: name
    label_name: interface
variables:
  - name: name
    label_name: iface
metrics:
  - name: rx-byte
    metric_type: Counter
    param_type: Int
    help: received bytes
    labels:
      - static: rx
        label_name: direction
sub_commands:
  - command: /interface/monitor-traffic ?interface={iface}
    metrics:
      - name: rx-bits-per-second
        param_type: Int
"#;
        let cmd: ModuleCommand = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cmd.command_timeout, Some(Duration::from_secs(2)));
        assert_eq!(cmd.labels[0].exposed_name(), "interface");
        assert_eq!(cmd.variables[0].exposed_name(), "iface");

        let metric = &cmd.metrics[0];
        assert_eq!(metric.exposed_name(), "rx_byte");
        assert_eq!(metric.metric_type, MetricType::Counter);
        assert_eq!(metric.param.param_type, ParamType::Int);
        assert_eq!(metric.labels[0].param.static_value.as_deref(), Some("rx"));

        let sub = &cmd.sub_commands[0].metrics[0];
        assert_eq!(sub.metric_type, MetricType::Gauge);
        assert_eq!(sub.exposed_name(), "rx_bits_per_second");
    }

    #[test]
    fn test_target_credentials() {
        let global = Global {
            username: Some("admin".into()),
            password: Some("secret".into()),
            ..Default::default()
        };
        let mut target = Target::new("10.0.0.1");
        assert_eq!(
            target.credentials(&global),
            ("admin".to_string(), "secret".to_string())
        );

        target.username = Some("monitor".into());
        assert_eq!(
            target.credentials(&global),
            ("monitor".to_string(), "secret".to_string())
        );
    }
}
