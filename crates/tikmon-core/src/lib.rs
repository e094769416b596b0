//! tikmon-core - Configuration for the tikmon exporter
//!
//! This crate holds the declarative model the scrape engine runs on:
//! targets, modules made of command trees, and the labels, metrics and
//! variables decoded from each response row. It also loads the YAML files,
//! applies module extensions and keeps the hot reloadable snapshot.

pub mod config;
pub mod duration;
pub mod error;
pub mod extension;
pub mod loader;
pub mod shared;

pub use config::{
    Configuration, Global, Label, Metric, MetricType, Module, ModuleCommand, RootFile, SubConfig,
    Target,
};
pub use error::{ConfigError, ConfigResult};
pub use extension::{merge, CommandExtension, ExtensionAction, LabelExtension, MetricExtension};
pub use loader::load_configuration;
pub use shared::SharedConfig;
