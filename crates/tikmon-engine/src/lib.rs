//! tikmon-engine - Scrape execution for the tikmon exporter
//!
//! This crate walks the command trees of a module against a device session
//! and turns every response row into Prometheus series.
//!
//! # Overview
//!
//! - [`collector::PreparedCommand`] computes metric names and label sets
//!   once per scrape and resolves series families lazily.
//! - [`executor::CommandRunner`] runs a prepared tree: command substitution,
//!   per-row variable scopes, label and metric decoding, sub commands and
//!   node timeouts.
//! - [`registry::MetricRegistry`] holds the series of one target across
//!   scrapes. Gauges are set, counters only ever increase.
//! - [`scrape::Scraper`] ties the connection pool, configuration and
//!   registries together.
//!
//! # Example
//!
//! ```ignore
//! let pool = Arc::new(ConnectionPool::new(connector, pool_config(&config.global)));
//! let scraper = Scraper::new(pool);
//! scraper.scrape(&config, "router1", &[]).await?;
//! let text = scraper.encode("router1")?;
//! ```

pub mod collector;
pub mod error;
pub mod executor;
pub mod registry;
pub mod scrape;

pub use collector::{MetricCollector, PreparedCommand};
pub use error::{ScrapeError, ScrapeResult};
pub use executor::{CommandRunner, NodeState};
pub use registry::{MetricRegistry, RegistryError, RegistryStore, SeriesFamily};
pub use scrape::{pool_config, Scraper};
