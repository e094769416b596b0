//! Scrape orchestration
//!
//! A scrape resolves the target and its modules, borrows a pooled session,
//! prepares every module's command forest and runs all roots concurrently.
//! The first failing root fails the scrape; values already written stay in
//! the target registry.

use std::sync::Arc;

use futures::future::try_join_all;
use tikmon_conv::VariableScope;
use tikmon_core::{Configuration, Global, Module};
use tikmon_device::{ConnectionKey, ConnectionPool, PoolConfig};
use tracing::{debug, info_span, Instrument};

use crate::collector::PreparedCommand;
use crate::error::{ScrapeError, ScrapeResult};
use crate::executor::CommandRunner;
use crate::registry::RegistryStore;

/// Pool timings taken from the global settings
pub fn pool_config(global: &Global) -> PoolConfig {
    PoolConfig {
        check_interval: global.connection_check_interval,
        use_timeout: global.connection_use_timeout,
        cleanup_interval: global.connection_cleanup_interval,
        ..PoolConfig::default()
    }
}

/// Runs scrapes and owns the registries they write to
pub struct Scraper {
    pool: Arc<ConnectionPool>,
    registries: RegistryStore,
}

impl Scraper {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool,
            registries: RegistryStore::new(),
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn registries(&self) -> &RegistryStore {
        &self.registries
    }

    /// Scrape `target_name` with the given modules, or with the target's
    /// default modules when `modules` is empty.
    pub async fn scrape(
        &self,
        config: &Configuration,
        target_name: &str,
        modules: &[String],
    ) -> ScrapeResult<()> {
        let span = info_span!("scrape", target = %target_name);
        self.scrape_inner(config, target_name, modules)
            .instrument(span)
            .await
    }

    async fn scrape_inner(
        &self,
        config: &Configuration,
        target_name: &str,
        modules: &[String],
    ) -> ScrapeResult<()> {
        let target = config
            .target(target_name)
            .ok_or_else(|| ScrapeError::TargetNotFound(target_name.to_string()))?;

        let names = if modules.is_empty() {
            target.modules.as_slice()
        } else {
            modules
        };
        let resolved: Vec<(&str, &Module)> = names
            .iter()
            .map(|name| {
                config
                    .module(name)
                    .map(|module| (name.as_str(), module))
                    .ok_or_else(|| ScrapeError::ModuleNotFound(name.clone()))
            })
            .collect::<ScrapeResult<_>>()?;

        let (username, password) = target.credentials(&config.global);
        let key = ConnectionKey::new(&target.host, username, password);
        let connection = self.pool.get_connection(&key).await?;

        let registry = self.registries.for_target(target_name);
        let runner = CommandRunner::new(
            connection.session().as_ref(),
            &registry,
            config.global.command_timeout,
        );
        let scope = VariableScope::from_map(target.variables.clone());

        let prepared: Vec<(&str, Vec<PreparedCommand<'_>>)> = resolved
            .iter()
            .map(|(name, module)| {
                let roots = module
                    .iter()
                    .map(|command| PreparedCommand::prepare(command, &config.global.prefix, name))
                    .collect();
                (*name, roots)
            })
            .collect();

        let runs = prepared.iter().map(|(name, roots)| {
            let span = info_span!("module", module = %name);
            let roots = try_join_all(roots.iter().map(|root| runner.run(root, scope.clone())));
            async move { roots.await.map(|_| ()) }.instrument(span)
        });
        try_join_all(runs).await?;

        connection.touch();
        debug!(responses = runner.responses(), "scrape complete");
        Ok(())
    }

    /// Exposition text of the target registry, empty for unknown targets
    pub fn encode(&self, target: &str) -> ScrapeResult<String> {
        match self.registries.get(target) {
            Some(registry) => Ok(registry.encode()?),
            None => Ok(String::new()),
        }
    }
}
