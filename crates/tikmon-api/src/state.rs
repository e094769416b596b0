//! Application state for the HTTP endpoints

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tikmon_core::{ConfigResult, Configuration, SharedConfig};
use tikmon_engine::{pool_config, Scraper};
use tracing::info;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    config: Arc<SharedConfig>,
    scraper: Arc<Scraper>,
    requests: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(config: Arc<SharedConfig>, scraper: Arc<Scraper>) -> Self {
        Self {
            config,
            scraper,
            requests: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn config(&self) -> &Arc<SharedConfig> {
        &self.config
    }

    pub fn scraper(&self) -> &Arc<Scraper> {
        &self.scraper
    }

    /// Id for the next request, starting at 1
    pub fn next_request_id(&self) -> u64 {
        self.requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Reload the configuration file and apply it to the pool and the
    /// registries. On error nothing changes.
    pub fn reload(&self) -> ConfigResult<Arc<Configuration>> {
        let config = self.config.reload()?;
        self.apply(&config);
        Ok(config)
    }

    fn apply(&self, config: &Configuration) {
        self.scraper.pool().set_config(pool_config(&config.global));
        self.scraper
            .registries()
            .retain_targets(config.targets.keys().map(String::as_str));
        info!(
            targets = config.targets.len(),
            modules = config.modules.len(),
            "configuration applied"
        );
    }
}
