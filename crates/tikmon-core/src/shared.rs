//! Hot reloadable configuration snapshot
//!
//! Readers take one `Arc<Configuration>` at the start of a request and keep
//! it until they finish; a reload swaps the pointer without blocking them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{error, info};

use crate::config::{Configuration, Global};
use crate::error::ConfigResult;
use crate::loader::load_configuration;

pub struct SharedConfig {
    path: PathBuf,
    current: ArcSwap<Configuration>,
}

impl SharedConfig {
    /// Initial load, an error here is fatal for the caller
    pub fn load(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        let config = load_configuration(&path)?;
        Ok(Self::new(path, config))
    }

    pub fn new(path: impl Into<PathBuf>, config: Configuration) -> Self {
        Self {
            path: path.into(),
            current: ArcSwap::from_pointee(config),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current configuration
    pub fn snapshot(&self) -> Arc<Configuration> {
        self.current.load_full()
    }

    /// Load the file again and swap it in. On error the previous snapshot
    /// stays active.
    pub fn reload(&self) -> ConfigResult<Arc<Configuration>> {
        match load_configuration(&self.path) {
            Ok(config) => Ok(self.replace(config)),
            Err(e) => {
                error!(error = %e, "configuration reload rejected, keeping previous configuration");
                Err(e)
            }
        }
    }

    /// Swap in an already assembled configuration.
    ///
    /// The listener settings (`port` and the URL paths) cannot change at
    /// runtime and keep their current values.
    pub fn replace(&self, mut config: Configuration) -> Arc<Configuration> {
        let old = self.current.load();
        keep_immutable(&old.global, &mut config.global);

        let config = Arc::new(config);
        self.current.store(Arc::clone(&config));
        info!("configuration swapped");
        config
    }
}

fn keep_immutable(old: &Global, new: &mut Global) {
    if old.port != new.port {
        info!("change ignored, changing the port is not allowed during runtime");
        new.port = old.port;
    }
    if old.metrics_url != new.metrics_url {
        info!("change ignored, changing the metrics_url is not allowed during runtime");
        new.metrics_url = old.metrics_url.clone();
    }
    if old.discover_url != new.discover_url {
        info!("change ignored, changing the discover_url is not allowed during runtime");
        new.discover_url = old.discover_url.clone();
    }
    if old.reload_url != new.reload_url {
        info!("change ignored, changing the reload_url is not allowed during runtime");
        new.reload_url = old.reload_url.clone();
    }
}
