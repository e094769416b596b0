//! Per-target metric registries
//!
//! Every target owns one `prometheus::Registry`. Series families are created
//! on first use and live as long as the registry, so values from previous
//! scrapes stay visible until they are overwritten.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use prometheus::core::Collector;
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use thiserror::Error;
use tikmon_core::MetricType;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("metric '{name}' already registered as {existing:?}, not {requested:?}")]
    KindMismatch {
        name: String,
        existing: MetricType,
        requested: MetricType,
    },

    #[error("metric '{name}' already registered with labels {existing:?}, not {requested:?}")]
    LabelMismatch {
        name: String,
        existing: Vec<String>,
        requested: Vec<String>,
    },

    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encode(String),
}

#[derive(Clone)]
enum FamilyVec {
    Gauge(GaugeVec),
    Counter(CounterVec),
}

/// Handle to one named series family
#[derive(Clone)]
pub struct SeriesFamily {
    name: String,
    kind: MetricType,
    label_names: Vec<String>,
    vec: FamilyVec,
    // serializes read-then-increment of counters
    update: Arc<Mutex<()>>,
}

impl SeriesFamily {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricType {
        self.kind
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Gauge: set the value. Counter: raise to the value, never lower it.
    pub fn observe(&self, label_values: &[&str], value: f64) -> Result<(), RegistryError> {
        match &self.vec {
            FamilyVec::Gauge(vec) => {
                vec.get_metric_with_label_values(label_values)?.set(value);
            }
            FamilyVec::Counter(vec) => {
                let counter = vec.get_metric_with_label_values(label_values)?;
                let _guard = self.update.lock();
                let current = counter.get();
                if value > current {
                    counter.inc_by(value - current);
                }
            }
        }
        Ok(())
    }

    /// Current value of one series, `None` when it was never observed
    pub fn value(&self, label_values: &[&str]) -> Option<f64> {
        if label_values.len() != self.label_names.len() {
            return None;
        }
        let families = match &self.vec {
            FamilyVec::Gauge(vec) => vec.collect(),
            FamilyVec::Counter(vec) => vec.collect(),
        };
        families
            .iter()
            .flat_map(|family| family.get_metric())
            .find(|metric| {
                self.label_names.iter().zip(label_values).all(|(name, value)| {
                    metric
                        .get_label()
                        .iter()
                        .any(|pair| pair.get_name() == name && pair.get_value() == *value)
                })
            })
            .map(|metric| match self.kind {
                MetricType::Gauge => metric.get_gauge().get_value(),
                MetricType::Counter => metric.get_counter().get_value(),
            })
    }
}

/// Metric registry of one target
pub struct MetricRegistry {
    registry: Registry,
    families: Mutex<HashMap<String, SeriesFamily>>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            families: Mutex::new(HashMap::new()),
        }
    }

    /// Return the family registered under `name`, creating it on first use
    pub fn get_or_create(
        &self,
        name: &str,
        help: &str,
        kind: MetricType,
        label_names: &[String],
    ) -> Result<SeriesFamily, RegistryError> {
        let mut families = self.families.lock();

        if let Some(family) = families.get(name) {
            if family.kind != kind {
                return Err(RegistryError::KindMismatch {
                    name: name.to_string(),
                    existing: family.kind,
                    requested: kind,
                });
            }
            if family.label_names != label_names {
                return Err(RegistryError::LabelMismatch {
                    name: name.to_string(),
                    existing: family.label_names.clone(),
                    requested: label_names.to_vec(),
                });
            }
            return Ok(family.clone());
        }

        // help text is mandatory for prometheus descriptors
        let help = if help.is_empty() { name } else { help };
        let opts = Opts::new(name, help);
        let names: Vec<&str> = label_names.iter().map(String::as_str).collect();

        let vec = match kind {
            MetricType::Gauge => {
                let vec = GaugeVec::new(opts, &names)?;
                self.registry.register(Box::new(vec.clone()))?;
                FamilyVec::Gauge(vec)
            }
            MetricType::Counter => {
                let vec = CounterVec::new(opts, &names)?;
                self.registry.register(Box::new(vec.clone()))?;
                FamilyVec::Counter(vec)
            }
        };

        let family = SeriesFamily {
            name: name.to_string(),
            kind,
            label_names: label_names.to_vec(),
            vec,
            update: Arc::new(Mutex::new(())),
        };
        families.insert(name.to_string(), family.clone());
        Ok(family)
    }

    /// Number of registered families
    pub fn len(&self) -> usize {
        self.families.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.lock().is_empty()
    }

    /// Text exposition format 0.0.4
    pub fn encode(&self) -> Result<String, RegistryError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::with_capacity(4096);
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| RegistryError::Encode(e.to_string()))
    }
}

/// Registries of all targets
#[derive(Default)]
pub struct RegistryStore {
    registries: RwLock<HashMap<String, Arc<MetricRegistry>>>,
}

impl RegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of `target`, created on first use
    pub fn for_target(&self, target: &str) -> Arc<MetricRegistry> {
        if let Some(registry) = self.registries.read().get(target) {
            return Arc::clone(registry);
        }
        Arc::clone(
            self.registries
                .write()
                .entry(target.to_string())
                .or_default(),
        )
    }

    pub fn get(&self, target: &str) -> Option<Arc<MetricRegistry>> {
        self.registries.read().get(target).cloned()
    }

    /// Drop registries of targets that no longer exist
    pub fn retain_targets<'a, I>(&self, targets: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keep: std::collections::HashSet<&str> = targets.into_iter().collect();
        self.registries
            .write()
            .retain(|name, _| keep.contains(name.as_str()));
    }
}
