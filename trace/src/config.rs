use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::export::Exporter;
use crate::id_generator::{IDGenerator, DEFAULT_ID_GENERATOR};
use crate::sampling::{probability_sampler, Sampler};
use crate::tracer::Tracer;

const DEFAULT_SERVICE_VERSION: &str = "1.0.0";
const DEFAULT_ENVIRONMENT: &str = "development";
const DEFAULT_FLUSH_INTERVAL_MS: u64 = 5_000;
const DEFAULT_BATCH_SIZE_THRESHOLD: usize = 100;

/// Config represents the static tracing configuration of a service.
///
/// Every field has a default, so a partial document deserializes cleanly;
/// only `service_name` must be supplied before a tracer can be built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// service_name is recorded on every span as `service.name`.
    pub service_name: String,
    /// service_version is recorded on every span as `service.version`.
    pub service_version: String,
    /// environment is recorded on every span as `service.environment`.
    pub environment: String,
    /// sample_rate is the fraction of new traces that are recorded, in [0, 1].
    pub sample_rate: f64,
    /// flush_interval_ms is the period of the background flush; 0 disables it.
    pub flush_interval_ms: u64,
    /// batch_size_threshold is the number of buffered spans that triggers a
    /// flush.
    pub batch_size_threshold: usize,
    /// resample_unsampled_parents makes the sampler reconsider traces that
    /// arrive already marked as not sampled. Sampled parents are always
    /// followed.
    pub resample_unsampled_parents: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            service_name: String::new(),
            service_version: DEFAULT_SERVICE_VERSION.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            sample_rate: 1.0,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            batch_size_threshold: DEFAULT_BATCH_SIZE_THRESHOLD,
            resample_unsampled_parents: false,
        }
    }
}

impl Config {
    /// new returns the default configuration for service_name.
    pub fn new(service_name: impl Into<String>) -> Self {
        Config {
            service_name: service_name.into(),
            ..Config::default()
        }
    }

    /// validate checks the settings a tracer relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::MissingServiceName);
        }
        if !(0.0..=1.0).contains(&self.sample_rate) {
            return Err(ConfigError::InvalidSampleRate(self.sample_rate));
        }
        if self.batch_size_threshold == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        Ok(())
    }

    /// flush_interval returns the background flush period, if enabled.
    pub fn flush_interval(&self) -> Option<Duration> {
        if self.flush_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.flush_interval_ms))
        }
    }
}

/// TracerBuilder assembles a Tracer from a Config plus the parts that cannot
/// be expressed in a config document.
pub struct TracerBuilder {
    config: Config,
    exporters: Vec<Arc<dyn Exporter>>,
    id_generator: Arc<dyn IDGenerator + Send + Sync>,
    sampler: Option<Sampler>,
}

impl TracerBuilder {
    /// from_config starts a builder from a loaded configuration document.
    pub fn from_config(config: Config) -> Self {
        TracerBuilder {
            config,
            exporters: Vec::new(),
            id_generator: Arc::clone(&DEFAULT_ID_GENERATOR),
            sampler: None,
        }
    }

    /// with_service_version sets the `service.version` attribute.
    pub fn with_service_version(mut self, version: impl Into<String>) -> Self {
        self.config.service_version = version.into();
        self
    }

    /// with_environment sets the `service.environment` attribute.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.config.environment = environment.into();
        self
    }

    /// with_sample_rate sets the fraction of new traces recorded.
    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    /// with_flush_interval sets the background flush period; None disables it.
    pub fn with_flush_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.flush_interval_ms = interval.map_or(0, |d| d.as_millis().max(1) as u64);
        self
    }

    /// with_batch_size_threshold sets the buffer size that triggers a flush.
    pub fn with_batch_size_threshold(mut self, threshold: usize) -> Self {
        self.config.batch_size_threshold = threshold;
        self
    }

    /// with_resample_unsampled_parents lets the sampler reconsider unsampled parents.
    pub fn with_resample_unsampled_parents(mut self, resample: bool) -> Self {
        self.config.resample_unsampled_parents = resample;
        self
    }

    /// with_exporter adds an exporter that receives every flushed batch.
    pub fn with_exporter(self, exporter: impl Exporter + 'static) -> Self {
        self.with_shared_exporter(Arc::new(exporter))
    }

    /// with_shared_exporter adds an exporter that is also used elsewhere.
    pub fn with_shared_exporter(mut self, exporter: Arc<dyn Exporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    /// with_id_generator replaces the default random id generator.
    pub fn with_id_generator(mut self, id_generator: Arc<dyn IDGenerator + Send + Sync>) -> Self {
        self.id_generator = id_generator;
        self
    }

    /// with_sampler replaces the probability sampler derived from the sample
    /// rate.
    pub fn with_sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// build validates the configuration and starts the tracer.
    ///
    /// When called inside a tokio runtime and a flush interval is configured,
    /// a background task flushes the tracer periodically.
    pub fn build(self) -> Result<Tracer, ConfigError> {
        self.config.validate()?;
        let sampler = self
            .sampler
            .unwrap_or_else(|| probability_sampler(self.config.sample_rate));
        Ok(Tracer::from_parts(
            self.config,
            self.exporters,
            self.id_generator,
            sampler,
        ))
    }
}

impl fmt::Debug for TracerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerBuilder")
            .field("config", &self.config)
            .field("exporters", &self.exporters)
            .field("id_generator", &self.id_generator)
            .field("custom_sampler", &self.sampler.is_some())
            .finish()
    }
}
