//! Routing configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration. Call [`RoutingConfig::validate`] (or any constructor that
//! takes a config) before use; invalid values are fatal.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CallError, Error, Result};
use crate::health::{ErrorFilter, HealthPolicy};
use crate::ring::{DEFAULT_QUORUM, DEFAULT_VNODES};

/// Caller-supplied test for errors that must not count towards circuit
/// breaking.
pub type ErrorPredicate = Arc<dyn Fn(&CallError) -> bool + Send + Sync>;

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// N: nodes per quorum.
    pub quorum_size: usize,
    /// V: ring tokens per physical node.
    pub virtual_nodes_per_physical_node: usize,
    /// A node is excluded when its failure ratio over one window exceeds this.
    pub failure_ratio_threshold: f64,
    /// Windows with fewer counted outcomes never trip the breaker.
    pub min_requests_per_window: u32,
    /// Length of one health window, i.e. the evaluation period.
    pub health_check_interval_ms: u64,
    /// Spacing between probe slots for an excluded node.
    pub probe_interval_secs: u64,
    /// Per-member bound on waiting for a usable connection.
    pub max_wait_for_connection_ms: u64,
    /// `CallError::Application` kinds that are never counted as failures.
    pub ignored_error_kinds: Vec<String>,
    #[serde(skip)]
    pub ignored_error_predicate: Option<ErrorPredicate>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            quorum_size: DEFAULT_QUORUM,
            virtual_nodes_per_physical_node: DEFAULT_VNODES,
            failure_ratio_threshold: 0.5,
            min_requests_per_window: 10,
            health_check_interval_ms: 1_000,
            probe_interval_secs: 5,
            max_wait_for_connection_ms: 500,
            ignored_error_kinds: Vec::new(),
            ignored_error_predicate: None,
        }
    }
}

impl fmt::Debug for RoutingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingConfig")
            .field("quorum_size", &self.quorum_size)
            .field(
                "virtual_nodes_per_physical_node",
                &self.virtual_nodes_per_physical_node,
            )
            .field("failure_ratio_threshold", &self.failure_ratio_threshold)
            .field("min_requests_per_window", &self.min_requests_per_window)
            .field("health_check_interval_ms", &self.health_check_interval_ms)
            .field("probe_interval_secs", &self.probe_interval_secs)
            .field("max_wait_for_connection_ms", &self.max_wait_for_connection_ms)
            .field("ignored_error_kinds", &self.ignored_error_kinds)
            .field(
                "ignored_error_predicate",
                &self.ignored_error_predicate.is_some(),
            )
            .finish()
    }
}

impl RoutingConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Install a predicate marking errors as non-breaking.
    pub fn with_ignored_errors<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CallError) -> bool + Send + Sync + 'static,
    {
        self.ignored_error_predicate = Some(Arc::new(predicate));
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.quorum_size == 0 {
            return Err(Error::Config("quorum_size must be > 0".into()));
        }
        if self.virtual_nodes_per_physical_node == 0 {
            return Err(Error::Config(
                "virtual_nodes_per_physical_node must be > 0".into(),
            ));
        }
        let threshold = self.failure_ratio_threshold;
        // ratios never exceed 1.0, so 1.0 would never trip
        if !(threshold > 0.0 && threshold < 1.0) {
            return Err(Error::Config(format!(
                "failure_ratio_threshold must be in (0, 1), got {threshold}"
            )));
        }
        if self.health_check_interval_ms == 0 {
            return Err(Error::Config("health_check_interval_ms must be > 0".into()));
        }
        if self.probe_interval_secs == 0 {
            return Err(Error::Config("probe_interval_secs must be > 0".into()));
        }
        if self.max_wait_for_connection_ms == 0 {
            return Err(Error::Config(
                "max_wait_for_connection_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn max_wait_for_connection(&self) -> Duration {
        Duration::from_millis(self.max_wait_for_connection_ms)
    }

    /// True if `err` matches the ignore list or the ignore predicate.
    pub fn is_ignored(&self, err: &CallError) -> bool {
        self.error_filter().is_ignored(err)
    }

    pub fn error_filter(&self) -> ErrorFilter {
        ErrorFilter::new(
            self.ignored_error_kinds.clone(),
            self.ignored_error_predicate.clone(),
        )
    }

    pub fn health_policy(&self) -> HealthPolicy {
        HealthPolicy {
            failure_ratio_threshold: self.failure_ratio_threshold,
            min_requests: self.min_requests_per_window,
            probe_interval: self.probe_interval(),
            filter: self.error_filter(),
        }
    }
}
